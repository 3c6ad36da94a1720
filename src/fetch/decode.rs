use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;

/// Canonical quote fields a provider record is mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Symbol,
    CurrentPrice,
    ReferencePrice,
    PriceTime,
    CloseDate,
    ChangePercent,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Symbol => "symbol",
            Field::CurrentPrice => "currentPrice",
            Field::ReferencePrice => "lastClosePrice",
            Field::PriceTime => "currentPriceTime",
            Field::CloseDate => "lastCloseDate",
            Field::ChangePercent => "percentageChange",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("provider returned no rows for {0}")]
    Empty(String),
    #[error("missing field `{field}` (looked for {keys})")]
    MissingField { field: Field, keys: String },
    #[error("field `{field}` is not numeric: {raw}")]
    NotNumeric { field: Field, raw: String },
    #[error("field `{field}` is not a valid date: {raw}")]
    InvalidDate { field: Field, raw: String },
    #[error("reference price for {0} is zero")]
    ZeroReference(String),
    #[error("price change for {0} is out of range")]
    Overflow(String),
    #[error("expected symbol {expected}, provider returned {actual}")]
    SymbolMismatch { expected: String, actual: String },
}

/// Explicit table from canonical field to the provider keys that may carry it, in priority order.
#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
    entries: &'static [(Field, &'static [&'static str])],
}

impl FieldMap {
    pub const fn new(entries: &'static [(Field, &'static [&'static str])]) -> Self {
        Self { entries }
    }

    pub fn keys(&self, field: Field) -> &'static [&'static str] {
        self.entries
            .iter()
            .find(|(candidate, _)| *candidate == field)
            .map(|(_, keys)| *keys)
            .unwrap_or(&[])
    }

    /// First non-null value among the keys mapped to `field`.
    pub fn lookup<'a>(&self, record: &'a Value, field: Field) -> Option<&'a Value> {
        self.keys(field)
            .iter()
            .filter_map(|key| record.get(*key))
            .find(|value| !value.is_null())
    }

    fn require<'a>(&self, record: &'a Value, field: Field) -> Result<&'a Value, NormalizeError> {
        self.lookup(record, field)
            .ok_or_else(|| NormalizeError::MissingField {
                field,
                keys: self.keys(field).join(", "),
            })
    }

    pub fn require_str(&self, record: &Value, field: Field) -> Result<String, NormalizeError> {
        let value = self.require(record, field)?;
        let text = value_to_string(value);
        if text.trim().is_empty() {
            return Err(NormalizeError::MissingField {
                field,
                keys: self.keys(field).join(", "),
            });
        }
        Ok(text.trim().to_string())
    }

    pub fn require_decimal(&self, record: &Value, field: Field) -> Result<Decimal, NormalizeError> {
        let value = self.require(record, field)?;
        parse_decimal(value).ok_or_else(|| NormalizeError::NotNumeric {
            field,
            raw: value_to_string(value),
        })
    }

    /// Absent is fine; present but unparsable is not.
    pub fn optional_decimal(
        &self,
        record: &Value,
        field: Field,
    ) -> Result<Option<Decimal>, NormalizeError> {
        match self.lookup(record, field) {
            None => Ok(None),
            Some(value) => parse_decimal(value)
                .map(Some)
                .ok_or_else(|| NormalizeError::NotNumeric {
                    field,
                    raw: value_to_string(value),
                }),
        }
    }

    pub fn require_timestamp(
        &self,
        record: &Value,
        field: Field,
    ) -> Result<DateTime<Utc>, NormalizeError> {
        let value = self.require(record, field)?;
        let raw = value_to_string(value);
        parse_timestamp(&raw).ok_or(NormalizeError::InvalidDate { field, raw })
    }
}

pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Accepts JSON numbers and numeric strings, tolerating a trailing `%` and thousands separators.
pub fn parse_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().replace(',', ""),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Parses provider timestamps. A bare `YYYY-MM-DD` is anchored to UTC midnight so the
/// calendar day never shifts with the host time zone.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MAP: FieldMap = FieldMap::new(&[
        (Field::Symbol, &["01. symbol", "symbol"]),
        (Field::CurrentPrice, &["last", "close"]),
        (Field::ChangePercent, &["10. change percent"]),
        (Field::PriceTime, &["date"]),
    ]);

    #[test]
    fn falls_back_through_mapped_keys() {
        let record = json!({ "last": null, "close": 250.5 });
        let price = MAP
            .require_decimal(&record, Field::CurrentPrice)
            .expect("close is used when last is null");
        assert_eq!(price, Decimal::new(2505, 1));
    }

    #[test]
    fn strips_percent_suffix() {
        let record = json!({ "10. change percent": "-1.2345%" });
        let pct = MAP
            .optional_decimal(&record, Field::ChangePercent)
            .expect("parses")
            .expect("present");
        assert_eq!(pct, Decimal::new(-12345, 4));
    }

    #[test]
    fn missing_key_is_typed_error() {
        let err = MAP
            .require_str(&json!({ "name": "Tesla" }), Field::Symbol)
            .expect_err("symbol missing");
        assert_eq!(
            err,
            NormalizeError::MissingField {
                field: Field::Symbol,
                keys: "01. symbol, symbol".to_string()
            }
        );
    }

    #[test]
    fn non_numeric_price_is_rejected_not_zeroed() {
        let err = MAP
            .require_decimal(&json!({ "last": "N/A" }), Field::CurrentPrice)
            .expect_err("N/A is not a price");
        assert!(matches!(err, NormalizeError::NotNumeric { .. }));
    }

    #[test]
    fn parses_marketstack_offset_format() {
        let ts = parse_timestamp("2024-01-05T15:59:00+0000").expect("parses");
        assert_eq!(ts.to_rfc3339(), "2024-01-05T15:59:00+00:00");
    }

    #[test]
    fn bare_date_anchors_to_utc_midnight() {
        let ts = parse_timestamp("2024-01-05").expect("parses");
        assert_eq!(ts.date_naive(), NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(ts.to_rfc3339(), "2024-01-05T00:00:00+00:00");
    }

    #[test]
    fn garbage_date_is_none() {
        assert!(parse_timestamp("2024-13-45").is_none());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(MAP
            .require_timestamp(&json!({ "date": "not a date" }), Field::PriceTime)
            .is_err());
    }
}
