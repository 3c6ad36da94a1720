//! Marketstack integration.
//!
//! Per-symbol runs call `eod/latest` once per symbol and compare the session close with its
//! open. Batched runs make two calls for the whole watchlist, `intraday/latest` for the current
//! price and `eod` over a short date window for the previous close, then merge them per symbol.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::config::MarketstackConfig;
use crate::fetch::transport::extract_error_message;
use crate::fetch::{
    FetchError, FetchResult, Field, FieldMap, NormalizeError, PreparedRequest, RequestBuilder,
    UpstreamKind,
};
use crate::quote::{Quote, QuoteEntry, QuoteError};
use crate::utils::DateRange;

use super::PerSymbolApi;

const CREDENTIAL_PARAM: &str = "access_key";

const EOD_LATEST_FIELDS: FieldMap = FieldMap::new(&[
    (Field::Symbol, &["symbol"]),
    (Field::CurrentPrice, &["close"]),
    (Field::ReferencePrice, &["open"]),
    (Field::PriceTime, &["date"]),
]);

const INTRADAY_FIELDS: FieldMap = FieldMap::new(&[
    (Field::Symbol, &["symbol"]),
    (Field::CurrentPrice, &["last", "close"]),
    (Field::PriceTime, &["date"]),
]);

const EOD_HISTORY_FIELDS: FieldMap = FieldMap::new(&[
    (Field::Symbol, &["symbol"]),
    (Field::ReferencePrice, &["close"]),
    (Field::CloseDate, &["date"]),
]);

fn data_rows(body: &Value) -> &[Value] {
    body.get("data")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn row_symbol(row: &Value) -> Option<String> {
    row.get("symbol")
        .and_then(Value::as_str)
        .map(|symbol| symbol.trim().to_uppercase())
}

/// Marketstack reports quota and key problems as an `error` object, sometimes with HTTP 200.
fn body_error(body: &Value) -> Option<FetchError> {
    if let Some(error) = body.get("error") {
        let code = error.get("code").and_then(Value::as_str).unwrap_or_default();
        let message = extract_error_message(body).unwrap_or_else(|| code.to_string());
        let kind = match code {
            "invalid_access_key" | "missing_access_key" | "inactive_user" => {
                UpstreamKind::InvalidCredential
            }
            "usage_limit_reached" | "rate_limit_reached" => UpstreamKind::RateLimited,
            _ => UpstreamKind::Provider,
        };
        return Some(FetchError::upstream(kind, message));
    }

    if !body.get("data").is_some_and(Value::is_array) {
        return Some(FetchError::upstream(
            UpstreamKind::MalformedBody,
            "response has no `data` array",
        ));
    }
    None
}

pub struct MarketstackLatestApi {
    base_url: String,
}

impl MarketstackLatestApi {
    pub fn new(config: &MarketstackConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
        }
    }
}

impl PerSymbolApi for MarketstackLatestApi {
    fn request(&self, credential: &str, symbol: &str) -> PreparedRequest {
        RequestBuilder::new(&self.base_url, "eod/latest")
            .label(format!("eod/latest {symbol}"))
            .secret(CREDENTIAL_PARAM, credential)
            .param("symbols", symbol)
            .param("limit", 1)
            .build()
    }

    fn upstream_error(&self, body: &Value) -> Option<FetchError> {
        body_error(body)
    }

    fn normalize(&self, symbol: &str, body: &Value) -> Result<Quote, NormalizeError> {
        let rows = data_rows(body);
        let row = rows
            .iter()
            .find(|row| row_symbol(row).as_deref() == Some(symbol))
            .or_else(|| rows.first())
            .ok_or_else(|| NormalizeError::Empty(symbol.to_string()))?;

        let returned = EOD_LATEST_FIELDS.require_str(row, Field::Symbol)?;
        if !returned.eq_ignore_ascii_case(symbol) {
            return Err(NormalizeError::SymbolMismatch {
                expected: symbol.to_string(),
                actual: returned,
            });
        }

        let close = EOD_LATEST_FIELDS.require_decimal(row, Field::CurrentPrice)?;
        let open = EOD_LATEST_FIELDS.require_decimal(row, Field::ReferencePrice)?;
        let session = EOD_LATEST_FIELDS.require_timestamp(row, Field::PriceTime)?;

        Quote::derive(symbol, close, open, session, session.date_naive())
    }
}

pub struct MarketstackBatchApi {
    base_url: String,
    lookback_days: u32,
}

impl MarketstackBatchApi {
    pub fn new(config: &MarketstackConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            lookback_days: config.lookback_days,
        }
    }

    pub fn lookback_days(&self) -> u32 {
        self.lookback_days
    }

    pub fn intraday_request(&self, credential: &str, symbols: &[String]) -> PreparedRequest {
        RequestBuilder::new(&self.base_url, "intraday/latest")
            .secret(CREDENTIAL_PARAM, credential)
            .param("symbols", symbols.join(","))
            .build()
    }

    /// One page sized to hold `lookback_days` rows for every symbol.
    pub fn eod_request(
        &self,
        credential: &str,
        symbols: &[String],
        range: &DateRange,
    ) -> PreparedRequest {
        let limit = symbols.len() * self.lookback_days as usize;
        RequestBuilder::new(&self.base_url, "eod")
            .secret(CREDENTIAL_PARAM, credential)
            .param("symbols", symbols.join(","))
            .param("date_from", range.from.format("%Y-%m-%d"))
            .param("date_to", range.to.format("%Y-%m-%d"))
            .param("limit", limit)
            .build()
    }

    pub fn upstream_error(&self, body: &Value) -> Option<FetchError> {
        body_error(body)
    }

    /// Combine both payloads into one entry per symbol, in `symbols` order.
    pub fn merge(
        &self,
        symbols: &[String],
        intraday: &FetchResult<Value>,
        eod: &FetchResult<Value>,
    ) -> Vec<QuoteEntry> {
        let intraday_rows = index_first(intraday);
        let eod_rows = index_all(eod);
        let call_failure = intraday.as_ref().err().or(eod.as_ref().err());

        symbols
            .iter()
            .map(|symbol| -> QuoteEntry {
                let latest = intraday_rows.get(symbol.as_str()).copied();
                let history = eod_rows.get(symbol.as_str());
                let has_intraday = latest.is_some();
                let has_eod = history.is_some();

                if let Some(err) = call_failure {
                    return QuoteError::fetch_failed(symbol, err)
                        .with_availability(has_intraday, has_eod)
                        .into();
                }

                match (latest, history) {
                    (Some(latest), Some(history)) => merge_symbol(symbol, latest, history)
                        .map(QuoteEntry::from)
                        .unwrap_or_else(|err| {
                            QuoteError::from_normalize(symbol, &err)
                                .with_availability(true, true)
                                .into()
                        }),
                    _ => QuoteError::incomplete(symbol, has_intraday, has_eod).into(),
                }
            })
            .collect()
    }
}

fn index_first(payload: &FetchResult<Value>) -> HashMap<String, &Value> {
    let mut index = HashMap::new();
    if let Ok(body) = payload {
        for row in data_rows(body) {
            if let Some(symbol) = row_symbol(row) {
                index.entry(symbol).or_insert(row);
            }
        }
    }
    index
}

fn index_all(payload: &FetchResult<Value>) -> HashMap<String, Vec<&Value>> {
    let mut index: HashMap<String, Vec<&Value>> = HashMap::new();
    if let Ok(body) = payload {
        for row in data_rows(body) {
            if let Some(symbol) = row_symbol(row) {
                index.entry(symbol).or_default().push(row);
            }
        }
    }
    index
}

/// The previous close is the latest EOD row dated before the intraday session, or the latest
/// EOD row overall when the provider has not published the prior session yet.
fn merge_symbol(symbol: &str, latest: &Value, history: &[&Value]) -> Result<Quote, NormalizeError> {
    let current = INTRADAY_FIELDS.require_decimal(latest, Field::CurrentPrice)?;
    let price_time = INTRADAY_FIELDS.require_timestamp(latest, Field::PriceTime)?;
    let session_day = price_time.date_naive();

    let mut closes: Vec<(NaiveDate, Decimal)> = Vec::with_capacity(history.len());
    for row in history {
        let date = EOD_HISTORY_FIELDS
            .require_timestamp(row, Field::CloseDate)?
            .date_naive();
        let close = EOD_HISTORY_FIELDS.require_decimal(row, Field::ReferencePrice)?;
        closes.push((date, close));
    }

    let (close_date, last_close) = closes
        .iter()
        .filter(|(date, _)| *date < session_day)
        .max_by_key(|(date, _)| *date)
        .or_else(|| closes.iter().max_by_key(|(date, _)| *date))
        .copied()
        .ok_or_else(|| NormalizeError::Empty(symbol.to_string()))?;

    Quote::derive(symbol, current, last_close, price_time, close_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::TransportKind;
    use serde_json::json;

    fn latest_api() -> MarketstackLatestApi {
        MarketstackLatestApi::new(&MarketstackConfig::default())
    }

    fn batch_api() -> MarketstackBatchApi {
        MarketstackBatchApi::new(&MarketstackConfig::default())
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn latest_request_carries_symbol_and_key() {
        let request = latest_api().request("secret", "TSLA");
        assert!(request.url.ends_with("/eod/latest"));
        assert_eq!(request.param("symbols"), Some("TSLA"));
        assert_eq!(request.param("access_key"), Some("secret"));
        assert_eq!(request.param("limit"), Some("1"));
        assert!(!request.redacted_query().contains("secret"));
    }

    #[test]
    fn normalizes_close_against_open() {
        let body = json!({
            "data": [{
                "symbol": "TSLA", "open": 245.0, "close": 250.0,
                "date": "2024-01-05T00:00:00+0000"
            }]
        });
        let quote = latest_api().normalize("TSLA", &body).expect("normalizes");
        let json = serde_json::to_value(&quote).unwrap();

        assert_eq!(json["priceChange"], "5.00");
        assert_eq!(json["percentageChange"], "2.04");
        assert_eq!(json["isPositive"], true);
        assert_eq!(json["lastCloseDate"], "2024-01-05");
    }

    #[test]
    fn empty_data_is_no_data() {
        let err = latest_api()
            .normalize("GOOGL", &json!({ "data": [] }))
            .expect_err("nothing to normalize");
        assert_eq!(err, NormalizeError::Empty("GOOGL".to_string()));
    }

    #[test]
    fn malformed_date_is_normalization_error() {
        let body = json!({
            "data": [{ "symbol": "AMZN", "open": 150.0, "close": 151.0, "date": "Invalid Date" }]
        });
        let err = latest_api().normalize("AMZN", &body).expect_err("bad date");
        assert!(matches!(err, NormalizeError::InvalidDate { .. }));
    }

    #[test]
    fn extreme_prices_degrade_instead_of_panicking() {
        let body = json!({
            "data": [{
                "symbol": "TSLA", "open": "0.0000000001",
                "close": "79228162514264337593543950335", "date": "2024-01-05"
            }]
        });
        let err = latest_api().normalize("TSLA", &body).expect_err("out of range");
        assert_eq!(err, NormalizeError::Overflow("TSLA".to_string()));
    }

    #[test]
    fn missing_close_is_not_defaulted() {
        let body = json!({
            "data": [{ "symbol": "AMZN", "open": 150.0, "date": "2024-01-05" }]
        });
        let err = latest_api().normalize("AMZN", &body).expect_err("no close");
        assert!(matches!(
            err,
            NormalizeError::MissingField { field: Field::CurrentPrice, .. }
        ));
    }

    #[test]
    fn error_envelope_maps_to_upstream_kind() {
        let body = json!({
            "error": { "code": "usage_limit_reached", "message": "Monthly limit reached" }
        });
        assert_eq!(
            latest_api().upstream_error(&body),
            Some(FetchError::upstream(UpstreamKind::RateLimited, "Monthly limit reached"))
        );

        let body = json!({ "error": { "code": "invalid_access_key", "message": "bad key" } });
        assert!(latest_api().upstream_error(&body).unwrap().is_invalid_credential());

        assert!(latest_api().upstream_error(&json!({ "data": [] })).is_none());
        assert!(matches!(
            latest_api().upstream_error(&json!({ "pagination": {} })),
            Some(FetchError::Upstream { kind: UpstreamKind::MalformedBody, .. })
        ));
    }

    #[test]
    fn eod_request_limit_scales_with_watchlist() {
        let range = DateRange {
            from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            to: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
        };
        let request = batch_api().eod_request("k", &symbols(&["TSLA", "MSFT", "NVDA"]), &range);
        assert_eq!(request.param("symbols"), Some("TSLA,MSFT,NVDA"));
        assert_eq!(request.param("limit"), Some("21"));
        assert_eq!(request.param("date_from"), Some("2024-01-01"));
        assert_eq!(request.param("date_to"), Some("2024-01-08"));
    }

    #[test]
    fn merge_uses_close_before_intraday_session() {
        let intraday = Ok(json!({ "data": [
            { "symbol": "MSFT", "last": 410.5, "close": 409.0, "date": "2024-01-08T15:30:00+0000" }
        ]}));
        let eod = Ok(json!({ "data": [
            { "symbol": "MSFT", "close": 405.0, "date": "2024-01-08T00:00:00+0000" },
            { "symbol": "MSFT", "close": 400.0, "date": "2024-01-05T00:00:00+0000" },
            { "symbol": "MSFT", "close": 398.0, "date": "2024-01-04T00:00:00+0000" }
        ]}));

        let entries = batch_api().merge(&symbols(&["MSFT"]), &intraday, &eod);
        let quote = entries[0].as_quote().expect("quote");
        let json = serde_json::to_value(quote).unwrap();

        assert_eq!(json["currentPrice"], "410.50");
        assert_eq!(json["lastClosePrice"], "400.00");
        assert_eq!(json["lastCloseDate"], "2024-01-05");
        assert_eq!(json["priceChange"], "10.50");
        assert_eq!(json["percentageChange"], "2.63");
    }

    #[test]
    fn merge_flags_partial_availability_in_order() {
        let intraday = Ok(json!({ "data": [
            { "symbol": "TSLA", "last": 251.0, "date": "2024-01-08T15:30:00+0000" }
        ]}));
        let eod = Ok(json!({ "data": [
            { "symbol": "NFLX", "close": 480.0, "date": "2024-01-05" },
            { "symbol": "TSLA", "close": 245.0, "date": "2024-01-05" }
        ]}));

        let entries = batch_api().merge(&symbols(&["NFLX", "TSLA", "META"]), &intraday, &eod);
        let order: Vec<&str> = entries.iter().map(QuoteEntry::symbol).collect();
        assert_eq!(order, vec!["NFLX", "TSLA", "META"]);

        let nflx = entries[0].as_error().expect("nflx has no intraday row");
        assert_eq!((nflx.has_intraday, nflx.has_eod), (Some(false), Some(true)));
        assert!(entries[1].as_quote().is_some());
        let meta = entries[2].as_error().expect("meta missing everywhere");
        assert_eq!((meta.has_intraday, meta.has_eod), (Some(false), Some(false)));
    }

    #[test]
    fn failed_call_degrades_every_symbol() {
        let intraday = Err(FetchError::transport(TransportKind::Timeout, "no response within 30s"));
        let eod = Ok(json!({ "data": [ { "symbol": "TSLA", "close": 245.0, "date": "2024-01-05" } ] }));

        let entries = batch_api().merge(&symbols(&["TSLA", "AMZN"]), &intraday, &eod);
        assert_eq!(entries.len(), 2);
        let tsla = entries[0].as_error().expect("error entry");
        assert!(tsla.details.as_deref().unwrap().contains("timed out"));
        assert_eq!((tsla.has_intraday, tsla.has_eod), (Some(false), Some(true)));
    }
}
