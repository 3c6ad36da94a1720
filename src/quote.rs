use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::FetchMode;
use crate::fetch::{FetchError, NormalizeError};
use crate::utils::{serialize_money, DateRange};

pub const REASON_INVALID_DATA: &str = "Invalid data received";
pub const REASON_NO_DATA: &str = "No data available";
pub const REASON_FETCH_FAILED: &str = "Failed to fetch data";
pub const REASON_INCOMPLETE: &str = "Incomplete data";
pub const REASON_CANCELLED: &str = "Cancelled";

/// Normalized price snapshot for one symbol.
///
/// `price_change`, `percentage_change` and `is_positive` are derived in [`Quote::derive`]
/// and cannot be set independently.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    symbol: String,
    #[serde(serialize_with = "serialize_money")]
    current_price: Decimal,
    #[serde(serialize_with = "serialize_money")]
    last_close_price: Decimal,
    #[serde(serialize_with = "serialize_money")]
    price_change: Decimal,
    #[serde(serialize_with = "serialize_money")]
    percentage_change: Decimal,
    current_price_time: DateTime<Utc>,
    last_close_date: NaiveDate,
    is_positive: bool,
}

impl Quote {
    pub fn derive(
        symbol: impl Into<String>,
        current_price: Decimal,
        last_close_price: Decimal,
        current_price_time: DateTime<Utc>,
        last_close_date: NaiveDate,
    ) -> Result<Self, NormalizeError> {
        let symbol = symbol.into();
        if last_close_price.is_zero() {
            return Err(NormalizeError::ZeroReference(symbol));
        }

        let price_change = current_price.checked_sub(last_close_price);
        let percentage_change = price_change
            .and_then(|change| change.checked_div(last_close_price))
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED));
        let (Some(price_change), Some(percentage_change)) = (price_change, percentage_change)
        else {
            return Err(NormalizeError::Overflow(symbol));
        };

        Ok(Self {
            symbol,
            current_price,
            last_close_price,
            price_change,
            percentage_change,
            current_price_time,
            last_close_date,
            is_positive: price_change >= Decimal::ZERO,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn current_price(&self) -> Decimal {
        self.current_price
    }

    pub fn last_close_price(&self) -> Decimal {
        self.last_close_price
    }

    pub fn price_change(&self) -> Decimal {
        self.price_change
    }

    pub fn percentage_change(&self) -> Decimal {
        self.percentage_change
    }

    pub fn current_price_time(&self) -> DateTime<Utc> {
        self.current_price_time
    }

    pub fn last_close_date(&self) -> NaiveDate {
        self.last_close_date
    }

    pub fn is_positive(&self) -> bool {
        self.is_positive
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteError {
    pub symbol: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_intraday: Option<bool>,
    #[serde(rename = "hasEOD", skip_serializing_if = "Option::is_none")]
    pub has_eod: Option<bool>,
}

impl QuoteError {
    fn new(symbol: &str, error: &str, details: Option<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            error: error.to_string(),
            details,
            has_intraday: None,
            has_eod: None,
        }
    }

    pub fn fetch_failed(symbol: &str, err: &FetchError) -> Self {
        Self::new(symbol, REASON_FETCH_FAILED, Some(err.to_string()))
    }

    pub fn from_normalize(symbol: &str, err: &NormalizeError) -> Self {
        let reason = match err {
            NormalizeError::Empty(_) => REASON_NO_DATA,
            _ => REASON_INVALID_DATA,
        };
        Self::new(symbol, reason, Some(err.to_string()))
    }

    pub fn incomplete(symbol: &str, has_intraday: bool, has_eod: bool) -> Self {
        let mut missing = Vec::new();
        if !has_intraday {
            missing.push("intraday");
        }
        if !has_eod {
            missing.push("end-of-day");
        }
        let details = format!("missing {} data", missing.join(" and "));
        Self {
            has_intraday: Some(has_intraday),
            has_eod: Some(has_eod),
            ..Self::new(symbol, REASON_INCOMPLETE, Some(details))
        }
    }

    pub fn cancelled(symbol: &str) -> Self {
        Self::new(
            symbol,
            REASON_CANCELLED,
            Some("aggregation cancelled before this symbol was fetched".to_string()),
        )
    }

    pub fn with_availability(mut self, has_intraday: bool, has_eod: bool) -> Self {
        self.has_intraday = Some(has_intraday);
        self.has_eod = Some(has_eod);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QuoteEntry {
    Quote(Quote),
    Error(QuoteError),
}

impl QuoteEntry {
    pub fn symbol(&self) -> &str {
        match self {
            QuoteEntry::Quote(quote) => quote.symbol(),
            QuoteEntry::Error(error) => &error.symbol,
        }
    }

    pub fn as_quote(&self) -> Option<&Quote> {
        match self {
            QuoteEntry::Quote(quote) => Some(quote),
            QuoteEntry::Error(_) => None,
        }
    }

    pub fn as_error(&self) -> Option<&QuoteError> {
        match self {
            QuoteEntry::Quote(_) => None,
            QuoteEntry::Error(error) => Some(error),
        }
    }
}

impl From<Quote> for QuoteEntry {
    fn from(quote: Quote) -> Self {
        QuoteEntry::Quote(quote)
    }
}

impl From<QuoteError> for QuoteEntry {
    fn from(error: QuoteError) -> Self {
        QuoteEntry::Error(error)
    }
}

/// Outcome of one aggregation run: one entry per watchlist symbol, in watchlist order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub success: bool,
    pub data: Vec<QuoteEntry>,
    pub timestamp: DateTime<Utc>,
    pub api_calls_used: usize,
    pub provider: String,
    pub mode: FetchMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

impl AggregateResult {
    pub fn quotes(&self) -> impl Iterator<Item = &Quote> {
        self.data.iter().filter_map(QuoteEntry::as_quote)
    }

    pub fn errors(&self) -> impl Iterator<Item = &QuoteError> {
        self.data.iter().filter_map(QuoteEntry::as_error)
    }
}
