//! Alpha Vantage `GLOBAL_QUOTE` integration. One call per symbol; the free tier allows five a
//! minute, which is why per-symbol runs against this provider are paced at twelve seconds.

use log::debug;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::config::AlphaVantageConfig;
use crate::fetch::{
    FetchError, Field, FieldMap, NormalizeError, PreparedRequest, RequestBuilder, UpstreamKind,
};
use crate::quote::Quote;
use crate::utils::time::previous_weekday;

use super::PerSymbolApi;

const QUOTE_KEY: &str = "Global Quote";

const GLOBAL_QUOTE_FIELDS: FieldMap = FieldMap::new(&[
    (Field::Symbol, &["01. symbol"]),
    (Field::CurrentPrice, &["05. price"]),
    (Field::ReferencePrice, &["08. previous close"]),
    (Field::PriceTime, &["07. latest trading day"]),
    (Field::ChangePercent, &["10. change percent"]),
]);

pub struct GlobalQuoteApi {
    base_url: String,
}

impl GlobalQuoteApi {
    pub fn new(config: &AlphaVantageConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
        }
    }
}

impl PerSymbolApi for GlobalQuoteApi {
    fn request(&self, credential: &str, symbol: &str) -> PreparedRequest {
        RequestBuilder::new(&self.base_url, "query")
            .label(format!("GLOBAL_QUOTE {symbol}"))
            .param("function", "GLOBAL_QUOTE")
            .param("symbol", symbol)
            .secret("apikey", credential)
            .build()
    }

    fn upstream_error(&self, body: &Value) -> Option<FetchError> {
        let text = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_string);

        if let Some(note) = text("Note").or_else(|| text("Information")) {
            return Some(FetchError::upstream(UpstreamKind::RateLimited, note));
        }
        if let Some(message) = text("Error Message") {
            let kind = if message.to_lowercase().contains("apikey") {
                UpstreamKind::InvalidCredential
            } else {
                UpstreamKind::Provider
            };
            return Some(FetchError::upstream(kind, message));
        }
        if !body.get(QUOTE_KEY).is_some_and(Value::is_object) {
            return Some(FetchError::upstream(
                UpstreamKind::MalformedBody,
                format!("response has no `{QUOTE_KEY}` object"),
            ));
        }
        None
    }

    fn normalize(&self, symbol: &str, body: &Value) -> Result<Quote, NormalizeError> {
        let record = body
            .get(QUOTE_KEY)
            .filter(|record| record.as_object().is_some_and(|map| !map.is_empty()))
            .ok_or_else(|| NormalizeError::Empty(symbol.to_string()))?;

        let returned = GLOBAL_QUOTE_FIELDS.require_str(record, Field::Symbol)?;
        if !returned.eq_ignore_ascii_case(symbol) {
            return Err(NormalizeError::SymbolMismatch {
                expected: symbol.to_string(),
                actual: returned,
            });
        }

        let price = GLOBAL_QUOTE_FIELDS.require_decimal(record, Field::CurrentPrice)?;
        let previous_close = GLOBAL_QUOTE_FIELDS.require_decimal(record, Field::ReferencePrice)?;
        let trading_day = GLOBAL_QUOTE_FIELDS.require_timestamp(record, Field::PriceTime)?;
        let reported_pct = GLOBAL_QUOTE_FIELDS.optional_decimal(record, Field::ChangePercent)?;

        // GLOBAL_QUOTE carries no date for the previous close. The weekday before the latest
        // trading day is an estimate and lands on the holiday itself after an exchange closure.
        let estimated_close_date = previous_weekday(trading_day.date_naive());
        let quote = Quote::derive(
            symbol,
            price,
            previous_close,
            trading_day,
            estimated_close_date,
        )?;

        if let Some(reported) = reported_pct {
            let drift = reported
                .checked_sub(quote.percentage_change())
                .map(|diff| diff.abs());
            if drift.map_or(true, |drift| drift > Decimal::new(1, 2)) {
                debug!(
                    "{symbol}: provider change percent {reported} differs from derived {}",
                    quote.percentage_change().round_dp(4)
                );
            }
        }

        Ok(quote)
    }
}
