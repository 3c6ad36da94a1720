use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use serde_json::Value;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, FetchMode, ProviderConfig};
use crate::error::{AppError, Result};
use crate::fetch::{FetchError, FetchResult, PreparedRequest, Transport};
use crate::pacing::CallPacing;
use crate::providers::{GlobalQuoteApi, MarketstackBatchApi, MarketstackLatestApi, PerSymbolApi};
use crate::quote::{AggregateResult, QuoteEntry, QuoteError};
use crate::utils::{lookback_range, DateRange};

pub const MISSING_CREDENTIAL: &str = "API key is required";

/// Fetches the configured watchlist and assembles one [`QuoteEntry`] per symbol.
///
/// Runs share nothing: each call to [`Aggregator::run`] starts from scratch, issues its upstream
/// calls strictly one after another, and returns a result sized to the watchlist.
pub struct Aggregator {
    config: Config,
    transport: Arc<dyn Transport>,
    pacing: Arc<dyn CallPacing>,
}

impl Aggregator {
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Self {
        let pacing = config.pacing();
        Self {
            config,
            transport,
            pacing,
        }
    }

    pub fn with_pacing(mut self, pacing: Arc<dyn CallPacing>) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Only a missing credential (or an unusable date window) fails the whole run; every
    /// per-symbol problem becomes a [`QuoteError`] entry instead.
    pub async fn run(
        &self,
        credential: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<AggregateResult> {
        let credential = self
            .config
            .resolve_credential(credential)
            .ok_or_else(|| AppError::config(MISSING_CREDENTIAL))?;

        let symbols = &self.config.watchlist;
        let mode = self.config.mode();
        info!(
            "Fetching {} symbols from {} ({:?})",
            symbols.len(),
            self.config.provider_name(),
            mode
        );

        let mut calls = 0;
        let (data, date_range) = match &self.config.provider {
            ProviderConfig::Marketstack(cfg) if cfg.mode == FetchMode::Batched => {
                let api = MarketstackBatchApi::new(cfg);
                let (data, range) = self
                    .run_batched(&api, &credential, cancel, &mut calls)
                    .await?;
                (data, Some(range))
            }
            ProviderConfig::Marketstack(cfg) => {
                let api = MarketstackLatestApi::new(cfg);
                let data = self
                    .run_per_symbol(&api, &credential, cancel, &mut calls)
                    .await;
                (data, None)
            }
            ProviderConfig::AlphaVantage(cfg) => {
                let api = GlobalQuoteApi::new(cfg);
                let data = self
                    .run_per_symbol(&api, &credential, cancel, &mut calls)
                    .await;
                (data, None)
            }
        };

        let result = AggregateResult {
            success: true,
            data,
            timestamp: Utc::now(),
            api_calls_used: calls,
            provider: self.config.provider_name().to_string(),
            mode,
            date_range,
        };
        info!(
            "Fetched {} quotes, {} errors, {} upstream calls",
            result.quotes().count(),
            result.errors().count(),
            calls
        );
        Ok(result)
    }

    async fn run_per_symbol(
        &self,
        api: &dyn PerSymbolApi,
        credential: &str,
        cancel: &CancellationToken,
        calls: &mut usize,
    ) -> Vec<QuoteEntry> {
        let mut entries: Vec<QuoteEntry> = Vec::with_capacity(self.config.watchlist.len());

        for symbol in &self.config.watchlist {
            if !self.pace(*calls, cancel).await {
                entries.push(QuoteError::cancelled(symbol).into());
                continue;
            }

            *calls += 1;
            let request = api.request(credential, symbol);
            let response = self.call(&request, |body| api.upstream_error(body)).await;
            let entry: QuoteEntry = match response {
                Ok(body) => match api.normalize(symbol, &body) {
                    Ok(quote) => quote.into(),
                    Err(err) => {
                        warn!("{symbol}: {err}");
                        QuoteError::from_normalize(symbol, &err).into()
                    }
                },
                Err(err) => {
                    warn!("{symbol}: {err}");
                    QuoteError::fetch_failed(symbol, &err).into()
                }
            };
            entries.push(entry);
        }

        entries
    }

    async fn run_batched(
        &self,
        api: &MarketstackBatchApi,
        credential: &str,
        cancel: &CancellationToken,
        calls: &mut usize,
    ) -> Result<(Vec<QuoteEntry>, DateRange)> {
        let symbols = &self.config.watchlist;
        let range = lookback_range(Utc::now().date_naive(), api.lookback_days())?;

        if !self.pace(*calls, cancel).await {
            return Ok((cancel_all(symbols), range));
        }
        *calls += 1;
        let intraday = self
            .call(&api.intraday_request(credential, symbols), |body| {
                api.upstream_error(body)
            })
            .await;
        if let Err(err) = &intraday {
            warn!("intraday batch failed: {err}");
        }

        if !self.pace(*calls, cancel).await {
            return Ok((cancel_all(symbols), range));
        }
        *calls += 1;
        let eod = self
            .call(&api.eod_request(credential, symbols, &range), |body| {
                api.upstream_error(body)
            })
            .await;
        if let Err(err) = &eod {
            warn!("end-of-day batch failed: {err}");
        }

        Ok((api.merge(symbols, &intraday, &eod), range))
    }

    /// Wait out the pacing interval for call `index`. Returns false once the run is cancelled.
    async fn pace(&self, index: usize, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        let wait = self.pacing.wait_before_call(index);
        if wait.is_zero() {
            return true;
        }

        debug!("Waiting {:?} before upstream call #{}", wait, index + 1);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = sleep(wait) => true,
        }
    }

    async fn call(
        &self,
        request: &PreparedRequest,
        check: impl Fn(&Value) -> Option<FetchError>,
    ) -> FetchResult<Value> {
        let body = self.transport.get_json(request).await?;
        match check(&body) {
            Some(err) => Err(err),
            None => Ok(body),
        }
    }
}

fn cancel_all(symbols: &[String]) -> Vec<QuoteEntry> {
    symbols
        .iter()
        .map(|symbol| QuoteError::cancelled(symbol).into())
        .collect()
}
