use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fetch::{BROWSER_USER_AGENT, DEFAULT_TIMEOUT};
use crate::pacing::{CallPacing, FixedDelay, NoDelay};

pub mod loader;
pub mod validator;

pub use loader::{load_config, load_or_builtin};
pub use validator::validate_config;

/// Symbols tracked when no config file overrides them.
pub const DEFAULT_WATCHLIST: &[&str] = &["TSLA", "GOOGL", "AMZN", "MSFT", "NFLX", "META", "NVDA"];

/// Fallback credential used when a caller supplies none.
pub const CREDENTIAL_ENV_VAR: &str = "QUOTE_API_KEY";

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

pub const MARKETSTACK_BASE_URL: &str = "http://api.marketstack.com/v1";
pub const ALPHA_VANTAGE_BASE_URL: &str = "https://www.alphavantage.co";

/// Spacing used for Marketstack per-symbol runs.
pub const MARKETSTACK_CALL_DELAY: Duration = Duration::from_secs(6);
pub const ALPHA_VANTAGE_REQUESTS_PER_MINUTE: u32 = 5;

/// Largest `limit` Marketstack accepts on a single page.
pub const MARKETSTACK_MAX_PAGE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// Two calls per run regardless of watchlist size.
    Batched,
    /// One paced call per symbol.
    PerSymbol,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderConfig {
    Marketstack(MarketstackConfig),
    AlphaVantage(AlphaVantageConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketstackConfig {
    pub base_url: String,
    pub mode: FetchMode,
    /// Calendar days of end-of-day history requested per symbol in batched mode.
    pub lookback_days: u32,
}

impl Default for MarketstackConfig {
    fn default() -> Self {
        Self {
            base_url: MARKETSTACK_BASE_URL.to_string(),
            mode: FetchMode::PerSymbol,
            lookback_days: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaVantageConfig {
    pub base_url: String,
}

impl Default for AlphaVantageConfig {
    fn default() -> Self {
        Self {
            base_url: ALPHA_VANTAGE_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub headers: BTreeMap<String, String>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: BROWSER_USER_AGENT.to_string(),
            headers: BTreeMap::new(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub watchlist: Vec<String>,
    pub provider: ProviderConfig,
    pub request: RequestConfig,
    /// Overrides the provider's default spacing between per-symbol calls.
    pub call_delay: Option<Duration>,
    pub bind: String,
    pub default_credential: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("watchlist", &self.watchlist)
            .field("provider", &self.provider)
            .field("request", &self.request)
            .field("call_delay", &self.call_delay)
            .field("bind", &self.bind)
            .field("default_credential", &self.default_credential.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Config {
    pub fn builtin() -> Self {
        Config {
            watchlist: DEFAULT_WATCHLIST.iter().map(|s| s.to_string()).collect(),
            provider: ProviderConfig::Marketstack(MarketstackConfig::default()),
            request: RequestConfig::default(),
            call_delay: None,
            bind: DEFAULT_BIND.to_string(),
            default_credential: None,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self.provider {
            ProviderConfig::Marketstack(_) => "marketstack",
            ProviderConfig::AlphaVantage(_) => "alphavantage",
        }
    }

    pub fn mode(&self) -> FetchMode {
        match &self.provider {
            ProviderConfig::Marketstack(cfg) => cfg.mode,
            ProviderConfig::AlphaVantage(_) => FetchMode::PerSymbol,
        }
    }

    /// Pacing policy for this provider; batched runs make only two calls and never wait.
    pub fn pacing(&self) -> Arc<dyn CallPacing> {
        if self.mode() == FetchMode::Batched {
            return Arc::new(NoDelay);
        }
        if let Some(delay) = self.call_delay {
            return Arc::new(FixedDelay::new(delay));
        }
        match self.provider {
            ProviderConfig::Marketstack(_) => Arc::new(FixedDelay::new(MARKETSTACK_CALL_DELAY)),
            ProviderConfig::AlphaVantage(_) => Arc::new(FixedDelay::from_quota(
                ALPHA_VANTAGE_REQUESTS_PER_MINUTE,
                Duration::from_secs(60),
            )),
        }
    }

    /// Caller-supplied credential first, then the configured fallback. Blank values count as absent.
    pub fn resolve_credential(&self, supplied: Option<&str>) -> Option<String> {
        supplied
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.default_credential
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
            })
    }
}
