use std::{collections::BTreeMap, fs, path::Path, time::Duration};

use log::info;
use serde::Deserialize;

use crate::error::{Context, Result};

use super::{
    validator, AlphaVantageConfig, Config, FetchMode, MarketstackConfig, ProviderConfig,
    CREDENTIAL_ENV_VAR,
};

/// Load a JSON config file layered over [`Config::builtin`], then pick up the credential fallback.
pub fn load_config(path: &Path) -> Result<Config> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read config JSON at {}", path.display()))?;
    let mut config = parse_config(&json)
        .with_context(|| format!("failed to parse config JSON at {}", path.display()))?;
    config.default_credential = credential_from_env();

    validator::validate_config(&config)?;
    info!(
        "Loaded config from {} ({} symbols, provider {})",
        path.display(),
        config.watchlist.len(),
        config.provider_name()
    );
    Ok(config)
}

/// Builtin defaults when no path is given.
pub fn load_or_builtin(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path),
        None => {
            let mut config = Config::builtin();
            config.default_credential = credential_from_env();
            validator::validate_config(&config)?;
            Ok(config)
        }
    }
}

fn credential_from_env() -> Option<String> {
    std::env::var(CREDENTIAL_ENV_VAR)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_config(json: &str) -> serde_json::Result<Config> {
    let raw: RawConfig = serde_json::from_str(json)?;
    Ok(raw.into_config())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    watchlist: Option<Vec<String>>,
    #[serde(default)]
    provider: Option<RawProviderConfig>,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(default)]
    user_agent: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    delay_ms: Option<u64>,
    #[serde(default)]
    bind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawProviderConfig {
    Marketstack {
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        mode: Option<FetchMode>,
        #[serde(default)]
        lookback_days: Option<u32>,
    },
    AlphaVantage {
        #[serde(default)]
        base_url: Option<String>,
    },
}

impl RawProviderConfig {
    fn into_provider_config(self) -> ProviderConfig {
        match self {
            RawProviderConfig::Marketstack {
                base_url,
                mode,
                lookback_days,
            } => {
                let defaults = MarketstackConfig::default();
                ProviderConfig::Marketstack(MarketstackConfig {
                    base_url: base_url.unwrap_or(defaults.base_url),
                    mode: mode.unwrap_or(defaults.mode),
                    lookback_days: lookback_days.unwrap_or(defaults.lookback_days),
                })
            }
            RawProviderConfig::AlphaVantage { base_url } => {
                let defaults = AlphaVantageConfig::default();
                ProviderConfig::AlphaVantage(AlphaVantageConfig {
                    base_url: base_url.unwrap_or(defaults.base_url),
                })
            }
        }
    }
}

impl RawConfig {
    fn into_config(self) -> Config {
        let mut config = Config::builtin();

        if let Some(watchlist) = self.watchlist {
            config.watchlist = watchlist
                .into_iter()
                .map(|symbol| symbol.trim().to_uppercase())
                .collect();
        }
        if let Some(provider) = self.provider {
            config.provider = provider.into_provider_config();
        }
        if let Some(secs) = self.timeout_secs {
            config.request.timeout = Duration::from_secs(secs);
        }
        if let Some(user_agent) = self.user_agent {
            config.request.user_agent = user_agent;
        }
        config.request.headers = self.headers;
        config.call_delay = self.delay_ms.map(Duration::from_millis);
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        config
    }
}
