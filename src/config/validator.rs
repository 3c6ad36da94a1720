use std::collections::HashSet;

use crate::error::{AppError, Result};

use super::{Config, FetchMode, ProviderConfig, MARKETSTACK_MAX_PAGE};

/// Validate a loaded config and surface every problem in one message.
pub fn validate_config(config: &Config) -> Result<()> {
    let mut issues = Vec::new();

    validate_watchlist(config, &mut issues);
    validate_request(config, &mut issues);
    validate_provider(config, &mut issues);

    if issues.is_empty() {
        Ok(())
    } else {
        Err(AppError::config(format!(
            "config invalid:\n  - {}",
            issues.join("\n  - ")
        )))
    }
}

fn validate_watchlist(config: &Config, issues: &mut Vec<String>) {
    if config.watchlist.is_empty() {
        issues.push("watchlist must contain at least one symbol".to_string());
        return;
    }

    let mut seen = HashSet::new();
    for symbol in &config.watchlist {
        if symbol.trim().is_empty() {
            issues.push("watchlist contains a blank symbol".to_string());
        } else if symbol.contains(',') || symbol.chars().any(char::is_whitespace) {
            issues.push(format!("watchlist symbol `{symbol}` contains a separator"));
        } else if !seen.insert(symbol.as_str()) {
            issues.push(format!("watchlist symbol `{symbol}` is listed twice"));
        }
    }
}

fn validate_request(config: &Config, issues: &mut Vec<String>) {
    if config.request.timeout.is_zero() {
        issues.push("timeout must be greater than zero".to_string());
    }
    if config.request.user_agent.trim().is_empty() {
        issues.push("user_agent must not be empty".to_string());
    }
    if config.bind.trim().is_empty() {
        issues.push("bind address must not be empty".to_string());
    }
}

fn validate_provider(config: &Config, issues: &mut Vec<String>) {
    let base_url = match &config.provider {
        ProviderConfig::Marketstack(cfg) => {
            if cfg.lookback_days == 0 {
                issues.push("provider.lookback_days must be at least 1".to_string());
            }
            let rows = config
                .watchlist
                .len()
                .saturating_mul(cfg.lookback_days as usize);
            if cfg.mode == FetchMode::Batched && rows > MARKETSTACK_MAX_PAGE {
                issues.push(format!(
                    "batched history needs {rows} rows ({} symbols x {} days), above the {MARKETSTACK_MAX_PAGE}-row page limit",
                    config.watchlist.len(),
                    cfg.lookback_days
                ));
            }
            &cfg.base_url
        }
        ProviderConfig::AlphaVantage(cfg) => &cfg.base_url,
    };

    if base_url.trim().is_empty() {
        issues.push("provider.base_url must not be empty".to_string());
    } else if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        issues.push(format!("provider.base_url `{base_url}` must be an http(s) URL"));
    }
}
