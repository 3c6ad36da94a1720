use std::collections::{BTreeMap, HashSet};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};

use crate::error::{Context, Result};

/// A fully resolved upstream GET, ready for the transport.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// Short name used in logs, e.g. `eod/latest TSLA`.
    pub label: String,
    pub url: String,
    pub query: Vec<(String, String)>,
    secret_params: HashSet<String>,
}

impl PreparedRequest {
    /// Query string with credential parameters masked, safe to log.
    pub fn redacted_query(&self) -> String {
        self.query
            .iter()
            .map(|(key, value)| {
                if self.secret_params.contains(key) {
                    format!("{key}=***")
                } else {
                    format!("{key}={value}")
                }
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

pub struct RequestBuilder {
    label: String,
    url: String,
    query: Vec<(String, String)>,
    secret_params: HashSet<String>,
}

impl RequestBuilder {
    pub fn new(base_url: &str, path: &str) -> Self {
        let url = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Self {
            label: path.trim_matches('/').to_string(),
            url,
            query: Vec::new(),
            secret_params: HashSet::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Adds a parameter whose value must never reach the logs.
    pub fn secret(mut self, key: &str, value: &str) -> Self {
        self.secret_params.insert(key.to_string());
        self.param(key, value)
    }

    pub fn build(self) -> PreparedRequest {
        PreparedRequest {
            label: self.label,
            url: self.url,
            query: self.query,
            secret_params: self.secret_params,
        }
    }
}

/// Default headers attached to every upstream call.
pub fn default_headers(
    user_agent: &str,
    extra: &BTreeMap<String, String>,
) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    map.insert(ACCEPT, HeaderValue::from_static("application/json"));
    let agent = HeaderValue::from_str(user_agent)
        .with_context(|| format!("Invalid User-Agent header value: {}", user_agent))?;
    map.insert(USER_AGENT, agent);

    for (key, value) in extra {
        let name = HeaderName::from_bytes(key.as_bytes())
            .with_context(|| format!("Invalid header name: {}", key))?;
        let header_value = HeaderValue::from_str(value)
            .with_context(|| format!("Invalid header value for {}", key))?;
        map.insert(name, header_value);
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_base_and_path_without_double_slash() {
        let request = RequestBuilder::new("https://api.example.com/v1/", "/eod/latest")
            .param("symbols", "TSLA")
            .build();
        assert_eq!(request.url, "https://api.example.com/v1/eod/latest");
        assert_eq!(request.label, "eod/latest");
        assert_eq!(request.param("symbols"), Some("TSLA"));
    }

    #[test]
    fn redacts_secret_parameters() {
        let request = RequestBuilder::new("https://api.example.com", "eod")
            .secret("access_key", "hunter2")
            .param("limit", 1)
            .build();
        let rendered = request.redacted_query();
        assert_eq!(rendered, "access_key=***&limit=1");
        assert!(!rendered.contains("hunter2"));
        assert_eq!(request.param("access_key"), Some("hunter2"));
    }

    #[test]
    fn rejects_invalid_extra_header() {
        let mut extra = BTreeMap::new();
        extra.insert("Bad Header".to_string(), "x".to_string());
        let err = default_headers("agent", &extra).expect_err("header name has a space");
        assert!(err.to_string().contains("Invalid header name"));
    }

    #[test]
    fn sets_user_agent() {
        let headers = default_headers("quote-board-test", &BTreeMap::new()).expect("headers");
        assert_eq!(headers.get(USER_AGENT).unwrap(), "quote-board-test");
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
    }
}
