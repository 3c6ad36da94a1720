use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::error::{Context, Result};

use super::{FetchError, FetchResult, PreparedRequest, TransportKind, UpstreamKind};

/// Issues one upstream GET and hands back the parsed JSON body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_json(&self, request: &PreparedRequest) -> FetchResult<Value>;
}

pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration, headers: HeaderMap) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to construct upstream HTTP client")?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, request: &PreparedRequest) -> FetchResult<Value> {
        debug!(
            "GET {} ?{} [{}]",
            request.url,
            request.redacted_query(),
            request.label
        );

        let response = self
            .client
            .get(&request.url)
            .query(&request.query)
            .send()
            .await
            .map_err(|err| classify_reqwest_error(&err, self.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| classify_reqwest_error(&err, self.timeout))?;

        if !status.is_success() {
            return Err(classify_status(status, &text));
        }

        serde_json::from_str(&text).map_err(|err| {
            FetchError::upstream(
                UpstreamKind::MalformedBody,
                format!("{} returned non-JSON body: {}", request.label, err),
            )
        })
    }
}

fn classify_reqwest_error(err: &reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::transport(
            TransportKind::Timeout,
            format!("no response within {}s", timeout.as_secs()),
        )
    } else if err.is_connect() {
        FetchError::transport(TransportKind::Connect, err.to_string())
    } else if err.is_decode() || err.is_body() {
        FetchError::upstream(UpstreamKind::MalformedBody, err.to_string())
    } else {
        FetchError::transport(TransportKind::Other, err.to_string())
    }
}

/// Map a non-2xx status onto the upstream taxonomy, keeping the provider's own message when present.
pub fn classify_status(status: StatusCode, body: &str) -> FetchError {
    let provider_message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| extract_error_message(&value))
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UpstreamKind::InvalidCredential,
        StatusCode::TOO_MANY_REQUESTS => UpstreamKind::RateLimited,
        other => UpstreamKind::Status(other.as_u16()),
    };
    FetchError::upstream(kind, provider_message)
}

/// Pull a human readable message out of the error envelopes the supported providers use.
pub fn extract_error_message(body: &Value) -> Option<String> {
    let candidates = [
        body.pointer("/error/message"),
        body.get("Error Message"),
        body.get("Note"),
        body.get("Information"),
        body.get("message"),
        body.get("error"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|value| value.as_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_is_reported_as_invalid_credential() {
        let body = r#"{"error":{"code":"invalid_access_key","message":"You have not supplied a valid API Access Key."}}"#;
        let err = classify_status(StatusCode::FORBIDDEN, body);
        assert!(err.is_invalid_credential());
        assert!(err.to_string().contains("valid API Access Key"));
    }

    #[test]
    fn too_many_requests_is_rate_limited() {
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, "");
        assert_eq!(
            err,
            FetchError::upstream(UpstreamKind::RateLimited, "HTTP 429")
        );
    }

    #[test]
    fn other_statuses_keep_their_code() {
        let err = classify_status(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert_eq!(
            err,
            FetchError::upstream(UpstreamKind::Status(502), "HTTP 502")
        );
    }

    #[test]
    fn extracts_alpha_vantage_note() {
        let body = serde_json::json!({ "Note": "Thank you for using Alpha Vantage!" });
        assert_eq!(
            extract_error_message(&body).as_deref(),
            Some("Thank you for using Alpha Vantage!")
        );
    }
}
