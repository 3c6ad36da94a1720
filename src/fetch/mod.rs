use std::time::Duration;

use thiserror::Error;

pub mod decode;
pub mod request;
pub mod transport;

pub use decode::{Field, FieldMap, NormalizeError};
pub use request::{PreparedRequest, RequestBuilder};
pub use transport::{HttpTransport, Transport};

/// Upper bound for a single upstream call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Some providers reject the default reqwest identity, so calls go out looking like a browser.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

pub type FetchResult<T> = std::result::Result<T, FetchError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportKind {
    #[error("Request timed out")]
    Timeout,
    #[error("Network error")]
    Connect,
    #[error("Transport error")]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UpstreamKind {
    #[error("Invalid API key")]
    InvalidCredential,
    #[error("Rate limit reached")]
    RateLimited,
    #[error("Upstream returned HTTP {0}")]
    Status(u16),
    #[error("Provider error")]
    Provider,
    #[error("Malformed response body")]
    MalformedBody,
}

/// Failure of a single upstream call. Always recovered per symbol by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("{kind}: {message}")]
    Transport {
        kind: TransportKind,
        message: String,
    },
    #[error("{kind}: {message}")]
    Upstream {
        kind: UpstreamKind,
        message: String,
    },
}

impl FetchError {
    pub fn transport<T: Into<String>>(kind: TransportKind, message: T) -> Self {
        FetchError::Transport {
            kind,
            message: message.into(),
        }
    }

    pub fn upstream<T: Into<String>>(kind: UpstreamKind, message: T) -> Self {
        FetchError::Upstream {
            kind,
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FetchError::Transport {
                kind: TransportKind::Timeout,
                ..
            }
        )
    }

    pub fn is_invalid_credential(&self) -> bool {
        matches!(
            self,
            FetchError::Upstream {
                kind: UpstreamKind::InvalidCredential,
                ..
            }
        )
    }
}
