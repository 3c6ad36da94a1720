use serde_json::Value;

use crate::fetch::{FetchError, NormalizeError, PreparedRequest};
use crate::quote::Quote;

pub mod alpha_vantage;
pub mod marketstack;

pub use alpha_vantage::GlobalQuoteApi;
pub use marketstack::{MarketstackBatchApi, MarketstackLatestApi};

/// A provider endpoint answering for exactly one symbol per call.
pub trait PerSymbolApi: Send + Sync {
    fn request(&self, credential: &str, symbol: &str) -> PreparedRequest;

    /// Quota or credential problems some providers report inside a 200 body.
    fn upstream_error(&self, body: &Value) -> Option<FetchError>;

    fn normalize(&self, symbol: &str, body: &Value) -> Result<Quote, NormalizeError>;
}
