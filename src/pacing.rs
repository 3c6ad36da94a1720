//! Spacing between sequential upstream calls.
//!
//! Providers publish small fixed quotas (Alpha Vantage's free tier allows 5 calls a minute),
//! so per-symbol runs wait a fixed interval between calls rather than throttling through a
//! shared bucket. The policy is injected into the aggregator so tests can run without delay.

use std::time::Duration;

pub trait CallPacing: Send + Sync {
    /// How long to wait before the call at `index` (0-based) within one run.
    fn wait_before_call(&self, index: usize) -> Duration;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Spread `requests` calls evenly across `per`, e.g. 5 per 60s gives 12s.
    pub fn from_quota(requests: u32, per: Duration) -> Self {
        Self::new(per / requests.max(1))
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl CallPacing for FixedDelay {
    fn wait_before_call(&self, index: usize) -> Duration {
        if index == 0 {
            Duration::ZERO
        } else {
            self.delay
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl CallPacing for NoDelay {
    fn wait_before_call(&self, _index: usize) -> Duration {
        Duration::ZERO
    }
}
