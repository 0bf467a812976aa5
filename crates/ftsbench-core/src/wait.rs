//! Bounded polling for backends that acknowledge writes out of band.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub interval: Duration,
    pub max_interval: Duration,
}

impl PollPolicy {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval, max_interval: Duration::from_secs(1).max(interval) }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), Duration::from_millis(10))
    }
}

/// Calls `probe` until it yields `Some`, an error, or the deadline passes.
///
/// The pause between attempts doubles from `interval` up to `max_interval`.
/// The probe always runs at least once, even with a zero timeout.
pub async fn poll_until<T, F, Fut>(policy: PollPolicy, mut probe: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + policy.timeout;
    let mut delay = policy.interval;
    loop {
        if let Some(done) = probe().await? {
            return Ok(done);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::FlushTimeout(policy.timeout));
        }
        tokio::time::sleep(delay.min(deadline - now)).await;
        delay = (delay * 2).min(policy.max_interval);
    }
}
