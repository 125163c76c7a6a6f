//! Bounded retry for fallible async calls.
//!
//! Used where a collaborator or the store may fail transiently: live zone
//! discovery and the instance write race. It only papers over a
//! read-modify-write race; a store-level compare-and-swap would replace it.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::debug;

/// How often and for how long an operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub interval: Duration,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// No new attempt starts once this much time has passed.
    pub timeout: Option<Duration>,
}

impl Backoff {
    /// A fixed number of attempts spaced by `interval`.
    pub fn attempts(max_attempts: u32, interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
            timeout: None,
        }
    }

    /// Keep polling every `interval` until `timeout` elapses.
    pub fn until(timeout: Duration, interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: u32::MAX,
            timeout: Some(timeout),
        }
    }
}

/// Run `op` until it succeeds or the backoff is exhausted, returning the last
/// error on failure.
pub async fn retry<T, E, F, Fut>(backoff: Backoff, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let started = Instant::now();
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let out_of_attempts = attempt >= backoff.max_attempts;
                let out_of_time = backoff
                    .timeout
                    .is_some_and(|t| started.elapsed() + backoff.interval > t);
                if out_of_attempts || out_of_time {
                    return Err(e);
                }
                debug!(attempt, error = %e, "retrying after failure");
                tokio::time::sleep(backoff.interval).await;
            }
        }
    }
}
