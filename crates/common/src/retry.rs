//! Retry helpers with pluggable backoff policies.

use std::{fmt::Display, future::Future, thread, time::Duration};

use tokio::time;
use tracing::*;

pub mod policies {
    use std::fmt::Debug;

    /// Computes successive delays between attempts.
    pub trait Backoff: Debug + Send + Sync {
        /// Delay before the first retry.
        fn base_delay_ms(&self) -> u64;

        /// Delay following a retry that waited `curr_delay_ms`.
        fn next_delay_ms(&self, curr_delay_ms: u64) -> u64;
    }

    /// Delay multiplied by a constant factor after every retry.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct ExponentialBackoff {
        base_delay_ms: u64,
        multiplier: u64,
    }

    impl ExponentialBackoff {
        pub fn new(base_delay_ms: u64, multiplier: u64) -> Self {
            Self {
                base_delay_ms,
                multiplier,
            }
        }
    }

    impl Default for ExponentialBackoff {
        fn default() -> Self {
            Self::new(2_000, 2)
        }
    }

    impl Backoff for ExponentialBackoff {
        fn base_delay_ms(&self) -> u64 {
            self.base_delay_ms
        }

        fn next_delay_ms(&self, curr_delay_ms: u64) -> u64 {
            curr_delay_ms.saturating_mul(self.multiplier)
        }
    }

    /// Same delay between every attempt.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct ConstantBackoff {
        delay_ms: u64,
    }

    impl ConstantBackoff {
        pub fn new(delay_ms: u64) -> Self {
            Self { delay_ms }
        }
    }

    impl Backoff for ConstantBackoff {
        fn base_delay_ms(&self) -> u64 {
            self.delay_ms
        }

        fn next_delay_ms(&self, _curr_delay_ms: u64) -> u64 {
            self.delay_ms
        }
    }
}

use policies::Backoff;

/// Delays to wait before each of `attempts` attempts; the first is zero.
pub fn delay_schedule(backoff: &impl Backoff, attempts: u16) -> Vec<Duration> {
    let mut delays = Vec::with_capacity(attempts as usize);
    let mut next = backoff.base_delay_ms();
    for i in 0..attempts {
        if i == 0 {
            delays.push(Duration::ZERO);
        } else {
            delays.push(Duration::from_millis(next));
            next = backoff.next_delay_ms(next);
        }
    }
    delays
}

/// Runs `operation` until it succeeds or `max_retries` retries are spent.
pub fn retry_with_backoff<R, E, F>(
    name: &str,
    max_retries: u16,
    backoff: &impl Backoff,
    operation: F,
) -> Result<R, E>
where
    E: Display,
    F: FnMut() -> Result<R, E>,
{
    retry_with_backoff_if(name, max_retries, backoff, |_| true, operation)
}

/// Like [`retry_with_backoff`], but gives up at once on errors for which
/// `should_retry` returns false.
pub fn retry_with_backoff_if<R, E, F, P>(
    name: &str,
    max_retries: u16,
    backoff: &impl Backoff,
    should_retry: P,
    mut operation: F,
) -> Result<R, E>
where
    E: Display,
    F: FnMut() -> Result<R, E>,
    P: Fn(&E) -> bool,
{
    let mut delay = backoff.base_delay_ms();
    let mut retries = 0;
    loop {
        match operation() {
            Ok(v) => return Ok(v),
            Err(e) if retries < max_retries && should_retry(&e) => {
                warn!(%name, %retries, err = %e, "operation failed, retrying");
                thread::sleep(Duration::from_millis(delay));
                delay = backoff.next_delay_ms(delay);
                retries += 1;
            }
            Err(e) => {
                error!(%name, %retries, err = %e, "operation failed, giving up");
                return Err(e);
            }
        }
    }
}

/// Async version of [`retry_with_backoff`].
pub async fn retry_with_backoff_async<R, E, F, Fut>(
    name: &str,
    max_retries: u16,
    backoff: &impl Backoff,
    mut operation: F,
) -> Result<R, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let mut delay = backoff.base_delay_ms();
    let mut retries = 0;
    loop {
        match operation().await {
            Ok(v) => return Ok(v),
            Err(e) if retries < max_retries => {
                warn!(%name, %retries, err = %e, "operation failed, retrying");
                time::sleep(Duration::from_millis(delay)).await;
                delay = backoff.next_delay_ms(delay);
                retries += 1;
            }
            Err(e) => {
                error!(%name, %retries, err = %e, "operation failed, giving up");
                return Err(e);
            }
        }
    }
}
