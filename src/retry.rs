//! Bounded retry with a fixed backoff between attempts.

use std::thread;
use std::time::Duration;

/// Why a retried operation gave up.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed transiently; holds the last error.
    Exhausted(E),
    /// An attempt failed with an error that must not be retried.
    Fatal(E),
}

/// Retry policy: at most `max_attempts` tries, sleeping `backoff` between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Pause after each transient failure that will be retried.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent.
    pub fn run<T, E, F, P>(&self, mut op: F, is_transient: P) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Result<T, E>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if !is_transient(&err) => return Err(RetryError::Fatal(err)),
                Err(err) if attempt >= self.max_attempts => {
                    return Err(RetryError::Exhausted(err));
                }
                Err(_) => {
                    thread::sleep(self.backoff);
                    attempt += 1;
                }
            }
        }
    }
}
