//! Polling helpers for eventually consistent cluster state.
use std::fmt::Display;
use std::time::{Duration, Instant};

/// Yields attempt numbers (starting at 1) until `timeout` is exhausted,
/// sleeping `interval` between attempts.
///
/// ```no_run
/// # use std::time::Duration;
/// # use libcephqe::waiter::WaitUntil;
/// let mut wait = WaitUntil::new(Duration::from_secs(60), Duration::from_secs(5));
/// for _ in wait.by_ref() {
///     // poll something, break when done
/// }
/// if wait.expired() {
///     // gave up
/// }
/// ```
#[derive(Debug)]
pub struct WaitUntil {
    timeout: Duration,
    interval: Duration,
    start: Option<Instant>,
    attempt: u32,
    expired: bool,
}

impl WaitUntil {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            start: None,
            attempt: 0,
            expired: false,
        }
    }

    /// True once the iterator stopped because the deadline passed.
    pub fn expired(&self) -> bool {
        self.expired
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

impl Iterator for WaitUntil {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let Some(start) = self.start else {
            self.start = Some(Instant::now());
            self.attempt = 1;
            return Some(1);
        };
        if self.expired || start.elapsed() + self.interval > self.timeout {
            self.expired = true;
            return None;
        }
        std::thread::sleep(self.interval);
        self.attempt += 1;
        Some(self.attempt)
    }
}

/// Calls `f` up to `tries` times, sleeping `delay` after each failure.
/// The error of the last attempt is returned.
pub fn retry<T, E, F>(tries: u32, delay: Duration, mut f: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Result<T, E>,
{
    let tries = tries.max(1);
    let mut attempt = 1;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < tries => {
                tracing::warn!(attempt, tries, "{}, retrying in {:?}", e, delay);
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Polls `check` until it reports `true` or `timeout` runs out.
/// Returns whether the condition was met; errors from `check` abort the wait.
pub fn wait_for<E, F>(timeout: Duration, interval: Duration, mut check: F) -> Result<bool, E>
where
    F: FnMut() -> Result<bool, E>,
{
    for _ in WaitUntil::new(timeout, interval) {
        if check()? {
            return Ok(true);
        }
    }
    Ok(false)
}
