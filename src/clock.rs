//! Wall-clock source used to stamp and age wire messages.
//!
//! Timers inside the engine run on Tokio's monotonic clock; wire timestamps
//! need a shared notion of time between peers, so they come from a
//! [`Clock`] that hosts and tests can substitute.

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of Unix-epoch timestamps in milliseconds.
pub trait Clock: Send + Sync + 'static {
    /// Current time as milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// [`Clock`] backed by [`SystemTime`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| {
                u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
            })
    }
}
