//! Modification clock.
//!
//! Every externally visible mutation (parameter change, manual `modified`,
//! largest-possible or buffered region change, produced output) stamps the
//! object with the next value of a monotonically increasing counter. Staleness
//! is decided purely by comparing these stamps.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// A point on the modification clock. `TimeStamp::NEVER` precedes every tick.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TimeStamp(u64);

impl TimeStamp {
    pub const NEVER: TimeStamp = TimeStamp(0);

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn is_never(self) -> bool {
        self.0 == 0
    }
}

/// Shared handle to a monotonically increasing counter.
///
/// Cloning shares the counter.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    counter: Arc<AtomicU64>,
}

static GLOBAL_CLOCK: OnceLock<Clock> = OnceLock::new();

impl Clock {
    /// A fresh, independent counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide counter used by pipeline graphs.
    pub fn global() -> Self {
        GLOBAL_CLOCK.get_or_init(Clock::new).clone()
    }

    /// Advance the clock and return the new time.
    pub fn tick(&self) -> TimeStamp {
        TimeStamp(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// The most recently issued time.
    pub fn now(&self) -> TimeStamp {
        TimeStamp(self.counter.load(Ordering::SeqCst))
    }
}
