// Wall-clock source for cadence deadlines, cache expiry, and hold windows.
//
// `tokio::time` handles the actual sleeping; everything that compares
// timestamps reads them through a `Clock` so tests can move time by hand.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

pub type SharedClock = Arc<dyn Clock>;

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock with millisecond resolution.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

/// Longest span ever added to a timestamp, so `DateTime + span` cannot overflow.
const MAX_SPAN_DAYS: i64 = 36_500;

/// Convert a std duration for timestamp arithmetic, capped at a century.
pub(crate) fn span(d: std::time::Duration) -> chrono::Duration {
    let cap = chrono::Duration::days(MAX_SPAN_DAYS);
    chrono::Duration::from_std(d).map_or(cap, |s| s.min(cap))
}
