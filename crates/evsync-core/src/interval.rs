// ── Polling interval controller ──
//
// Spreads the daily request budget across the fleet and owns the throttle
// for out-of-schedule refresh requests.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::clock::span;
use crate::error::CoreError;

const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalSettings {
    pub daily_request_budget: u32,
    pub minimum_interval: Duration,
    pub default_interval: Duration,
}

impl IntervalSettings {
    /// Lower bound every computed interval is clamped to.
    pub fn floor(&self) -> Duration {
        self.default_interval.max(self.minimum_interval)
    }

    /// `ceil(device_count * 86400 / budget)` seconds, clamped to [`floor`](Self::floor).
    ///
    /// A zero budget means "no budget configured" and yields the floor.
    pub fn compute(&self, device_count: usize) -> Duration {
        let budget = u64::from(self.daily_request_budget);
        if budget == 0 {
            return self.floor();
        }
        let devices = u64::try_from(device_count).unwrap_or(u64::MAX);
        let secs = devices.saturating_mul(SECONDS_PER_DAY).div_ceil(budget);
        Duration::from_secs(secs).max(self.floor())
    }
}

/// Scheduler-owned interval state. One writer per cycle.
#[derive(Debug, Clone)]
pub struct PollingIntervalController {
    settings: IntervalSettings,
    current: Duration,
    last_cycle_at: Option<DateTime<Utc>>,
}

impl PollingIntervalController {
    pub fn new(settings: IntervalSettings) -> Self {
        Self {
            settings,
            current: settings.floor(),
            last_cycle_at: None,
        }
    }

    pub fn settings(&self) -> &IntervalSettings {
        &self.settings
    }

    /// Period the scheduler should wait before the next cycle.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn last_cycle_at(&self) -> Option<DateTime<Utc>> {
        self.last_cycle_at
    }

    /// Record that a cycle started.
    pub fn mark_cycle(&mut self, at: DateTime<Utc>) {
        self.last_cycle_at = Some(at);
    }

    /// Recompute after a successful cycle. Applies to the next cycle only.
    pub fn on_success(&mut self, device_count: usize) -> Duration {
        let next = self.settings.compute(device_count);
        if next != self.current {
            debug!(
                device_count,
                previous_secs = self.current.as_secs(),
                next_secs = next.as_secs(),
                "poll interval recomputed"
            );
        }
        self.current = next;
        next
    }

    /// Apply the failure policy before the error propagates.
    ///
    /// Auth and request failures drop back to the default period; a rate
    /// limit leaves the interval alone.
    pub fn on_failure(&mut self, err: &CoreError) {
        if err.is_rate_limit() {
            return;
        }
        let floor = self.settings.floor();
        if self.current != floor {
            debug!(error = %err, reset_secs = floor.as_secs(), "poll interval reset after failure");
        }
        self.current = floor;
    }

    /// Whether an out-of-schedule refresh may run now.
    ///
    /// Requires `minimum_interval` since the last cycle started.
    pub fn forced_allowed(&self, now: DateTime<Utc>) -> bool {
        self.last_cycle_at
            .is_none_or(|last| now - last >= span(self.settings.minimum_interval))
    }
}
