// ── Optimistic write reconciler ──
//
// Holds a locally predicted value for a bounded window after a write so a
// stale authoritative read does not make the control bounce back.
//
//   Idle ──predict(v)──▶ Pending{v, issued_at}
//   Pending ──read(a), a ≈ v──────────────▶ Idle   (surface a)
//   Pending ──read(a), now-issued ≥ hold──▶ Idle   (surface a)
//   Pending ──read(a), otherwise──────────▶ Pending (surface v)
//   Pending ──write failed────────────────▶ Idle   (restore pre-predict value)

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::clock::{SharedClock, span};

/// Agreement test between a prediction and an authoritative read.
pub trait Converges {
    fn converges(&self, other: &Self, tolerance: f64) -> bool;
}

impl Converges for f64 {
    fn converges(&self, other: &Self, tolerance: f64) -> bool {
        (self - other).abs() <= tolerance
    }
}

impl Converges for bool {
    fn converges(&self, other: &Self, _tolerance: f64) -> bool {
        self == other
    }
}

impl Converges for String {
    fn converges(&self, other: &Self, _tolerance: f64) -> bool {
        self == other
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Pending<T> {
    value: T,
    issued_at: DateTime<Utc>,
}

/// Per-control reconciliation state.
#[derive(Debug)]
pub struct OptimisticValue<T> {
    hold_window: Duration,
    tolerance: f64,
    clock: SharedClock,
    pending: Option<Pending<T>>,
    /// Last value surfaced to readers.
    effective: Option<T>,
}

impl<T: Clone + Converges> OptimisticValue<T> {
    pub fn new(hold_window: Duration, tolerance: f64, clock: SharedClock) -> Self {
        Self {
            hold_window,
            tolerance,
            clock,
            pending: None,
            effective: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn effective(&self) -> Option<&T> {
        self.effective.as_ref()
    }

    /// Start holding `value`. Returns the value in effect before the call,
    /// for [`confirm_or_rollback`](Self::confirm_or_rollback).
    pub fn predict(&mut self, value: T) -> Option<T> {
        let previous = self.effective.replace(value.clone());
        self.pending = Some(Pending {
            value,
            issued_at: self.clock.now(),
        });
        previous
    }

    /// Reconcile an authoritative read and return the value to show.
    ///
    /// An absent authoritative value never overwrites what is shown.
    pub fn read(&mut self, authoritative: Option<T>) -> Option<T> {
        let Some(pending) = self.pending.as_ref() else {
            if authoritative.is_some() {
                self.effective = authoritative;
            }
            return self.effective.clone();
        };

        let Some(auth) = authoritative else {
            return self.effective.clone();
        };

        let held_for = self.clock.now() - pending.issued_at;
        if auth.converges(&pending.value, self.tolerance) {
            debug!("optimistic value confirmed");
        } else if held_for >= span(self.hold_window) {
            debug!(held_ms = held_for.num_milliseconds(), "optimistic hold expired");
        } else {
            return Some(pending.value.clone());
        }

        self.pending = None;
        self.effective = Some(auth);
        self.effective.clone()
    }

    /// Settle the write behind the last `predict`. On failure the
    /// pre-predict value is restored and the hold is dropped.
    pub fn confirm_or_rollback(&mut self, success: bool, previous: Option<T>) {
        if success {
            return;
        }
        self.pending = None;
        self.effective = previous;
    }

    /// `predict`, run `write`, then settle. The write's error is returned
    /// untouched after the rollback.
    pub async fn write<F, R, E>(&mut self, value: T, write: F) -> Result<R, E>
    where
        F: Future<Output = Result<R, E>>,
    {
        let previous = self.predict(value);
        let result = write.await;
        self.confirm_or_rollback(result.is_ok(), previous);
        result
    }
}
