// Explicit retry state machine shared by the cloud and local clients.
//
// The request loops in `cloud::client` and `local` own no backoff logic of
// their own: they report each failed attempt here and either sleep for the
// returned delay or surface the terminal error.

use std::time::Duration;

/// Bounded retry schedule: `backoff_base * attempt`, at most `max_attempts`
/// attempts in total, server hints capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Schedule used for the local device endpoint (linear 1.5 s steps).
    pub fn local() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1500),
            max_delay: Duration::from_secs(30),
        }
    }

    /// Start a fresh attempt sequence.
    pub fn start(&self) -> RetryState {
        RetryState {
            policy: *self,
            attempt: 1,
        }
    }
}

/// What the request loop should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Sleep for the given duration, then issue the next attempt.
    Retry(Duration),
    /// Attempt ceiling reached; surface the terminal error.
    GiveUp,
}

/// Attempt counter for one logical request.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    /// 1-based number of the attempt currently in flight.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record a retryable failure of the current attempt.
    ///
    /// `hint` is a server-provided delay (e.g. `Retry-After`); without one the
    /// linear schedule applies.
    pub fn on_failure(&mut self, hint: Option<Duration>) -> Step {
        if self.attempt >= self.policy.max_attempts {
            return Step::GiveUp;
        }
        let delay = hint
            .unwrap_or_else(|| self.policy.backoff_base.saturating_mul(self.attempt))
            .min(self.policy.max_delay);
        self.attempt += 1;
        Step::Retry(delay)
    }
}
