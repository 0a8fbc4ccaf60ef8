// ── Runtime sync configuration ──
//
// Describes *how* to sync a fleet: credentials, cadences and budgets. It
// never touches disk. The config crate or the CLI builds a `SyncConfig`
// and hands it to the controller.

use std::time::Duration;

use evsync_api::{DEFAULT_BASE_URL, RetryPolicy, TransportConfig};
use secrecy::SecretString;

use crate::interval::IntervalSettings;
use crate::merge::{Cadence, MergeSettings};
use crate::model::Pairing;

/// Settings for the per-device local endpoint pollers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSettings {
    pub enabled: bool,
    pub poll_interval: Duration,
    /// Hard ceiling per attempt.
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Linear backoff step between read attempts.
    pub backoff: Duration,
    /// Delay before the follow-up read after a failed write.
    pub write_followup: Duration,
    /// Consecutive failures after which a recovery is logged at info.
    pub recovery_log_threshold: u32,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff: Duration::from_millis(1500),
            write_followup: Duration::from_secs(5),
            recovery_log_threshold: 3,
        }
    }
}

impl LocalSettings {
    pub fn transport(&self) -> TransportConfig {
        TransportConfig::local()
            .with_timeout(self.timeout)
            .with_retry(RetryPolicy {
                max_attempts: self.max_attempts.max(1),
                backoff_base: self.backoff,
                max_delay: RetryPolicy::local().max_delay,
            })
    }
}

/// Configuration for syncing one account's fleet.
///
/// Built by CLI/config loader, passed to `Controller` -- core never reads config files.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_key: SecretString,
    /// Cloud API root (e.g. `https://v2c.cloud/kong/v2c_service`).
    pub base_url: String,
    /// Request timeout per cloud attempt.
    pub timeout: Duration,
    pub retry: RetryPolicy,

    // ── Polling cadence ──────────────────────────────────────────────
    /// Requests per day the account may spend. 0 disables budgeting.
    pub daily_request_budget: u32,
    pub minimum_interval: Duration,
    pub default_interval: Duration,
    pub pairing_ttl: Duration,
    pub rfid: Cadence,
    pub version: Cadence,

    // ── Writes ───────────────────────────────────────────────────────
    pub hold_window: Duration,

    pub local: LocalSettings,
    /// Pairings known before the first fetch.
    pub seed_pairings: Vec<Pairing>,
    /// Spawn the scheduler and local pollers on connect.
    pub background: bool,
}

impl SyncConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            daily_request_budget: 1000,
            minimum_interval: Duration::from_secs(90),
            default_interval: Duration::from_secs(120),
            pairing_ttl: Duration::from_secs(900),
            rfid: Cadence {
                refresh: Duration::from_secs(6 * 3600),
                retry: Duration::from_secs(1800),
            },
            version: Cadence {
                refresh: Duration::from_secs(12 * 3600),
                retry: Duration::from_secs(1800),
            },
            hold_window: Duration::from_secs(20),
            local: LocalSettings::default(),
            seed_pairings: Vec::new(),
            background: true,
        }
    }

    pub fn interval_settings(&self) -> IntervalSettings {
        IntervalSettings {
            daily_request_budget: self.daily_request_budget,
            minimum_interval: self.minimum_interval,
            default_interval: self.default_interval,
        }
    }

    pub fn merge_settings(&self) -> MergeSettings {
        MergeSettings {
            rfid: self.rfid,
            version: self.version,
        }
    }

    pub fn cloud_transport(&self) -> TransportConfig {
        TransportConfig::default()
            .with_timeout(self.timeout)
            .with_retry(self.retry)
    }
}
