// ── Cloud sync cycle ──
//
// One cycle: roster from the pairing cache, every device merged
// concurrently, results applied to the store, interval recomputed. Cycles
// never overlap; a caller arriving mid-cycle waits for it to finish.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::SyncConfig;
use crate::error::CoreError;
use crate::interval::PollingIntervalController;
use crate::merge::StateMerger;
use crate::pairing_cache::PairingCache;
use crate::source::CloudSource;
use crate::store::DeviceStore;

/// Summary of one cloud cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub devices: usize,
    /// Facet failures across the fleet. They never abort the cycle.
    pub failures: usize,
    /// The roster fetch was rate limited with nothing cached; the store
    /// was left untouched.
    pub skipped: bool,
    /// Period until the next scheduled cycle.
    pub next_interval: Duration,
}

pub struct SyncEngine<S: CloudSource> {
    source: S,
    store: Arc<DeviceStore>,
    cache: PairingCache,
    merger: StateMerger,
    interval: Mutex<PollingIntervalController>,
    /// Serialises cycles.
    running: tokio::sync::Mutex<()>,
    clock: SharedClock,
}

impl<S: CloudSource> SyncEngine<S> {
    pub fn new(source: S, store: Arc<DeviceStore>, config: &SyncConfig, clock: SharedClock) -> Self {
        let cache = PairingCache::new(config.pairing_ttl, Arc::clone(&clock))
            .with_seed(config.seed_pairings.clone());
        Self {
            source,
            store,
            cache,
            merger: StateMerger::new(config.merge_settings(), Arc::clone(&clock)),
            interval: Mutex::new(PollingIntervalController::new(config.interval_settings())),
            running: tokio::sync::Mutex::new(()),
            clock,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &Arc<DeviceStore> {
        &self.store
    }

    pub fn current_interval(&self) -> Duration {
        self.interval().current()
    }

    pub fn last_cycle_at(&self) -> Option<DateTime<Utc>> {
        self.interval().last_cycle_at()
    }

    /// Run a scheduled cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport, CoreError> {
        let _running = self.running.lock().await;
        self.cycle().await
    }

    /// Run an out-of-schedule cycle unless one started less than
    /// `minimum_interval` ago, in which case `Ok(None)` is returned.
    pub async fn run_forced_cycle(&self) -> Result<Option<CycleReport>, CoreError> {
        let _running = self.running.lock().await;
        if !self.interval().forced_allowed(self.clock.now()) {
            debug!("refresh request throttled");
            return Ok(None);
        }
        self.cycle().await.map(Some)
    }

    async fn cycle(&self) -> Result<CycleReport, CoreError> {
        let started_at = self.clock.now();
        self.interval().mark_cycle(started_at);

        let pairings = match self.cache.get_pairings(&self.source).await {
            Ok(pairings) => pairings,
            Err(e) if e.is_rate_limit() => {
                warn!(error = %e, "cycle skipped, keeping previous state");
                return Ok(CycleReport {
                    started_at,
                    devices: self.store.len(),
                    failures: 0,
                    skipped: true,
                    next_interval: self.current_interval(),
                });
            }
            Err(e) => {
                self.interval().on_failure(&e);
                return Err(e);
            }
        };

        let (merger, source, store) = (&self.merger, &self.source, &self.store);
        let merges = pairings.iter().map(move |pairing| {
            let previous = store.get(&pairing.device_id);
            async move {
                merger
                    .merge_device(source, pairing, previous.as_deref())
                    .await
            }
        });
        let outcomes = join_all(merges).await;

        let mut failures = 0;
        let mut auth_failure = None;
        let mut records = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            for (facet, err) in &outcome.failures {
                warn!(
                    device_id = %outcome.record.device_id,
                    facet = %facet,
                    error = %err,
                    "device refresh failed"
                );
            }
            failures += outcome.failures.len();
            if auth_failure.is_none() {
                auth_failure = outcome.auth_failure().cloned();
            }
            records.push(outcome.record);
        }

        let devices = records.len();
        self.store
            .apply_cloud(records, Arc::clone(&pairings), started_at);

        if let Some(err) = auth_failure {
            self.interval().on_failure(&err);
            return Err(err);
        }

        let next_interval = self.interval().on_success(devices);
        info!(
            devices,
            failures,
            next_secs = next_interval.as_secs(),
            "cloud cycle complete"
        );
        Ok(CycleReport {
            started_at,
            devices,
            failures,
            skipped: false,
            next_interval,
        })
    }

    fn interval(&self) -> MutexGuard<'_, PollingIntervalController> {
        self.interval.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
