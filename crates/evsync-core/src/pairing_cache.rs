// ── Pairing roster cache ──
//
// Short-TTL cache in front of the pairings endpoint. A rate-limited refresh
// falls back to whatever is cached, expired or not.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::clock::{SharedClock, span};
use crate::error::CoreError;
use crate::model::Pairing;
use crate::source::CloudSource;

#[derive(Debug, Clone)]
struct CacheEntry {
    pairings: Arc<Vec<Pairing>>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct PairingCache {
    ttl: Duration,
    clock: SharedClock,
    /// Held across the refresh so concurrent callers share one fetch.
    entry: Mutex<Option<CacheEntry>>,
}

impl PairingCache {
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            ttl,
            clock,
            entry: Mutex::new(None),
        }
    }

    /// Pre-seed from persisted data. Seeds count as fresh for one TTL, so
    /// the first cycle after a restart skips the roster fetch.
    pub fn with_seed(self, pairings: Vec<Pairing>) -> Self {
        if pairings.is_empty() {
            return self;
        }
        let expires_at = self.clock.now() + span(self.ttl);
        Self {
            entry: Mutex::new(Some(CacheEntry {
                pairings: Arc::new(pairings),
                expires_at,
            })),
            ..self
        }
    }

    /// Current roster, refreshing through `source` when expired.
    pub async fn get_pairings<S: CloudSource>(
        &self,
        source: &S,
    ) -> Result<Arc<Vec<Pairing>>, CoreError> {
        let mut guard = self.entry.lock().await;
        let now = self.clock.now();

        if let Some(entry) = guard.as_ref().filter(|e| now < e.expires_at) {
            return Ok(Arc::clone(&entry.pairings));
        }

        match source.pairings().await {
            Ok(fresh) => {
                debug!(count = fresh.len(), "pairings refreshed");
                let pairings = Arc::new(fresh);
                *guard = Some(CacheEntry {
                    pairings: Arc::clone(&pairings),
                    expires_at: now + span(self.ttl),
                });
                Ok(pairings)
            }
            Err(e) if e.is_rate_limit() => match guard.as_ref() {
                Some(entry) => {
                    warn!(error = %e, "pairings rate limited, serving cached roster");
                    Ok(Arc::clone(&entry.pairings))
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Cached roster regardless of expiry.
    pub async fn cached(&self) -> Option<Arc<Vec<Pairing>>> {
        self.entry
            .lock()
            .await
            .as_ref()
            .map(|e| Arc::clone(&e.pairings))
    }

    /// Force the next call to refetch, keeping the data as a rate-limit fallback.
    pub async fn expire(&self) {
        if let Some(entry) = self.entry.lock().await.as_mut() {
            entry.expires_at = self.clock.now();
        }
    }
}
