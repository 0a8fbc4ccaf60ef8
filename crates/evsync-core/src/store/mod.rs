// ── Reactive device store ──
//
// The device map is the only state shared between the cloud scheduler, the
// local pollers and consumers. Mutations are broadcast via `watch` channels.

mod collection;
mod refresh;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use self::collection::EntityCollection;
use crate::model::{DeviceRecord, Pairing};

/// Central reactive store for device records.
///
/// Reads are cheap `Arc` clones; writes replace one record at a time under
/// the map's per-shard lock.
pub struct DeviceStore {
    pub(crate) devices: EntityCollection<DeviceRecord>,
    pub(crate) pairings: watch::Sender<Arc<Vec<Pairing>>>,
    pub(crate) last_cycle: watch::Sender<Option<DateTime<Utc>>>,
}

impl DeviceStore {
    pub fn new() -> Self {
        let (pairings, _) = watch::channel(Arc::new(Vec::new()));
        let (last_cycle, _) = watch::channel(None);

        Self {
            devices: EntityCollection::new(),
            pairings,
            last_cycle,
        }
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    /// All device records, ordered by device id.
    pub fn snapshot(&self) -> Arc<Vec<Arc<DeviceRecord>>> {
        self.devices.snapshot()
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceRecord>> {
        self.devices.get(device_id)
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<DeviceRecord>>>> {
        self.devices.subscribe()
    }

    /// Roster used by the last cloud cycle.
    pub fn pairings(&self) -> Arc<Vec<Pairing>> {
        self.pairings.borrow().clone()
    }

    /// Start time of the last applied cloud cycle.
    pub fn last_cycle(&self) -> Option<DateTime<Utc>> {
        *self.last_cycle.borrow()
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.devices.keys()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.len() == 0
    }

    /// Bumped on every mutation.
    pub fn version(&self) -> u64 {
        self.devices.version()
    }
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new()
    }
}
