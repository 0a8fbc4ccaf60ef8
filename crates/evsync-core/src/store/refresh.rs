// ── Cycle application logic ──
//
// Applies the cloud cycle's merged records and the local pollers'
// snapshots into the DeviceStore. Each source owns its own fields; neither
// overwrites the other's.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::DeviceStore;
use super::collection::EntityCollection;
use crate::model::{DeviceRecord, LocalSnapshot, Pairing};

/// Upsert all incoming values, then prune any existing keys not in the
/// incoming set. This avoids the brief empty state that a clear causes.
fn upsert_and_prune<T, F>(collection: &EntityCollection<T>, items: Vec<(String, T)>, merge: F)
where
    T: Send + Sync + 'static,
    F: Fn(T, Option<&T>) -> T,
{
    let incoming_keys: HashSet<String> = items.iter().map(|(k, _)| k.clone()).collect();
    for (key, value) in items {
        collection.upsert_with(key, |existing| merge(value, existing));
    }
    for existing_key in collection.keys() {
        if !incoming_keys.contains(&existing_key) {
            collection.remove(&existing_key);
        }
    }
}

/// Carry the local poller's fields over from the stored record. The merger
/// started from an older copy; the poller may have written since.
fn keep_local_fields(mut incoming: DeviceRecord, existing: Option<&DeviceRecord>) -> DeviceRecord {
    if let Some(existing) = existing {
        incoming.local_snapshot.clone_from(&existing.local_snapshot);
        incoming.additional.shared.clone_from(&existing.additional.shared);
        incoming.additional.freshness.local_at = existing.additional.freshness.local_at;
    }
    incoming
}

impl DeviceStore {
    /// Apply one cloud cycle. Devices no longer paired are dropped.
    pub(crate) fn apply_cloud(
        &self,
        records: Vec<DeviceRecord>,
        pairings: Arc<Vec<Pairing>>,
        at: DateTime<Utc>,
    ) {
        upsert_and_prune(
            &self.devices,
            records
                .into_iter()
                .map(|r| (r.device_id.clone(), r))
                .collect(),
            keep_local_fields,
        );
        self.pairings.send_replace(pairings);
        self.last_cycle.send_replace(Some(at));
    }

    /// Apply a local endpoint read. Returns `false` if the device is unknown.
    pub(crate) fn apply_local(&self, device_id: &str, snapshot: LocalSnapshot) -> bool {
        self.devices.update(device_id, |current| {
            let mut next = current.clone();
            next.additional.shared.extend(snapshot.shared_fields());
            next.additional.freshness.local_at = Some(snapshot.fetched_at);
            next.local_snapshot = Some(snapshot);
            next
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{Map, json};

    use super::*;

    fn record(id: &str) -> DeviceRecord {
        DeviceRecord::new(Pairing::new(id))
    }

    fn snapshot(fields: serde_json::Value) -> LocalSnapshot {
        let fields: Map<String, serde_json::Value> = match fields {
            serde_json::Value::Object(m) => m,
            _ => Map::new(),
        };
        LocalSnapshot {
            source_ip: "10.0.0.7".into(),
            fields,
            fetched_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn cloud_cycle_prunes_unpaired_devices() {
        let store = DeviceStore::new();
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        store.apply_cloud(vec![record("a"), record("b")], Arc::new(Vec::new()), at);
        assert_eq!(store.len(), 2);

        store.apply_cloud(vec![record("b")], Arc::new(Vec::new()), at);
        assert_eq!(store.len(), 1);
        assert!(store.get("a").is_none());
        assert_eq!(store.last_cycle(), Some(at));
    }

    #[test]
    fn local_fields_survive_cloud_cycle() {
        let store = DeviceStore::new();
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        store.apply_cloud(vec![record("a")], Arc::new(Vec::new()), at);
        assert!(store.apply_local("a", snapshot(json!({ "Paused": 1, "Voltage": 230 }))));

        // The merger worked from a copy taken before the local read.
        store.apply_cloud(vec![record("a")], Arc::new(Vec::new()), at);
        let r = store.get("a").unwrap();
        assert_eq!(r.additional.shared.get("paused"), Some(&json!(1)));
        assert_eq!(r.local_snapshot.as_ref().unwrap().source_ip, "10.0.0.7");
        assert!(r.additional.freshness.local_at.is_some());
    }

    #[test]
    fn local_read_for_unknown_device_is_ignored() {
        let store = DeviceStore::new();
        assert!(!store.apply_local("ghost", snapshot(json!({}))));
        assert!(store.snapshot().is_empty());
    }
}
