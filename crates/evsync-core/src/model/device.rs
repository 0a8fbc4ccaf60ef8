// ── Device domain types ──
//
// `DeviceRecord` is the unit of truth per device. The cloud merger owns
// everything except `local_snapshot` and `additional.shared`, which belong
// to the local poller.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Pairing;
use crate::keys::{self, get_ci};

// ── Reported snapshot ───────────────────────────────────────────────

/// Latest authoritative field snapshot, looked up case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Reported {
    fields: Map<String, Value>,
    /// lower-cased key -> original key
    index: HashMap<String, String>,
}

impl Reported {
    pub fn new(fields: Map<String, Value>) -> Self {
        let index = fields
            .keys()
            .map(|k| (k.to_ascii_lowercase(), k.clone()))
            .collect();
        Self { fields, index }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        let original = self.index.get(&key.to_ascii_lowercase())?;
        self.fields.get(original)
    }

    /// First present, non-null value among `aliases`.
    pub fn get_any(&self, aliases: &[&str]) -> Option<&Value> {
        aliases
            .iter()
            .filter_map(|k| self.get(k))
            .find(|v| !v.is_null())
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

impl From<Map<String, Value>> for Reported {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}

impl From<Reported> for Map<String, Value> {
    fn from(r: Reported) -> Self {
        r.fields
    }
}

// ── Local snapshot ──────────────────────────────────────────────────

/// Last successful read of the device's local endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSnapshot {
    /// Address the payload came from.
    pub source_ip: String,
    pub fields: Map<String, Value>,
    pub fetched_at: DateTime<Utc>,
}

impl LocalSnapshot {
    pub fn get(&self, key: &str) -> Option<&Value> {
        get_ci(&self.fields, key)
    }

    /// Back-fill values for the cloud record's side channel, keyed lower-case.
    pub fn shared_fields(&self) -> BTreeMap<String, Value> {
        keys::SHARED_LOCAL_KEYS
            .iter()
            .filter_map(|k| self.get(k).map(|v| (k.to_ascii_lowercase(), v.clone())))
            .collect()
    }
}

// ── RFID credentials ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfidCard {
    pub code: String,
    pub tag: Option<String>,
    pub added_at: Option<String>,
}

// ── Side channel ────────────────────────────────────────────────────

/// When each facet last refreshed successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Freshness {
    pub reported_at: Option<DateTime<Utc>>,
    pub rfid_at: Option<DateTime<Utc>>,
    pub version_at: Option<DateTime<Utc>>,
    pub local_at: Option<DateTime<Utc>>,
}

/// Derived and cached facts that survive failed cycles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Additional {
    /// Resolved LAN address.
    pub static_ip: Option<String>,
    pub next_rfid_refresh: Option<DateTime<Utc>>,
    pub next_version_refresh: Option<DateTime<Utc>>,
    /// Fields back-filled from the local endpoint (lower-case keys).
    pub shared: BTreeMap<String, Value>,
    pub freshness: Freshness,
}

// ── Device record ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub pairing: Pairing,
    /// `None` until a reported snapshot carries a connectivity flag.
    pub connected: Option<bool>,
    pub reported: Reported,
    /// Raw status blob, kept verbatim.
    pub current_state: Option<Value>,
    pub rfid_cards: Option<Vec<RfidCard>>,
    pub firmware_version: Option<String>,
    pub local_snapshot: Option<LocalSnapshot>,
    pub additional: Additional,
}

type AddressSource = fn(&DeviceRecord) -> Option<String>;

fn resolved_address(r: &DeviceRecord) -> Option<String> {
    r.additional.static_ip.clone().filter(|s| !s.is_empty())
}

fn local_payload_address(r: &DeviceRecord) -> Option<String> {
    let local = r.local_snapshot.as_ref()?;
    Some(local.source_ip.clone())
        .filter(|s| !s.is_empty())
        .or_else(|| local.get("IP").and_then(keys::non_empty))
}

fn reported_address(r: &DeviceRecord) -> Option<String> {
    r.reported
        .get_any(&["ip", "wifi_ip"])
        .and_then(keys::non_empty)
}

fn pairing_address(r: &DeviceRecord) -> Option<String> {
    r.pairing.network_address.clone().filter(|s| !s.is_empty())
}

/// Local addressing chain, most specific first.
const ADDRESS_SOURCES: &[AddressSource] = &[
    resolved_address,
    local_payload_address,
    reported_address,
    pairing_address,
];

impl DeviceRecord {
    pub fn new(pairing: Pairing) -> Self {
        Self {
            device_id: pairing.device_id.clone(),
            pairing,
            connected: None,
            reported: Reported::default(),
            current_state: None,
            rfid_cards: None,
            firmware_version: None,
            local_snapshot: None,
            additional: Additional::default(),
        }
    }

    /// Address to use for the local endpoint, if any source knows one.
    pub fn local_address(&self) -> Option<String> {
        ADDRESS_SOURCES.iter().find_map(|f| f(self))
    }

    /// Value from whichever source answered last: local side channel for
    /// shared keys, otherwise the reported snapshot.
    pub fn value(&self, aliases: &[&str]) -> Option<&Value> {
        let shared = aliases
            .iter()
            .find_map(|k| self.additional.shared.get(&k.to_ascii_lowercase()));
        let reported = self.reported.get_any(aliases);
        match (shared, self.newest_is_local()) {
            (Some(v), true) => Some(v),
            (s, _) => reported.or(s),
        }
    }

    fn newest_is_local(&self) -> bool {
        let f = &self.additional.freshness;
        match (f.local_at, f.reported_at) {
            (Some(local), Some(cloud)) => local >= cloud,
            (Some(_), None) => true,
            _ => false,
        }
    }
}
