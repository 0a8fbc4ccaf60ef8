// ── Key alias tables and value coercion ──
//
// Firmware revisions spell the same field several ways. Every lookup goes
// through an ordered alias list probed against a lower-cased index; the
// first hit wins.

use serde_json::{Map, Value};

use crate::model::Reported;

/// Reported keys that carry the cloud connectivity flag.
pub const CONNECTED_KEYS: &[&str] = &[
    "connected",
    "isconnected",
    "is_connected",
    "online",
    "isonline",
    "cloudconnected",
];

/// Local real-time fields copied into the cloud record's side channel.
pub const SHARED_LOCAL_KEYS: &[&str] = &["DynamicPowerMode", "ContractedPower", "Paused", "Locked"];

/// Top-level reported keys that may hold the device's LAN address.
const ADDRESS_KEYS: &[&str] = &["ip", "wifi_ip", "ip_address", "ipaddress", "localip", "local_ip"];

/// Nested objects whose `ip` member may hold the LAN address.
const NESTED_ADDRESS_PARENTS: &[&str] = &["wifi", "network", "connection"];

/// Coerce a loosely typed flag.
///
/// Accepts booleans, numbers (non-zero is true) and the usual on/off words.
pub fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" | "enabled" => Some(true),
            "0" | "false" | "off" | "no" | "disabled" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Coerce a number that may arrive as a numeric string.
pub fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Non-empty trimmed string, or `None`.
pub fn non_empty(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "0.0.0.0")
        .map(str::to_owned)
}

/// Case-insensitive lookup in a plain JSON object.
pub fn get_ci<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

// ── Address extraction ──────────────────────────────────────────────

type AddressExtractor = fn(&Reported) -> Option<String>;

fn top_level_address(reported: &Reported) -> Option<String> {
    ADDRESS_KEYS
        .iter()
        .find_map(|k| reported.get(k).and_then(non_empty))
}

fn nested_address(reported: &Reported) -> Option<String> {
    NESTED_ADDRESS_PARENTS.iter().find_map(|parent| {
        let Value::Object(inner) = reported.get(parent)? else {
            return None;
        };
        ["ip", "ip_address", "address"]
            .iter()
            .find_map(|k| get_ci(inner, k).and_then(non_empty))
    })
}

/// Extractors tried in order; first non-empty address wins.
const ADDRESS_EXTRACTORS: &[AddressExtractor] = &[top_level_address, nested_address];

/// Pull a LAN address out of a reported snapshot, whatever shape it takes.
pub fn extract_address(reported: &Reported) -> Option<String> {
    ADDRESS_EXTRACTORS.iter().find_map(|f| f(reported))
}
