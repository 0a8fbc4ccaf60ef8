// ── Wire-to-domain conversions ──
//
// Maps `evsync_api` response shapes onto the domain model, and unpacks the
// several envelopes a reported-state body may arrive in.

use chrono::{DateTime, Utc};
use evsync_api::{PairingResponse, RealtimeData};
use serde_json::{Map, Value};

use crate::model::{LocalSnapshot, Pairing, RfidCard};

impl From<PairingResponse> for Pairing {
    fn from(p: PairingResponse) -> Self {
        Self {
            device_id: p.device_id,
            tag: p.tag.filter(|t| !t.is_empty()),
            network_address: p.ip.filter(|ip| !ip.trim().is_empty()),
            model: p.model,
        }
    }
}

impl From<evsync_api::RfidCard> for RfidCard {
    fn from(c: evsync_api::RfidCard) -> Self {
        Self {
            code: c.code,
            tag: c.tag,
            added_at: c.added_at,
        }
    }
}

impl LocalSnapshot {
    pub fn from_realtime(data: RealtimeData, fetched_at: DateTime<Utc>) -> Self {
        Self {
            source_ip: data.source_ip,
            fields: data.fields,
            fetched_at,
        }
    }
}

/// Locate the field map inside a reported-state body.
///
/// Accepted shapes, in order: a nested `reported` object, a nested
/// `reported` string holding JSON, or the body object itself.
pub fn reported_fields(body: &Value) -> Option<Map<String, Value>> {
    let Value::Object(outer) = body else {
        return match body {
            Value::String(s) => parse_object(s),
            _ => None,
        };
    };
    match outer.get("reported") {
        Some(Value::Object(inner)) => Some(inner.clone()),
        Some(Value::String(s)) => parse_object(s),
        _ => Some(outer.clone()),
    }
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}
