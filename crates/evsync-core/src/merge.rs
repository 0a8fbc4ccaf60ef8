// ── Per-device state merger ──
//
// Builds one device's record for a cloud cycle from the previous record and
// this cycle's fetches. A facet that fails keeps its previous value and
// bookkeeping; only the failed facet's retry deadline moves.

use std::time::Duration;

use chrono::{DateTime, Utc};
use strum::{Display, IntoStaticStr};
use tracing::debug;

use crate::clock::{SharedClock, span};
use crate::convert::reported_fields;
use crate::error::CoreError;
use crate::keys::{self, CONNECTED_KEYS};
use crate::model::{DeviceRecord, Pairing, Reported};
use crate::source::CloudSource;

/// Long/short cadence pair for an auxiliary facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    /// Wait after a successful refresh.
    pub refresh: Duration,
    /// Wait after a failed or malformed refresh.
    pub retry: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSettings {
    pub rfid: Cadence,
    pub version: Cadence,
}

/// Which part of the record a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Facet {
    Reported,
    Rfid,
    Version,
}

#[derive(Debug)]
pub struct MergeOutcome {
    pub record: DeviceRecord,
    pub failures: Vec<(Facet, CoreError)>,
}

impl MergeOutcome {
    pub fn auth_failure(&self) -> Option<&CoreError> {
        self.failures
            .iter()
            .map(|(_, e)| e)
            .find(|e| e.is_auth())
    }
}

#[derive(Debug)]
pub struct StateMerger {
    settings: MergeSettings,
    clock: SharedClock,
}

impl StateMerger {
    pub fn new(settings: MergeSettings, clock: SharedClock) -> Self {
        Self { settings, clock }
    }

    /// Run one device's merge. Steps are ordered: `reported` is fetched
    /// before `connected` is derived.
    pub async fn merge_device<S: CloudSource>(
        &self,
        source: &S,
        pairing: &Pairing,
        previous: Option<&DeviceRecord>,
    ) -> MergeOutcome {
        let device_id = pairing.device_id.as_str();
        let mut record = previous
            .cloned()
            .unwrap_or_else(|| DeviceRecord::new(pairing.clone()));
        record.pairing = pairing.clone();
        let mut failures = Vec::new();

        // 1. reported snapshot
        match source.reported(device_id).await {
            Ok(body) => {
                match reported_fields(&body) {
                    Some(fields) => {
                        record.reported = Reported::new(fields);
                        record.additional.freshness.reported_at = Some(self.clock.now());
                    }
                    None => failures.push((
                        Facet::Reported,
                        CoreError::Payload {
                            message: format!("reported body for {device_id} is not an object"),
                        },
                    )),
                }
                record.current_state = Some(body);
            }
            Err(e) => failures.push((Facet::Reported, e)),
        }

        if failures.iter().any(|(_, e)| e.is_auth()) {
            return MergeOutcome { record, failures };
        }

        // 2. connectivity, recomputed from whatever snapshot is retained
        if let Some(flag) = record
            .reported
            .get_any(CONNECTED_KEYS)
            .and_then(keys::to_bool)
        {
            record.connected = Some(flag);
        }

        // 3. LAN address: reported, then pairing, then what we had
        if let Some(address) =
            keys::extract_address(&record.reported).or_else(|| pairing.network_address.clone())
        {
            record.additional.static_ip = Some(address);
        }

        // 4. RFID cards
        let now = self.clock.now();
        if is_due(record.additional.next_rfid_refresh, now) {
            match source.rfid_cards(device_id).await {
                Ok(cards) => {
                    debug!(device_id, count = cards.len(), "rfid cards refreshed");
                    record.rfid_cards = Some(cards);
                    record.additional.freshness.rfid_at = Some(now);
                    record.additional.next_rfid_refresh = Some(now + span(self.settings.rfid.refresh));
                }
                Err(e) => {
                    record.additional.next_rfid_refresh = Some(now + span(self.settings.rfid.retry));
                    failures.push((Facet::Rfid, e));
                }
            }
        }

        // 5. firmware version
        if is_due(record.additional.next_version_refresh, now) {
            match source.firmware_version(device_id).await {
                Ok(version) => {
                    record.firmware_version = Some(version);
                    record.additional.freshness.version_at = Some(now);
                    record.additional.next_version_refresh =
                        Some(now + span(self.settings.version.refresh));
                }
                Err(e) => {
                    record.additional.next_version_refresh =
                        Some(now + span(self.settings.version.retry));
                    failures.push((Facet::Version, e));
                }
            }
        }

        MergeOutcome { record, failures }
    }
}

fn is_due(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    deadline.is_none_or(|at| now >= at)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::model::RfidCard;
    use crate::testing::{FakeCloud, network_error};

    fn settings() -> MergeSettings {
        MergeSettings {
            rfid: Cadence {
                refresh: Duration::from_secs(6 * 3600),
                retry: Duration::from_secs(1800),
            },
            version: Cadence {
                refresh: Duration::from_secs(12 * 3600),
                retry: Duration::from_secs(1800),
            },
        }
    }

    fn setup() -> (Arc<ManualClock>, StateMerger) {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let merger = StateMerger::new(settings(), clock.clone());
        (clock, merger)
    }

    fn card(code: &str) -> RfidCard {
        RfidCard {
            code: code.into(),
            tag: None,
            added_at: None,
        }
    }

    #[tokio::test]
    async fn first_merge_populates_every_facet() {
        let (clock, merger) = setup();
        let cloud = FakeCloud::with_devices(&["x"]);
        cloud.set_reported(
            "x",
            Ok(json!({ "reported": { "Connected": "yes", "ip": "10.0.0.9", "intensity": 16 } })),
        );
        cloud.set_rfid("x", Ok(vec![card("AA")]));
        cloud.set_version("x", Ok("2.1.7".into()));

        let out = merger.merge_device(&cloud, &Pairing::new("x"), None).await;
        assert!(out.failures.is_empty());
        let r = out.record;
        assert_eq!(r.connected, Some(true));
        assert_eq!(r.additional.static_ip.as_deref(), Some("10.0.0.9"));
        assert_eq!(r.rfid_cards, Some(vec![card("AA")]));
        assert_eq!(r.firmware_version.as_deref(), Some("2.1.7"));
        assert_eq!(
            r.additional.next_rfid_refresh,
            Some(clock.now() + chrono::Duration::hours(6))
        );
    }

    #[tokio::test]
    async fn rfid_network_error_keeps_cards_and_schedules_short_retry() {
        let (clock, merger) = setup();
        let cloud = FakeCloud::with_devices(&["x"]);
        cloud.set_rfid("x", Ok(vec![card("AA")]));
        let first = merger.merge_device(&cloud, &Pairing::new("x"), None).await;

        // Long cadence elapses; reported changes, RFID fetch breaks.
        clock.advance(chrono::Duration::hours(7));
        cloud.set_reported(
            "x",
            Ok(json!({ "reported": { "connected": 0, "intensity": 20 } })),
        );
        cloud.set_rfid("x", Err(network_error()));

        let out = merger
            .merge_device(&cloud, &Pairing::new("x"), Some(&first.record))
            .await;
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].0, Facet::Rfid);

        let r = out.record;
        assert_eq!(r.reported.get("intensity"), Some(&json!(20)));
        assert_eq!(r.connected, Some(false));
        assert_eq!(r.rfid_cards, Some(vec![card("AA")]));
        assert_eq!(
            r.additional.freshness.rfid_at,
            first.record.additional.freshness.rfid_at
        );
        assert_eq!(
            r.additional.next_rfid_refresh,
            Some(clock.now() + chrono::Duration::minutes(30))
        );
    }

    #[tokio::test]
    async fn version_failure_keeps_firmware_and_schedules_short_retry() {
        let (clock, merger) = setup();
        let cloud = FakeCloud::with_devices(&["x"]);
        cloud.set_version("x", Ok("2.0".into()));
        let first = merger.merge_device(&cloud, &Pairing::new("x"), None).await;

        clock.advance(chrono::Duration::hours(13));
        cloud.set_version("x", Err(network_error()));
        let out = merger
            .merge_device(&cloud, &Pairing::new("x"), Some(&first.record))
            .await;
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].0, Facet::Version);

        let r = out.record;
        assert_eq!(r.firmware_version.as_deref(), Some("2.0"));
        assert_eq!(
            r.additional.freshness.version_at,
            first.record.additional.freshness.version_at
        );
        assert_eq!(
            r.additional.next_version_refresh,
            Some(clock.now() + chrono::Duration::minutes(30))
        );
        // RFID cadence is independent and was due too.
        assert_eq!(cloud.calls("rfid"), 2);
    }

    #[tokio::test]
    async fn reported_failure_keeps_previous_snapshot_and_connectivity() {
        let (clock, merger) = setup();
        let cloud = FakeCloud::with_devices(&["x"]);
        cloud.set_reported(
            "x",
            Ok(json!({ "reported": { "online": true, "wifi": { "ip": "10.1.1.1" } } })),
        );
        let first = merger.merge_device(&cloud, &Pairing::new("x"), None).await;

        clock.advance(chrono::Duration::minutes(5));
        cloud.set_reported("x", Err(network_error()));
        let out = merger
            .merge_device(&cloud, &Pairing::new("x"), Some(&first.record))
            .await;

        let r = out.record;
        assert_eq!(r.reported, first.record.reported);
        assert_eq!(r.current_state, first.record.current_state);
        assert_eq!(r.connected, Some(true));
        assert_eq!(r.additional.static_ip.as_deref(), Some("10.1.1.1"));
        assert_eq!(
            r.additional.freshness.reported_at,
            first.record.additional.freshness.reported_at
        );
    }

    #[tokio::test]
    async fn auxiliary_facets_wait_for_their_cadence() {
        let (clock, merger) = setup();
        let cloud = FakeCloud::with_devices(&["x"]);
        let first = merger.merge_device(&cloud, &Pairing::new("x"), None).await;
        assert_eq!(cloud.calls("rfid"), 1);
        assert_eq!(cloud.calls("version"), 1);

        clock.advance(chrono::Duration::minutes(10));
        merger
            .merge_device(&cloud, &Pairing::new("x"), Some(&first.record))
            .await;
        assert_eq!(cloud.calls("reported"), 2);
        assert_eq!(cloud.calls("rfid"), 1);
        assert_eq!(cloud.calls("version"), 1);
    }

    #[tokio::test]
    async fn auth_failure_short_circuits() {
        let (_clock, merger) = setup();
        let cloud = FakeCloud::with_devices(&["x"]);
        cloud.set_reported(
            "x",
            Err(CoreError::Auth {
                message: "revoked".into(),
            }),
        );
        let out = merger.merge_device(&cloud, &Pairing::new("x"), None).await;
        assert!(out.auth_failure().is_some());
        assert_eq!(cloud.calls("rfid"), 0);
        assert_eq!(out.record.connected, None);
    }

    #[tokio::test]
    async fn scalar_body_is_kept_raw_but_does_not_replace_reported() {
        let (_clock, merger) = setup();
        let cloud = FakeCloud::with_devices(&["x"]);
        let first = merger.merge_device(&cloud, &Pairing::new("x"), None).await;

        cloud.set_reported("x", Ok(json!(true)));
        let out = merger
            .merge_device(&cloud, &Pairing::new("x"), Some(&first.record))
            .await;
        assert_eq!(out.failures[0].0, Facet::Reported);
        assert_eq!(out.record.current_state, Some(json!(true)));
        assert_eq!(out.record.reported, first.record.reported);
    }
}
