// ── Request quota tracking ──
//
// Pure state holder for the provider's rate-limit headers. Written by the
// cloud client whenever a response carries them, read by anyone who wants
// to surface the remaining budget.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Header name prefixes probed in order.
const HEADER_PREFIXES: &[&str] = &["x-ratelimit-", "ratelimit-"];

/// Reset values above this are absolute epoch seconds, below it relative.
const EPOCH_THRESHOLD: i64 = 1_000_000_000;

/// Last-seen request budget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl QuotaSnapshot {
    /// Parse quota headers. Returns `None` when none are present.
    pub fn from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Self> {
        let limit = header_u64(headers, "limit");
        let remaining = header_u64(headers, "remaining");
        let reset_at = header_i64(headers, "reset").and_then(|raw| {
            if raw >= EPOCH_THRESHOLD {
                Utc.timestamp_opt(raw, 0).single()
            } else {
                Some(now + chrono::Duration::seconds(raw))
            }
        });

        if limit.is_none() && remaining.is_none() && reset_at.is_none() {
            return None;
        }
        Some(Self {
            limit,
            remaining,
            reset_at,
        })
    }

    /// Overlay the fields present in `newer` onto `self`.
    fn merged(&self, newer: Self) -> Self {
        Self {
            limit: newer.limit.or(self.limit),
            remaining: newer.remaining.or(self.remaining),
            reset_at: newer.reset_at.or(self.reset_at),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, suffix: &str) -> Option<&'a str> {
    HEADER_PREFIXES.iter().find_map(|prefix| {
        headers
            .get(format!("{prefix}{suffix}"))
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    })
}

fn header_u64(headers: &HeaderMap, suffix: &str) -> Option<u64> {
    header_str(headers, suffix).and_then(|s| s.parse().ok())
}

fn header_i64(headers: &HeaderMap, suffix: &str) -> Option<i64> {
    header_str(headers, suffix).and_then(|s| s.parse().ok())
}

/// Shared, lock-free holder of the latest [`QuotaSnapshot`].
///
/// Cheap to clone; all clones observe the same snapshot.
#[derive(Debug, Clone, Default)]
pub struct QuotaTracker {
    latest: Arc<ArcSwapOption<QuotaSnapshot>>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record any quota headers on a response. Absent headers leave the
    /// previous snapshot untouched.
    pub fn observe(&self, headers: &HeaderMap) {
        let Some(parsed) = QuotaSnapshot::from_headers(headers, Utc::now()) else {
            return;
        };
        let merged = match self.latest.load_full() {
            Some(previous) => previous.merged(parsed),
            None => parsed,
        };
        trace!(limit = ?merged.limit, remaining = ?merged.remaining, "quota observed");
        self.latest.store(Some(Arc::new(merged)));
    }

    /// The last recorded snapshot, if any response carried quota headers.
    pub fn snapshot(&self) -> Option<QuotaSnapshot> {
        self.latest.load_full().map(|s| (*s).clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn parses_relative_reset() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let snap = QuotaSnapshot::from_headers(
            &headers(&[
                ("x-ratelimit-limit", "1000"),
                ("x-ratelimit-remaining", "998"),
                ("x-ratelimit-reset", "60"),
            ]),
            now,
        )
        .unwrap();
        assert_eq!(snap.limit, Some(1000));
        assert_eq!(snap.remaining, Some(998));
        assert_eq!(snap.reset_at, Some(now + chrono::Duration::seconds(60)));
    }

    #[test]
    fn parses_absolute_reset_and_alternate_prefix() {
        let now = Utc::now();
        let snap = QuotaSnapshot::from_headers(
            &headers(&[("ratelimit-remaining", "5"), ("ratelimit-reset", "1800000000")]),
            now,
        )
        .unwrap();
        assert_eq!(snap.limit, None);
        assert_eq!(snap.remaining, Some(5));
        assert_eq!(snap.reset_at, Utc.timestamp_opt(1_800_000_000, 0).single());
    }

    #[test]
    fn absence_leaves_previous_snapshot() {
        let tracker = QuotaTracker::new();
        tracker.observe(&headers(&[
            ("x-ratelimit-limit", "1000"),
            ("x-ratelimit-remaining", "10"),
        ]));
        tracker.observe(&HeaderMap::new());
        let snap = tracker.snapshot().unwrap();
        assert_eq!(snap.remaining, Some(10));

        tracker.observe(&headers(&[("x-ratelimit-remaining", "9")]));
        let snap = tracker.snapshot().unwrap();
        assert_eq!(snap.limit, Some(1000));
        assert_eq!(snap.remaining, Some(9));
    }
}
