//! Device state synchronization engine between `evsync-api` and consumers.
//!
//! Keeps one coherent record per charger from two independently failing
//! sources (a rate-limited cloud API and each device's local endpoint):
//!
//! - **[`Controller`]**: Central facade. [`connect()`](Controller::connect)
//!   runs the first cloud cycle, then spawns the scheduler, one local poller
//!   per device, and the command processor.
//!   [`Controller::oneshot()`](Controller::oneshot) runs a single cycle for
//!   CLI use.
//!
//! - **[`SyncEngine`]**: One cloud cycle: roster from the [`PairingCache`],
//!   per-device merges by the [`StateMerger`], interval recomputed by the
//!   [`PollingIntervalController`].
//!
//! - **[`DeviceStore`]**: Reactive storage (`DashMap` + `tokio::sync::watch`).
//!   Records are replaced whole, so readers never see a half-merged device.
//!
//! - **[`OptimisticValue`]** / **[`ControlHandle`]**: Hold a written value
//!   until the authoritative source confirms it or the hold window expires.
//!
//! - **[`Command`]**: Typed writes routed through an `mpsc` channel to the
//!   controller's command processor.

pub mod clock;
pub mod command;
pub mod config;
pub mod controller;
pub mod controls;
pub mod convert;
pub mod engine;
pub mod error;
pub mod interval;
pub mod keys;
pub mod local_poller;
pub mod merge;
pub mod model;
pub mod optimistic;
pub mod pairing_cache;
pub mod source;
pub mod store;

#[cfg(test)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use command::{Command, CommandResult};
pub use config::{LocalSettings, SyncConfig};
pub use controller::{ConnectionState, Controller};
pub use controls::{CONTROLS, ControlHandle, ControlKind, ControlSpec, ControlValue};
pub use engine::{CycleReport, SyncEngine};
pub use error::CoreError;
pub use interval::{IntervalSettings, PollingIntervalController};
pub use merge::{Cadence, Facet, MergeOutcome, MergeSettings, StateMerger};
pub use optimistic::{Converges, OptimisticValue};
pub use pairing_cache::PairingCache;
pub use source::CloudSource;
pub use store::DeviceStore;

pub use model::{Additional, DeviceRecord, Freshness, LocalSnapshot, Pairing, Reported, RfidCard};

pub use evsync_api::{QuotaSnapshot, WriteValue};
