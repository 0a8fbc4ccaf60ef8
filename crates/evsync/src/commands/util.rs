//! Shared helpers for command handlers.

use std::sync::Arc;

use evsync_api::CloudClient;
use evsync_core::{CoreError, DeviceRecord, SyncConfig};

use crate::error::CliError;

/// Cloud client for commands that bypass the sync engine.
pub fn cloud_client(sync: &SyncConfig) -> Result<CloudClient, CliError> {
    CloudClient::from_api_key(&sync.base_url, &sync.api_key, &sync.cloud_transport())
        .map_err(|e| CoreError::from(e).into())
}

/// Match a device by exact ID, then by tag (case-insensitive).
pub fn find_device<'a>(
    records: &'a [Arc<DeviceRecord>],
    identifier: &str,
) -> Result<&'a Arc<DeviceRecord>, CliError> {
    records
        .iter()
        .find(|r| r.device_id == identifier)
        .or_else(|| {
            records.iter().find(|r| {
                r.pairing
                    .tag
                    .as_deref()
                    .is_some_and(|t| t.eq_ignore_ascii_case(identifier))
            })
        })
        .ok_or_else(|| CliError::NotFound {
            resource_type: "device".into(),
            identifier: identifier.into(),
            list_command: "status".into(),
        })
}

/// Resolve an identifier to a device ID against the store's snapshot.
pub fn resolve_device_id(
    store: &evsync_core::DeviceStore,
    identifier: &str,
) -> Result<String, CliError> {
    let snap = store.snapshot();
    find_device(&snap, identifier).map(|r| r.device_id.clone())
}

/// `-` for absent values in table cells.
pub fn or_dash(value: Option<impl ToString>) -> String {
    value.map_or_else(|| "-".into(), |v| v.to_string())
}
