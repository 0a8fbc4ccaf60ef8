// ── Local endpoint access ──
//
// Reads and writes a device's own HTTP endpoint at the address the store
// resolves for it. A failed read leaves the previous snapshot in place.

use std::sync::Arc;

use evsync_api::{LocalClient, WriteValue};
use tracing::debug;

use crate::clock::SharedClock;
use crate::config::LocalSettings;
use crate::error::CoreError;
use crate::model::LocalSnapshot;
use crate::store::DeviceStore;

#[derive(Clone)]
pub struct LocalPoller {
    client: LocalClient,
    store: Arc<DeviceStore>,
    clock: SharedClock,
}

impl LocalPoller {
    pub fn new(
        settings: &LocalSettings,
        store: Arc<DeviceStore>,
        clock: SharedClock,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            client: LocalClient::new(&settings.transport())?,
            store,
            clock,
        })
    }

    fn address(&self, device_id: &str) -> Result<String, CoreError> {
        let record = self
            .store
            .get(device_id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: device_id.to_owned(),
            })?;
        record
            .local_address()
            .ok_or_else(|| CoreError::AddressUnknown {
                device_id: device_id.to_owned(),
            })
    }

    /// Fetch the real-time payload and apply it to the store.
    pub async fn refresh(&self, device_id: &str) -> Result<LocalSnapshot, CoreError> {
        let address = self.address(device_id)?;
        let data = self.client.fetch_realtime(&address).await?;
        let snapshot = LocalSnapshot::from_realtime(data, self.clock.now());
        debug!(device_id, %address, fields = snapshot.fields.len(), "local snapshot");
        self.store.apply_local(device_id, snapshot.clone());
        Ok(snapshot)
    }

    /// One write attempt. A timeout surfaces as `LocalUnavailable`: the
    /// write may still have landed.
    pub async fn write(
        &self,
        device_id: &str,
        keyword: &str,
        value: &WriteValue,
    ) -> Result<(), CoreError> {
        let address = self.address(device_id)?;
        self.client.write_keyword(&address, keyword, value).await?;
        Ok(())
    }
}
