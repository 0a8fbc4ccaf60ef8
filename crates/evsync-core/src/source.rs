// ── Cloud read seam ──
//
// The engine only needs four reads from the cloud. Keeping them behind a
// trait lets the cycle logic run against an in-memory fleet in tests.

use std::future::Future;

use evsync_api::CloudClient;
use serde_json::Value;

use crate::error::CoreError;
use crate::model::{Pairing, RfidCard};

/// Read-side view of the cloud API.
pub trait CloudSource: Send + Sync {
    fn pairings(&self) -> impl Future<Output = Result<Vec<Pairing>, CoreError>> + Send;

    /// Raw reported-state body; the merger unpacks it.
    fn reported(&self, device_id: &str) -> impl Future<Output = Result<Value, CoreError>> + Send;

    fn rfid_cards(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<Vec<RfidCard>, CoreError>> + Send;

    fn firmware_version(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<String, CoreError>> + Send;
}

impl CloudSource for CloudClient {
    async fn pairings(&self) -> Result<Vec<Pairing>, CoreError> {
        let raw = self.get_pairings().await?;
        Ok(raw.into_iter().map(Pairing::from).collect())
    }

    async fn reported(&self, device_id: &str) -> Result<Value, CoreError> {
        Ok(self.get_reported(device_id).await?)
    }

    async fn rfid_cards(&self, device_id: &str) -> Result<Vec<RfidCard>, CoreError> {
        let raw = self.get_rfid_cards(device_id).await?;
        Ok(raw.into_iter().map(RfidCard::from).collect())
    }

    async fn firmware_version(&self, device_id: &str) -> Result<String, CoreError> {
        Ok(self.get_version(device_id).await?)
    }
}
