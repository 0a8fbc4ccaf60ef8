// In-memory fleet used by the unit tests.
#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::{Value, json};

use crate::error::CoreError;
use crate::model::{Pairing, RfidCard};
use crate::source::CloudSource;

#[derive(Debug, Default)]
struct State {
    devices: Vec<Pairing>,
    pairings_error: Option<CoreError>,
    reported: HashMap<String, Result<Value, CoreError>>,
    rfid: HashMap<String, Result<Vec<RfidCard>, CoreError>>,
    version: HashMap<String, Result<String, CoreError>>,
    calls: HashMap<&'static str, usize>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeCloud {
    state: Mutex<State>,
}

impl FakeCloud {
    pub(crate) fn with_devices(ids: &[&str]) -> Self {
        let fake = Self::default();
        fake.set_devices(ids);
        fake
    }

    pub(crate) fn set_devices(&self, ids: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.devices = ids.iter().map(|id| Pairing::new(*id)).collect();
        for id in ids {
            state
                .reported
                .entry((*id).to_owned())
                .or_insert_with(|| Ok(json!({ "reported": { "connected": true } })));
        }
    }

    pub(crate) fn fail_pairings(&self, err: Option<CoreError>) {
        self.state.lock().unwrap().pairings_error = err;
    }

    pub(crate) fn set_reported(&self, id: &str, result: Result<Value, CoreError>) {
        self.state
            .lock()
            .unwrap()
            .reported
            .insert(id.to_owned(), result);
    }

    pub(crate) fn set_rfid(&self, id: &str, result: Result<Vec<RfidCard>, CoreError>) {
        self.state.lock().unwrap().rfid.insert(id.to_owned(), result);
    }

    pub(crate) fn set_version(&self, id: &str, result: Result<String, CoreError>) {
        self.state
            .lock()
            .unwrap()
            .version
            .insert(id.to_owned(), result);
    }

    pub(crate) fn calls(&self, facet: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(facet)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn pairing_calls(&self) -> usize {
        self.calls("pairings")
    }

    fn bump(&self, facet: &'static str) {
        *self.state.lock().unwrap().calls.entry(facet).or_default() += 1;
    }
}

pub(crate) fn network_error() -> CoreError {
    CoreError::Request {
        status: None,
        message: "connection reset".into(),
    }
}

impl CloudSource for FakeCloud {
    async fn pairings(&self) -> Result<Vec<Pairing>, CoreError> {
        self.bump("pairings");
        let state = self.state.lock().unwrap();
        match &state.pairings_error {
            Some(e) => Err(e.clone()),
            None => Ok(state.devices.clone()),
        }
    }

    async fn reported(&self, device_id: &str) -> Result<Value, CoreError> {
        self.bump("reported");
        self.state
            .lock()
            .unwrap()
            .reported
            .get(device_id)
            .cloned()
            .unwrap_or_else(|| {
                Err(CoreError::DeviceNotFound {
                    identifier: device_id.to_owned(),
                })
            })
    }

    async fn rfid_cards(&self, device_id: &str) -> Result<Vec<RfidCard>, CoreError> {
        self.bump("rfid");
        self.state
            .lock()
            .unwrap()
            .rfid
            .get(device_id)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn firmware_version(&self, device_id: &str) -> Result<String, CoreError> {
        self.bump("version");
        self.state
            .lock()
            .unwrap()
            .version
            .get(device_id)
            .cloned()
            .unwrap_or_else(|| Ok("1.0.0".to_owned()))
    }
}
