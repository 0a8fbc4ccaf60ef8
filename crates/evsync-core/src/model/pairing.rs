use serde::{Deserialize, Serialize};

/// One device linked to the account.
///
/// Replaced wholesale whenever the roster is refreshed; never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pairing {
    pub device_id: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub network_address: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl Pairing {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            tag: None,
            network_address: None,
            model: None,
        }
    }

    /// Human label: tag if set, else the id.
    pub fn display_name(&self) -> &str {
        self.tag
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.device_id)
    }
}
