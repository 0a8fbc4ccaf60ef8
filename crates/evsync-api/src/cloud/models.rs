// Wire shapes returned by the cloud API.
//
// Field spellings vary between API revisions, so identifiers accept several
// aliases and everything else is optional.

use serde::{Deserialize, Deserializer, Serialize};

/// One entry of the account's pairing roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingResponse {
    #[serde(
        alias = "deviceId",
        alias = "device_id",
        alias = "id",
        deserialize_with = "string_or_number"
    )]
    pub device_id: String,
    #[serde(default, alias = "name", alias = "label")]
    pub tag: Option<String>,
    #[serde(default, alias = "ipAddress", alias = "ip_address")]
    pub ip: Option<String>,
    #[serde(default, alias = "deviceModel", alias = "type")]
    pub model: Option<String>,
}

/// One stored RFID credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfidCard {
    #[serde(alias = "code", alias = "uid", alias = "rfid")]
    pub code: String,
    #[serde(default, alias = "tag", alias = "name")]
    pub tag: Option<String>,
    #[serde(default, alias = "timestamp", alias = "addedAt")]
    pub added_at: Option<String>,
}

/// Identifiers are sometimes sent as JSON numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(serde_json::Number),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
    })
}
