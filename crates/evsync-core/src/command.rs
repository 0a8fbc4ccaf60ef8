// ── Command API ──
//
// All writes flow through a single `Command` enum. The controller's command
// processor executes them one at a time, so writes never overlap.

use evsync_api::WriteValue;
use serde_json::Value;
use strum::IntoStaticStr;

use crate::error::CoreError;

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
}

/// All write operations against a charger.
#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Command {
    // ── Cloud: charging limits ───────────────────────────────────────
    SetIntensity { device_id: String, amps: u8 },
    SetMinIntensity { device_id: String, amps: u8 },
    SetMaxIntensity { device_id: String, amps: u8 },
    /// Watts on the wire.
    SetMaxPower { device_id: String, watts: u32 },

    // ── Cloud: toggles ───────────────────────────────────────────────
    SetDynamic { device_id: String, enabled: bool },
    SetLocked { device_id: String, locked: bool },
    SetLogoLed { device_id: String, enabled: bool },
    SetRfidReader { device_id: String, enabled: bool },

    // ── Cloud: actions ───────────────────────────────────────────────
    StartCharge { device_id: String },
    PauseCharge { device_id: String },
    Reboot { device_id: String },
    TriggerUpdate { device_id: String },

    // ── Local endpoint ───────────────────────────────────────────────
    WriteLocal {
        device_id: String,
        keyword: String,
        value: WriteValue,
    },
}

impl Command {
    pub fn device_id(&self) -> &str {
        match self {
            Self::SetIntensity { device_id, .. }
            | Self::SetMinIntensity { device_id, .. }
            | Self::SetMaxIntensity { device_id, .. }
            | Self::SetMaxPower { device_id, .. }
            | Self::SetDynamic { device_id, .. }
            | Self::SetLocked { device_id, .. }
            | Self::SetLogoLed { device_id, .. }
            | Self::SetRfidReader { device_id, .. }
            | Self::StartCharge { device_id }
            | Self::PauseCharge { device_id }
            | Self::Reboot { device_id }
            | Self::TriggerUpdate { device_id }
            | Self::WriteLocal { device_id, .. } => device_id,
        }
    }

    /// Snake-case command name for logs.
    pub fn name(&self) -> &'static str {
        self.into()
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::WriteLocal { .. })
    }
}

/// Result of a successfully executed command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    Ok,
    /// Body returned by the cloud, already coerced from plain text.
    Response(Value),
}
