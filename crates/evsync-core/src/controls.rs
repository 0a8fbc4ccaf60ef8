// ── Writable controls ──
//
// Declarative table of the charger's writable properties: where each one is
// read from, its range and step, and the command that writes it. A
// `ControlHandle` pairs one control with an optimistic reconciler.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::command::Command;
use crate::controller::Controller;
use crate::error::CoreError;
use crate::keys::{to_bool, to_f64};
use crate::model::DeviceRecord;
use crate::optimistic::{Converges, OptimisticValue};

/// Reported `maxpower` values above this are watts, not kilowatts.
const WATTS_THRESHOLD_KW: f64 = 23.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlKind {
    Number {
        min: f64,
        max: f64,
        step: f64,
        unit: &'static str,
    },
    Switch,
}

/// How a raw reported number maps to the control's unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceScale {
    Identity,
    /// Kilowatts, but some firmware reports watts.
    KilowattsOrWatts,
}

impl SourceScale {
    fn apply(self, raw: f64) -> f64 {
        match self {
            Self::Identity => raw,
            Self::KilowattsOrWatts if raw > WATTS_THRESHOLD_KW => raw / 1000.0,
            Self::KilowattsOrWatts => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Writer {
    Intensity,
    MinIntensity,
    MaxIntensity,
    MaxPower,
    Dynamic,
    Locked,
    LogoLed,
    RfidReader,
}

/// One writable property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSpec {
    pub name: &'static str,
    pub kind: ControlKind,
    pub aliases: &'static [&'static str],
    /// Reported keys carrying a device-specific upper bound.
    dynamic_max_aliases: &'static [&'static str],
    scale: SourceScale,
    writer: Writer,
}

const AMPS: ControlKind = ControlKind::Number {
    min: 6.0,
    max: 80.0,
    step: 1.0,
    unit: "A",
};

pub const CONTROLS: &[ControlSpec] = &[
    ControlSpec {
        name: "intensity",
        kind: AMPS,
        aliases: &[
            "intensity",
            "currentintensity",
            "current_int",
            "current_intensity",
            "car_intensity",
        ],
        dynamic_max_aliases: &[],
        scale: SourceScale::Identity,
        writer: Writer::Intensity,
    },
    ControlSpec {
        name: "min_intensity",
        kind: AMPS,
        aliases: &["mincarint", "min_intensity", "mincarintensity", "min_car_int", "mincar_int"],
        dynamic_max_aliases: &[],
        scale: SourceScale::Identity,
        writer: Writer::MinIntensity,
    },
    ControlSpec {
        name: "max_intensity",
        kind: AMPS,
        aliases: &["maxcarint", "max_intensity", "maxcarintensity", "max_car_int", "maxcar_int"],
        dynamic_max_aliases: &[],
        scale: SourceScale::Identity,
        writer: Writer::MaxIntensity,
    },
    ControlSpec {
        name: "max_power",
        kind: ControlKind::Number {
            min: 1.0,
            max: 22.0,
            step: 0.1,
            unit: "kW",
        },
        aliases: &["maxpower", "max_power"],
        dynamic_max_aliases: &["maxpowerinstallation", "max_power_installation"],
        scale: SourceScale::KilowattsOrWatts,
        writer: Writer::MaxPower,
    },
    ControlSpec {
        name: "dynamic",
        kind: ControlKind::Switch,
        aliases: &["dynamic"],
        dynamic_max_aliases: &[],
        scale: SourceScale::Identity,
        writer: Writer::Dynamic,
    },
    ControlSpec {
        name: "locked",
        kind: ControlKind::Switch,
        aliases: &["locked"],
        dynamic_max_aliases: &[],
        scale: SourceScale::Identity,
        writer: Writer::Locked,
    },
    ControlSpec {
        name: "logo_led",
        kind: ControlKind::Switch,
        aliases: &["logo_led", "logoled"],
        dynamic_max_aliases: &[],
        scale: SourceScale::Identity,
        writer: Writer::LogoLed,
    },
    ControlSpec {
        name: "rfid_reader",
        kind: ControlKind::Switch,
        aliases: &["set_rfid", "rfid_enabled", "rfid"],
        dynamic_max_aliases: &[],
        scale: SourceScale::Identity,
        writer: Writer::RfidReader,
    },
];

pub fn lookup(name: &str) -> Option<&'static ControlSpec> {
    let wanted = name.trim().replace('-', "_").to_ascii_lowercase();
    CONTROLS.iter().find(|c| c.name == wanted)
}

// ── Values ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ControlValue {
    Number(f64),
    Switch(bool),
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Switch(true) => f.write_str("on"),
            Self::Switch(false) => f.write_str("off"),
        }
    }
}

impl Converges for ControlValue {
    fn converges(&self, other: &Self, tolerance: f64) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.converges(b, tolerance),
            (Self::Switch(a), Self::Switch(b)) => a == b,
            _ => false,
        }
    }
}

impl ControlSpec {
    /// Half a step for numbers; exact match for switches.
    pub fn tolerance(&self) -> f64 {
        match self.kind {
            ControlKind::Number { step, .. } => step / 2.0,
            ControlKind::Switch => 0.0,
        }
    }

    /// Current authoritative value from a device record.
    pub fn read(&self, record: &DeviceRecord) -> Option<ControlValue> {
        let raw = record.value(self.aliases)?;
        match self.kind {
            ControlKind::Number { .. } => {
                to_f64(raw).map(|n| ControlValue::Number(self.scale.apply(n)))
            }
            ControlKind::Switch => to_bool(raw).map(ControlValue::Switch),
        }
    }

    /// Upper bound, narrowed by the device's own limit when reported.
    pub fn max(&self, record: Option<&DeviceRecord>) -> Option<f64> {
        let ControlKind::Number { max, .. } = self.kind else {
            return None;
        };
        let dynamic = record
            .and_then(|r| r.reported.get_any(self.dynamic_max_aliases))
            .and_then(to_f64)
            .map(|n| self.scale.apply(n))
            .filter(|n| *n > 0.0);
        Some(dynamic.unwrap_or(max))
    }

    /// Snap a number onto the control's step; switches pass through.
    pub fn snap(&self, value: ControlValue) -> ControlValue {
        match (self.kind, value) {
            (ControlKind::Number { step, .. }, ControlValue::Number(n)) => {
                ControlValue::Number(snap_to_step(n, step))
            }
            _ => value,
        }
    }

    /// Parse user input into a value of this control's kind.
    pub fn parse(&self, input: &str) -> Result<ControlValue, CoreError> {
        match self.kind {
            ControlKind::Number { .. } => input
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(ControlValue::Number),
            ControlKind::Switch => {
                to_bool(&Value::String(input.to_owned())).map(ControlValue::Switch)
            }
        }
        .ok_or_else(|| CoreError::ValidationFailed {
            message: format!("'{input}' is not a valid value for {}", self.name),
        })
    }

    /// Validate `value` and build the command that writes it.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::as_conversions
    )]
    pub fn command(
        &self,
        device_id: &str,
        value: ControlValue,
        record: Option<&DeviceRecord>,
    ) -> Result<Command, CoreError> {
        let device_id = device_id.to_owned();
        match (self.kind, value) {
            (ControlKind::Number { min, step, unit, .. }, ControlValue::Number(n)) => {
                let max = self.max(record).unwrap_or(n);
                if n < min - f64::EPSILON || n > max + f64::EPSILON {
                    return Err(CoreError::ValidationFailed {
                        message: format!("{} must be between {min} and {max} {unit}", self.name),
                    });
                }
                let rounded = snap_to_step(n, step);
                // Range checked above, so the casts cannot truncate.
                let amps = rounded.round() as u8;
                Ok(match self.writer {
                    Writer::Intensity => Command::SetIntensity { device_id, amps },
                    Writer::MinIntensity => Command::SetMinIntensity { device_id, amps },
                    Writer::MaxIntensity => Command::SetMaxIntensity { device_id, amps },
                    Writer::MaxPower => Command::SetMaxPower {
                        device_id,
                        watts: (rounded * 1000.0).round() as u32,
                    },
                    _ => return Err(self.kind_mismatch(value)),
                })
            }
            (ControlKind::Switch, ControlValue::Switch(enabled)) => Ok(match self.writer {
                Writer::Dynamic => Command::SetDynamic { device_id, enabled },
                Writer::Locked => Command::SetLocked {
                    device_id,
                    locked: enabled,
                },
                Writer::LogoLed => Command::SetLogoLed { device_id, enabled },
                Writer::RfidReader => Command::SetRfidReader { device_id, enabled },
                _ => return Err(self.kind_mismatch(value)),
            }),
            _ => Err(self.kind_mismatch(value)),
        }
    }

    fn kind_mismatch(&self, value: ControlValue) -> CoreError {
        CoreError::ValidationFailed {
            message: format!("{} does not accept {value}", self.name),
        }
    }
}

fn snap_to_step(n: f64, step: f64) -> f64 {
    let per_unit = step.recip();
    (n * per_unit).round() / per_unit
}

// ── Handle ──────────────────────────────────────────────────────────

/// One control of one device, with write-latency masking.
pub struct ControlHandle {
    controller: Controller,
    device_id: String,
    spec: &'static ControlSpec,
    state: OptimisticValue<ControlValue>,
}

impl ControlHandle {
    pub(crate) fn new(controller: Controller, device_id: String, spec: &'static ControlSpec) -> Self {
        let state = OptimisticValue::new(
            controller.config().hold_window,
            spec.tolerance(),
            controller.clock(),
        );
        Self {
            controller,
            device_id,
            spec,
            state,
        }
    }

    pub fn spec(&self) -> &'static ControlSpec {
        self.spec
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Value to display, reconciled against the store.
    pub fn value(&mut self) -> Option<ControlValue> {
        let authoritative = self
            .controller
            .store()
            .get(&self.device_id)
            .and_then(|r| self.spec.read(&r));
        self.state.read(authoritative)
    }

    /// Write `value` through the command processor. Shows the new value at
    /// once; rolls back if the command fails.
    pub async fn set(&mut self, value: ControlValue) -> Result<ControlValue, CoreError> {
        // Seed the reconciler so a rollback has something to restore.
        self.value();
        let record = self.controller.store().get(&self.device_id);
        let command = self.spec.command(&self.device_id, value, record.as_deref())?;
        // Hold what is actually written, not the raw input.
        let value = self.spec.snap(value);
        let controller = self.controller.clone();
        self.state
            .write(value, async move { controller.execute(command).await })
            .await?;
        Ok(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::{Pairing, Reported};

    fn record(fields: Value) -> DeviceRecord {
        let mut r = DeviceRecord::new(Pairing::new("dev-1"));
        if let Value::Object(map) = fields {
            r.reported = Reported::new(map);
        }
        r
    }

    #[test]
    fn every_control_is_reachable_by_name() {
        for spec in CONTROLS {
            assert_eq!(lookup(spec.name).map(|s| s.name), Some(spec.name));
        }
        assert_eq!(lookup("Max-Power").map(|s| s.name), Some("max_power"));
        assert!(lookup("volume").is_none());
    }

    #[test]
    fn reads_through_aliases_and_coerces() {
        let r = record(json!({ "CurrentIntensity": "16", "LogoLED": "on", "maxpower": 7400 }));
        assert_eq!(
            lookup("intensity").unwrap().read(&r),
            Some(ControlValue::Number(16.0))
        );
        assert_eq!(
            lookup("logo_led").unwrap().read(&r),
            Some(ControlValue::Switch(true))
        );
        assert_eq!(
            lookup("max_power").unwrap().read(&r),
            Some(ControlValue::Number(7.4))
        );
    }

    #[test]
    fn max_power_is_written_in_watts_and_bounded_by_installation() {
        let spec = lookup("max_power").unwrap();
        let r = record(json!({ "maxpowerinstallation": 11000 }));
        let cmd = spec
            .command("dev-1", ControlValue::Number(7.43), Some(&r))
            .unwrap();
        assert_eq!(
            cmd,
            Command::SetMaxPower {
                device_id: "dev-1".into(),
                watts: 7400
            }
        );
        assert!(
            spec.command("dev-1", ControlValue::Number(15.0), Some(&r))
                .is_err()
        );
        assert!(
            spec.command("dev-1", ControlValue::Number(15.0), None)
                .is_ok()
        );
    }

    #[test]
    fn out_of_range_and_wrong_kind_rejected() {
        let spec = lookup("intensity").unwrap();
        assert!(spec.command("dev-1", ControlValue::Number(5.0), None).is_err());
        assert!(spec.command("dev-1", ControlValue::Switch(true), None).is_err());
        assert_eq!(
            spec.command("dev-1", ControlValue::Number(20.4), None).unwrap(),
            Command::SetIntensity {
                device_id: "dev-1".into(),
                amps: 20
            }
        );
    }

    #[test]
    fn parse_and_tolerance() {
        let locked = lookup("locked").unwrap();
        assert_eq!(locked.parse("yes").unwrap(), ControlValue::Switch(true));
        assert!(locked.parse("perhaps").is_err());
        assert_eq!(locked.tolerance(), 0.0);

        let power = lookup("max_power").unwrap();
        assert_eq!(power.parse("7.4").unwrap(), ControlValue::Number(7.4));
        assert!((power.tolerance() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn snap_matches_the_written_value() {
        let power = lookup("max_power").unwrap();
        assert_eq!(power.snap(ControlValue::Number(7.43)), ControlValue::Number(7.4));
        assert_eq!(power.snap(ControlValue::Number(7.46)), ControlValue::Number(7.5));

        let intensity = lookup("intensity").unwrap();
        assert_eq!(intensity.snap(ControlValue::Number(20.4)), ControlValue::Number(20.0));
        assert_eq!(intensity.snap(ControlValue::Number(20.5)), ControlValue::Number(21.0));

        let locked = lookup("locked").unwrap();
        assert_eq!(locked.snap(ControlValue::Switch(true)), ControlValue::Switch(true));
    }
}
