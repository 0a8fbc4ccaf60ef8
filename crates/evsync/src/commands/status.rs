//! `status`: one cloud cycle plus local reads, then a fleet view.

use std::sync::Arc;

use tabled::Tabled;
use tracing::warn;

use evsync_core::{Controller, DeviceRecord, SyncConfig, controls};

use crate::cli::StatusArgs;
use crate::error::CliError;
use crate::output;

use super::{RenderOpts, util};

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Current (A)")]
    intensity: String,
    #[tabled(rename = "Max (A)")]
    max_intensity: String,
    #[tabled(rename = "Power (kW)")]
    max_power: String,
    #[tabled(rename = "Locked")]
    locked: String,
    #[tabled(rename = "Firmware")]
    firmware: String,
    #[tabled(rename = "Address")]
    address: String,
}

/// Display value of a named control, `-` when unknown.
fn control_text(record: &DeviceRecord, name: &str) -> String {
    util::or_dash(controls::lookup(name).and_then(|spec| spec.read(record)))
}

impl DeviceRow {
    pub fn new(r: &DeviceRecord, color: bool) -> Self {
        Self {
            id: r.device_id.clone(),
            name: r.pairing.display_name().to_owned(),
            state: output::connectivity(r.connected, color),
            intensity: control_text(r, "intensity"),
            max_intensity: control_text(r, "max_intensity"),
            max_power: control_text(r, "max_power"),
            locked: control_text(r, "locked"),
            firmware: util::or_dash(r.firmware_version.as_deref()),
            address: util::or_dash(r.local_address()),
        }
    }
}

fn detail(r: &DeviceRecord, color: bool) -> String {
    let mut lines = vec![
        format!("ID:        {}", r.device_id),
        format!("Name:      {}", r.pairing.display_name()),
        format!("Model:     {}", util::or_dash(r.pairing.model.as_deref())),
        format!("State:     {}", output::connectivity(r.connected, color)),
        format!("Firmware:  {}", util::or_dash(r.firmware_version.as_deref())),
        format!("Address:   {}", util::or_dash(r.local_address())),
    ];

    lines.push(String::new());
    lines.push(output::heading("Controls", color));
    for spec in controls::CONTROLS {
        lines.push(format!(
            "  {:<14} {}",
            spec.name,
            util::or_dash(spec.read(r))
        ));
    }

    if let Some(cards) = r.rfid_cards.as_ref().filter(|c| !c.is_empty()) {
        lines.push(String::new());
        lines.push(output::heading("RFID cards", color));
        for card in cards {
            lines.push(format!(
                "  {:<14} {}",
                card.code,
                card.tag.as_deref().unwrap_or("")
            ));
        }
    }

    let fresh = &r.additional.freshness;
    lines.push(String::new());
    lines.push(output::heading("Last refreshed", color));
    lines.push(format!("  reported       {}", util::or_dash(fresh.reported_at)));
    lines.push(format!("  rfid           {}", util::or_dash(fresh.rfid_at)));
    lines.push(format!("  version        {}", util::or_dash(fresh.version_at)));
    lines.push(format!("  local          {}", util::or_dash(fresh.local_at)));
    lines.join("\n")
}

/// Render the whole fleet or one device in the chosen format.
pub fn render(
    records: &[Arc<DeviceRecord>],
    device: Option<&str>,
    opts: RenderOpts,
) -> Result<String, CliError> {
    match device {
        Some(identifier) => {
            let record = util::find_device(records, identifier)?;
            output::render_single(
                opts.format,
                record,
                |r| detail(r, opts.color),
                |r| r.device_id.clone(),
            )
        }
        None => output::render_list(
            opts.format,
            records,
            |r| DeviceRow::new(r, opts.color),
            |r| r.device_id.clone(),
        ),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(sync: SyncConfig, args: &StatusArgs, opts: RenderOpts) -> Result<(), CliError> {
    let records = Controller::oneshot(sync, |controller| async move {
        for (device_id, result) in controller.refresh_local_all().await {
            if let Err(e) = result {
                warn!(device_id = %device_id, error = %e, "local read failed");
            }
        }
        Ok(controller.store().snapshot())
    })
    .await?;

    let out = render(&records, args.device.as_deref(), opts)?;
    output::print_output(&out, opts.quiet);
    Ok(())
}
