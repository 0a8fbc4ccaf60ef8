//! `action` and `write`: one-off commands through the command processor.

use serde::Serialize;
use serde_json::Value;

use evsync_core::{Command, CommandResult, Controller, SyncConfig, WriteValue};

use crate::cli::{ActionArgs, ChargerAction, WriteArgs};
use crate::error::CliError;
use crate::output;

use super::{RenderOpts, util};

#[derive(Debug, Serialize)]
struct ActionOutcome {
    device_id: String,
    command: &'static str,
    response: Option<Value>,
}

impl ActionOutcome {
    fn new(device_id: String, command: &Command, result: CommandResult) -> Self {
        Self {
            device_id,
            command: command.name(),
            response: match result {
                CommandResult::Ok => None,
                CommandResult::Response(body) => Some(body),
            },
        }
    }
}

fn detail(o: &ActionOutcome) -> String {
    format!("{} accepted for {}", o.command, o.device_id)
}

fn print(outcome: &ActionOutcome, opts: RenderOpts) -> Result<(), CliError> {
    let out = output::render_single(opts.format, outcome, detail, |o| o.command.to_owned())?;
    output::print_output(&out, opts.quiet);
    Ok(())
}

/// Send `build(device_id)` once the identifier is resolved.
async fn run(
    controller: &Controller,
    identifier: &str,
    build: impl FnOnce(String) -> Command,
) -> Result<ActionOutcome, CliError> {
    let device_id = util::resolve_device_id(controller.store(), identifier)?;
    let command = build(device_id.clone());
    let result = controller.execute(command.clone()).await?;
    Ok(ActionOutcome::new(device_id, &command, result))
}

// ── action ──────────────────────────────────────────────────────────

fn action_command(action: ChargerAction, device_id: String) -> Command {
    match action {
        ChargerAction::Start => Command::StartCharge { device_id },
        ChargerAction::Pause => Command::PauseCharge { device_id },
        ChargerAction::Reboot => Command::Reboot { device_id },
        ChargerAction::Update => Command::TriggerUpdate { device_id },
    }
}

pub async fn handle_action(
    sync: SyncConfig,
    args: &ActionArgs,
    opts: RenderOpts,
) -> Result<(), CliError> {
    let (device, action) = (args.device.clone(), args.action);
    let outcome = Controller::oneshot(sync, move |controller| async move {
        Ok(run(&controller, &device, |id| action_command(action, id)).await)
    })
    .await??;
    print(&outcome, opts)
}

// ── write ───────────────────────────────────────────────────────────

/// Booleans, then integers, then floats; anything else is sent as text.
fn parse_write_value(raw: &str) -> WriteValue {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "on" => return WriteValue::Bool(true),
        "false" | "off" => return WriteValue::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.trim().parse::<i64>() {
        return WriteValue::Int(i);
    }
    if let Ok(x) = raw.trim().parse::<f64>() {
        return WriteValue::Float(x);
    }
    WriteValue::Text(raw.to_owned())
}

pub async fn handle_write(sync: SyncConfig, args: WriteArgs, opts: RenderOpts) -> Result<(), CliError> {
    if !sync.local.enabled {
        return Err(CliError::Validation {
            field: "--no-local".into(),
            reason: "local writes need the local endpoint enabled".into(),
        });
    }
    let value = parse_write_value(&args.value);
    let outcome = Controller::oneshot(sync, move |controller| async move {
        Ok(run(&controller, &args.device, |device_id| Command::WriteLocal {
            device_id,
            keyword: args.keyword.clone(),
            value,
        })
        .await)
    })
    .await??;
    print(&outcome, opts)
}
