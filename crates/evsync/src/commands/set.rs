//! `set`: write one control through the optimistic reconciler.

use serde::Serialize;
use tracing::debug;

use evsync_core::{ControlValue, Controller, SyncConfig};

use crate::cli::SetArgs;
use crate::error::CliError;
use crate::output;

use super::{RenderOpts, util};

#[derive(Debug, Serialize)]
struct SetOutcome {
    device_id: String,
    control: &'static str,
    requested: ControlValue,
    /// Value shown after the write: the held prediction until the device
    /// reports it, or what the device reports instead.
    value: Option<ControlValue>,
    /// Whether a fresh read landed after the write.
    refreshed: bool,
}

fn detail(o: &SetOutcome) -> String {
    let shown = util::or_dash(o.value);
    let mut line = if o.value == Some(o.requested) {
        format!("{} {} = {shown}", o.device_id, o.control)
    } else {
        format!(
            "{} {} = {shown} (requested {})",
            o.device_id, o.control, o.requested
        )
    };
    if !o.refreshed {
        line.push_str(" [not yet confirmed]");
    }
    line
}

/// Read the device back after a write. The local endpoint answers at once;
/// the cloud only when the refresh throttle allows it.
async fn refresh_after_write(controller: &Controller, device_id: &str) -> bool {
    let result = if controller.config().local.enabled {
        controller.refresh_local(device_id).await.map(|_| true)
    } else {
        controller.refresh_now().await.map(|report| report.is_some())
    };
    match result {
        Ok(true) => true,
        Ok(false) => {
            debug!(device_id = %device_id, "cloud refresh throttled, keeping held value");
            false
        }
        Err(e) => {
            debug!(device_id = %device_id, error = %e, "post-write refresh failed");
            false
        }
    }
}

async fn apply(controller: &Controller, args: &SetArgs) -> Result<SetOutcome, CliError> {
    let device_id = util::resolve_device_id(controller.store(), &args.device)?;
    let mut handle = controller.control(&device_id, &args.control)?;
    let requested = handle.spec().parse(&args.value)?;
    handle.set(requested).await?;

    let refreshed = refresh_after_write(controller, &device_id).await;

    Ok(SetOutcome {
        control: handle.spec().name,
        value: handle.value(),
        device_id,
        requested,
        refreshed,
    })
}

pub async fn handle(sync: SyncConfig, args: SetArgs, opts: RenderOpts) -> Result<(), CliError> {
    let outcome = Controller::oneshot(sync, move |controller| async move {
        Ok(apply(&controller, &args).await)
    })
    .await??;

    let out = output::render_single(opts.format, &outcome, detail, |o| util::or_dash(o.value))?;
    output::print_output(&out, opts.quiet);
    Ok(())
}
