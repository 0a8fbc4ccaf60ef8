//! `watch`: run the full engine and re-render on every store change.

use chrono::Utc;
use tracing::info;

use evsync_core::{Controller, SyncConfig};

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::output;

use super::{RenderOpts, status};

fn banner(controller: &Controller, opts: RenderOpts) -> String {
    let interval = humantime::format_duration(controller.current_interval());
    let quota = controller
        .quota()
        .and_then(|q| q.remaining)
        .map_or_else(|| "?".into(), |r| r.to_string());
    output::heading(
        &format!(
            "{}  next cloud cycle in {interval}  quota remaining {quota}",
            Utc::now().format("%H:%M:%S")
        ),
        opts.color,
    )
}

fn render(controller: &Controller, opts: RenderOpts) -> Result<(), CliError> {
    let records = controller.store().snapshot();
    // Structured formats stream one document per change.
    let opts = match opts.format {
        OutputFormat::Json => RenderOpts {
            format: OutputFormat::JsonCompact,
            ..opts
        },
        _ => opts,
    };
    let body = status::render(&records, None, opts)?;
    if opts.format == OutputFormat::Table && !opts.quiet {
        output::print_output(&banner(controller, opts), false);
    }
    output::print_output(&body, opts.quiet);
    Ok(())
}

async fn watch_loop(controller: &Controller, opts: RenderOpts) -> Result<(), CliError> {
    let mut devices = controller.store().subscribe();
    let mut state = controller.connection_state();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    devices.borrow_and_update();
    render(controller, opts)?;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("interrupted, shutting down");
                return Ok(());
            }
            changed = devices.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                devices.borrow_and_update();
                render(controller, opts)?;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = *state.borrow_and_update();
                if !opts.quiet {
                    eprintln!("connection: {current}");
                }
            }
        }
    }
}

pub async fn handle(mut sync: SyncConfig, opts: RenderOpts) -> Result<(), CliError> {
    sync.background = true;
    let controller = Controller::new(sync)?;
    controller.connect().await?;

    let result = watch_loop(&controller, opts).await;
    controller.disconnect().await;
    result
}
