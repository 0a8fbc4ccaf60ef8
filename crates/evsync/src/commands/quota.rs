//! `quota`: one roster fetch, then the budget headers it returned.

use chrono::Utc;

use evsync_core::{CloudSource, QuotaSnapshot, SyncConfig};

use crate::error::CliError;
use crate::output;

use super::{RenderOpts, util};

fn detail(q: &QuotaSnapshot) -> String {
    let reset = q.reset_at.map_or_else(
        || "-".into(),
        |at| {
            let wait = (at - Utc::now()).to_std().unwrap_or_default();
            format!(
                "{} (in {})",
                at.format("%Y-%m-%d %H:%M:%S UTC"),
                humantime::format_duration(std::time::Duration::from_secs(wait.as_secs()))
            )
        },
    );
    [
        format!("Limit:     {}", util::or_dash(q.limit)),
        format!("Remaining: {}", util::or_dash(q.remaining)),
        format!("Resets:    {reset}"),
    ]
    .join("\n")
}

pub async fn handle(sync: &SyncConfig, opts: RenderOpts) -> Result<(), CliError> {
    let client = util::cloud_client(sync)?;
    client.pairings().await?;

    let Some(quota) = client.quota().snapshot() else {
        if !opts.quiet {
            eprintln!("The API returned no quota headers.");
        }
        return Ok(());
    };

    let out = output::render_single(opts.format, &quota, detail, |q| {
        util::or_dash(q.remaining)
    })?;
    output::print_output(&out, opts.quiet);
    Ok(())
}
