//! `pairings`: live roster fetch, optionally saved as the seed file.

use tabled::Tabled;

use evsync_core::{CloudSource, Pairing, SyncConfig};

use crate::cli::PairingsArgs;
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

use super::{RenderOpts, util};

#[derive(Tabled)]
struct PairingRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Tag")]
    tag: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Model")]
    model: String,
}

impl From<&Pairing> for PairingRow {
    fn from(p: &Pairing) -> Self {
        Self {
            id: p.device_id.clone(),
            tag: util::or_dash(p.tag.as_deref()),
            address: util::or_dash(p.network_address.as_deref()),
            model: util::or_dash(p.model.as_deref()),
        }
    }
}

pub async fn handle(
    sync: &SyncConfig,
    args: &PairingsArgs,
    cfg: &Config,
    opts: RenderOpts,
) -> Result<(), CliError> {
    let client = util::cloud_client(sync)?;
    let pairings = client.pairings().await?;

    if args.save {
        let path = cfg
            .pairings_file
            .clone()
            .unwrap_or_else(config::default_pairings_path);
        config::save_pairings(&path, &pairings)?;
        if !opts.quiet {
            eprintln!("Saved {} pairings to {}", pairings.len(), path.display());
            if cfg.pairings_file.is_none() {
                eprintln!(
                    "Set pairings_file = \"{}\" in the config to seed future runs.",
                    path.display()
                );
            }
        }
    }

    let out = output::render_list(
        opts.format,
        &pairings,
        |p| PairingRow::from(p),
        |p| p.device_id.clone(),
    )?;
    output::print_output(&out, opts.quiet);
    Ok(())
}
