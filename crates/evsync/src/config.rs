//! CLI configuration: thin wrapper around `evsync_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--config, --api-key, --base-url, --timeout, --no-local).

use std::path::PathBuf;

use clap::ValueEnum;
use secrecy::SecretString;

use evsync_core::SyncConfig;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

pub use evsync_config::{Config, config_path, default_pairings_path, save_pairings};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Config file in effect: `--config` / `EVSYNC_CONFIG`, else the platform path.
pub fn active_config_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config_path)
}

/// Load the config file and apply flag overrides.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = evsync_config::load_config_from(&active_config_path(global))?;
    if let Some(ref url) = global.base_url {
        cfg.base_url.clone_from(url);
    }
    if let Some(timeout) = global.timeout {
        cfg.timeout = timeout;
    }
    if global.no_local {
        cfg.local.enabled = false;
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Output format: flag > config `[defaults]` > table.
pub fn output_format(global: &GlobalOpts, cfg: &Config) -> OutputFormat {
    global
        .output
        .or_else(|| OutputFormat::from_str(&cfg.defaults.output, true).ok())
        .unwrap_or(OutputFormat::Table)
}

/// Translate the config + global flags into a `SyncConfig`.
pub fn sync_config(global: &GlobalOpts, cfg: &Config) -> Result<SyncConfig, CliError> {
    let api_key = resolve_api_key_with_flag(global, cfg)?;
    Ok(evsync_config::to_sync_config(cfg, api_key)?)
}

/// Resolve API key with CLI flag override, then fall through to shared resolution.
fn resolve_api_key_with_flag(global: &GlobalOpts, cfg: &Config) -> Result<SecretString, CliError> {
    if let Some(ref key) = global.api_key {
        return Ok(SecretString::from(key.clone()));
    }
    Ok(evsync_config::resolve_api_key(cfg)?)
}
