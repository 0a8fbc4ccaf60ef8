//! Clap derive structures for the `evsync` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// evsync -- keep an EV charger fleet in sync from the command line
#[derive(Debug, Parser)]
#[command(
    name = "evsync",
    version,
    about = "Monitor and control EV chargers from the command line",
    long_about = "Syncs charger state from the rate-limited cloud API and each\n\
        charger's local endpoint, and writes settings with optimistic feedback.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Cloud API key (overrides config and environment)
    #[arg(long, global = true, hide_env = true)]
    pub api_key: Option<String>,

    /// Cloud API base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Config file path
    #[arg(long, env = "EVSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format [default: from config, else table]
    #[arg(long, short = 'o', env = "EVSYNC_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip the chargers' local endpoints
    #[arg(long, global = true)]
    pub no_local: bool,

    /// Cloud request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one sync cycle and show device state
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Keep syncing and re-render on every change until Ctrl-C
    Watch,

    /// List the chargers paired with the account
    Pairings(PairingsArgs),

    /// Change a charger setting
    Set(SetArgs),

    /// Trigger a charger action
    Action(ActionArgs),

    /// Write a raw keyword to a charger's local endpoint
    Write(WriteArgs),

    /// Show the cloud request quota
    Quota,

    /// Inspect CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DEVICES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Show one charger in detail (device ID or tag)
    pub device: Option<String>,
}

#[derive(Debug, Args)]
pub struct PairingsArgs {
    /// Persist the fetched roster as the pairing seed file
    #[arg(long)]
    pub save: bool,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Device ID or tag
    pub device: String,

    /// Control name (intensity, min_intensity, max_intensity, max_power,
    /// dynamic, locked, logo_led, rfid_reader)
    pub control: String,

    /// New value: a number, or on/off for switches
    pub value: String,
}

#[derive(Debug, Args)]
pub struct ActionArgs {
    /// Device ID or tag
    pub device: String,

    #[arg(value_enum)]
    pub action: ChargerAction,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ChargerAction {
    /// Start or resume charging
    Start,
    /// Pause charging
    Pause,
    /// Reboot the charger
    Reboot,
    /// Install pending firmware
    Update,
}

#[derive(Debug, Args)]
pub struct WriteArgs {
    /// Device ID or tag
    pub device: String,

    /// Keyword as the charger names it (e.g. Locked, Paused)
    pub keyword: String,

    /// Value; true/false are sent as 1/0
    pub value: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Print the resolved configuration (API key redacted)
    Show,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
