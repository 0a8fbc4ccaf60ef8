//! Command handlers, one module per subcommand.

pub mod actions;
pub mod config_cmd;
pub mod pairings;
pub mod quota;
pub mod set;
pub mod status;
pub mod util;
pub mod watch;

use evsync_core::SyncConfig;

use crate::cli::{Command, GlobalOpts, OutputFormat};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

/// Rendering choices shared by every handler.
#[derive(Debug, Clone, Copy)]
pub struct RenderOpts {
    pub format: OutputFormat,
    pub quiet: bool,
    pub color: bool,
}

impl RenderOpts {
    pub fn new(global: &GlobalOpts, cfg: &Config) -> Self {
        Self {
            format: config::output_format(global, cfg),
            quiet: global.quiet,
            color: output::should_color(global.color),
        }
    }
}

/// Route a command that needs cloud credentials.
pub async fn dispatch(
    cmd: Command,
    sync: SyncConfig,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let opts = RenderOpts::new(global, cfg);
    match cmd {
        Command::Status(args) => status::handle(sync, &args, opts).await,
        Command::Watch => watch::handle(sync, opts).await,
        Command::Pairings(args) => pairings::handle(&sync, &args, cfg, opts).await,
        Command::Set(args) => set::handle(sync, args, opts).await,
        Command::Action(args) => actions::handle_action(sync, &args, opts).await,
        Command::Write(args) => actions::handle_write(sync, args, opts).await,
        Command::Quota => quota::handle(&sync, opts).await,
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
