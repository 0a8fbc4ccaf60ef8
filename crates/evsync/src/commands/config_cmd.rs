//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

use super::RenderOpts;

/// Redacted config as TOML.
fn format_config_redacted(cfg: &Config) -> Result<String, CliError> {
    toml::to_string_pretty(&cfg.redacted()).map_err(|e| CliError::Render(e.to_string()))
}

pub fn handle(args: &ConfigArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let opts = RenderOpts::new(global, cfg);
    match args.command {
        ConfigCommand::Path => {
            let path = config::active_config_path(global);
            output::print_output(&path.display().to_string(), opts.quiet);
            if !path.exists() && !opts.quiet {
                eprintln!("(file does not exist, built-in defaults apply)");
            }
            Ok(())
        }

        ConfigCommand::Show => {
            let out = match opts.format {
                OutputFormat::Table | OutputFormat::Plain => format_config_redacted(cfg)?,
                format => output::render_single(
                    format,
                    &cfg.redacted(),
                    |_| String::new(),
                    |_| String::new(),
                )?,
            };
            output::print_output(&out, opts.quiet);
            Ok(())
        }
    }
}
