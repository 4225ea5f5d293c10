//! Config subcommand handlers.

use std::io::{BufRead, IsTerminal};

use pullpoint_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

/// Blank out secrets before a config is printed.
fn redact(cfg: &mut Config) {
    if cfg.trigger.token.is_some() {
        cfg.trigger.token = Some(REDACTED.into());
    }
    for device in &mut cfg.devices {
        if !device.password.is_empty() {
            device.password = REDACTED.into();
        }
    }
}

/// Read the recorder token: a hidden prompt on a terminal, otherwise
/// the first line of stdin.
fn read_token() -> Result<String, CliError> {
    let stdin = std::io::stdin();
    let raw = if stdin.is_terminal() {
        rpassword::prompt_password("Recorder token: ")?
    } else {
        let mut line = String::new();
        stdin.lock().read_line(&mut line)?;
        line
    };
    normalize_token(&raw)
}

fn normalize_token(raw: &str) -> Result<String, CliError> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "token cannot be empty".into(),
        });
    }
    Ok(token.to_owned())
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::config_path(global);

    match args.command {
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            pullpoint_config::save_config_to(&Config::default(), &path)?;
            tracing::info!(path = %path.display(), "wrote default config");
            if !global.quiet {
                eprintln!("Wrote default configuration to {}", path.display());
                eprintln!("Add cameras as [[devices]] entries, then run: pullpoint devices list");
            }
            Ok(())
        }

        ConfigCommand::Show => {
            let mut cfg = config::load(global)?;
            redact(&mut cfg);
            let out = output::render_single(
                global.output,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_else(|e| format!("# unrenderable: {e}")),
                |_| path.display().to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::SetToken => {
            let token = read_token()?;
            pullpoint_config::store_recorder_token(&token)?;
            tracing::info!("stored recorder token in system keyring");
            if !global.quiet {
                eprintln!("Recorder token stored in the system keyring");
            }
            Ok(())
        }
    }
}
