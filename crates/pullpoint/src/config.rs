//! CLI-side config resolution: `--config` override or the platform path.

use std::path::PathBuf;

use pullpoint_config::Config;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// The config file this invocation reads and writes.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(pullpoint_config::config_path)
}

/// Load the config file merged with defaults and `PULLPOINT_` env vars.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = config_path(global);
    tracing::debug!(path = %path.display(), "loading config");
    Ok(pullpoint_config::load_config_from(&path)?)
}
