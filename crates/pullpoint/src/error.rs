//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use pullpoint_config::ConfigError;
use pullpoint_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const DELIVERY: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Devices ──────────────────────────────────────────────────────

    #[error("Device '{identifier}' not found")]
    #[diagnostic(
        code(pullpoint::not_found),
        help("Run: pullpoint devices list --all to see configured devices")
    )]
    DeviceNotFound { identifier: String },

    #[error("Device '{identifier}' has an invalid registry record: {reason}")]
    #[diagnostic(
        code(pullpoint::invalid_device),
        help("Check the [[devices]] entry in your config file.")
    )]
    InvalidDevice { identifier: String, reason: String },

    // ── Delivery ─────────────────────────────────────────────────────

    #[error("Trigger delivery failed: {message}")]
    #[diagnostic(
        code(pullpoint::trigger_failed),
        help(
            "Check that trigger.file is writable, or that trigger.endpoint is\n\
             reachable and the recorder token is valid."
        )
    )]
    TriggerFailed { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(pullpoint::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(pullpoint::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(
        code(pullpoint::config),
        help("Run: pullpoint config path to locate the file being read.")
    )]
    Config(ConfigError),

    // ── Engine ───────────────────────────────────────────────────────

    #[error("{message}")]
    #[diagnostic(code(pullpoint::engine))]
    Engine { message: String },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {message}")]
    #[diagnostic(code(pullpoint::render))]
    Render { message: String },
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DeviceNotFound { .. } => exit_code::NOT_FOUND,
            Self::ConfigExists { .. } => exit_code::CONFLICT,
            Self::TriggerFailed { .. } => exit_code::DELIVERY,
            Self::Validation { .. } | Self::InvalidDevice { .. } | Self::Config(_) => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Io(io) => CliError::Io(io),
            other => CliError::Config(other),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::DeviceNotFound { device_id } => CliError::DeviceNotFound {
                identifier: device_id.to_string(),
            },

            CoreError::InvalidDevice { device_id, reason } => CliError::InvalidDevice {
                identifier: device_id.to_string(),
                reason,
            },

            CoreError::Trigger { message } => CliError::TriggerFailed { message },

            CoreError::Config { message } => CliError::Validation {
                field: "trigger".into(),
                reason: message,
            },

            other => CliError::Engine {
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Render {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Render {
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for CliError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Render {
            message: err.to_string(),
        }
    }
}
