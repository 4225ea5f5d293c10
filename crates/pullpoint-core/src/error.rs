// ── Core error types ──
//
// Errors surfaced by the event engine. Protocol and transport failures
// arrive as `pullpoint_api::Error` and are classified into a
// `FailureKind` before they reach callers.

use std::time::Duration;

use thiserror::Error;

use crate::failure::FailureKind;
use crate::model::DeviceId;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Session errors ───────────────────────────────────────────────
    #[error("Device {device_id}: connect failed ({kind}): {message}")]
    Connect {
        device_id: DeviceId,
        kind: FailureKind,
        message: String,
    },

    #[error("Device {device_id}: subscription failed ({kind}): {message}")]
    Subscribe {
        device_id: DeviceId,
        kind: FailureKind,
        message: String,
    },

    #[error(
        "Device {device_id}: too many consecutive failures, retry in {}",
        humantime::format_duration(*retry_in)
    )]
    CoolingDown {
        device_id: DeviceId,
        retry_in: Duration,
    },

    #[error("Device {device_id}: not connected")]
    NotConnected { device_id: DeviceId },

    #[error("Device {device_id}: session closed")]
    SessionClosed { device_id: DeviceId },

    // ── Registry errors ──────────────────────────────────────────────
    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: DeviceId },

    #[error("Device {device_id} is disabled or has events turned off")]
    DeviceDisabled { device_id: DeviceId },

    #[error("Device {device_id}: invalid connection info: {reason}")]
    InvalidDevice { device_id: DeviceId, reason: String },

    #[error("Device registry unavailable: {message}")]
    Registry { message: String },

    // ── Delivery errors ──────────────────────────────────────────────
    #[error("Trigger delivery failed: {message}")]
    Trigger { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api { message: String },
}

impl CoreError {
    /// Failure kind for session errors, when one applies.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Connect { kind, .. } | Self::Subscribe { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// `true` for the cooldown refusal (no network call was made).
    pub fn is_cooling_down(&self) -> bool {
        matches!(self, Self::CoolingDown { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<pullpoint_api::Error> for CoreError {
    fn from(err: pullpoint_api::Error) -> Self {
        match err {
            pullpoint_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            pullpoint_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
            pullpoint_api::Error::Recorder { status, message } => CoreError::Trigger {
                message: format!("recorder answered HTTP {status}: {message}"),
            },
            pullpoint_api::Error::Transport(e) => CoreError::Trigger {
                message: e.to_string(),
            },
            other => CoreError::Api {
                message: other.to_string(),
            },
        }
    }
}
