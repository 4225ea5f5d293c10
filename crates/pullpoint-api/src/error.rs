use thiserror::Error;

/// Top-level error type for the `pullpoint-api` crate.
///
/// Covers both surfaces this crate exposes: the black-box ONVIF protocol
/// client and the HTTP recorder endpoint. Protocol libraries rarely expose
/// structured error codes, so protocol failures carry the library's text
/// verbatim; `pullpoint-core` classifies them from that text.
#[derive(Debug, Error)]
pub enum Error {
    // ── Protocol ────────────────────────────────────────────────────
    /// Failure reported by the protocol client (connect, subscribe, pull).
    #[error("{message}")]
    Protocol { message: String },

    /// A protocol call did not complete within the configured timeout.
    #[error("Connection timeout after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The connection was closed by the device or the client library.
    #[error("Connection closed")]
    Closed,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Recorder ────────────────────────────────────────────────────
    /// The recorder endpoint answered with a non-success status.
    #[error("Recorder rejected trigger (HTTP {status}): {message}")]
    Recorder { status: u16, message: String },
}

impl Error {
    /// Shorthand for a textual protocol failure.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::Closed => true,
            Self::Recorder { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
