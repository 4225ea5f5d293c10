//! Black-box ONVIF protocol client boundary.
//!
//! The SOAP/XML wire protocol is provided by whichever client library the
//! embedding application links. This module only describes the capability
//! the event engine needs from it:
//!
//! - a [`Connector`] that opens a [`Connection`] to one camera,
//! - pull-point subscription management on that connection,
//! - an event message channel (the library's message callback, bridged to
//!   a [`tokio::sync::mpsc`] receiver),
//! - a [`tokio::sync::broadcast`] of out-of-band [`ConnectionSignal`]s.
//!
//! # Example
//!
//! ```rust,ignore
//! let conn = connector.connect(&options).await?;
//! let mut messages = conn.register_event_handler();
//! let subscription = conn.create_pull_point_subscription().await?;
//!
//! while let Some(msg) = messages.recv().await {
//!     println!("{}", msg.message);
//! }
//! ```

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::error::Error;

/// Default timeout for a single protocol call.
pub const DEFAULT_PROTOCOL_TIMEOUT: Duration = Duration::from_secs(10);

// ── ConnectOptions ───────────────────────────────────────────────────

/// Everything a protocol client needs to reach one camera.
#[derive(Clone)]
pub struct ConnectOptions {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub timeout: Duration,
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ── Subscription ─────────────────────────────────────────────────────

/// A pull-point subscription granted by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription manager address (the WS-Addressing reference).
    pub reference: String,

    /// Lease granted by the device. Some firmware omits it.
    #[serde(default)]
    pub lease: Option<Duration>,
}

// ── EventMessage ─────────────────────────────────────────────────────

/// One inbound notification message.
///
/// `message` is the library's parsed representation. Some libraries hand
/// it over as a JSON string rather than a structured value; consumers must
/// accept both. `source` is the raw XML the message was parsed from, kept
/// for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub message: serde_json::Value,
    #[serde(default)]
    pub source: String,
}

impl EventMessage {
    pub fn new(message: serde_json::Value) -> Self {
        Self {
            message,
            source: String::new(),
        }
    }
}

// ── ConnectionSignal ─────────────────────────────────────────────────

/// Out-of-band signals emitted by a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionSignal {
    /// The library reported an error; the connection may still be usable.
    Error(String),
    /// The connection is gone and must be re-established.
    Closed,
}

// ── Traits ───────────────────────────────────────────────────────────

/// Opens protocol connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn Connection>, Error>;
}

/// A live protocol connection to one camera.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Create a pull-point subscription. The library keeps pulling messages
    /// for as long as at least one event handler is registered.
    async fn create_pull_point_subscription(&self) -> Result<Subscription, Error>;

    /// Register for event messages, delivered in receipt order.
    fn register_event_handler(&self) -> mpsc::Receiver<EventMessage>;

    /// Drop every registered event handler (their receivers see end-of-stream).
    fn remove_event_handlers(&self);

    /// Release the current subscription on the device.
    async fn unsubscribe(&self) -> Result<(), Error>;

    /// Subscribe to error/close signals.
    fn signals(&self) -> broadcast::Receiver<ConnectionSignal>;

    /// Close the connection and release its resources.
    async fn close(&self);
}
