//! Boundary crate for `pullpoint`.
//!
//! Two external surfaces live here: the ONVIF protocol client capability,
//! described as the [`Connector`] / [`Connection`] traits (the wire protocol
//! itself is supplied by the embedding application), and the HTTP
//! [`RecorderClient`] that forwards start/stop triggers to a recording
//! system.

pub mod error;
pub mod protocol;
pub mod recorder;
pub mod transport;

pub use error::Error;
pub use protocol::{
    ConnectOptions, Connection, ConnectionSignal, Connector, DEFAULT_PROTOCOL_TIMEOUT,
    EventMessage, Subscription,
};
pub use recorder::{RecorderClient, TriggerPayload};
pub use transport::{TlsMode, TransportConfig};
