//! Command handlers: bridge CLI args -> config + core -> output formatting.

pub mod config_cmd;
pub mod devices;
pub mod topics;
pub mod trigger;
