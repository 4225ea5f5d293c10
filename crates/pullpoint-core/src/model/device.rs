// ── Device identity and connection snapshot ──

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use pullpoint_api::ConnectOptions;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Camera identifier as assigned by the device registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

impl DeviceId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DeviceId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl FromStr for DeviceId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Immutable connection snapshot taken from the registry when a session
/// starts. Never refreshed mid-session.
#[derive(Debug, Clone)]
pub struct DeviceConnectionInfo {
    pub id: DeviceId,
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub events_enabled: bool,
    pub disabled: bool,
}

impl DeviceConnectionInfo {
    /// Enabled for event watching: events turned on and not disabled.
    pub fn is_watchable(&self) -> bool {
        self.events_enabled && !self.disabled
    }

    /// Protocol connect options for this device.
    pub fn connect_options(&self, timeout: Duration) -> ConnectOptions {
        ConnectOptions {
            hostname: self.address.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            timeout,
        }
    }
}
