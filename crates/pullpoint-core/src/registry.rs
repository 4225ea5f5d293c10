// ── Device registry ──
//
// The registry is the source of truth for which cameras exist and how to
// reach them. Production deployments back it with the NVR database; the
// `StaticRegistry` here serves records loaded from configuration.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CoreError;
use crate::model::{DeviceConnectionInfo, DeviceId};

/// Port used when a record carries none.
pub const DEFAULT_ONVIF_PORT: u16 = 80;

/// Read access to the device registry.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Devices with events enabled that are not disabled.
    async fn find_all_enabled(&self) -> Result<Vec<DeviceConnectionInfo>, CoreError>;

    /// A single device, whatever its enabled state.
    async fn find_by_id(&self, id: DeviceId) -> Result<Option<DeviceConnectionInfo>, CoreError>;
}

// ── RegistryRecord ───────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

/// A raw registry row. Credentials may be stored hex-encoded with a `0x`
/// prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub id: u32,
    #[serde(alias = "ip_address")]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_true")]
    pub events_enabled: bool,
    #[serde(default)]
    pub disabled: bool,
}

impl RegistryRecord {
    /// Validate and decode into a connection snapshot.
    pub fn into_connection_info(self) -> Result<DeviceConnectionInfo, CoreError> {
        let id = DeviceId(self.id);
        let invalid = |reason: String| CoreError::InvalidDevice {
            device_id: id,
            reason,
        };

        let address = self.address.trim().to_owned();
        if address.is_empty() {
            return Err(invalid("missing address".into()));
        }

        let port = match self.port {
            None | Some(0) => DEFAULT_ONVIF_PORT,
            Some(p) => u16::try_from(p).map_err(|_| invalid(format!("port {p} out of range")))?,
        };

        let username = decode_credential(&self.username).map_err(invalid)?;
        let password = decode_credential(&self.password).map_err(invalid)?;

        Ok(DeviceConnectionInfo {
            id,
            address,
            port,
            username,
            password: SecretString::from(password),
            events_enabled: self.events_enabled,
            disabled: self.disabled,
        })
    }

    /// Username with any hex encoding removed, for display.
    pub fn display_username(&self) -> String {
        decode_credential(&self.username).unwrap_or_else(|_| self.username.clone())
    }
}

/// Decode a `0x`-prefixed hex credential. Anything else is returned as is.
pub fn decode_credential(raw: &str) -> Result<String, String> {
    let Some(hex) = raw.strip_prefix("0x") else {
        return Ok(raw.to_owned());
    };

    if hex.len() % 2 != 0 {
        return Err("hex credential has an odd number of digits".into());
    }

    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("invalid hex digits at offset {i}"))
        })
        .collect::<Result<Vec<u8>, String>>()?;

    String::from_utf8(bytes).map_err(|_| "hex credential is not valid UTF-8".to_owned())
}

// ── StaticRegistry ───────────────────────────────────────────────────

/// Registry over a fixed set of records.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    records: Vec<RegistryRecord>,
}

impl StaticRegistry {
    pub fn new(records: Vec<RegistryRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[RegistryRecord] {
        &self.records
    }
}

#[async_trait]
impl DeviceRegistry for StaticRegistry {
    async fn find_all_enabled(&self) -> Result<Vec<DeviceConnectionInfo>, CoreError> {
        let devices = self
            .records
            .iter()
            .filter(|r| r.events_enabled && !r.disabled)
            .filter_map(|r| match r.clone().into_connection_info() {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!(device_id = r.id, error = %e, "skipping invalid registry record");
                    None
                }
            })
            .collect();
        Ok(devices)
    }

    async fn find_by_id(&self, id: DeviceId) -> Result<Option<DeviceConnectionInfo>, CoreError> {
        self.records
            .iter()
            .find(|r| r.id == id.get())
            .map(|r| r.clone().into_connection_info())
            .transpose()
    }
}
