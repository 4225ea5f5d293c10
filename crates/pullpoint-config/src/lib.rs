//! Shared configuration for pullpoint.
//!
//! TOML config with `PULLPOINT_` environment overrides, recorder token
//! resolution (env + keyring + plaintext), and translation to
//! `pullpoint_core::{EngineConfig, TriggerConfig}`. Device records in
//! `[[devices]]` back the static registry.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pullpoint_api::{TlsMode, TransportConfig};
use pullpoint_core::{
    CooldownPolicy, DEFAULT_TRIGGER_FILE, EngineConfig, Label, LabelPolicy, RegistryRecord,
    StaticRegistry, TriggerConfig, TriggerMode,
};

/// Environment variable consulted first for the recorder token.
pub const RECORDER_TOKEN_ENV: &str = "PULLPOINT_RECORDER_TOKEN";

const KEYRING_SERVICE: &str = "pullpoint";
const KEYRING_TOKEN_USER: &str = "recorder/token";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// CLI presentation defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Session and watcher tuning.
    #[serde(default)]
    pub engine: EngineSection,

    /// Trigger delivery.
    #[serde(default)]
    pub trigger: TriggerSection,

    /// Static device registry.
    #[serde(default)]
    pub devices: Vec<RegistryRecord>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

/// `[engine]`: durations are whole seconds.
#[derive(Debug, Deserialize, Serialize)]
pub struct EngineSection {
    #[serde(default = "default_protocol_timeout")]
    pub protocol_timeout: u64,

    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    #[serde(default = "default_lease")]
    pub default_lease: u64,

    #[serde(default = "default_renewal_ratio")]
    pub renewal_ratio: f64,

    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: u64,

    /// 0 polls the registry once at startup only.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,

    #[serde(default = "default_cooldown")]
    pub cooldown: u64,

    /// Labels allowed through; empty allows all.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Topics supported in addition to the built-in list.
    #[serde(default)]
    pub extra_topics: Vec<String>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            protocol_timeout: default_protocol_timeout(),
            retry_delay: default_retry_delay(),
            default_lease: default_lease(),
            renewal_ratio: default_renewal_ratio(),
            health_check_interval: default_health_check_interval(),
            poll_interval: default_poll_interval(),
            max_consecutive_failures: default_max_failures(),
            cooldown: default_cooldown(),
            labels: Vec::new(),
            extra_topics: Vec::new(),
        }
    }
}

fn default_protocol_timeout() -> u64 {
    10
}
fn default_retry_delay() -> u64 {
    10
}
fn default_lease() -> u64 {
    60
}
fn default_renewal_ratio() -> f64 {
    0.8
}
fn default_health_check_interval() -> u64 {
    15
}
fn default_poll_interval() -> u64 {
    60
}
fn default_max_failures() -> u32 {
    5
}
fn default_cooldown() -> u64 {
    30 * 60
}

/// `[trigger]`
#[derive(Debug, Deserialize, Serialize)]
pub struct TriggerSection {
    /// "file", "http", or "both".
    #[serde(default = "default_mode")]
    pub mode: String,

    #[serde(default = "default_trigger_file")]
    pub file: PathBuf,

    /// Recorder endpoint URL for "http" and "both".
    pub endpoint: Option<String>,

    /// Bearer token in plaintext; prefer the keyring or an env var.
    pub token: Option<String>,

    /// Environment variable name containing the token.
    pub token_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_trigger_timeout")]
    pub timeout: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_trigger_retry_delay")]
    pub retry_delay: u64,
}

impl Default for TriggerSection {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            file: default_trigger_file(),
            endpoint: None,
            token: None,
            token_env: None,
            ca_cert: None,
            insecure: false,
            timeout: default_trigger_timeout(),
            max_retries: default_max_retries(),
            retry_delay: default_trigger_retry_delay(),
        }
    }
}

fn default_mode() -> String {
    "file".into()
}
fn default_trigger_file() -> PathBuf {
    PathBuf::from(DEFAULT_TRIGGER_FILE)
}
fn default_trigger_timeout() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    3
}
fn default_trigger_retry_delay() -> u64 {
    5
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "pullpoint", "pullpoint").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("pullpoint");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment. A missing file yields
/// the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("PULLPOINT_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the recorder bearer token, if any is configured.
///
/// Order: the section's `token_env` variable, `PULLPOINT_RECORDER_TOKEN`,
/// the system keyring, then the plaintext `token`.
pub fn resolve_recorder_token(trigger: &TriggerSection) -> Option<SecretString> {
    // 1. Env vars
    let env_names = trigger
        .token_env
        .as_deref()
        .into_iter()
        .chain(std::iter::once(RECORDER_TOKEN_ENV));
    for name in env_names {
        if let Ok(val) = std::env::var(name) {
            if !val.is_empty() {
                return Some(SecretString::from(val));
            }
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, KEYRING_TOKEN_USER) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    trigger.token.clone().map(SecretString::from)
}

/// Store the recorder token in the system keyring.
pub fn store_recorder_token(token: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, KEYRING_TOKEN_USER)
        .and_then(|entry| entry.set_password(token))
        .map_err(|e| ConfigError::Validation {
            field: "token".into(),
            reason: format!("keyring unavailable: {e}"),
        })
}

// ── Translation to core types ───────────────────────────────────────

fn parse_labels(labels: &[String]) -> Result<LabelPolicy, ConfigError> {
    if labels.is_empty() {
        return Ok(LabelPolicy::Any);
    }
    let set = labels
        .iter()
        .map(|l| {
            l.parse::<Label>().map_err(|_| ConfigError::Validation {
                field: "engine.labels".into(),
                reason: format!("unknown label '{l}' (expected Person, Vehicle, Animal, motion)"),
            })
        })
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(LabelPolicy::Only(set))
}

/// Build the core `EngineConfig` from `[engine]`.
pub fn to_engine_config(cfg: &Config) -> Result<EngineConfig, ConfigError> {
    let engine = &cfg.engine;

    let ratio = engine.renewal_ratio;
    if ratio.is_nan() || ratio <= 0.0 || ratio > 1.0 {
        return Err(ConfigError::Validation {
            field: "engine.renewal_ratio".into(),
            reason: format!("must be in (0, 1], got {ratio}"),
        });
    }
    if engine.protocol_timeout == 0 {
        return Err(ConfigError::Validation {
            field: "engine.protocol_timeout".into(),
            reason: "must be at least 1 second".into(),
        });
    }

    Ok(EngineConfig {
        protocol_timeout: Duration::from_secs(engine.protocol_timeout),
        retry_delay: Duration::from_secs(engine.retry_delay),
        default_lease: Duration::from_secs(engine.default_lease.max(1)),
        renewal_ratio: engine.renewal_ratio,
        health_check_interval: Duration::from_secs(engine.health_check_interval.max(1)),
        poll_interval: Duration::from_secs(engine.poll_interval),
        cooldown: CooldownPolicy {
            max_consecutive_failures: engine.max_consecutive_failures.max(1),
            cooldown: Duration::from_secs(engine.cooldown),
        },
        label_policy: parse_labels(&engine.labels)?,
        extra_topics: engine.extra_topics.clone(),
        ..EngineConfig::default()
    })
}

/// Build the core `TriggerConfig` from `[trigger]`, resolving the token.
pub fn to_trigger_config(cfg: &Config) -> Result<TriggerConfig, ConfigError> {
    let trigger = &cfg.trigger;

    let mode = match trigger.mode.to_ascii_lowercase().as_str() {
        "file" => TriggerMode::File,
        "http" => TriggerMode::Http,
        "both" => TriggerMode::Both,
        other => {
            return Err(ConfigError::Validation {
                field: "trigger.mode".into(),
                reason: format!("expected 'file', 'http', or 'both', got '{other}'"),
            });
        }
    };

    let endpoint = trigger
        .endpoint
        .as_deref()
        .map(|raw| {
            raw.parse::<url::Url>().map_err(|_| ConfigError::Validation {
                field: "trigger.endpoint".into(),
                reason: format!("invalid URL: {raw}"),
            })
        })
        .transpose()?;

    if mode != TriggerMode::File && endpoint.is_none() {
        return Err(ConfigError::Validation {
            field: "trigger.endpoint".into(),
            reason: format!("required when mode is '{}'", trigger.mode),
        });
    }

    let tls = if trigger.insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = trigger.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    let token = if endpoint.is_some() {
        resolve_recorder_token(trigger)
    } else {
        None
    };

    Ok(TriggerConfig {
        mode,
        file: trigger.file.clone(),
        endpoint,
        transport: TransportConfig {
            tls,
            timeout: Duration::from_secs(trigger.timeout.max(1)),
            token,
        },
        max_retries: trigger.max_retries,
        retry_delay: Duration::from_secs(trigger.retry_delay),
    })
}

/// Registry over the configured `[[devices]]`.
pub fn static_registry(cfg: &Config) -> StaticRegistry {
    StaticRegistry::new(cfg.devices.clone())
}
