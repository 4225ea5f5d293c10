// ── Runtime engine configuration ──
//
// These types describe how sessions, the watcher, and trigger delivery
// behave. They never touch disk: the CLI (or an embedding service) builds
// them, usually through `pullpoint-config`, and hands them in.

use std::path::PathBuf;
use std::time::Duration;

use pullpoint_api::{DEFAULT_PROTOCOL_TIMEOUT, TransportConfig};
use url::Url;

use crate::classifier::{LabelPolicy, TopicClassifier};
use crate::failure::CooldownPolicy;

/// Default trigger file shared with the recorder.
pub const DEFAULT_TRIGGER_FILE: &str = "/tmp/bluecherry_trigger";

/// Session and watcher tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bound on a single connect or subscribe call.
    pub protocol_timeout: Duration,
    /// Delay before retrying a failed subscription or a lost connection.
    pub retry_delay: Duration,
    /// Lease assumed when the device grants none.
    pub default_lease: Duration,
    /// Fraction of the lease after which the subscription is renewed.
    pub renewal_ratio: f64,
    /// Per-device health check period.
    pub health_check_interval: Duration,
    /// Registry re-poll period. Zero polls once at startup only.
    pub poll_interval: Duration,
    pub cooldown: CooldownPolicy,
    pub label_policy: LabelPolicy,
    /// Topics supported in addition to the built-in allow-list.
    pub extra_topics: Vec<String>,
    /// Capacity of the `TopicEvent` broadcast channel.
    pub event_buffer: usize,
    /// Triggers waiting for delivery before new ones are dropped.
    pub trigger_queue: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            protocol_timeout: DEFAULT_PROTOCOL_TIMEOUT,
            retry_delay: Duration::from_secs(10),
            default_lease: Duration::from_secs(60),
            renewal_ratio: 0.8,
            health_check_interval: Duration::from_secs(15),
            poll_interval: Duration::from_secs(60),
            cooldown: CooldownPolicy::default(),
            label_policy: LabelPolicy::Any,
            extra_topics: Vec::new(),
            event_buffer: 256,
            trigger_queue: 1024,
        }
    }
}

impl EngineConfig {
    /// Build the topic classifier this configuration describes.
    pub fn classifier(&self) -> TopicClassifier {
        TopicClassifier::new(self.label_policy.clone(), self.extra_topics.iter().cloned())
    }

    /// Delay until renewal for a granted lease.
    pub fn renewal_delay(&self, lease: Duration) -> Duration {
        let ratio = if self.renewal_ratio > 0.0 && self.renewal_ratio <= 1.0 {
            self.renewal_ratio
        } else {
            0.8
        };
        lease.mul_f64(ratio)
    }
}

/// Where triggers are delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TriggerMode {
    #[default]
    File,
    Http,
    Both,
}

/// Trigger delivery configuration.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub mode: TriggerMode,
    pub file: PathBuf,
    /// Recorder endpoint, required for `Http` and `Both`.
    pub endpoint: Option<Url>,
    pub transport: TransportConfig,
    /// HTTP delivery attempts before giving up.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            mode: TriggerMode::File,
            file: PathBuf::from(DEFAULT_TRIGGER_FILE),
            endpoint: None,
            transport: TransportConfig::default(),
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renewal_at_eighty_percent_by_default() {
        let config = EngineConfig::default();
        assert_eq!(
            config.renewal_delay(Duration::from_secs(100)),
            Duration::from_secs(80)
        );
        assert_eq!(
            config.renewal_delay(Duration::from_secs(60)),
            Duration::from_secs(48)
        );
    }

    #[test]
    fn out_of_range_ratio_falls_back() {
        let config = EngineConfig {
            renewal_ratio: 1.5,
            ..EngineConfig::default()
        };
        assert_eq!(
            config.renewal_delay(Duration::from_secs(10)),
            Duration::from_secs(8)
        );
    }
}
