// pullpoint-core: ONVIF pull-point event engine between the protocol
// boundary (pullpoint-api) and consumers (CLI, NVR services).

pub mod classifier;
pub mod config;
pub mod error;
pub mod failure;
pub mod manager;
pub mod model;
pub mod payload;
pub mod registry;
pub mod session;
pub mod sink;
pub mod watcher;

// ── Primary re-exports ──────────────────────────────────────────────
pub use classifier::{Classification, LabelPolicy, TopicClassifier, topic_kind};
pub use config::{DEFAULT_TRIGGER_FILE, EngineConfig, TriggerConfig, TriggerMode};
pub use error::CoreError;
pub use failure::{CooldownPolicy, FailureKind, FailureStatus, FailureTracker};
pub use manager::SubscriptionManager;
pub use registry::{DEFAULT_ONVIF_PORT, DeviceRegistry, RegistryRecord, StaticRegistry};
pub use session::{DeviceSession, SessionContext, SessionPhase};
pub use sink::{
    FanoutSink, FileTriggerSink, HttpTriggerSink, QueuedSink, TriggerSink, build_sink,
};
pub use watcher::FleetWatcher;

pub use model::{
    DeviceConnectionInfo, DeviceId, EventTopicState, Label, TopicEvent, TriggerRecord, Transition,
};
