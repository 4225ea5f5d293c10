// ── Domain model ──

mod device;
mod event;

pub use device::{DeviceConnectionInfo, DeviceId};
pub use event::{EventTopicState, Label, TopicEvent, TriggerRecord, Transition};
