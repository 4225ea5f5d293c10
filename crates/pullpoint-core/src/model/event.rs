// ── Event labels, topic state, and trigger records ──

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use super::device::DeviceId;

/// Semantic label derived from an event topic.
///
/// Motion keeps its lower-case spelling: it is the fallback label and the
/// recorder's trigger file has always carried it that way.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum Label {
    #[serde(rename = "Person")]
    #[strum(serialize = "Person")]
    Person,
    #[serde(rename = "Vehicle")]
    #[strum(serialize = "Vehicle")]
    Vehicle,
    #[serde(rename = "Animal")]
    #[strum(serialize = "Animal")]
    Animal,
    #[serde(rename = "motion", alias = "Motion")]
    #[strum(serialize = "motion")]
    Motion,
}

/// Direction of an edge-triggered state change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Transition {
    Start,
    Stop,
}

impl Transition {
    /// `true` → start, `false` → stop.
    pub fn from_state(active: bool) -> Self {
        if active { Self::Start } else { Self::Stop }
    }
}

/// Per (device, topic) boolean state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventTopicState {
    pub is_active: bool,
    pub last_update: DateTime<Utc>,
}

impl EventTopicState {
    pub(crate) fn new() -> Self {
        Self {
            is_active: false,
            last_update: Utc::now(),
        }
    }
}

/// A normalized trigger handed to the recording system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerRecord {
    pub device_id: DeviceId,
    pub label: Label,
    pub transition: Transition,
    pub timestamp: DateTime<Utc>,
}

impl TriggerRecord {
    pub fn new(device_id: DeviceId, label: Label, transition: Transition) -> Self {
        Self {
            device_id,
            label,
            transition,
            timestamp: Utc::now(),
        }
    }
}

/// Renders the trigger file line format: `deviceId|label|transition`.
impl fmt::Display for TriggerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.device_id, self.label, self.transition)
    }
}

/// Broadcast to observers whenever a session emits a trigger.
#[derive(Debug, Clone, Serialize)]
pub struct TopicEvent {
    pub device_id: DeviceId,
    pub topic: String,
    /// Last topic segment, lower-cased (e.g. `persondetect`).
    pub kind: String,
    pub label: Label,
    pub state: bool,
    pub transition: Transition,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_record_renders_file_line() {
        let record = TriggerRecord::new(DeviceId(3), Label::Person, Transition::Start);
        assert_eq!(record.to_string(), "3|Person|start");

        let record = TriggerRecord::new(DeviceId(11), Label::Motion, Transition::Stop);
        assert_eq!(record.to_string(), "11|motion|stop");
    }

    #[test]
    fn label_parses_case_insensitively() {
        assert_eq!("person".parse::<Label>().unwrap(), Label::Person);
        assert_eq!("Motion".parse::<Label>().unwrap(), Label::Motion);
        assert!("tamper".parse::<Label>().is_err());
    }

    #[test]
    fn label_serde_matches_display() {
        let json = serde_json::to_string(&Label::Motion).unwrap();
        assert_eq!(json, "\"motion\"");
        let back: Label = serde_json::from_str("\"Motion\"").unwrap();
        assert_eq!(back, Label::Motion);
    }

    #[test]
    fn transition_follows_state() {
        assert_eq!(Transition::from_state(true), Transition::Start);
        assert_eq!(Transition::from_state(false), Transition::Stop);
        assert_eq!("STOP".parse::<Transition>().unwrap(), Transition::Stop);
    }
}
