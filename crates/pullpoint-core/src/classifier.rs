// ── Topic classification ──
//
// Cameras publish events under vendor-specific topic paths. The classifier
// decides whether a topic is one we act on and which semantic label the
// recorder should see for it.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::model::Label;

const RULE_DETECTOR_PREFIX: &str = "tns1:RuleEngine/MyRuleDetector/";

const RULE_DETECTOR_TOPICS: &[&str] = &[
    "PeopleDetect",
    "VehicleDetect",
    "PersonDetect",
    "VehicleDetector",
    "PeopleDetector",
    "PersonDetector",
    "MotionDetector",
    "MotionDetect",
    "Motion",
    "People",
    "Person",
    "Vehicle",
    "VehicleDetection",
    "PeopleDetection",
    "PersonDetection",
];

const MOTION_ALARM_TOPIC: &str = "tns1:VideoSource/MotionAlarm";

const LABEL_TABLE: &[(&str, Label)] = &[
    ("MyRuleDetector/VehicleDetect", Label::Vehicle),
    ("MyRuleDetector/VehicleDetector", Label::Vehicle),
    ("MyRuleDetector/Vehicle", Label::Vehicle),
    ("MyRuleDetector/VehicleDetection", Label::Vehicle),
    ("MyRuleDetector/PeopleDetect", Label::Person),
    ("MyRuleDetector/PersonDetect", Label::Person),
    ("MyRuleDetector/PeopleDetector", Label::Person),
    ("MyRuleDetector/PersonDetector", Label::Person),
    ("MyRuleDetector/People", Label::Person),
    ("MyRuleDetector/Person", Label::Person),
    ("MyRuleDetector/PeopleDetection", Label::Person),
    ("MyRuleDetector/PersonDetection", Label::Person),
    ("MyRuleDetector/FaceDetect", Label::Person),
    ("MyRuleDetector/DogCatDetect", Label::Animal),
    ("CellMotionDetector/Motion", Label::Motion),
    ("MyRuleDetector/MotionDetector", Label::Motion),
    ("MyRuleDetector/MotionDetect", Label::Motion),
    ("MyRuleDetector/Motion", Label::Motion),
    ("VideoSource/MotionAlarm", Label::Motion),
    (MOTION_ALARM_TOPIC, Label::Motion),
];

/// The topics supported out of the box.
pub fn default_topics() -> Vec<String> {
    RULE_DETECTOR_TOPICS
        .iter()
        .map(|name| format!("{RULE_DETECTOR_PREFIX}{name}"))
        .chain(std::iter::once(MOTION_ALARM_TOPIC.to_owned()))
        .collect()
}

/// Last topic segment, lower-cased with whitespace removed.
pub fn topic_kind(topic: &str) -> String {
    topic
        .rsplit('/')
        .next()
        .unwrap_or(topic)
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Strip a leading `prefix:` namespace qualifier.
fn strip_namespace(topic: &str) -> &str {
    match topic.split_once(':') {
        Some((prefix, rest)) if !prefix.contains('/') => rest,
        _ => topic,
    }
}

/// Which labels are allowed to reach the recorder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LabelPolicy {
    #[default]
    Any,
    Only(HashSet<Label>),
}

impl LabelPolicy {
    pub fn allows(&self, label: Label) -> bool {
        match self {
            Self::Any => true,
            Self::Only(set) => set.contains(&label),
        }
    }
}

/// Result of classifying one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub supported: bool,
    pub label: Label,
}

/// Allow-list plus label table.
#[derive(Debug, Clone)]
pub struct TopicClassifier {
    topics: Vec<String>,
    exact: HashSet<String>,
    stripped: HashSet<String>,
    labels: HashMap<&'static str, Label>,
    policy: LabelPolicy,
}

impl Default for TopicClassifier {
    fn default() -> Self {
        Self::new(LabelPolicy::Any, std::iter::empty::<String>())
    }
}

impl TopicClassifier {
    /// Build a classifier over the default allow-list plus `extra_topics`.
    pub fn new<I, S>(policy: LabelPolicy, extra_topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut topics = default_topics();
        for topic in extra_topics {
            let topic = topic.into();
            if !topic.is_empty() && !topics.contains(&topic) {
                topics.push(topic);
            }
        }

        let exact = topics.iter().cloned().collect();
        let stripped = topics
            .iter()
            .map(|t| strip_namespace(t).to_owned())
            .collect();

        Self {
            topics,
            exact,
            stripped,
            labels: LABEL_TABLE.iter().copied().collect(),
            policy,
        }
    }

    /// The effective allow-list, defaults first.
    pub fn supported_topics(&self) -> &[String] {
        &self.topics
    }

    pub fn policy(&self) -> &LabelPolicy {
        &self.policy
    }

    pub fn classify(&self, topic: &str) -> Classification {
        let label = self.label_for(topic);
        let listed =
            self.exact.contains(topic) || self.stripped.contains(strip_namespace(topic));

        Classification {
            supported: listed && self.policy.allows(label),
            label,
        }
    }

    /// Label lookup: full topic, then the last segment, then the last two
    /// segments. Anything else is motion.
    pub fn label_for(&self, topic: &str) -> Label {
        if let Some(label) = self.labels.get(topic) {
            return *label;
        }

        let segments: Vec<&str> = topic.split('/').collect();
        if let Some(last) = segments.last() {
            if let Some(label) = self.labels.get(*last) {
                return *label;
            }
        }

        if segments.len() >= 2 {
            let tail = segments[segments.len() - 2..].join("/");
            let tail = strip_namespace(&tail);
            if let Some(label) = self.labels.get(tail) {
                return *label;
            }
        }

        Label::Motion
    }
}
