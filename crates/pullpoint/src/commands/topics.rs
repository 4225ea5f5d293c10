//! Topic subcommand handlers.

use serde::Serialize;
use tabled::Tabled;

use pullpoint_core::{Label, TopicClassifier, topic_kind};

use crate::cli::{GlobalOpts, TopicsArgs, TopicsCommand};
use crate::config;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct TopicView {
    topic: String,
    kind: String,
    label: Label,
    supported: bool,
}

impl TopicView {
    fn classify(classifier: &TopicClassifier, topic: &str) -> Self {
        let c = classifier.classify(topic);
        Self {
            topic: topic.to_owned(),
            kind: topic_kind(topic),
            label: c.label,
            supported: c.supported,
        }
    }
}

#[derive(Tabled)]
struct TopicRow {
    #[tabled(rename = "Topic")]
    topic: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Supported")]
    supported: String,
}

pub fn handle(args: TopicsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let classifier = pullpoint_config::to_engine_config(&cfg)?.classifier();
    let color = output::should_color(global.color);

    let views: Vec<TopicView> = match args.command {
        TopicsCommand::Classify { topics } => topics
            .iter()
            .map(|t| TopicView::classify(&classifier, t))
            .collect(),
        TopicsCommand::Supported => classifier
            .supported_topics()
            .iter()
            .map(|t| TopicView::classify(&classifier, t))
            .collect(),
    };

    let out = output::render_list(
        global.output,
        &views,
        |v| TopicRow {
            topic: v.topic.clone(),
            kind: v.kind.clone(),
            label: v.label.to_string(),
            supported: output::flag(v.supported, color),
        },
        |v| format!("{}\t{}\t{}", v.topic, v.label, v.supported),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
