// ── Trigger delivery ──
//
// Sessions hand every edge-detected transition to a `TriggerSink`. The
// recorder reads triggers either from a shared append-only file or over
// HTTP; `build_sink` picks the configured target(s). Sessions reach the
// sink through a `QueuedSink`, so delivery runs off the message pump.

mod file;
mod http;
mod queue;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

pub use file::FileTriggerSink;
pub use http::HttpTriggerSink;
pub use queue::QueuedSink;

use crate::config::{TriggerConfig, TriggerMode};
use crate::error::CoreError;
use crate::model::TriggerRecord;

/// Destination for trigger records.
#[async_trait]
pub trait TriggerSink: Send + Sync {
    /// Deliver one record, reporting failure to the caller.
    async fn deliver(&self, record: &TriggerRecord) -> Result<(), CoreError>;

    /// Deliver one record, logging failure. Sessions use this: a lost
    /// trigger never interrupts event processing.
    async fn emit(&self, record: &TriggerRecord) {
        if let Err(e) = self.deliver(record).await {
            warn!(
                device_id = %record.device_id,
                label = %record.label,
                transition = %record.transition,
                error = %e,
                "trigger delivery failed"
            );
        }
    }
}

/// Delivers to several sinks in order. Every sink is attempted; the first
/// error is reported.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TriggerSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn TriggerSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl TriggerSink for FanoutSink {
    async fn deliver(&self, record: &TriggerRecord) -> Result<(), CoreError> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(record).await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Construct the sink described by `config`.
pub fn build_sink(config: &TriggerConfig) -> Result<Arc<dyn TriggerSink>, CoreError> {
    let file = || -> Arc<dyn TriggerSink> { Arc::new(FileTriggerSink::new(&config.file)) };

    let http = || -> Result<Arc<dyn TriggerSink>, CoreError> {
        let endpoint = config.endpoint.clone().ok_or_else(|| CoreError::Config {
            message: "trigger mode requires a recorder endpoint".into(),
        })?;
        Ok(Arc::new(HttpTriggerSink::from_config(endpoint, config)?))
    };

    Ok(match config.mode {
        TriggerMode::File => file(),
        TriggerMode::Http => http()?,
        TriggerMode::Both => Arc::new(FanoutSink::new(vec![file(), http()?])),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::model::{DeviceId, Label, Transition};

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl TriggerSink for Recording {
        async fn deliver(&self, record: &TriggerRecord) -> Result<(), CoreError> {
            self.seen.lock().unwrap().push(record.to_string());
            if self.fail {
                return Err(CoreError::Trigger {
                    message: "nope".into(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn fanout_attempts_every_sink() {
        let failing = Arc::new(Recording {
            fail: true,
            ..Recording::default()
        });
        let ok = Arc::new(Recording::default());
        let sinks: Vec<Arc<dyn TriggerSink>> = vec![failing.clone(), ok.clone()];
        let fanout = FanoutSink::new(sinks);

        let record = TriggerRecord::new(DeviceId(1), Label::Vehicle, Transition::Start);
        assert!(fanout.deliver(&record).await.is_err());
        assert_eq!(ok.seen.lock().unwrap().as_slice(), ["1|Vehicle|start"]);
        assert_eq!(failing.seen.lock().unwrap().len(), 1);

        // emit swallows the error
        fanout.emit(&record).await;
        assert_eq!(ok.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn http_mode_requires_endpoint() {
        let config = TriggerConfig {
            mode: TriggerMode::Http,
            ..TriggerConfig::default()
        };
        assert!(matches!(build_sink(&config), Err(CoreError::Config { .. })));
    }

    #[test]
    fn file_mode_builds_without_endpoint() {
        assert!(build_sink(&TriggerConfig::default()).is_ok());
    }
}
