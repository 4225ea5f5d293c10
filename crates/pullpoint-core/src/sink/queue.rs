use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use super::TriggerSink;
use crate::error::CoreError;
use crate::model::TriggerRecord;

/// Hands records to a background worker that delivers them to `inner` one
/// at a time, in the order they were queued.
///
/// `deliver` returns as soon as the record is queued, so a slow recorder
/// (HTTP retries, a stuck file system) never holds up the message pump.
/// A full queue rejects the record. The worker is spawned on first use and
/// exits once the queue is dropped and drained.
pub struct QueuedSink {
    inner: Arc<dyn TriggerSink>,
    capacity: usize,
    queue: OnceLock<mpsc::Sender<TriggerRecord>>,
}

impl QueuedSink {
    pub fn new(inner: Arc<dyn TriggerSink>, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            queue: OnceLock::new(),
        }
    }

    fn sender(&self) -> &mpsc::Sender<TriggerRecord> {
        self.queue.get_or_init(|| {
            let (tx, mut rx) = mpsc::channel::<TriggerRecord>(self.capacity);
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                while let Some(record) = rx.recv().await {
                    inner.emit(&record).await;
                }
                debug!("trigger queue drained");
            });
            tx
        })
    }
}

#[async_trait]
impl TriggerSink for QueuedSink {
    async fn deliver(&self, record: &TriggerRecord) -> Result<(), CoreError> {
        self.sender()
            .try_send(record.clone())
            .map_err(|e| match e {
                TrySendError::Full(_) => CoreError::Trigger {
                    message: format!("trigger queue full ({} pending)", self.capacity),
                },
                TrySendError::Closed(_) => CoreError::Trigger {
                    message: "trigger worker stopped".into(),
                },
            })
    }
}
