use std::time::Duration;

use async_trait::async_trait;
use pullpoint_api::{RecorderClient, TriggerPayload};
use tracing::{debug, warn};
use url::Url;

use super::TriggerSink;
use crate::config::TriggerConfig;
use crate::error::CoreError;
use crate::model::TriggerRecord;

/// POSTs triggers to the recorder, retrying transient failures.
pub struct HttpTriggerSink {
    client: RecorderClient,
    max_attempts: u32,
    retry_delay: Duration,
}

impl HttpTriggerSink {
    pub fn new(client: RecorderClient, max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            client,
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    pub fn from_config(endpoint: Url, config: &TriggerConfig) -> Result<Self, CoreError> {
        let client = RecorderClient::new(endpoint, &config.transport)?;
        Ok(Self::new(client, config.max_retries, config.retry_delay))
    }
}

#[async_trait]
impl TriggerSink for HttpTriggerSink {
    async fn deliver(&self, record: &TriggerRecord) -> Result<(), CoreError> {
        let payload = TriggerPayload::new(
            record.device_id.get(),
            record.label.as_ref(),
            record.transition.as_ref(),
            record.timestamp,
        );

        let mut attempt = 1;
        loop {
            match self.client.send_trigger(&payload).await {
                Ok(()) => {
                    debug!(
                        endpoint = %self.client.endpoint(),
                        trigger = %record,
                        attempt,
                        "trigger posted"
                    );
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        trigger = %record,
                        attempt,
                        error = %e,
                        "trigger post failed, retrying in {:?}",
                        self.retry_delay
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
