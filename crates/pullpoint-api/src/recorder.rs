// Recorder trigger HTTP client
//
// Posts start/stop triggers to an external recording system. The recorder
// only needs a device id and a free-text description; the structured label
// and transition ride along for recorders that understand them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Body of a trigger request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPayload {
    pub device_id: u32,
    /// `label|transition`, the same text the trigger file carries.
    pub description: String,
    pub label: String,
    pub transition: String,
    pub timestamp: DateTime<Utc>,
}

impl TriggerPayload {
    pub fn new(
        device_id: u32,
        label: impl Into<String>,
        transition: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let label = label.into();
        let transition = transition.into();
        Self {
            device_id,
            description: format!("{label}|{transition}"),
            label,
            transition,
            timestamp,
        }
    }
}

/// HTTP client for the recorder's trigger endpoint.
pub struct RecorderClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl RecorderClient {
    /// Create a recorder client from a `TransportConfig`.
    ///
    /// `endpoint` is the full URL triggers are POSTed to.
    pub fn new(endpoint: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, endpoint })
    }

    /// Create a recorder client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, endpoint: Url) -> Self {
        Self { http, endpoint }
    }

    /// The trigger endpoint URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Deliver one trigger. Any 2xx status counts as accepted.
    pub async fn send_trigger(&self, payload: &TriggerPayload) -> Result<(), Error> {
        debug!(
            device_id = payload.device_id,
            description = %payload.description,
            "posting trigger to recorder"
        );

        let resp = self
            .http
            .post(self.endpoint.clone())
            .json(payload)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            trace!(status = status.as_u16(), "recorder accepted trigger");
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        let message = recorder_message(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_owned()
        });

        Err(Error::Recorder {
            status: status.as_u16(),
            message,
        })
    }
}

/// Recorders answer errors either as `{"error": "..."}`, `{"message": "..."}`,
/// or plain text.
fn recorder_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(json) => json["error"]
            .as_str()
            .or_else(|| json["message"].as_str())
            .map(String::from),
        Err(_) => Some(trimmed.to_owned()),
    }
}
