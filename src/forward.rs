//! Re-posts the raw payload to a third-party consumer.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use crate::error::SinkError;
use crate::models::RawPayload;

const FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

// ---

#[derive(Debug, Clone)]
pub struct Forwarder {
    client: Client,
    url: String,
}

impl Forwarder {
    pub fn new(url: impl Into<String>) -> Result<Self, SinkError> {
        // ---
        let url = url.into();
        let client = Client::builder()
            .timeout(FORWARD_TIMEOUT)
            .build()
            .map_err(|e| SinkError::Forward {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, url })
    }

    /// Post `payload` form-encoded. A non-success status counts as a failure.
    pub async fn forward(&self, payload: &RawPayload) -> Result<(), SinkError> {
        // ---
        let failed = |reason: String| SinkError::Forward {
            url: self.url.clone(),
            reason,
        };

        let response = self
            .client
            .post(&self.url)
            .form(payload)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %self.url, %status, "forward rejected");
            return Err(failed(format!("status {status}")));
        }
        debug!(url = %self.url, %status, "payload forwarded");
        Ok(())
    }
}
