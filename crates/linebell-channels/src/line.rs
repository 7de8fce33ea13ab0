//! LINE Messaging API push channel.
//!
//! One POST per call to `/v2/bot/message/push`, no retries. A 2xx status
//! is a delivery; anything else is returned as `Failed` with the raw body.

use async_trait::async_trait;
use linebell_core::config::LineConfig;
use linebell_core::error::{LinebellError, Result};
use linebell_core::traits::Notifier;
use linebell_core::types::{DispatchOutcome, DispatchRequest};
use std::time::Duration;

/// LINE push-message dispatcher.
pub struct LineNotifier {
    endpoint: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl LineNotifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(LinebellError::Config("LINE timeout must be positive".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                LinebellError::Transport(format!("LINE: failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            endpoint: endpoint.into(),
            timeout,
            client,
        })
    }

    pub fn from_config(config: &LineConfig, timeout: Duration) -> Result<Self> {
        Self::new(config.endpoint.clone(), timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// JSON body of a single text push.
    pub fn push_body(request: &DispatchRequest) -> serde_json::Value {
        serde_json::json!({
            "to": request.recipient_id(),
            "messages": [{"type": "text", "text": request.message_text()}]
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> LinebellError {
        if e.is_timeout() {
            LinebellError::Transport(format!(
                "LINE: no response within {}s: {e}",
                self.timeout.as_secs_f32()
            ))
        } else {
            LinebellError::Transport(format!("LINE: {e}"))
        }
    }
}

#[async_trait]
impl Notifier for LineNotifier {
    fn name(&self) -> &str { "line" }

    async fn push(&self, request: &DispatchRequest) -> Result<DispatchOutcome> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", request.credential()))
            .header("Content-Type", "application/json")
            .json(&Self::push_body(request))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| self.transport_error(e))?;
        let outcome = DispatchOutcome::from_response(status, body);

        if outcome.is_delivered() {
            tracing::info!("✅ LINE push delivered to {} ({status})", request.recipient_id());
        } else {
            tracing::warn!("❌ LINE push rejected with status {status}");
        }
        Ok(outcome)
    }
}
