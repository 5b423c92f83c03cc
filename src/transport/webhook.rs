//! Webhook delivery for operational notifications.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::transport::WebhookTransport;

/// Posts `{"content": ...}` to a chat webhook URL.
#[derive(Debug, Clone, Default)]
pub struct HttpWebhook {
    client: reqwest::Client,
}

impl HttpWebhook {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookTransport for HttpWebhook {
    async fn post_webhook(&self, url: &str, content: &str) -> Result<(), TransportError> {
        let resp = self
            .client
            .post(url)
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(TransportError::SendFailed {
                transport: "webhook".into(),
                reason: format!("HTTP {}", resp.status()),
            });
        }
        Ok(())
    }
}
