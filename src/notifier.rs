//! Operational notifications: run summaries and reply events to a webhook.
//!
//! Diagnostic only. A missing target disables it, and delivery failures are
//! logged and dropped.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{CHAT_MESSAGE_LIMIT, OutreachConfig};
use crate::transport::WebhookTransport;
use crate::util::truncate;

pub struct Notifier {
    transport: Arc<dyn WebhookTransport>,
    url: Option<String>,
    responsible_user_id: Option<String>,
}

impl Notifier {
    pub fn new(
        transport: Arc<dyn WebhookTransport>,
        url: Option<String>,
        responsible_user_id: Option<String>,
    ) -> Self {
        Self {
            transport,
            url,
            responsible_user_id,
        }
    }

    pub fn from_config(transport: Arc<dyn WebhookTransport>, config: &OutreachConfig) -> Self {
        Self::new(
            transport,
            config.notify_webhook_url.clone(),
            config.responsible_user_id.clone(),
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Deliver one bulleted report. Never fails.
    pub async fn notify(&self, title: &str, lines: &[String], mention_responsible: bool) {
        let Some(url) = self.url.as_deref() else {
            debug!(title, "Notifier disabled, dropping report");
            return;
        };

        let mention = if mention_responsible {
            self.responsible_user_id.as_deref()
        } else {
            None
        };
        let content = format_notification(title, lines, mention);

        if let Err(e) = self.transport.post_webhook(url, &content).await {
            warn!(title, error = %e, "Notification delivery failed");
        }
    }
}

/// `<@id> **title**` followed by one `- line` per entry, cut to the chat limit.
pub fn format_notification(title: &str, lines: &[String], mention: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(user) = mention {
        out.push_str(&format!("<@{user}> "));
    }
    out.push_str(&format!("**{title}**"));
    for line in lines {
        out.push_str("\n- ");
        out.push_str(line);
    }
    truncate(&out, CHAT_MESSAGE_LIMIT)
}
