//! Transport seams: outbound mail, the chat platform, and the webhook notifier.
//!
//! Engines and the bridge only see these traits. Concrete clients live in the
//! submodules. The scripted fakes in `memory` are built for tests and for the
//! `test-util` feature only.

pub mod discord;
pub mod imap;
pub mod mail;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
#[cfg(test)]
mod stub;
pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

pub use discord::DiscordClient;
pub use mail::MailClient;
pub use webhook::HttpWebhook;

/// One outbound touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Reference of the conversation this touch continues, if any.
    pub thread_reference: Option<String>,
}

/// Identifiers assigned to a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub message_id: String,
    pub thread_id: String,
}

/// What the transport can tell about a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadInfo {
    pub message_count: usize,
}

/// Mail send plus thread inspection.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: OutboundMail) -> Result<SentMail, TransportError>;

    async fn fetch_thread(&self, thread_id: &str) -> Result<ThreadInfo, TransportError>;

    /// Inspect several threads; one result per id, in order.
    async fn fetch_threads(&self, thread_ids: &[String]) -> Vec<Result<ThreadInfo, TransportError>> {
        let mut results = Vec::with_capacity(thread_ids.len());
        for thread_id in thread_ids {
            results.push(self.fetch_thread(thread_id).await);
        }
        results
    }
}

/// Author of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAuthor {
    pub id: String,
    #[serde(default)]
    pub bot: bool,
}

/// A chat message as returned by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Snowflake id. Compare with [`crate::util::compare_ids`], never numerically.
    pub id: String,
    pub author: ChatAuthor,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn new(id: impl Into<String>, author_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: ChatAuthor {
                id: author_id.into(),
                bot: false,
            },
            content: content.into(),
        }
    }

    pub fn from_bot(mut self) -> Self {
        self.author.bot = true;
        self
    }
}

/// Chat platform message transport.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Messages newer than `after` (or the most recent ones), in no particular order.
    async fn fetch_messages(
        &self,
        channel_id: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, TransportError>;

    async fn post_message(&self, channel_id: &str, content: &str) -> Result<(), TransportError>;
}

/// Fire-and-forget webhook delivery.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post_webhook(&self, url: &str, content: &str) -> Result<(), TransportError>;
}
