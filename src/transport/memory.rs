//! Scripted in-process transports for tests.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::TransportError;
use crate::transport::{
    ChatMessage, ChatTransport, MailTransport, OutboundMail, SentMail, ThreadInfo,
    WebhookTransport,
};
use crate::util::compare_ids;

/// Records every send; fails for chosen recipients; reports scripted thread sizes.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundMail>>,
    failing_recipients: Mutex<HashSet<String>>,
    thread_counts: Mutex<HashMap<String, usize>>,
    failing_threads: Mutex<HashSet<String>>,
    fetches: AtomicUsize,
    batches: AtomicUsize,
    next_id: AtomicUsize,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_recipient(&self, recipient: &str) {
        self.failing_recipients
            .lock()
            .await
            .insert(recipient.to_string());
    }

    pub async fn set_thread_count(&self, thread_id: &str, count: usize) {
        self.thread_counts
            .lock()
            .await
            .insert(thread_id.to_string(), count);
    }

    pub async fn fail_thread(&self, thread_id: &str) {
        self.failing_threads
            .lock()
            .await
            .insert(thread_id.to_string());
    }

    /// Every successfully sent mail, in order.
    pub async fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().await.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(AtomicOrdering::SeqCst)
    }

    /// Calls to [`MailTransport::fetch_threads`].
    pub fn batch_count(&self) -> usize {
        self.batches.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl MailTransport for RecordingMailer {
    async fn send(&self, mail: OutboundMail) -> Result<SentMail, TransportError> {
        if self.failing_recipients.lock().await.contains(&mail.to) {
            return Err(TransportError::SendFailed {
                transport: "memory".into(),
                reason: format!("mailbox unavailable: {}", mail.to),
            });
        }

        let n = self.next_id.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        let message_id = format!("<msg-{n}@memory>");
        let thread_id = mail
            .thread_reference
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| message_id.clone());
        self.sent.lock().await.push(mail);
        Ok(SentMail {
            message_id,
            thread_id,
        })
    }

    async fn fetch_thread(&self, thread_id: &str) -> Result<ThreadInfo, TransportError> {
        self.fetches.fetch_add(1, AtomicOrdering::SeqCst);
        if self.failing_threads.lock().await.contains(thread_id) {
            return Err(TransportError::FetchFailed {
                transport: "memory".into(),
                reason: format!("thread {thread_id} unavailable"),
            });
        }
        let message_count = self
            .thread_counts
            .lock()
            .await
            .get(thread_id)
            .copied()
            .unwrap_or(1);
        Ok(ThreadInfo { message_count })
    }

    async fn fetch_threads(&self, thread_ids: &[String]) -> Vec<Result<ThreadInfo, TransportError>> {
        self.batches.fetch_add(1, AtomicOrdering::SeqCst);
        let mut results = Vec::with_capacity(thread_ids.len());
        for thread_id in thread_ids {
            results.push(self.fetch_thread(thread_id).await);
        }
        results
    }
}

/// Per-channel message history; records every posted reply.
#[derive(Default)]
pub struct ScriptedChat {
    channels: Mutex<HashMap<String, Vec<ChatMessage>>>,
    posted: Mutex<Vec<(String, String)>>,
    failing_fetch: Mutex<HashSet<String>>,
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, channel_id: &str, message: ChatMessage) {
        self.channels
            .lock()
            .await
            .entry(channel_id.to_string())
            .or_default()
            .push(message);
    }

    pub async fn fail_fetch(&self, channel_id: &str) {
        self.failing_fetch
            .lock()
            .await
            .insert(channel_id.to_string());
    }

    /// `(channel, content)` of every post, in order.
    pub async fn posted(&self) -> Vec<(String, String)> {
        self.posted.lock().await.clone()
    }

    pub async fn posted_to(&self, channel_id: &str) -> Vec<String> {
        self.posted
            .lock()
            .await
            .iter()
            .filter(|(c, _)| c == channel_id)
            .map(|(_, content)| content.clone())
            .collect()
    }
}

#[async_trait]
impl ChatTransport for ScriptedChat {
    /// Mirrors the platform: without `after` the newest `limit` messages,
    /// with `after` the oldest `limit` messages past it. Returned newest first.
    async fn fetch_messages(
        &self,
        channel_id: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, TransportError> {
        if self.failing_fetch.lock().await.contains(channel_id) {
            return Err(TransportError::FetchFailed {
                transport: "memory".into(),
                reason: format!("channel {channel_id} unavailable"),
            });
        }

        let mut messages = self
            .channels
            .lock()
            .await
            .get(channel_id)
            .cloned()
            .unwrap_or_default();
        messages.sort_by(|a, b| compare_ids(&a.id, &b.id));

        let mut page: Vec<ChatMessage> = match after {
            Some(after) => messages
                .into_iter()
                .filter(|m| compare_ids(&m.id, after) == Ordering::Greater)
                .take(limit)
                .collect(),
            None => {
                let skip = messages.len().saturating_sub(limit);
                messages.into_iter().skip(skip).collect()
            }
        };
        page.reverse();
        Ok(page)
    }

    async fn post_message(&self, channel_id: &str, content: &str) -> Result<(), TransportError> {
        self.posted
            .lock()
            .await
            .push((channel_id.to_string(), content.to_string()));
        Ok(())
    }
}

/// Records webhook posts; can be switched to fail.
#[derive(Default)]
pub struct RecordingWebhook {
    posts: Mutex<Vec<(String, String)>>,
    failing: Mutex<bool>,
}

impl RecordingWebhook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_failing(&self, failing: bool) {
        *self.failing.lock().await = failing;
    }

    /// `(url, content)` of every delivered post.
    pub async fn posts(&self) -> Vec<(String, String)> {
        self.posts.lock().await.clone()
    }
}

#[async_trait]
impl WebhookTransport for RecordingWebhook {
    async fn post_webhook(&self, url: &str, content: &str) -> Result<(), TransportError> {
        if *self.failing.lock().await {
            return Err(TransportError::SendFailed {
                transport: "memory".into(),
                reason: "webhook unavailable".into(),
            });
        }
        self.posts
            .lock()
            .await
            .push((url.to_string(), content.to_string()));
        Ok(())
    }
}
