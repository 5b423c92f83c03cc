//! Cursor-based chat command bridge.
//!
//! Each permitted channel moves from no cursor, to a cursor bootstrapped at
//! the newest message, to a cursor that only ever advances. A poll is one
//! scheduled step: read everything past the cursor, answer the commands in
//! creation order, store the newest id seen.

pub mod command;
pub mod handler;

pub use command::{Access, Command, Invocation};
pub use handler::CommandHandler;

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::bridge::command::strip_prefix;
use crate::config::OutreachConfig;
use crate::error::{CommandError, Result};
use crate::store::CursorStore;
use crate::transport::{ChatMessage, ChatTransport};
use crate::util::compare_ids;

/// Cursor stored for a channel that has no messages yet.
pub const EMPTY_CHANNEL_CURSOR: &str = "0";

/// Outcome of one poll of one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// The channel had no cursor; it was bootstrapped and nothing was processed.
    pub bootstrapped: bool,
    /// Messages past the cursor.
    pub fetched: usize,
    /// Command messages answered.
    pub processed: usize,
    /// Cursor after the poll.
    pub cursor: String,
}

/// Messages strictly newer than `cursor`, oldest first.
pub fn newer_than(cursor: &str, mut messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    messages.retain(|m| compare_ids(&m.id, cursor) == Ordering::Greater);
    messages.sort_by(|a, b| compare_ids(&a.id, &b.id));
    messages.dedup_by(|a, b| a.id == b.id);
    messages
}

pub struct CommandBridge {
    config: Arc<OutreachConfig>,
    chat: Arc<dyn ChatTransport>,
    cursors: Arc<dyn CursorStore>,
    handler: CommandHandler,
}

impl CommandBridge {
    pub fn new(
        config: Arc<OutreachConfig>,
        chat: Arc<dyn ChatTransport>,
        cursors: Arc<dyn CursorStore>,
        handler: CommandHandler,
    ) -> Self {
        Self {
            config,
            chat,
            cursors,
            handler,
        }
    }

    fn ensure_permitted(&self, channel_id: &str) -> Result<()> {
        if self.config.is_permitted_channel(channel_id) {
            Ok(())
        } else {
            Err(CommandError::ChannelNotPermitted(channel_id.to_string()).into())
        }
    }

    /// Set the cursor to the newest message without processing anything.
    pub async fn bootstrap_cursor(&self, channel_id: &str) -> Result<String> {
        self.ensure_permitted(channel_id)?;
        let latest = self.chat.fetch_messages(channel_id, None, 1).await?;
        let cursor = latest
            .iter()
            .map(|m| m.id.as_str())
            .max_by(|a, b| compare_ids(a, b))
            .unwrap_or(EMPTY_CHANNEL_CURSOR)
            .to_string();
        self.cursors.set_cursor(channel_id, &cursor).await?;
        info!(channel = channel_id, cursor = %cursor, "Cursor bootstrapped");
        Ok(cursor)
    }

    /// One poll step for one channel.
    ///
    /// Without a cursor this bootstraps and returns. Otherwise at most one
    /// page past the cursor is processed; the cursor moves to the newest id in
    /// that page whatever the individual commands did.
    pub async fn poll_channel(&self, channel_id: &str) -> Result<PollReport> {
        self.ensure_permitted(channel_id)?;

        let Some(cursor) = self.cursors.get_cursor(channel_id).await? else {
            let cursor = self.bootstrap_cursor(channel_id).await?;
            return Ok(PollReport {
                bootstrapped: true,
                cursor,
                ..Default::default()
            });
        };

        let page = self
            .chat
            .fetch_messages(channel_id, Some(&cursor), self.config.page_size)
            .await?;
        let messages = newer_than(&cursor, page);
        let Some(newest) = messages.last().map(|m| m.id.clone()) else {
            debug!(channel = channel_id, "No new messages");
            return Ok(PollReport {
                cursor,
                ..Default::default()
            });
        };

        let prefix = self.config.command_prefix.as_str();
        let mut processed = 0;
        for message in &messages {
            if message.author.bot {
                continue;
            }
            let Some(rest) = strip_prefix(&message.content, prefix) else {
                continue;
            };
            processed += 1;
            info!(
                channel = channel_id,
                author = %message.author.id,
                message_id = %message.id,
                "Command received"
            );

            let reply = self.handler.handle(&message.author.id, rest).await;
            if let Err(e) = self.chat.post_message(channel_id, &reply).await {
                warn!(channel = channel_id, message_id = %message.id, error = %e, "Reply delivery failed");
            }
        }

        self.cursors.set_cursor(channel_id, &newest).await?;
        debug!(channel = channel_id, cursor = %newest, processed, "Cursor advanced");

        Ok(PollReport {
            bootstrapped: false,
            fetched: messages.len(),
            processed,
            cursor: newest,
        })
    }

    /// Bootstrap every permitted channel. Returns the channels that succeeded.
    pub async fn bootstrap_all(&self) -> Vec<String> {
        let mut done = Vec::new();
        for channel_id in &self.config.admin_channel_ids {
            match self.bootstrap_cursor(channel_id).await {
                Ok(_) => done.push(channel_id.clone()),
                Err(e) => error!(channel = %channel_id, error = %e, "Bootstrap failed"),
            }
        }
        done
    }

    /// Poll every permitted channel. A failing channel does not stop the others.
    pub async fn poll_all(&self) -> usize {
        let mut processed = 0;
        for channel_id in &self.config.admin_channel_ids {
            match self.poll_channel(channel_id).await {
                Ok(report) => processed += report.processed,
                Err(e) => error!(channel = %channel_id, error = %e, "Poll failed"),
            }
        }
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::{ready, row, store, with};
    use crate::engine::{ReplySyncEngine, SendEngine};
    use crate::error::Error;
    use crate::notifier::Notifier;
    use crate::roster::columns::Column;
    use crate::roster::{ApprovalStatus, Roster, SendLock};
    use crate::store::MemoryStore;
    use crate::transport::memory::{RecordingMailer, RecordingWebhook, ScriptedChat};
    use chrono::NaiveDate;

    const CHANNEL: &str = "100";

    struct Harness {
        roster: Arc<Roster>,
        chat: Arc<ScriptedChat>,
        cursors: Arc<MemoryStore>,
        bridge: CommandBridge,
    }

    fn harness(rows: &[Vec<(Column, String)>], page_size: usize) -> Harness {
        let config = Arc::new(OutreachConfig {
            allowed_user_ids: vec!["42".into()],
            admin_channel_ids: vec![CHANNEL.into(), "200".into()],
            page_size,
            ..Default::default()
        });
        let roster = Arc::new(Roster::new(store(rows)));
        let mailer = Arc::new(RecordingMailer::new());
        let notifier = Arc::new(Notifier::new(Arc::new(RecordingWebhook::new()), None, None));
        let send = Arc::new(SendEngine::new(roster.clone(), Some(mailer.clone()), notifier.clone()));
        let replies = Arc::new(ReplySyncEngine::new(roster.clone(), Some(mailer), notifier));
        let handler = CommandHandler::new(config.clone(), roster.clone(), send, replies)
            .with_today(NaiveDate::from_ymd_opt(2026, 2, 10).unwrap());

        let chat = Arc::new(ScriptedChat::new());
        let cursors = Arc::new(MemoryStore::new());
        let bridge = CommandBridge::new(config, chat.clone(), cursors.clone(), handler);
        Harness {
            roster,
            chat,
            cursors,
            bridge,
        }
    }

    async fn cursor(h: &Harness) -> Option<String> {
        h.cursors.get_cursor(CHANNEL).await.unwrap()
    }

    #[test]
    fn newer_than_orders_by_length_then_text() {
        let ids = ["9", "100000000000000000001", "10", "99999999999999999999", "8"];
        let messages = ids.iter().map(|id| ChatMessage::new(*id, "u", "x")).collect();
        let ordered: Vec<String> = newer_than("8", messages).into_iter().map(|m| m.id).collect();
        assert_eq!(
            ordered,
            vec!["9", "10", "99999999999999999999", "100000000000000000001"]
        );
    }

    #[tokio::test]
    async fn bootstrap_then_poll_processes_nothing() {
        let h = harness(&[ready("1")], 50);
        h.chat.push(CHANNEL, ChatMessage::new("500", "42", "!outreach lock 1")).await;
        h.chat.push(CHANNEL, ChatMessage::new("501", "42", "!outreach status")).await;

        assert_eq!(h.bridge.bootstrap_cursor(CHANNEL).await.unwrap(), "501");
        let report = h.bridge.poll_channel(CHANNEL).await.unwrap();

        assert_eq!(report.processed, 0);
        assert!(h.chat.posted().await.is_empty());
        assert_eq!(row(&h.roster, "1").await.lock, SendLock::Unlocked);
        assert_eq!(cursor(&h).await.as_deref(), Some("501"));
    }

    #[tokio::test]
    async fn first_poll_self_bootstraps() {
        let h = harness(&[ready("1")], 50);
        h.chat.push(CHANNEL, ChatMessage::new("700", "42", "!outreach lock 1")).await;

        let report = h.bridge.poll_channel(CHANNEL).await.unwrap();
        assert!(report.bootstrapped);
        assert_eq!(report.cursor, "700");
        assert!(h.chat.posted().await.is_empty());
        assert_eq!(row(&h.roster, "1").await.lock, SendLock::Unlocked);
    }

    #[tokio::test]
    async fn empty_channel_bootstraps_to_zero() {
        let h = harness(&[], 50);
        assert_eq!(h.bridge.bootstrap_cursor(CHANNEL).await.unwrap(), EMPTY_CHANNEL_CURSOR);

        h.chat.push(CHANNEL, ChatMessage::new("5", "42", "!outreach help")).await;
        let report = h.bridge.poll_channel(CHANNEL).await.unwrap();
        assert_eq!(report.processed, 1);
    }

    #[tokio::test]
    async fn processes_in_creation_order_and_advances_cursor() {
        let pending = |seq: &str| with(ready(seq), Column::ApprovalStatus, "PENDING_REVIEW");
        let h = harness(&[pending("1"), pending("2")], 50);
        h.cursors.set_cursor(CHANNEL, "1000").await.unwrap();

        h.chat.push(CHANNEL, ChatMessage::new("999", "42", "!outreach approve 2")).await;
        h.chat.push(CHANNEL, ChatMessage::new("1002", "42", "!outreach reject 1")).await;
        h.chat.push(CHANNEL, ChatMessage::new("1001", "42", "!outreach approve 1")).await;
        h.chat.push(CHANNEL, ChatMessage::new("1003", "9", "just chatting")).await;

        let report = h.bridge.poll_channel(CHANNEL).await.unwrap();
        assert_eq!(report.fetched, 3);
        assert_eq!(report.processed, 2);
        assert_eq!(report.cursor, "1003");
        assert_eq!(cursor(&h).await.as_deref(), Some("1003"));

        // 1001 approve then 1002 reject: reject wins.
        assert_eq!(row(&h.roster, "1").await.approval, ApprovalStatus::Rejected);
        // 999 is at or below the cursor.
        assert_eq!(row(&h.roster, "2").await.approval, ApprovalStatus::PendingReview);

        let posted = h.chat.posted_to(CHANNEL).await;
        assert_eq!(posted, vec!["Approved 1 row(s): 1", "Rejected 1 row(s): 1"]);
    }

    #[tokio::test]
    async fn never_reprocesses_at_or_below_cursor() {
        let h = harness(&[ready("1")], 50);
        h.cursors.set_cursor(CHANNEL, "10").await.unwrap();
        h.chat.push(CHANNEL, ChatMessage::new("11", "42", "!outreach lock 1")).await;

        h.bridge.poll_channel(CHANNEL).await.unwrap();
        let again = h.bridge.poll_channel(CHANNEL).await.unwrap();

        assert_eq!(again.fetched, 0);
        assert_eq!(again.cursor, "11");
        assert_eq!(h.chat.posted().await.len(), 1);
    }

    #[tokio::test]
    async fn bot_messages_are_ignored() {
        let h = harness(&[ready("1")], 50);
        h.cursors.set_cursor(CHANNEL, "10").await.unwrap();
        h.chat
            .push(CHANNEL, ChatMessage::new("11", "42", "!outreach lock 1").from_bot())
            .await;

        let report = h.bridge.poll_channel(CHANNEL).await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.cursor, "11");
        assert_eq!(row(&h.roster, "1").await.lock, SendLock::Unlocked);
    }

    #[tokio::test]
    async fn page_size_bounds_each_poll() {
        let h = harness(&[], 2);
        h.cursors.set_cursor(CHANNEL, "10").await.unwrap();
        for id in ["11", "12", "13"] {
            h.chat.push(CHANNEL, ChatMessage::new(id, "42", "!outreach help")).await;
        }

        let first = h.bridge.poll_channel(CHANNEL).await.unwrap();
        assert_eq!((first.processed, first.cursor.as_str()), (2, "12"));
        let second = h.bridge.poll_channel(CHANNEL).await.unwrap();
        assert_eq!((second.processed, second.cursor.as_str()), (1, "13"));
    }

    #[tokio::test]
    async fn failing_command_still_advances_cursor() {
        let h = harness(&[ready("1")], 50);
        h.cursors.set_cursor(CHANNEL, "10").await.unwrap();
        h.chat.push(CHANNEL, ChatMessage::new("11", "7", "!outreach lock 1")).await;
        h.chat.push(CHANNEL, ChatMessage::new("12", "42", "!outreach explode")).await;

        let report = h.bridge.poll_channel(CHANNEL).await.unwrap();
        assert_eq!(report.cursor, "12");
        let posted = h.chat.posted_to(CHANNEL).await;
        assert_eq!(posted[0], "Unauthorized: <@7> cannot run `lock`.");
        assert_eq!(posted[1], "Unknown command `explode`. Use `!outreach help`.");
        assert_eq!(row(&h.roster, "1").await.lock, SendLock::Unlocked);
    }

    #[tokio::test]
    async fn fetch_failure_keeps_cursor() {
        let h = harness(&[], 50);
        h.cursors.set_cursor(CHANNEL, "10").await.unwrap();
        h.chat.fail_fetch(CHANNEL).await;

        let err = h.bridge.poll_channel(CHANNEL).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(cursor(&h).await.as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn unpermitted_channel_is_refused() {
        let h = harness(&[], 50);
        let err = h.bridge.poll_channel("300").await.unwrap_err();
        assert!(matches!(err, Error::Command(CommandError::ChannelNotPermitted(_))));
        assert!(h.cursors.get_cursor("300").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn poll_all_isolates_channel_failures() {
        let h = harness(&[], 50);
        h.cursors.set_cursor(CHANNEL, "10").await.unwrap();
        h.cursors.set_cursor("200", "10").await.unwrap();
        h.chat.fail_fetch(CHANNEL).await;
        h.chat.push("200", ChatMessage::new("11", "9", "!outreach help")).await;

        assert_eq!(h.bridge.poll_all().await, 1);
        assert_eq!(h.chat.posted_to("200").await.len(), 1);
    }
}
