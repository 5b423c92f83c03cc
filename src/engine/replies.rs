//! Reply sync: flag rows whose outreach thread has grown past our own message.
//!
//! Detection is a heuristic. A thread with more than one message counts as
//! replied, so a second outbound message in the same thread is indistinguishable
//! from an inbound reply. The transport's thread count is taken at face value.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::engine::note_error;
use crate::error::{ConfigError, Result};
use crate::notifier::Notifier;
use crate::roster::columns::Column;
use crate::roster::{ApprovalStatus, ReplyStatus, Roster, Row, RowUpdate};
use crate::transport::MailTransport;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyReport {
    /// One line per newly detected reply.
    pub replied: Vec<String>,
    /// One line per thread that could not be read.
    pub errors: Vec<String>,
    /// Threads inspected.
    pub checked: usize,
}

impl ReplyReport {
    pub fn title(&self) -> String {
        let mut title = format!(
            "Reply sync: {} new repl{} / {} checked",
            self.replied.len(),
            if self.replied.len() == 1 { "y" } else { "ies" },
            self.checked
        );
        if !self.errors.is_empty() {
            title.push_str(&format!(", {} fetch error(s)", self.errors.len()));
        }
        title
    }

    pub fn lines(&self) -> Vec<String> {
        self.replied
            .iter()
            .chain(self.errors.iter())
            .cloned()
            .collect()
    }

    pub fn render(&self) -> String {
        let mut out = self.title();
        for line in self.lines() {
            out.push_str("\n- ");
            out.push_str(&line);
        }
        out
    }
}

/// Rows worth a thread lookup.
fn awaiting_reply(row: &Row) -> bool {
    !row.thread_reference.is_empty() && !row.reply_status.is_replied()
}

/// Cells written when a reply is detected. Sends stop until a human re-approves.
pub fn replied_update(now: &str) -> RowUpdate {
    RowUpdate::new()
        .set(Column::ReplyStatus, ReplyStatus::REPLIED)
        .set(Column::LastReplyAt, now)
        .set(Column::ApprovalStatus, ApprovalStatus::PendingReview.as_str())
        .set(Column::NextFollowupDate, "")
}

pub struct ReplySyncEngine {
    roster: Arc<Roster>,
    mailer: Option<Arc<dyn MailTransport>>,
    notifier: Arc<Notifier>,
}

impl ReplySyncEngine {
    pub fn new(
        roster: Arc<Roster>,
        mailer: Option<Arc<dyn MailTransport>>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            roster,
            mailer,
            notifier,
        }
    }

    /// One invocation. A failed thread lookup is reported and the run goes on.
    pub async fn run(&self) -> Result<ReplyReport> {
        let _guard = self.roster.lock().await;

        let Some(mailer) = self.mailer.as_ref() else {
            return Err(ConfigError::MissingRequired {
                key: "IMAP_HOST".into(),
                hint: "reply sync reads threads over IMAP".into(),
            }
            .into());
        };

        let snapshot = self.roster.load().await?;
        let mut report = ReplyReport::default();

        let awaiting: Vec<&Row> = snapshot.rows.iter().filter(|row| awaiting_reply(row)).collect();
        let thread_ids: Vec<String> = awaiting.iter().map(|row| row.thread_reference.clone()).collect();
        let threads = if thread_ids.is_empty() {
            Vec::new()
        } else {
            mailer.fetch_threads(&thread_ids).await
        };

        for (row, fetched) in awaiting.into_iter().zip(threads) {
            report.checked += 1;
            let thread = match fetched {
                Ok(thread) => thread,
                Err(e) => {
                    warn!(sequence = %row.sequence, error = %e, "Thread fetch failed");
                    report
                        .errors
                        .push(format!("#{} thread fetch failed: {}", row.sequence, note_error(&e)));
                    continue;
                }
            };

            if thread.message_count <= 1 {
                debug!(sequence = %row.sequence, "No reply yet");
                continue;
            }

            let now = Utc::now().to_rfc3339();
            self.roster
                .apply(&snapshot.columns, row.record, &replied_update(&now))
                .await?;
            info!(sequence = %row.sequence, messages = thread.message_count, "Reply detected");
            report.replied.push(format!(
                "#{} {} replied (thread has {} messages), back to review",
                row.sequence, row.recipient, thread.message_count
            ));
        }

        info!(
            checked = report.checked,
            replied = report.replied.len(),
            errors = report.errors.len(),
            "Reply sync complete"
        );

        if !report.replied.is_empty() || !report.errors.is_empty() {
            self.notifier
                .notify(&report.title(), &report.lines(), !report.replied.is_empty())
                .await;
        }

        Ok(report)
    }
}
