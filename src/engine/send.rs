//! Send engine: one bounded pass over the roster, sending every due touch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use crate::config::OutreachConfig;
use crate::engine::{append_note, note_error};
use crate::error::{ConfigError, Result, TransportError};
use crate::guardrail::GuardrailCheck;
use crate::notifier::Notifier;
use crate::roster::columns::{Column, StageField};
use crate::roster::{ActiveTouch, Roster, Row, RowUpdate, SendStatus, Stage};
use crate::transport::{MailTransport, OutboundMail, SentMail};

/// Parameters of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    /// Attempts (successful or failed) allowed in this invocation.
    pub max_count: usize,
    /// Evaluate and report only; nothing is sent or written.
    pub dry_run: bool,
    pub today: NaiveDate,
}

impl SendOptions {
    pub fn from_config(config: &OutreachConfig, today: NaiveDate) -> Self {
        Self {
            max_count: config.max_sends,
            dry_run: !config.send_enabled,
            today,
        }
    }
}

/// Outcome of one invocation: one line per attempted row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    pub sent: Vec<String>,
    pub failed: Vec<String>,
    /// Eligible rows left for the next run because the cap was reached.
    pub deferred: usize,
    pub dry_run: bool,
    /// The run stopped early because a roster write failed.
    pub halted: bool,
}

impl SendReport {
    pub fn attempts(&self) -> usize {
        self.sent.len() + self.failed.len()
    }

    pub fn title(&self) -> String {
        let mut title = if self.dry_run {
            format!("Outreach send (dry run): {} would send", self.sent.len())
        } else {
            format!(
                "Outreach send: {} sent / {} failed",
                self.sent.len(),
                self.failed.len()
            )
        };
        if self.deferred > 0 {
            title.push_str(&format!(", {} deferred to next run", self.deferred));
        }
        if self.halted {
            title.push_str(", stopped on roster write failure");
        }
        title
    }

    pub fn lines(&self) -> Vec<String> {
        self.sent
            .iter()
            .chain(self.failed.iter())
            .cloned()
            .collect()
    }

    /// Chat rendering: title plus bullets.
    pub fn render(&self) -> String {
        if self.attempts() == 0 && self.deferred == 0 {
            return format!("{}\nNothing due.", self.title());
        }
        let mut out = self.title();
        for line in self.lines() {
            out.push_str("\n- ");
            out.push_str(&line);
        }
        out
    }
}

/// Cells written after a successful send of `stage`.
pub fn sent_update(row: &Row, stage: Stage, sent: &SentMail, now: &str) -> RowUpdate {
    let content = row.stage(stage);
    let mut update = RowUpdate::new()
        .set(Column::Stage(stage, StageField::Status), SendStatus::Sent.as_str())
        .set(
            Column::Stage(stage, StageField::Notes),
            append_note(&content.notes, &format!("{now} sent {}", sent.message_id)),
        )
        .set(Column::LastSentAt, now);

    if row.thread_reference.is_empty() {
        update = update.set(Column::ThreadReference, sent.thread_id.clone());
    }

    match stage.next() {
        Some(next) => update
            .set(Column::ActiveTouch, next.as_str())
            .set(Column::SendStatus, SendStatus::NotSent.as_str())
            .set(Column::NextFollowupDate, row.stage(next).date.clone()),
        None => update
            .set(Column::ActiveTouch, ActiveTouch::Complete.as_str())
            .set(Column::SendStatus, SendStatus::Sent.as_str())
            .set(Column::NextFollowupDate, ""),
    }
}

/// Cells written after a failed send of `stage`. The touch stays active.
pub fn failed_update(row: &Row, stage: Stage, error: &TransportError, now: &str) -> RowUpdate {
    let content = row.stage(stage);
    RowUpdate::new()
        .set(Column::SendStatus, SendStatus::Failed.as_str())
        .set(Column::Stage(stage, StageField::Status), SendStatus::Failed.as_str())
        .set(
            Column::Stage(stage, StageField::Notes),
            append_note(&content.notes, &format!("{now} send failed: {}", note_error(error))),
        )
}

pub struct SendEngine {
    roster: Arc<Roster>,
    mailer: Option<Arc<dyn MailTransport>>,
    notifier: Arc<Notifier>,
    delay: Duration,
}

impl SendEngine {
    /// `mailer` may be absent; only dry runs are possible then.
    pub fn new(
        roster: Arc<Roster>,
        mailer: Option<Arc<dyn MailTransport>>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            roster,
            mailer,
            notifier,
            delay: Duration::ZERO,
        }
    }

    /// Fixed pause between two attempts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// One invocation. Rows are visited in store order.
    ///
    /// Fails before any send when the roster header is incomplete or, for a
    /// live run, when no mail transport is configured. Per-row transport
    /// failures are recorded on the row and in the report. A failed roster
    /// write stops the run; what was sent so far is still reported.
    pub async fn run(&self, options: SendOptions) -> Result<SendReport> {
        let _guard = self.roster.lock().await;

        let mailer = match (&self.mailer, options.dry_run) {
            (_, true) => None,
            (Some(mailer), false) => Some(Arc::clone(mailer)),
            (None, false) => {
                return Err(ConfigError::MissingRequired {
                    key: "SMTP_HOST".into(),
                    hint: "live sends need SMTP settings; use a dry run otherwise".into(),
                }
                .into());
            }
        };

        let snapshot = self.roster.load().await?;
        let mut report = SendReport {
            dry_run: options.dry_run,
            ..Default::default()
        };

        for row in &snapshot.rows {
            let check = GuardrailCheck::evaluate(row, options.today);
            if let Some(clause) = check.first_failure() {
                debug!(sequence = %row.sequence, reason = %clause, "Guardrail skip");
                continue;
            }
            let Some((stage, content)) = row.current_content() else {
                continue;
            };

            if report.attempts() >= options.max_count {
                report.deferred += 1;
                continue;
            }

            let Some(mailer) = mailer.as_ref() else {
                report.sent.push(format!(
                    "#{} {} {}: {}",
                    row.sequence, row.recipient, stage, content.subject
                ));
                continue;
            };

            if report.attempts() > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let mail = OutboundMail {
                to: row.recipient.clone(),
                subject: content.subject.clone(),
                body: content.body.clone(),
                thread_reference: Some(row.thread_reference.clone()).filter(|t| !t.is_empty()),
            };
            let now = Utc::now().to_rfc3339();

            let outcome = match mailer.send(mail).await {
                Ok(sent) => {
                    let update = sent_update(row, stage, &sent, &now);
                    match self.roster.apply(&snapshot.columns, row.record, &update).await {
                        Ok(()) => {
                            info!(sequence = %row.sequence, stage = %stage, "Touch sent");
                            report
                                .sent
                                .push(format!("#{} -> {} ({})", row.sequence, row.recipient, stage));
                            Ok(())
                        }
                        Err(e) => Err(format!(
                            "#{} -> {} ({}) sent as {} but not recorded: {}",
                            row.sequence,
                            row.recipient,
                            stage,
                            sent.message_id,
                            note_error(&e)
                        )),
                    }
                }
                Err(e) => {
                    warn!(sequence = %row.sequence, stage = %stage, error = %e, "Touch send failed");
                    let line = format!(
                        "#{} -> {} ({}) FAILED: {}",
                        row.sequence,
                        row.recipient,
                        stage,
                        note_error(&e)
                    );
                    let update = failed_update(row, stage, &e, &now);
                    match self.roster.apply(&snapshot.columns, row.record, &update).await {
                        Ok(()) => {
                            report.failed.push(line);
                            Ok(())
                        }
                        Err(store) => Err(format!("{line}; not recorded: {}", note_error(&store))),
                    }
                }
            };

            // A failed roster write ends the run.
            if let Err(line) = outcome {
                error!(sequence = %row.sequence, stage = %stage, detail = %line, "Roster write failed, stopping run");
                report.failed.push(line);
                report.halted = true;
                break;
            }
        }

        info!(
            sent = report.sent.len(),
            failed = report.failed.len(),
            deferred = report.deferred,
            dry_run = report.dry_run,
            "Send run complete"
        );

        if !report.dry_run && report.attempts() > 0 {
            self.notifier
                .notify(&report.title(), &report.lines(), !report.failed.is_empty())
                .await;
        }

        Ok(report)
    }
}
