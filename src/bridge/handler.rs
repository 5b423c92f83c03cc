//! Command execution against the roster and the engines.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::{error, info, warn};

use crate::bridge::command::{Access, Command, Invocation, access, help_text};
use crate::config::{CHAT_MESSAGE_LIMIT, OutreachConfig};
use crate::engine::{ReplySyncEngine, SendEngine, SendOptions};
use crate::error::{CommandError, Error, Result};
use crate::guardrail::{GuardrailCheck, is_actionable, is_sendable};
use crate::roster::columns::Column;
use crate::roster::{ApprovalStatus, Roster, RowUpdate, SendLock, Stage};
use crate::util::truncate;

pub struct CommandHandler {
    config: Arc<OutreachConfig>,
    roster: Arc<Roster>,
    send: Arc<SendEngine>,
    replies: Arc<ReplySyncEngine>,
    today: Option<NaiveDate>,
}

impl CommandHandler {
    pub fn new(
        config: Arc<OutreachConfig>,
        roster: Arc<Roster>,
        send: Arc<SendEngine>,
        replies: Arc<ReplySyncEngine>,
    ) -> Self {
        Self {
            config,
            roster,
            send,
            replies,
            today: None,
        }
    }

    /// Pin the date used for guardrail evaluation.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Reply to one command message. `rest` is the text after the prefix.
    ///
    /// Never fails: every error becomes the reply text.
    pub async fn handle(&self, author_id: &str, rest: &str) -> String {
        let prefix = self.config.command_prefix.as_str();
        match self.dispatch(author_id, rest).await {
            Ok(reply) => reply,
            Err(Error::Command(e @ CommandError::UnknownCommand(_))) => {
                format!("{e} Use `{prefix} help`.")
            }
            Err(Error::Command(e @ CommandError::Unauthorized { .. })) => {
                warn!(author = author_id, error = %e, "Unauthorized command");
                e.to_string()
            }
            Err(Error::Command(e)) => e.to_string(),
            Err(e) => {
                error!(author = author_id, error = %e, "Command failed");
                truncate(&format!("Command failed: {e}"), CHAT_MESSAGE_LIMIT)
            }
        }
    }

    async fn dispatch(&self, author_id: &str, rest: &str) -> Result<String> {
        let prefix = self.config.command_prefix.as_str();
        let Some(invocation) = Invocation::parse(rest) else {
            return Ok(format!("Usage: {prefix} help"));
        };
        let Some(class) = access(&invocation.name) else {
            return Err(CommandError::UnknownCommand(invocation.name).into());
        };
        if class == Access::Mutating && !self.config.is_allowed_user(author_id) {
            return Err(CommandError::Unauthorized {
                command: invocation.name,
                user: author_id.to_string(),
            }
            .into());
        }

        let command = Command::parse(&invocation, prefix)?;
        info!(author = author_id, command = command.name(), "Executing command");
        self.execute(command).await
    }

    /// Run a parsed, already authorized command.
    pub async fn execute(&self, command: Command) -> Result<String> {
        match command {
            Command::Help => Ok(help_text(&self.config.command_prefix)),
            Command::Status => self.status().await,
            Command::Queue { limit } => self.queue(limit).await,
            Command::Row { sequence } => self.row_detail(&sequence).await,
            Command::Next { limit } => self.next(limit).await,
            Command::Approve(sequences) => {
                self.batch(&sequences, Column::ApprovalStatus, ApprovalStatus::Approved.as_str(), "Approved")
                    .await
            }
            Command::Reject(sequences) => {
                self.batch(&sequences, Column::ApprovalStatus, ApprovalStatus::Rejected.as_str(), "Rejected")
                    .await
            }
            Command::Unlock(sequences) => {
                self.batch(&sequences, Column::SendLock, SendLock::Unlocked.as_str(), "Unlocked")
                    .await
            }
            Command::Lock(sequences) => {
                self.batch(&sequences, Column::SendLock, SendLock::Locked.as_str(), "Locked")
                    .await
            }
            Command::RunSend { dry_run } => {
                let mut options = SendOptions::from_config(&self.config, self.today());
                options.dry_run |= dry_run;
                Ok(self.send.run(options).await?.render())
            }
            Command::RunReplies => Ok(self.replies.run().await?.render()),
        }
    }

    async fn status(&self) -> Result<String> {
        let snapshot = self.roster.load().await?;
        let today = self.today();

        let mut approval: BTreeMap<String, usize> = BTreeMap::new();
        let mut lock: BTreeMap<String, usize> = BTreeMap::new();
        let mut send: BTreeMap<String, usize> = BTreeMap::new();
        let mut reply: BTreeMap<String, usize> = BTreeMap::new();
        for row in &snapshot.rows {
            *approval.entry(row.approval.to_string()).or_default() += 1;
            *lock.entry(row.lock.to_string()).or_default() += 1;
            *send.entry(row.send_status.to_string()).or_default() += 1;
            *reply.entry(row.reply_status.to_string()).or_default() += 1;
        }
        let sendable = snapshot
            .rows
            .iter()
            .filter(|row| is_sendable(row, today))
            .count();

        let counts = |label: &str, map: &BTreeMap<String, usize>| {
            let parts: Vec<String> = map.iter().map(|(k, v)| format!("{k}={v}")).collect();
            format!("{label}: {}", if parts.is_empty() { "-".into() } else { parts.join(", ") })
        };

        Ok([
            format!(
                "**Roster status** ({} rows, {} sendable {})",
                snapshot.rows.len(),
                sendable,
                today
            ),
            counts("approval", &approval),
            counts("lock", &lock),
            counts("send", &send),
            counts("reply", &reply),
        ]
        .join("\n"))
    }

    async fn queue(&self, limit: usize) -> Result<String> {
        let snapshot = self.roster.load().await?;
        let rows = snapshot.by_sequence();
        if rows.is_empty() {
            return Ok("Roster is empty.".into());
        }
        let shown: Vec<String> = rows.iter().take(limit).map(|row| row.summary_line()).collect();
        Ok(format!(
            "**Queue** ({} of {})\n{}",
            shown.len(),
            rows.len(),
            shown.join("\n")
        ))
    }

    async fn next(&self, limit: usize) -> Result<String> {
        let snapshot = self.roster.load().await?;
        let rows: Vec<String> = snapshot
            .by_sequence()
            .into_iter()
            .filter(|row| is_actionable(row))
            .take(limit)
            .map(|row| row.summary_line())
            .collect();
        if rows.is_empty() {
            return Ok("No actionable rows.".into());
        }
        Ok(format!("**Next actionable** ({})\n{}", rows.len(), rows.join("\n")))
    }

    async fn row_detail(&self, sequence: &str) -> Result<String> {
        let snapshot = self.roster.load().await?;
        let Some(row) = snapshot.find(sequence) else {
            return Ok(format!("Row `{sequence}` not found."));
        };
        let or_dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };

        let mut lines = vec![
            row.summary_line(),
            format!("thread: {}", or_dash(&row.thread_reference)),
            format!(
                "last sent: {} | last reply: {} | next follow-up: {}",
                or_dash(&row.last_sent_at),
                or_dash(&row.last_reply_at),
                or_dash(&row.next_followup_date)
            ),
        ];
        for stage in Stage::ALL {
            let content = row.stage(stage);
            lines.push(format!(
                "{} {} [{}] {}",
                stage,
                or_dash(&content.date),
                content.status,
                or_dash(&content.subject)
            ));
        }
        let verdict = match GuardrailCheck::evaluate(row, self.today()).first_failure() {
            None => "yes".to_string(),
            Some(clause) => format!("no ({clause})"),
        };
        lines.push(format!("sendable today: {verdict}"));
        Ok(lines.join("\n"))
    }

    /// Set one column on every named row under the roster lock.
    async fn batch(
        &self,
        sequences: &[String],
        column: Column,
        value: &str,
        verb: &str,
    ) -> Result<String> {
        let _guard = self.roster.lock().await;
        let snapshot = self.roster.load().await?;
        let update = RowUpdate::new().set(column, value);

        let mut updated = Vec::new();
        let mut missing = Vec::new();
        for sequence in sequences {
            match snapshot.find(sequence) {
                Some(row) => {
                    self.roster
                        .apply(&snapshot.columns, row.record, &update)
                        .await?;
                    updated.push(sequence.as_str());
                }
                None => missing.push(sequence.as_str()),
            }
        }
        info!(column = %column, value, updated = updated.len(), missing = missing.len(), "Batch update");

        let mut reply = format!("{verb} {} row(s)", updated.len());
        if !updated.is_empty() {
            reply.push_str(&format!(": {}", updated.join(", ")));
        }
        if !missing.is_empty() {
            reply.push_str(&format!("\nNot found: {}", missing.join(", ")));
        }
        Ok(reply)
    }
}
