//! Typed roster rows: approval gates, touch stages, and per-stage content.
//!
//! Cells arrive from the store as free text. Parsing is lenient and always
//! falls back to the value that blocks sending, so an unexpected cell can
//! never unlock an outbound touch.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Human-owned review gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    PendingReview,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingReview => "PENDING_REVIEW",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Parse a cell. Blank or unknown values read as `PendingReview`.
    pub fn from_cell(cell: &str) -> Self {
        match normalize(cell).as_str() {
            "APPROVED" => Self::Approved,
            "REJECTED" => Self::Rejected,
            _ => Self::PendingReview,
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-owned unlock flag, independent of approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendLock {
    Locked,
    Unlocked,
}

impl SendLock {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Locked => "LOCKED",
            Self::Unlocked => "UNLOCKED",
        }
    }

    /// Parse a cell. Anything other than an explicit unlock reads as `Locked`.
    pub fn from_cell(cell: &str) -> Self {
        match normalize(cell).as_str() {
            "UNLOCKED" => Self::Unlocked,
            _ => Self::Locked,
        }
    }
}

impl fmt::Display for SendLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the fixed outbound touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Touch1,
    Touch2,
    Touch3,
}

impl Stage {
    /// Every stage in send order.
    pub const ALL: [Stage; 3] = [Stage::Touch1, Stage::Touch2, Stage::Touch3];

    /// 1-based position in the sequence.
    pub fn number(&self) -> usize {
        match self {
            Self::Touch1 => 1,
            Self::Touch2 => 2,
            Self::Touch3 => 3,
        }
    }

    pub fn index(&self) -> usize {
        self.number() - 1
    }

    /// The stage that follows this one, if any.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Self::Touch1 => Some(Self::Touch2),
            Self::Touch2 => Some(Self::Touch3),
            Self::Touch3 => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Touch1 => "TOUCH1",
            Self::Touch2 => "TOUCH2",
            Self::Touch3 => "TOUCH3",
        }
    }

    /// Column-name prefix for this stage's content tuple.
    pub fn column_prefix(&self) -> &'static str {
        match self {
            Self::Touch1 => "touch1",
            Self::Touch2 => "touch2",
            Self::Touch3 => "touch3",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pointer to the touch that is currently due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActiveTouch {
    Stage(Stage),
    /// Every stage has been sent.
    Complete,
}

impl ActiveTouch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stage(stage) => stage.as_str(),
            Self::Complete => "COMPLETE",
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage(stage) => Some(*stage),
            Self::Complete => None,
        }
    }

    /// Parse a cell.
    ///
    /// A blank cell is a freshly imported row and points at the first touch.
    /// Unrecognised text reads as `Complete` so nothing is sent for it.
    pub fn from_cell(cell: &str) -> Self {
        match normalize(cell).as_str() {
            "" | "TOUCH1" | "STAGE1" | "1" => Self::Stage(Stage::Touch1),
            "TOUCH2" | "STAGE2" | "2" => Self::Stage(Stage::Touch2),
            "TOUCH3" | "STAGE3" | "3" => Self::Stage(Stage::Touch3),
            _ => Self::Complete,
        }
    }
}

impl fmt::Display for ActiveTouch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the active touch (and, per stage, of that stage's send).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendStatus {
    NotSent,
    Sent,
    Failed,
}

impl SendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotSent => "NOT_SENT",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }

    pub fn from_cell(cell: &str) -> Self {
        match normalize(cell).as_str() {
            "SENT" => Self::Sent,
            "FAILED" => Self::Failed,
            _ => Self::NotSent,
        }
    }
}

impl Default for SendStatus {
    fn default() -> Self {
        Self::NotSent
    }
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the contact has answered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReplyStatus {
    NoReply,
    /// Any `REPLIED_*` label; the engine itself only writes `REPLIED`.
    Replied(String),
}

impl ReplyStatus {
    /// The neutral label written by reply sync.
    pub const REPLIED: &'static str = "REPLIED";

    pub fn replied() -> Self {
        Self::Replied(Self::REPLIED.to_string())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NoReply => "NO_REPLY",
            Self::Replied(label) => label,
        }
    }

    pub fn is_replied(&self) -> bool {
        matches!(self, Self::Replied(_))
    }

    pub fn from_cell(cell: &str) -> Self {
        match normalize(cell).as_str() {
            "" | "NO_REPLY" => Self::NoReply,
            other => Self::Replied(other.to_string()),
        }
    }
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authored content plus mutable outcome for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StageContent {
    /// Scheduled date as written in the store.
    pub date: String,
    pub subject: String,
    pub body: String,
    pub status: SendStatus,
    pub notes: String,
}

impl StageContent {
    /// Parse the scheduled date. Accepts `YYYY-MM-DD` with an optional time suffix.
    pub fn scheduled_date(&self) -> Option<NaiveDate> {
        let raw = self.date.trim();
        let day = raw.get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
    }

    pub fn has_content(&self) -> bool {
        !self.subject.trim().is_empty() && !self.body.trim().is_empty()
    }
}

/// One roster row, translated from its cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Position of this row in the store (the header is record 0).
    pub record: usize,
    pub sequence: String,
    pub recipient: String,
    pub approval: ApprovalStatus,
    pub lock: SendLock,
    pub active_touch: ActiveTouch,
    pub send_status: SendStatus,
    pub reply_status: ReplyStatus,
    pub thread_reference: String,
    pub last_sent_at: String,
    pub last_reply_at: String,
    pub next_followup_date: String,
    pub stages: [StageContent; 3],
}

impl Row {
    /// A freshly imported row: pending review, locked, first touch due.
    pub fn new(record: usize, sequence: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            record,
            sequence: sequence.into(),
            recipient: recipient.into(),
            approval: ApprovalStatus::PendingReview,
            lock: SendLock::Locked,
            active_touch: ActiveTouch::Stage(Stage::Touch1),
            send_status: SendStatus::NotSent,
            reply_status: ReplyStatus::NoReply,
            thread_reference: String::new(),
            last_sent_at: String::new(),
            last_reply_at: String::new(),
            next_followup_date: String::new(),
            stages: Default::default(),
        }
    }

    pub fn stage(&self, stage: Stage) -> &StageContent {
        &self.stages[stage.index()]
    }

    /// Content of the active touch, or `None` once the sequence is complete.
    pub fn current_content(&self) -> Option<(Stage, &StageContent)> {
        self.active_touch
            .stage()
            .map(|stage| (stage, self.stage(stage)))
    }

    /// No further automated touch can fire for this row.
    pub fn is_terminal(&self) -> bool {
        self.active_touch == ActiveTouch::Complete || self.reply_status.is_replied()
    }

    /// One-line listing used by chat replies.
    pub fn summary_line(&self) -> String {
        let due = self
            .current_content()
            .map(|(_, content)| content.date.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "n/a".to_string());
        format!(
            "#{} {} [{}/{}] touch={} send={} reply={} due={}",
            self.sequence,
            if self.recipient.is_empty() { "(no recipient)" } else { &self.recipient },
            self.approval,
            self.lock,
            self.active_touch,
            self.send_status,
            self.reply_status,
            due,
        )
    }
}

fn normalize(cell: &str) -> String {
    cell.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}
