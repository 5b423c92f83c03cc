//! Named roster columns and their positional offsets in the store.

use std::collections::HashMap;
use std::fmt;

use crate::error::ConfigError;
use crate::roster::model::Stage;

/// One field of a stage's `{date, subject, body, status, notes}` tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageField {
    Date,
    Subject,
    Body,
    Status,
    Notes,
}

impl StageField {
    pub const ALL: [StageField; 5] = [
        StageField::Date,
        StageField::Subject,
        StageField::Body,
        StageField::Status,
        StageField::Notes,
    ];

    fn suffix(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Subject => "subject",
            Self::Body => "body",
            Self::Status => "status",
            Self::Notes => "notes",
        }
    }
}

/// Every column the core reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Sequence,
    Recipient,
    ApprovalStatus,
    SendLock,
    ActiveTouch,
    SendStatus,
    ReplyStatus,
    ThreadReference,
    LastSentAt,
    LastReplyAt,
    NextFollowupDate,
    Stage(Stage, StageField),
}

impl Column {
    /// All required columns, in the order a fresh header is written.
    pub fn required() -> Vec<Column> {
        let mut columns = vec![
            Column::Sequence,
            Column::Recipient,
            Column::ApprovalStatus,
            Column::SendLock,
            Column::ActiveTouch,
            Column::SendStatus,
            Column::ReplyStatus,
            Column::ThreadReference,
            Column::LastSentAt,
            Column::LastReplyAt,
            Column::NextFollowupDate,
        ];
        for stage in Stage::ALL {
            for field in StageField::ALL {
                columns.push(Column::Stage(stage, field));
            }
        }
        columns
    }

    /// Header name of this column.
    pub fn name(&self) -> String {
        match self {
            Self::Sequence => "sequence".into(),
            Self::Recipient => "recipient".into(),
            Self::ApprovalStatus => "approval_status".into(),
            Self::SendLock => "send_lock".into(),
            Self::ActiveTouch => "active_touch".into(),
            Self::SendStatus => "send_status".into(),
            Self::ReplyStatus => "reply_status".into(),
            Self::ThreadReference => "thread_reference".into(),
            Self::LastSentAt => "last_sent_at".into(),
            Self::LastReplyAt => "last_reply_at".into(),
            Self::NextFollowupDate => "next_followup_date".into(),
            Self::Stage(stage, field) => format!("{}_{}", stage.column_prefix(), field.suffix()),
        }
    }

    /// The header every valid roster carries, in canonical order.
    pub fn default_header() -> Vec<String> {
        Self::required().iter().map(Column::name).collect()
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Header names are matched trimmed, lowercased, with spaces as underscores.
fn normalize_header(name: &str) -> String {
    name.trim().to_lowercase().replace([' ', '-'], "_")
}

/// Map from column to positional offset, built from the header record.
///
/// Column order in the store is irrelevant; presence of every required column
/// is checked once at construction.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    offsets: HashMap<Column, usize>,
    width: usize,
}

impl ColumnMap {
    /// Build the map, failing with every missing column name.
    pub fn from_header(header: &[String]) -> Result<Self, ConfigError> {
        let positions: HashMap<String, usize> = header
            .iter()
            .enumerate()
            .rev()
            .map(|(i, name)| (normalize_header(name), i))
            .collect();

        let mut offsets = HashMap::new();
        let mut missing = Vec::new();
        for column in Column::required() {
            match positions.get(&column.name()) {
                Some(&offset) => {
                    offsets.insert(column, offset);
                }
                None => missing.push(column.name()),
            }
        }

        if !missing.is_empty() {
            return Err(ConfigError::MissingColumns(missing));
        }

        Ok(Self {
            offsets,
            width: header.len(),
        })
    }

    /// Offset of a column. Every `Column` is present once the map exists.
    pub fn offset(&self, column: Column) -> usize {
        self.offsets.get(&column).copied().unwrap_or(usize::MAX)
    }

    /// Number of header cells.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Read a cell, treating short records as blank.
    pub fn cell<'a>(&self, record: &'a [String], column: Column) -> &'a str {
        record
            .get(self.offset(column))
            .map(String::as_str)
            .unwrap_or("")
    }
}
