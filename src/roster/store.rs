//! Roster accessor: translates between positional records and typed rows.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::{ConfigError, Result};
use crate::roster::columns::{Column, ColumnMap, StageField};
use crate::roster::model::{
    ActiveTouch, ApprovalStatus, ReplyStatus, Row, SendLock, SendStatus, Stage, StageContent,
};
use crate::store::SheetStore;
use crate::util::compare_ids;

/// Pending cell writes for one row, applied in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowUpdate {
    cells: Vec<(Column, String)>,
}

impl RowUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: Column, value: impl Into<String>) -> Self {
        self.cells.push((column, value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Column, String)> {
        self.cells.iter()
    }
}

/// Rows as read at one instant, plus the column map used to read them.
#[derive(Debug, Clone)]
pub struct RosterSnapshot {
    pub columns: ColumnMap,
    /// In store order.
    pub rows: Vec<Row>,
}

impl RosterSnapshot {
    pub fn find(&self, sequence: &str) -> Option<&Row> {
        let sequence = sequence.trim();
        self.rows.iter().find(|row| row.sequence == sequence)
    }

    /// Rows ordered by sequence key (shorter keys first, then lexicographic).
    pub fn by_sequence(&self) -> Vec<&Row> {
        let mut rows: Vec<&Row> = self.rows.iter().collect();
        rows.sort_by(|a, b| match compare_ids(&a.sequence, &b.sequence) {
            Ordering::Equal => a.record.cmp(&b.record),
            other => other,
        });
        rows
    }
}

/// Translate one positional record into a typed row.
pub fn parse_row(columns: &ColumnMap, record: usize, cells: &[String]) -> Row {
    let cell = |column: Column| columns.cell(cells, column).trim().to_string();
    let stage_content = |stage: Stage| StageContent {
        date: cell(Column::Stage(stage, StageField::Date)),
        subject: cell(Column::Stage(stage, StageField::Subject)),
        body: columns
            .cell(cells, Column::Stage(stage, StageField::Body))
            .to_string(),
        status: SendStatus::from_cell(&cell(Column::Stage(stage, StageField::Status))),
        notes: columns
            .cell(cells, Column::Stage(stage, StageField::Notes))
            .to_string(),
    };

    Row {
        record,
        sequence: cell(Column::Sequence),
        recipient: cell(Column::Recipient),
        approval: ApprovalStatus::from_cell(&cell(Column::ApprovalStatus)),
        lock: SendLock::from_cell(&cell(Column::SendLock)),
        active_touch: ActiveTouch::from_cell(&cell(Column::ActiveTouch)),
        send_status: SendStatus::from_cell(&cell(Column::SendStatus)),
        reply_status: ReplyStatus::from_cell(&cell(Column::ReplyStatus)),
        thread_reference: cell(Column::ThreadReference),
        last_sent_at: cell(Column::LastSentAt),
        last_reply_at: cell(Column::LastReplyAt),
        next_followup_date: cell(Column::NextFollowupDate),
        stages: Stage::ALL.map(stage_content),
    }
}

/// The roster behind an advisory lock.
///
/// Every scheduled invocation holds [`Roster::lock`] for its whole run so
/// that two functions never interleave partial writes to the same rows.
pub struct Roster {
    sheet: Arc<dyn SheetStore>,
    lock: Mutex<()>,
}

impl Roster {
    pub fn new(sheet: Arc<dyn SheetStore>) -> Self {
        Self {
            sheet,
            lock: Mutex::new(()),
        }
    }

    /// Acquire the advisory invocation lock.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    /// Validate the header and return the column map.
    pub async fn check_columns(&self) -> Result<ColumnMap> {
        let records = self.sheet.read_records().await?;
        let header = records.first().map(Vec::as_slice).unwrap_or(&[]);
        Ok(ColumnMap::from_header(header)?)
    }

    /// Read every row. Records with a blank sequence key are ignored.
    pub async fn load(&self) -> Result<RosterSnapshot> {
        let records = self.sheet.read_records().await?;
        let Some((header, body)) = records.split_first() else {
            return Err(ConfigError::MissingColumns(Column::default_header()).into());
        };
        let columns = ColumnMap::from_header(header)?;

        let rows: Vec<Row> = body
            .iter()
            .enumerate()
            .map(|(i, cells)| parse_row(&columns, i + 1, cells))
            .filter(|row| !row.sequence.is_empty())
            .collect();

        debug!(rows = rows.len(), "Roster snapshot loaded");
        Ok(RosterSnapshot { columns, rows })
    }

    /// Write the cells of an update to one record in a single store call.
    pub async fn apply(&self, columns: &ColumnMap, record: usize, update: &RowUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        let cells: Vec<(usize, String)> = update
            .iter()
            .map(|(column, value)| (columns.offset(*column), value.clone()))
            .collect();
        self.sheet.write_cells(record, &cells).await?;
        Ok(())
    }

    /// Replace the roster with imported records (header first).
    ///
    /// Blank gate and state cells are filled with the fresh-row defaults, so an
    /// imported row always starts pending review and locked. Sequence keys must
    /// be unique; a table repeating one is rejected whole.
    pub async fn import(&self, mut records: Vec<Vec<String>>) -> Result<usize> {
        let Some(header) = records.first() else {
            return Err(ConfigError::MissingColumns(Column::default_header()).into());
        };
        let columns = ColumnMap::from_header(header)?;
        let width = columns.width();

        let defaults = [
            (Column::ApprovalStatus, ApprovalStatus::PendingReview.as_str()),
            (Column::SendLock, SendLock::Locked.as_str()),
            (Column::ActiveTouch, Stage::Touch1.as_str()),
            (Column::SendStatus, SendStatus::NotSent.as_str()),
            (Column::ReplyStatus, ReplyStatus::NoReply.as_str()),
        ];

        let mut seen = HashSet::new();
        let mut duplicates = BTreeSet::new();
        for cells in records.iter().skip(1) {
            let sequence = columns.cell(cells, Column::Sequence).trim();
            if !sequence.is_empty() && !seen.insert(sequence) {
                duplicates.insert(sequence.to_string());
            }
        }
        if !duplicates.is_empty() {
            let keys: Vec<String> = duplicates.into_iter().collect();
            return Err(ConfigError::InvalidValue {
                key: Column::Sequence.name(),
                message: format!("duplicate sequence keys: {}", keys.join(", ")),
            }
            .into());
        }

        let mut imported = 0;
        for cells in records.iter_mut().skip(1) {
            if columns.cell(cells, Column::Sequence).trim().is_empty() {
                continue;
            }
            if cells.len() < width {
                cells.resize(width, String::new());
            }
            for (column, default) in defaults {
                let offset = columns.offset(column);
                if cells[offset].trim().is_empty() {
                    cells[offset] = default.to_string();
                }
            }
            imported += 1;
        }

        self.sheet.replace_records(&records).await?;
        info!(rows = imported, "Roster imported");
        Ok(imported)
    }
}
