//! libSQL backend for the roster and the channel cursors.
//!
//! The roster is kept cell-per-row in `roster_cells`, keyed by
//! `(record, col)`, so a single-cell write never rewrites its neighbours.
//! `roster_meta.record_count` remembers how many records the table has,
//! including trailing records whose cells are all blank.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::migrations;
use crate::store::traits::{CursorStore, SheetStore};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Pool(format!("Failed to create database directory: {e}"))
                })?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        migrations::run_migrations(&backend.conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to create in-memory database: {e}")))?;

        let backend = Self::from_database(db)?;
        migrations::run_migrations(&backend.conn).await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    async fn record_count(&self) -> Result<usize, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM roster_meta WHERE key = 'record_count'",
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("record_count: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("record_count: {e}")))?;
                Ok(usize::try_from(count).unwrap_or(0))
            }
            Ok(None) => Ok(0),
            Err(e) => Err(StoreError::Query(format!("record_count: {e}"))),
        }
    }
}

fn to_i64(value: usize, what: &str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Serialization(format!("{what} {value} is too large")))
}

#[async_trait]
impl SheetStore for LibSqlBackend {
    async fn read_records(&self) -> Result<Vec<Vec<String>>, StoreError> {
        let count = self.record_count().await?;
        let mut records: Vec<Vec<String>> = vec![Vec::new(); count];

        let mut rows = self
            .conn
            .query(
                "SELECT record, col, value FROM roster_cells ORDER BY record, col",
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("read_records: {e}")))?;

        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("read_records: {e}")))?
        {
            let record: i64 = row.get(0).map_err(|e| StoreError::Query(format!("read_records: {e}")))?;
            let col: i64 = row.get(1).map_err(|e| StoreError::Query(format!("read_records: {e}")))?;
            let value: String = row.get(2).unwrap_or_default();

            let (Ok(record), Ok(col)) = (usize::try_from(record), usize::try_from(col)) else {
                continue;
            };
            let Some(cells) = records.get_mut(record) else {
                continue;
            };
            if cells.len() <= col {
                cells.resize(col + 1, String::new());
            }
            cells[col] = value;
        }

        debug!(records = records.len(), "Roster loaded");
        Ok(records)
    }

    async fn write_cells(
        &self,
        record: usize,
        cells: &[(usize, String)],
    ) -> Result<(), StoreError> {
        let len = self.record_count().await?;
        if record >= len {
            return Err(StoreError::RecordOutOfRange { record, len });
        }
        let record = to_i64(record, "record")?;

        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| StoreError::Query(format!("write_cells: {e}")))?;

        for (column, value) in cells {
            tx.execute(
                "INSERT INTO roster_cells (record, col, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT (record, col) DO UPDATE SET value = ?3",
                params![record, to_i64(*column, "column")?, value.as_str()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("write_cells: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(format!("write_cells: {e}")))?;
        Ok(())
    }

    async fn replace_records(&self, records: &[Vec<String>]) -> Result<(), StoreError> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| StoreError::Query(format!("replace_records: {e}")))?;

        tx.execute("DELETE FROM roster_cells", ())
            .await
            .map_err(|e| StoreError::Query(format!("replace_records: {e}")))?;

        for (record, cells) in records.iter().enumerate() {
            for (col, value) in cells.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                tx.execute(
                    "INSERT INTO roster_cells (record, col, value) VALUES (?1, ?2, ?3)",
                    params![to_i64(record, "record")?, to_i64(col, "column")?, value.as_str()],
                )
                .await
                .map_err(|e| StoreError::Query(format!("replace_records: {e}")))?;
            }
        }

        tx.execute(
            "INSERT INTO roster_meta (key, value) VALUES ('record_count', ?1)
             ON CONFLICT (key) DO UPDATE SET value = ?1",
            params![to_i64(records.len(), "record count")?],
        )
        .await
        .map_err(|e| StoreError::Query(format!("replace_records: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(format!("replace_records: {e}")))?;

        info!(records = records.len(), "Roster replaced");
        Ok(())
    }
}

#[async_trait]
impl CursorStore for LibSqlBackend {
    async fn get_cursor(&self, channel_id: &str) -> Result<Option<String>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT message_id FROM cursors WHERE channel_id = ?1",
                params![channel_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_cursor: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let id: String = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("get_cursor: {e}")))?;
                Ok(Some(id))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get_cursor: {e}"))),
        }
    }

    async fn set_cursor(&self, channel_id: &str, message_id: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO cursors (channel_id, message_id, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (channel_id) DO UPDATE SET message_id = ?2, updated_at = ?3",
                params![channel_id, message_id, now],
            )
            .await
            .map_err(|e| StoreError::Query(format!("set_cursor: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn table() -> Vec<Vec<String>> {
        vec![
            vec!["sequence".into(), "recipient".into(), "notes".into()],
            vec!["1".into(), "a@example.com".into(), "".into()],
            vec!["2".into(), "".into()],
            vec![],
        ]
    }

    #[tokio::test]
    async fn empty_roster_reads_no_records() {
        let db = test_db().await;
        assert!(db.read_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_then_read_keeps_record_positions() {
        let db = test_db().await;
        db.replace_records(&table()).await.unwrap();

        let records = db.read_records().await.unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0][2], "notes");
        assert_eq!(records[1], vec!["1".to_string(), "a@example.com".to_string()]);
        assert_eq!(records[2], vec!["2".to_string()]);
        assert!(records[3].is_empty());
    }

    #[tokio::test]
    async fn write_cell_updates_single_cell() {
        let db = test_db().await;
        db.replace_records(&table()).await.unwrap();

        db.write_cell(2, 2, "hello").await.unwrap();
        db.write_cell(1, 1, "b@example.com").await.unwrap();

        let records = db.read_records().await.unwrap();
        assert_eq!(records[1][1], "b@example.com");
        assert_eq!(records[2], vec!["2".to_string(), "".to_string(), "hello".to_string()]);
    }

    #[tokio::test]
    async fn write_cells_commits_every_cell() {
        let db = test_db().await;
        db.replace_records(&table()).await.unwrap();

        db.write_cells(1, &[(1, "c@example.com".into()), (2, "sent".into())])
            .await
            .unwrap();

        let records = db.read_records().await.unwrap();
        assert_eq!(records[1], vec!["1", "c@example.com", "sent"]);
    }

    #[tokio::test]
    async fn write_cell_out_of_range() {
        let db = test_db().await;
        db.replace_records(&table()).await.unwrap();
        let err = db.write_cell(9, 0, "x").await.unwrap_err();
        assert!(matches!(err, StoreError::RecordOutOfRange { record: 9, len: 4 }));
    }

    #[tokio::test]
    async fn replace_discards_previous_table() {
        let db = test_db().await;
        db.replace_records(&table()).await.unwrap();
        db.replace_records(&[vec!["sequence".into()]]).await.unwrap();
        let records = db.read_records().await.unwrap();
        assert_eq!(records, vec![vec!["sequence".to_string()]]);
    }

    #[tokio::test]
    async fn cursor_upsert() {
        let db = test_db().await;
        assert_eq!(db.get_cursor("42").await.unwrap(), None);
        db.set_cursor("42", "1000").await.unwrap();
        db.set_cursor("42", "1001").await.unwrap();
        assert_eq!(db.get_cursor("42").await.unwrap().as_deref(), Some("1001"));
    }

    #[tokio::test]
    async fn local_file_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("outreach.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.replace_records(&table()).await.unwrap();
            db.set_cursor("7", "77").await.unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert_eq!(db.read_records().await.unwrap().len(), 4);
        assert_eq!(db.get_cursor("7").await.unwrap().as_deref(), Some("77"));
    }
}
