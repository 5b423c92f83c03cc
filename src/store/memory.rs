//! In-memory store used by tests and dry experimentation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::traits::{CursorStore, SheetStore};

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<Vec<String>>>,
    cursors: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with a table, header first.
    pub fn with_records(records: Vec<Vec<String>>) -> Self {
        Self {
            records: RwLock::new(records),
            cursors: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SheetStore for MemoryStore {
    async fn read_records(&self) -> Result<Vec<Vec<String>>, StoreError> {
        Ok(self.records.read().await.clone())
    }

    async fn write_cells(
        &self,
        record: usize,
        cells: &[(usize, String)],
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let len = records.len();
        let row = records
            .get_mut(record)
            .ok_or(StoreError::RecordOutOfRange { record, len })?;
        for (column, value) in cells {
            if row.len() <= *column {
                row.resize(column + 1, String::new());
            }
            row[*column] = value.clone();
        }
        Ok(())
    }

    async fn replace_records(&self, records: &[Vec<String>]) -> Result<(), StoreError> {
        *self.records.write().await = records.to_vec();
        Ok(())
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn get_cursor(&self, channel_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.cursors.read().await.get(channel_id).cloned())
    }

    async fn set_cursor(&self, channel_id: &str, message_id: &str) -> Result<(), StoreError> {
        self.cursors
            .write()
            .await
            .insert(channel_id.to_string(), message_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_cell_pads_short_records() {
        let store = MemoryStore::with_records(vec![vec!["a".into(), "b".into(), "c".into()], vec![]]);
        store.write_cell(1, 2, "x").await.unwrap();
        let records = store.read_records().await.unwrap();
        assert_eq!(records[1], vec!["".to_string(), "".to_string(), "x".to_string()]);
    }

    #[tokio::test]
    async fn write_cells_updates_one_record() {
        let store = MemoryStore::with_records(vec![vec!["a".into(), "b".into()], vec!["1".into()]]);
        store
            .write_cells(1, &[(1, "x".into()), (3, "y".into())])
            .await
            .unwrap();
        let records = store.read_records().await.unwrap();
        assert_eq!(records[1], vec!["1", "x", "", "y"]);
    }

    #[tokio::test]
    async fn write_cell_rejects_missing_record() {
        let store = MemoryStore::new();
        let err = store.write_cell(3, 0, "x").await.unwrap_err();
        assert!(matches!(err, StoreError::RecordOutOfRange { record: 3, len: 0 }));
    }

    #[tokio::test]
    async fn cursors_round_trip_per_channel() {
        let store = MemoryStore::new();
        assert_eq!(store.get_cursor("1").await.unwrap(), None);
        store.set_cursor("1", "100").await.unwrap();
        store.set_cursor("2", "200").await.unwrap();
        store.set_cursor("1", "150").await.unwrap();
        assert_eq!(store.get_cursor("1").await.unwrap().as_deref(), Some("150"));
        assert_eq!(store.get_cursor("2").await.unwrap().as_deref(), Some("200"));
    }
}
