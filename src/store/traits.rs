//! Storage seams: the tabular row store and the per-channel cursor store.

use async_trait::async_trait;

use crate::error::StoreError;

/// Tabular store holding the roster.
///
/// Record 0 is the header naming every column; records 1.. are one per row.
/// Cells are addressed positionally; name-to-offset translation happens in
/// [`crate::roster::ColumnMap`].
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Every record, header first. Records may be shorter than the header.
    async fn read_records(&self) -> Result<Vec<Vec<String>>, StoreError>;

    /// Overwrite several cells of one record as a unit: either every cell is
    /// written or none is. Short records are padded with blanks.
    async fn write_cells(&self, record: usize, cells: &[(usize, String)])
    -> Result<(), StoreError>;

    /// Overwrite one cell.
    async fn write_cell(&self, record: usize, column: usize, value: &str) -> Result<(), StoreError> {
        self.write_cells(record, &[(column, value.to_string())]).await
    }

    /// Replace the whole table (bulk import).
    async fn replace_records(&self, records: &[Vec<String>]) -> Result<(), StoreError>;
}

/// Last-processed message id per chat channel.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get_cursor(&self, channel_id: &str) -> Result<Option<String>, StoreError>;

    async fn set_cursor(&self, channel_id: &str, message_id: &str) -> Result<(), StoreError>;
}
