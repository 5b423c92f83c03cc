//! Persistence layer: the roster table and the per-channel command cursors.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use memory::MemoryStore;
pub use traits::{CursorStore, SheetStore};
