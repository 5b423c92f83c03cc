//! The roster: one row per outreach target, moving through fixed touches.

pub mod columns;
pub mod model;
pub mod store;

pub use columns::{Column, ColumnMap, StageField};
pub use model::{
    ActiveTouch, ApprovalStatus, ReplyStatus, Row, SendLock, SendStatus, Stage, StageContent,
};
pub use store::{Roster, RosterSnapshot, RowUpdate, parse_row};
