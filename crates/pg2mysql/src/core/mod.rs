//! Core abstractions shared by the engines and the dialect adapters.
//!
//! - [`schema`]: table and column metadata built from introspection
//! - [`value`]: dynamic SQL values used at the row boundary
//! - [`traits`]: the [`Database`] capability interface
//! - [`batch`]: batched row delivery over a bounded channel

pub mod batch;
pub mod schema;
pub mod traits;
pub mod value;

pub use batch::{RowBatchReceiver, RowBatchSender, RowBatcher};
pub use schema::{Column, Schema, SchemaRow, Table, IDENTITY_COLUMN};
pub use traits::Database;
pub use value::SqlValue;
