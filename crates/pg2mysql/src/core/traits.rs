//! The database capability interface shared by every dialect adapter.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::config::Flavor;
use crate::core::batch::{RowBatchSender, RowBatcher};
use crate::core::schema::SchemaRow;
use crate::core::value::SqlValue;
use crate::error::Result;

/// One live connection to a source or destination database.
///
/// Engines only talk to databases through this trait, so every dialect
/// difference (identifier quoting, parameter markers, NULL-safe comparison,
/// UUID storage, timestamp resolution) lives behind it.
#[async_trait]
pub trait Database: Send {
    /// Dialect of this connection.
    fn flavor(&self) -> Flavor;

    /// Introspect the column metadata of every base table.
    async fn schema_rows(&mut self) -> Result<Vec<SchemaRow>>;

    /// Suspend referential-integrity checks on this connection.
    async fn disable_constraints(&mut self) -> Result<()>;

    /// Restore referential-integrity checks on this connection.
    async fn enable_constraints(&mut self) -> Result<()>;

    /// Quote an identifier for use in generated SQL.
    fn quote_ident(&self, name: &str) -> String;

    /// Expression selecting `column` of declared type `data_type`.
    ///
    /// Adapters wrap columns they cannot decode natively so they arrive as text.
    fn select_expression(&self, column: &str, _data_type: &str) -> String {
        self.quote_ident(column)
    }

    /// Parameter placeholder for the zero-based parameter `index`.
    fn parameter_marker(&self, index: usize) -> String;

    /// Placeholder that accepts canonical UUID text and stores it in this
    /// dialect's UUID representation.
    fn binary_uuid_marker(&self, index: usize) -> String {
        self.parameter_marker(index)
    }

    /// NULL-safe equality predicate between `column` and parameter `index`.
    ///
    /// `source_type` is the declared type of the source column feeding the
    /// parameter, so UUID values can be compared against binary storage.
    fn comparison_clause(&self, index: usize, column: &str, source_type: &str) -> String;

    /// Bring a timestamp to the resolution this database stores.
    fn normalize_time(&self, t: NaiveDateTime) -> NaiveDateTime {
        t
    }

    /// Run a statement returning rows.
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Vec<SqlValue>>>;

    /// Run a statement and send its rows to `tx` in batches of `batch_size`.
    ///
    /// Returns the number of rows sent. Adapters override this to read from
    /// the server incrementally; the default runs [`Database::query`].
    async fn stream_rows(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        batch_size: usize,
        tx: RowBatchSender,
    ) -> Result<u64> {
        let rows = self.query(sql, params).await?;
        let mut batcher = RowBatcher::new(tx, batch_size);
        for row in rows {
            batcher.push(row).await?;
        }
        batcher.finish().await
    }

    /// Run a statement returning the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Remove every row from `table`.
    async fn truncate(&mut self, table: &str) -> Result<()> {
        let sql = format!("TRUNCATE TABLE {}", self.quote_ident(table));
        self.execute(&sql, &[]).await?;
        Ok(())
    }

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;
}
