//! Row-level building blocks shared by the migration and verification engines.
//!
//! A [`TablePlan`] pairs a source table with its destination table, resolves
//! destination columns by normalized name and renders every statement the
//! engines issue for that pair. Source rows reach the engines in batches
//! over a bounded channel, see [`pipeline`].

use std::future::Future;

use tracing::info;

use crate::compat::SchemaReport;
use crate::config::DiagnosticsConfig;
use crate::core::batch::{row_batch_channel, RowBatchSender};
use crate::core::schema::{Column, Schema, Table, IDENTITY_COLUMN};
use crate::core::traits::Database;
use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};

/// Statements and column mapping for one source/destination table pair.
#[derive(Debug)]
pub struct TablePlan<'a> {
    source: &'a Table,
    target: &'a Table,
    /// Destination column for each source column, in source column order.
    target_columns: Vec<&'a Column>,
    select_sql: String,
    exists_sql: String,
    insert_sql: String,
}

impl<'a> TablePlan<'a> {
    pub fn new(
        source_db: &dyn Database,
        target_db: &dyn Database,
        source: &'a Table,
        target: &'a Table,
    ) -> Result<Self> {
        let target_columns = source
            .columns
            .iter()
            .map(|c| target.column(&c.actual_name))
            .collect::<Result<Vec<_>>>()?;

        let select_sql = format!(
            "SELECT {} FROM {}",
            source_column_list(source_db, source),
            source_db.quote_ident(&source.actual_name)
        );

        let clauses: Vec<String> = source
            .columns
            .iter()
            .zip(&target_columns)
            .enumerate()
            .map(|(i, (src, dst))| target_db.comparison_clause(i, &dst.actual_name, &src.data_type))
            .collect();
        let exists_sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {})",
            target_db.quote_ident(&target.actual_name),
            clauses.join(" AND ")
        );

        let insert_columns: Vec<String> = target_columns
            .iter()
            .map(|c| target_db.quote_ident(&c.actual_name))
            .collect();
        let markers: Vec<String> = source
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                if c.is_uuid() {
                    target_db.binary_uuid_marker(i)
                } else {
                    target_db.parameter_marker(i)
                }
            })
            .collect();
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            target_db.quote_ident(&target.actual_name),
            insert_columns.join(", "),
            markers.join(", ")
        );

        Ok(Self {
            source,
            target,
            target_columns,
            select_sql,
            exists_sql,
            insert_sql,
        })
    }

    pub fn source(&self) -> &'a Table {
        self.source
    }

    pub fn target(&self) -> &'a Table {
        self.target
    }

    pub fn target_columns(&self) -> &[&'a Column] {
        &self.target_columns
    }

    /// `SELECT <source columns> FROM <source table>`.
    pub fn select_sql(&self) -> &str {
        &self.select_sql
    }

    /// `SELECT EXISTS (...)` with one NULL-safe comparison per column.
    pub fn exists_sql(&self) -> &str {
        &self.exists_sql
    }

    /// `INSERT INTO <destination table> (...) VALUES (...)`.
    pub fn insert_sql(&self) -> &str {
        &self.insert_sql
    }

    /// Whether both tables have an identity column.
    pub fn has_identity(&self) -> bool {
        self.source.has_identity() && self.target.has_identity()
    }

    /// `SELECT id FROM <destination table>`.
    pub fn target_ids_sql(&self, target_db: &dyn Database) -> String {
        format!(
            "SELECT {} FROM {}",
            target_db.quote_ident(self.identity_name(self.target)),
            target_db.quote_ident(&self.target.actual_name)
        )
    }

    /// Source rows whose identity is not among `excluded` ids.
    ///
    /// With zero ids this is the plain select.
    pub fn source_rows_excluding_sql(&self, source_db: &dyn Database, excluded: usize) -> String {
        if excluded == 0 {
            return self.select_sql.clone();
        }
        let markers: Vec<String> = (0..excluded)
            .map(|i| source_db.parameter_marker(i))
            .collect();
        format!(
            "{} WHERE {} NOT IN ({})",
            self.select_sql,
            source_db.quote_ident(self.identity_name(self.source)),
            markers.join(", ")
        )
    }

    fn identity_name<'t>(&self, table: &'t Table) -> &'t str {
        table
            .identity_column()
            .map(|c| c.actual_name.as_str())
            .unwrap_or(IDENTITY_COLUMN)
    }

    /// Canonical text of a source row's identity, if the source table has one.
    pub fn row_id(&self, row: &[SqlValue]) -> Option<String> {
        self.source
            .identity_index()
            .and_then(|idx| row.get(idx))
            .map(SqlValue::id_to_string)
    }

    /// Stream source rows selected by `sql` into `tx` in batches of `batch_size`.
    pub async fn stream_source_rows(
        &self,
        source_db: &mut dyn Database,
        sql: &str,
        params: &[SqlValue],
        batch_size: usize,
        tx: RowBatchSender,
        diagnostics: &DiagnosticsConfig,
    ) -> Result<u64> {
        log_sql(diagnostics, sql);
        source_db
            .stream_rows(sql, params, batch_size, tx)
            .await
            .map_err(|e| e.context(format!("failed to select rows from {}", self.source.actual_name)))
    }

    /// Bring time values of a source row to the destination's resolution.
    pub fn normalize_row(&self, target_db: &dyn Database, row: Vec<SqlValue>) -> Vec<SqlValue> {
        row.into_iter()
            .map(|v| v.map_time(|t| target_db.normalize_time(t)))
            .collect()
    }

    /// Whether an identical row already exists in the destination.
    pub async fn exists(
        &self,
        target_db: &mut dyn Database,
        row: &[SqlValue],
        diagnostics: &DiagnosticsConfig,
    ) -> Result<bool> {
        log_row(diagnostics, &self.source.actual_name, row);
        let rows = target_db
            .query(&self.exists_sql, row)
            .await
            .map_err(|e| e.context("failed to check if row exists"))?;
        rows.first()
            .and_then(|r| r.first())
            .and_then(SqlValue::as_bool)
            .ok_or_else(|| {
                MigrateError::transfer(&self.target.actual_name, "existence probe returned no value")
            })
    }

    /// Insert one row into the destination; zero affected rows is an error.
    pub async fn insert(&self, target_db: &mut dyn Database, row: &[SqlValue]) -> Result<()> {
        let affected = target_db.execute(&self.insert_sql, row).await?;
        if affected == 0 {
            return Err(MigrateError::transfer(
                &self.target.actual_name,
                "no rows affected by insert",
            ));
        }
        Ok(())
    }

    /// Count source rows with no identical destination row.
    ///
    /// Rows are read in batches of `batch_size` and probed one by one; only
    /// the ids of missing rows are kept.
    pub async fn missing_rows(
        &self,
        source_db: &mut dyn Database,
        target_db: &mut dyn Database,
        batch_size: usize,
        diagnostics: &DiagnosticsConfig,
    ) -> Result<MissingRows> {
        let (tx, mut rx) = row_batch_channel();
        let read = self.stream_source_rows(source_db, &self.select_sql, &[], batch_size, tx, diagnostics);
        let probe = async move {
            log_sql(diagnostics, &self.exists_sql);
            let mut missing = MissingRows::default();
            while let Some(batch) = rx.recv().await {
                for row in batch {
                    let row = self.normalize_row(&*target_db, row);
                    if !self.exists(&mut *target_db, &row, diagnostics).await? {
                        missing.missing_rows += 1;
                        missing.missing_ids.extend(self.row_id(&row));
                    }
                }
            }
            Ok(missing)
        };

        let (rows_read, mut missing) = pipeline(read, probe).await?;
        missing.rows_read = rows_read;
        Ok(missing)
    }
}

/// Outcome of a missing-row scan over one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingRows {
    pub rows_read: u64,
    pub missing_rows: u64,
    /// Canonical ids of missing rows; empty without a source identity column.
    pub missing_ids: Vec<String>,
}

/// Run a source reader and the consumer of its batches side by side.
///
/// The consumer owns the receiving end, so when it fails the reader stops
/// with `StreamClosed`; the consumer's error is the one returned.
pub async fn pipeline<T>(
    read: impl Future<Output = Result<u64>>,
    consume: impl Future<Output = Result<T>>,
) -> Result<(u64, T)> {
    let (read, consumed) = tokio::join!(read, consume);
    let consumed = consumed?;
    Ok((read?, consumed))
}

/// Build both schemas and run the schema-dump diagnostics.
///
/// Returns `StopRequested` after the dump when asked to stop there.
pub async fn load_schemas(
    source_db: &mut dyn Database,
    target_db: &mut dyn Database,
    diagnostics: &DiagnosticsConfig,
) -> Result<(Schema, Schema)> {
    let source = Schema::build(source_db)
        .await
        .map_err(|e| e.context("failed to build source schema"))?;
    let target = Schema::build(target_db)
        .await
        .map_err(|e| e.context("failed to build destination schema"))?;

    if diagnostics.dump_schema_diff {
        SchemaReport::compare(&source, &target).log();
        if diagnostics.stop_after_schema_dump {
            return Err(MigrateError::StopRequested);
        }
    }

    Ok((source, target))
}

fn source_column_list(db: &dyn Database, table: &Table) -> String {
    table
        .columns
        .iter()
        .map(|c| db.select_expression(&c.actual_name, &c.data_type))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SELECT COUNT(*)` of a table.
pub async fn count_rows(db: &mut dyn Database, table: &Table) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", db.quote_ident(&table.actual_name));
    let rows = db.query(&sql, &[]).await?;
    rows.first()
        .and_then(|r| r.first())
        .and_then(SqlValue::as_i64)
        .ok_or_else(|| MigrateError::transfer(&table.actual_name, "COUNT(*) returned no value"))
}

/// Log a generated statement when SQL diagnostics are on.
pub fn log_sql(diagnostics: &DiagnosticsConfig, sql: &str) {
    if diagnostics.log_sql {
        info!("SQL: {}", sql);
    }
}

/// Log scanned values when row diagnostics are on.
pub fn log_row(diagnostics: &DiagnosticsConfig, table: &str, row: &[SqlValue]) {
    if diagnostics.log_row_values {
        let values: Vec<String> = row.iter().map(|v| format!("{:?}", v)).collect();
        info!("Row {}: [{}]", table, values.join(", "));
    }
}
