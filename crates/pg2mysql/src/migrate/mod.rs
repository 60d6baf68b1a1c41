//! Migration engine: copies source rows that are missing from the destination.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::EngineOptions;
use crate::core::batch::{row_batch_channel, RowBatchReceiver};
use crate::core::schema::{Schema, Table};
use crate::core::traits::Database;
use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};
use crate::progress::MigrationWatcher;
use crate::reconcile::{count_rows, load_schemas, log_sql, pipeline, TablePlan};

/// How rows of a table were matched against the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Rows matched by their `id` column.
    Identity,
    /// Rows matched by comparing every column.
    FullRow,
}

/// Outcome of migrating one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMigrationResult {
    pub table_name: String,
    pub strategy: Strategy,
    pub rows_inserted: u64,
    /// Rows skipped because their id already existed.
    pub rows_duplicate: u64,
    /// Rows whose insert failed and were skipped.
    pub rows_failed: u64,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Total rows inserted across tables.
    pub rows_inserted: u64,

    /// Per-table outcomes in processing order.
    pub tables: Vec<TableMigrationResult>,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Total rows whose insert failed.
    pub fn rows_failed(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_failed).sum()
    }
}

/// Copies missing rows from source to destination, table by table.
pub struct Migrator<'a> {
    source: &'a mut dyn Database,
    target: &'a mut dyn Database,
    options: EngineOptions,
    watcher: &'a dyn MigrationWatcher,
}

impl<'a> Migrator<'a> {
    pub fn new(
        source: &'a mut dyn Database,
        target: &'a mut dyn Database,
        options: EngineOptions,
        watcher: &'a dyn MigrationWatcher,
    ) -> Self {
        Self {
            source,
            target,
            options,
            watcher,
        }
    }

    /// Run the migration.
    ///
    /// Destination constraints are disabled around the table loop and
    /// re-enabled even when a table fails.
    pub async fn migrate(mut self) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let start = Instant::now();

        let (source_schema, target_schema) =
            load_schemas(&mut *self.source, &mut *self.target, &self.options.diagnostics).await?;

        self.watcher.will_disable_constraints();
        self.target
            .disable_constraints()
            .await
            .map_err(|e| e.context("failed to disable constraints"))?;
        self.watcher.did_disable_constraints();

        let outcome = self.migrate_tables(&source_schema, &target_schema).await;

        self.watcher.will_enable_constraints();
        match self.target.enable_constraints().await {
            Ok(()) => self.watcher.enable_constraints_did_finish(),
            Err(e) => {
                error!("Failed to re-enable constraints: {}", e);
                self.watcher.enable_constraints_did_fail_with_error(&e);
            }
        }

        let tables = outcome?;
        let rows_inserted = tables.iter().map(|t| t.rows_inserted).sum();
        let duration = start.elapsed();
        info!(
            "Migrated {} tables, {} rows inserted in {:.1}s",
            tables.len(),
            rows_inserted,
            duration.as_secs_f64()
        );

        Ok(MigrationResult {
            started_at,
            completed_at: Utc::now(),
            duration_seconds: duration.as_secs_f64(),
            rows_inserted,
            tables,
        })
    }

    async fn migrate_tables(
        &mut self,
        source_schema: &Schema,
        target_schema: &Schema,
    ) -> Result<Vec<TableMigrationResult>> {
        let mut results = Vec::with_capacity(source_schema.len());
        for source_table in source_schema.tables() {
            let target_table = target_schema.table(&source_table.normalized_name)?;
            results.push(self.migrate_table(source_table, target_table).await?);
        }
        Ok(results)
    }

    async fn migrate_table(
        &mut self,
        source_table: &Table,
        target_table: &Table,
    ) -> Result<TableMigrationResult> {
        if self.options.migration.truncate_first {
            self.watcher.will_truncate_table(&target_table.actual_name);
            self.target
                .truncate(&target_table.actual_name)
                .await
                .map_err(|e| e.context(format!("failed truncating {}", target_table.actual_name)))?;
            self.watcher.truncate_table_did_finish(&target_table.actual_name);
        }

        let plan = TablePlan::new(&*self.source, &*self.target, source_table, target_table)?;
        log_sql(&self.options.diagnostics, plan.insert_sql());

        let strategy = if plan.has_identity() {
            Strategy::Identity
        } else {
            Strategy::FullRow
        };
        let mut result = TableMigrationResult {
            table_name: source_table.actual_name.clone(),
            strategy,
            rows_inserted: 0,
            rows_duplicate: 0,
            rows_failed: 0,
        };

        self.watcher.table_migration_did_start(&source_table.actual_name);
        debug!("Migrating {} with {:?} strategy", source_table.actual_name, strategy);

        match strategy {
            Strategy::Identity => self
                .migrate_with_ids(&plan, &mut result)
                .await
                .map_err(|e| e.context("failed migrating table with ids"))?,
            Strategy::FullRow => self
                .migrate_full_rows(&plan, &mut result)
                .await
                .map_err(|e| e.context("failed migrating table without ids"))?,
        }

        if result.rows_duplicate > 0 || result.rows_failed > 0 {
            info!(
                "{}: {} inserted, {} duplicate, {} failed",
                result.table_name, result.rows_inserted, result.rows_duplicate, result.rows_failed
            );
        }
        self.watcher
            .table_migration_did_finish(&source_table.actual_name, result.rows_inserted);
        Ok(result)
    }

    async fn migrate_with_ids(
        &mut self,
        plan: &TablePlan<'_>,
        result: &mut TableMigrationResult,
    ) -> Result<()> {
        let ids_sql = plan.target_ids_sql(&*self.target);
        log_sql(&self.options.diagnostics, &ids_sql);
        let existing: Vec<SqlValue> = self
            .target
            .query(&ids_sql, &[])
            .await
            .map_err(|e| e.context("failed to select id from rows"))?
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect();

        let (select_sql, params) =
            if !existing.is_empty() && existing.len() < self.options.migration.max_in_clause_ids {
                (plan.source_rows_excluding_sql(&*self.source, existing.len()), existing)
            } else {
                if !existing.is_empty() {
                    debug!(
                        "{}: {} destination ids exceed the NOT IN limit, reading every source row",
                        plan.source().actual_name,
                        existing.len()
                    );
                }
                (plan.select_sql().to_string(), Vec::new())
            };

        self.copy_rows(plan, &select_sql, &params, false, result).await
    }

    async fn migrate_full_rows(
        &mut self,
        plan: &TablePlan<'_>,
        result: &mut TableMigrationResult,
    ) -> Result<()> {
        if let Some(limit) = self.options.migration.full_row_probe_limit {
            let rows = count_rows(&mut *self.source, plan.source()).await?;
            if rows > 0 && rows as u64 > limit {
                return Err(MigrateError::FullRowLimitExceeded {
                    table: plan.source().actual_name.clone(),
                    rows,
                    limit,
                });
            }
        }

        self.copy_rows(plan, plan.select_sql(), &[], true, result).await
    }

    /// Stream source rows selected by `sql` into the destination.
    ///
    /// With `probe` set, rows that already exist in the destination are skipped.
    async fn copy_rows(
        &mut self,
        plan: &TablePlan<'_>,
        sql: &str,
        params: &[SqlValue],
        probe: bool,
        result: &mut TableMigrationResult,
    ) -> Result<()> {
        let (tx, rx) = row_batch_channel();
        let read = plan.stream_source_rows(
            &mut *self.source,
            sql,
            params,
            self.options.migration.read_batch_size,
            tx,
            &self.options.diagnostics,
        );
        let writer = RowWriter {
            target: &mut *self.target,
            watcher: self.watcher,
            options: &self.options,
        };
        let (rows_read, ()) = pipeline(read, writer.write(plan, rx, probe, result)).await?;
        debug!("{}: read {} source rows", plan.source().actual_name, rows_read);
        Ok(())
    }
}

/// Destination side of a table copy.
struct RowWriter<'w> {
    target: &'w mut dyn Database,
    watcher: &'w dyn MigrationWatcher,
    options: &'w EngineOptions,
}

impl RowWriter<'_> {
    /// Insert every received row; consumes the receiver so the reader stops if this fails.
    async fn write(
        mut self,
        plan: &TablePlan<'_>,
        mut rx: RowBatchReceiver,
        probe: bool,
        result: &mut TableMigrationResult,
    ) -> Result<()> {
        let options = self.options;
        let diagnostics = &options.diagnostics;
        if probe {
            log_sql(diagnostics, plan.exists_sql());
        }
        while let Some(batch) = rx.recv().await {
            for row in batch {
                let row = plan.normalize_row(&*self.target, row);
                if probe && plan.exists(&mut *self.target, &row, diagnostics).await? {
                    continue;
                }
                self.insert_row(plan, &row, result).await;
            }
        }
        Ok(())
    }

    /// Insert one row, counting its outcome; only successful inserts report progress.
    async fn insert_row(
        &mut self,
        plan: &TablePlan<'_>,
        row: &[SqlValue],
        result: &mut TableMigrationResult,
    ) {
        match plan.insert(&mut *self.target, row).await {
            Ok(()) => {
                result.rows_inserted += 1;
                let interval = self.options.migration.progress_interval;
                if interval > 0 && result.rows_inserted % interval == 0 {
                    self.watcher
                        .table_migration_in_progress(&result.table_name, result.rows_inserted);
                }
            }
            Err(e) if e.is_duplicate_key() => {
                result.rows_duplicate += 1;
                if let Some(id) = plan.row_id(row) {
                    debug!("{}: id {} already present", result.table_name, id);
                }
            }
            Err(e) => {
                result.rows_failed += 1;
                error!(
                    "failed to insert into {}: {} ({})",
                    result.table_name,
                    e,
                    plan.insert_sql()
                );
                if result.rows_failed == 1 {
                    warn!(
                        "{}: continuing past failed inserts, see errors above",
                        result.table_name
                    );
                }
            }
        }
    }
}
