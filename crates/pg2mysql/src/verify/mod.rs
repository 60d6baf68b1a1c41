//! Verification engine: reports source rows with no identical destination row.
//!
//! Read-only. Every table is compared column by column, whether or not it
//! has an identity column; the identity only decides whether missing ids are
//! listed.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EngineOptions;
use crate::core::schema::Table;
use crate::core::traits::Database;
use crate::error::Result;
use crate::progress::VerificationWatcher;
use crate::reconcile::{load_schemas, TablePlan};

/// Verification outcome for one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableVerifyResult {
    pub table_name: String,
    pub missing_rows: u64,
    /// Canonical ids of the missing rows; empty without an identity column.
    pub missing_ids: Vec<String>,
    /// Set when the table could not be verified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a verification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResult {
    pub duration_seconds: f64,
    pub tables: Vec<TableVerifyResult>,
}

impl VerifyResult {
    /// True when every table verified and none has missing rows.
    pub fn is_in_sync(&self) -> bool {
        self.tables
            .iter()
            .all(|t| t.error.is_none() && t.missing_rows == 0)
    }

    pub fn missing_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.missing_rows).sum()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub struct Verifier<'a> {
    source: &'a mut dyn Database,
    target: &'a mut dyn Database,
    options: EngineOptions,
    watcher: &'a dyn VerificationWatcher,
}

impl<'a> Verifier<'a> {
    pub fn new(
        source: &'a mut dyn Database,
        target: &'a mut dyn Database,
        options: EngineOptions,
        watcher: &'a dyn VerificationWatcher,
    ) -> Self {
        Self {
            source,
            target,
            options,
            watcher,
        }
    }

    /// Compare every source table with the destination.
    ///
    /// A table that fails to verify is reported and skipped; a source table
    /// missing from the destination aborts the run.
    pub async fn verify(mut self) -> Result<VerifyResult> {
        let start = Instant::now();
        let (source_schema, target_schema) =
            load_schemas(&mut *self.source, &mut *self.target, &self.options.diagnostics).await?;

        let mut tables = Vec::with_capacity(source_schema.len());
        for source_table in source_schema.tables() {
            let target_table = target_schema.table(&source_table.normalized_name)?;
            let name = &source_table.actual_name;

            self.watcher.table_verification_did_start(name);
            match self.verify_table(source_table, target_table).await {
                Ok((missing_rows, missing_ids)) => {
                    self.watcher
                        .table_verification_did_finish(name, missing_rows, &missing_ids);
                    tables.push(TableVerifyResult {
                        table_name: name.clone(),
                        missing_rows,
                        missing_ids,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!("Failed to verify {}: {}", name, e);
                    self.watcher.table_verification_did_finish_with_error(name, &e);
                    tables.push(TableVerifyResult {
                        table_name: name.clone(),
                        missing_rows: 0,
                        missing_ids: Vec::new(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let result = VerifyResult {
            duration_seconds: start.elapsed().as_secs_f64(),
            tables,
        };
        info!(
            "Verified {} tables, {} missing rows",
            result.tables.len(),
            result.missing_rows()
        );
        Ok(result)
    }

    async fn verify_table(
        &mut self,
        source_table: &Table,
        target_table: &Table,
    ) -> Result<(u64, Vec<String>)> {
        let plan = TablePlan::new(&*self.source, &*self.target, source_table, target_table)?;
        let scan = plan
            .missing_rows(
                &mut *self.source,
                &mut *self.target,
                self.options.migration.read_batch_size,
                &self.options.diagnostics,
            )
            .await?;

        if let Some(limit) = self.options.migration.full_row_probe_limit {
            if scan.rows_read > limit {
                warn!(
                    "{} has {} rows, above the full-row probe limit of {}",
                    source_table.actual_name, scan.rows_read, limit
                );
            }
        }
        Ok((scan.missing_rows, scan.missing_ids))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::NaiveDate;

    use super::*;
    use crate::config::MigrationConfig;
    use crate::core::value::SqlValue;
    use crate::error::MigrateError;
    use crate::migrate::Migrator;
    use crate::progress::NoopWatcher;
    use crate::testing::MemoryDb;

    #[derive(Default)]
    struct RecordingWatcher {
        finished: Mutex<Vec<(String, u64, Vec<String>)>>,
        failed: Mutex<Vec<String>>,
    }

    impl VerificationWatcher for RecordingWatcher {
        fn table_verification_did_finish(&self, table: &str, missing_rows: u64, missing_ids: &[String]) {
            self.finished
                .lock()
                .unwrap()
                .push((table.to_string(), missing_rows, missing_ids.to_vec()));
        }

        fn table_verification_did_finish_with_error(&self, table: &str, _err: &MigrateError) {
            self.failed.lock().unwrap().push(table.to_string());
        }
    }

    fn users_source() -> MemoryDb {
        MemoryDb::new()
            .table("users", &[("id", "integer", None), ("name", "text", None)])
            .row("users", vec![1.into(), "ann".into()])
            .row("users", vec![2.into(), "bob".into()])
            .row("users", vec![3.into(), "cid".into()])
    }

    fn users_target() -> MemoryDb {
        MemoryDb::new().table("users", &[("id", "int", None), ("name", "longtext", None)])
    }

    async fn verify(source: &mut MemoryDb, target: &mut MemoryDb) -> VerifyResult {
        Verifier::new(source, target, EngineOptions::default(), &NoopWatcher)
            .verify()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_reports_missing_ids() {
        let mut source = users_source();
        let mut target = users_target().row("users", vec![2.into(), "bob".into()]);
        let watcher = RecordingWatcher::default();

        let result = Verifier::new(&mut source, &mut target, EngineOptions::default(), &watcher)
            .verify()
            .await
            .unwrap();

        assert_eq!(result.tables[0].missing_rows, 2);
        assert_eq!(result.tables[0].missing_ids, vec!["1", "3"]);
        assert!(!result.is_in_sync());
        assert_eq!(
            watcher.finished.lock().unwrap()[0],
            ("users".to_string(), 2, vec!["1".to_string(), "3".to_string()])
        );
    }

    #[tokio::test]
    async fn test_source_read_once_in_small_batches() {
        let mut source = users_source();
        let mut target = users_target().row("users", vec![1.into(), "ann".into()]);
        let options = EngineOptions {
            migration: MigrationConfig {
                read_batch_size: 1,
                full_row_probe_limit: Some(1),
                ..Default::default()
            },
            ..Default::default()
        };

        let result = Verifier::new(&mut source, &mut target, options, &NoopWatcher)
            .verify()
            .await
            .unwrap();
        assert_eq!(result.tables[0].missing_ids, vec!["2", "3"]);
        // Over the probe limit only warns, without a separate COUNT(*).
        assert_eq!(source.statements, vec!["SELECT id, name FROM users"]);
    }

    #[tokio::test]
    async fn test_changed_row_counts_as_missing() {
        let mut source = users_source();
        let mut target = users_target()
            .row("users", vec![1.into(), "ann".into()])
            .row("users", vec![2.into(), "BOB".into()])
            .row("users", vec![3.into(), "cid".into()]);

        let result = verify(&mut source, &mut target).await;
        assert_eq!(result.tables[0].missing_ids, vec!["2"]);
    }

    #[tokio::test]
    async fn test_clean_after_migrate() {
        let mut source = users_source();
        let mut target = users_target();
        Migrator::new(&mut source, &mut target, EngineOptions::default(), &NoopWatcher)
            .migrate()
            .await
            .unwrap();

        let result = verify(&mut source, &mut target).await;
        assert!(result.is_in_sync());
        assert_eq!(result.missing_rows(), 0);
    }

    #[tokio::test]
    async fn test_never_writes() {
        let mut source = users_source();
        let mut target = users_target();
        verify(&mut source, &mut target).await;

        assert!(target.rows("users").is_empty());
        assert!(target.constraint_toggles.is_empty());
        assert!(target.statements.iter().all(|s| s.starts_with("SELECT")));
    }

    #[tokio::test]
    async fn test_table_without_identity_lists_no_ids() {
        let mut source = MemoryDb::new()
            .table("tags", &[("label", "text", None)])
            .row("tags", vec!["a".into()]);
        let mut target = MemoryDb::new().table("tags", &[("label", "longtext", None)]);

        let result = verify(&mut source, &mut target).await;
        assert_eq!(result.tables[0].missing_rows, 1);
        assert!(result.tables[0].missing_ids.is_empty());
    }

    #[tokio::test]
    async fn test_table_error_does_not_stop_run() {
        let mut source = MemoryDb::new()
            .table("a", &[("id", "integer", None), ("extra", "text", None)])
            .table("b", &[("id", "integer", None)])
            .row("b", vec![1.into()]);
        let mut target = MemoryDb::new()
            .table("a", &[("id", "int", None)])
            .table("b", &[("id", "int", None)]);
        let watcher = RecordingWatcher::default();

        let result = Verifier::new(&mut source, &mut target, EngineOptions::default(), &watcher)
            .verify()
            .await
            .unwrap();

        assert!(result.tables[0].error.is_some());
        assert_eq!(result.tables[1].missing_rows, 1);
        assert_eq!(*watcher.failed.lock().unwrap(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_destination_table_is_fatal() {
        let mut source = users_source();
        let mut target = MemoryDb::new();
        let err = Verifier::new(&mut source, &mut target, EngineOptions::default(), &NoopWatcher)
            .verify()
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::TableNotFound(_)));
    }

    #[tokio::test]
    async fn test_uuid_ids_rendered_canonically() {
        let id = uuid::Uuid::parse_str("6ba7b810-9dad-11d1-80b4-00c04fd430c8").unwrap();
        let mut source = MemoryDb::new()
            .table("things", &[("id", "uuid", None)])
            .row("things", vec![SqlValue::Uuid(id)]);
        let mut target = MemoryDb::new().table("things", &[("id", "binary", Some(16))]);

        let result = verify(&mut source, &mut target).await;
        assert_eq!(
            result.tables[0].missing_ids,
            vec!["6ba7b810-9dad-11d1-80b4-00c04fd430c8"]
        );
    }

    #[tokio::test]
    async fn test_subsecond_residual_matches_after_rounding() {
        let at = |h, m, s, ms| {
            NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_milli_opt(h, m, s, ms)
                .unwrap()
        };
        let mut source = MemoryDb::new()
            .table("events", &[("at", "timestamp without time zone", None)])
            .row("events", vec![SqlValue::DateTime(at(12, 0, 0, 700))]);

        let mut rounding = MemoryDb::new()
            .table("events", &[("at", "datetime", None)])
            .row("events", vec![SqlValue::DateTime(at(12, 0, 1, 0))])
            .time_resolution(true);
        assert!(verify(&mut source, &mut rounding).await.is_in_sync());

        let mut truncating = MemoryDb::new()
            .table("events", &[("at", "datetime", None)])
            .row("events", vec![SqlValue::DateTime(at(12, 0, 1, 0))])
            .time_resolution(false);
        assert_eq!(verify(&mut source, &mut truncating).await.missing_rows(), 1);
    }

    #[test]
    fn test_error_omitted_from_json_when_absent() {
        let result = VerifyResult {
            duration_seconds: 0.0,
            tables: vec![TableVerifyResult {
                table_name: "t".into(),
                missing_rows: 0,
                missing_ids: Vec::new(),
                error: None,
            }],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["tables"][0].get("error").is_none());
    }
}
