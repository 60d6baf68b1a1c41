//! Validation engine: finds source rows whose values would not fit the destination.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::compat::{incompatible_columns, ColumnPair};
use crate::config::EngineOptions;
use crate::core::schema::Table;
use crate::core::traits::Database;
use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};
use crate::reconcile::{load_schemas, log_sql};

/// Incompatible rows of one source table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub table_name: String,
    /// Destination columns whose bound a source value may exceed.
    pub incompatible_columns: Vec<String>,
    /// Ids of offending rows; only filled when both tables have an identity column.
    pub incompatible_row_ids: Vec<String>,
    pub incompatible_row_count: i64,
}

impl ValidationResult {
    pub fn is_clean(&self) -> bool {
        self.incompatible_row_count == 0
    }
}

pub struct Validator<'a> {
    source: &'a mut dyn Database,
    target: &'a mut dyn Database,
    options: EngineOptions,
}

impl<'a> Validator<'a> {
    pub fn new(
        source: &'a mut dyn Database,
        target: &'a mut dyn Database,
        options: EngineOptions,
    ) -> Self {
        Self {
            source,
            target,
            options,
        }
    }

    /// Check every source table against the destination column bounds.
    ///
    /// Only the source is queried, and only for tables with incompatible columns.
    pub async fn validate(mut self) -> Result<Vec<ValidationResult>> {
        let (source_schema, target_schema) =
            load_schemas(&mut *self.source, &mut *self.target, &self.options.diagnostics).await?;

        let mut results = Vec::with_capacity(source_schema.len());
        for source_table in source_schema.tables() {
            let target_table = target_schema
                .table(&source_table.normalized_name)
                .map_err(|e| e.context("failed to get table from destination schema"))?;
            if target_table.actual_name != source_table.actual_name {
                warn!(
                    "Source table {} does not exist in the destination schema, but found {} instead",
                    source_table.actual_name, target_table.actual_name
                );
            }
            results.push(self.validate_table(source_table, target_table).await?);
        }

        let dirty = results.iter().filter(|r| !r.is_clean()).count();
        info!("Validated {} tables, {} with incompatible rows", results.len(), dirty);
        Ok(results)
    }

    async fn validate_table(
        &mut self,
        source_table: &Table,
        target_table: &Table,
    ) -> Result<ValidationResult> {
        let pairs = incompatible_columns(source_table, target_table)?;
        let mut result = ValidationResult {
            table_name: source_table.actual_name.clone(),
            incompatible_columns: pairs.iter().map(|p| p.target.actual_name.clone()).collect(),
            ..Default::default()
        };
        if pairs.is_empty() {
            debug!("{}: all columns compatible", source_table.actual_name);
            return Ok(result);
        }

        let predicate = length_predicate(&*self.source, &pairs);
        let table = self.source.quote_ident(&source_table.actual_name);

        match (source_table.identity_column(), target_table.has_identity()) {
            (Some(id), true) => {
                let sql = format!(
                    "SELECT {} FROM {} WHERE {}",
                    self.source.quote_ident(&id.actual_name),
                    table,
                    predicate
                );
                log_sql(&self.options.diagnostics, &sql);
                let rows = self
                    .source
                    .query(&sql, &[])
                    .await
                    .map_err(|e| e.context("failed getting incompatible row ids"))?;
                result.incompatible_row_ids = rows
                    .iter()
                    .filter_map(|row| row.first())
                    .map(SqlValue::id_to_string)
                    .collect();
                result.incompatible_row_count = result.incompatible_row_ids.len() as i64;
            }
            _ => {
                let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", table, predicate);
                log_sql(&self.options.diagnostics, &sql);
                let rows = self
                    .source
                    .query(&sql, &[])
                    .await
                    .map_err(|e| e.context("failed getting incompatible row count"))?;
                result.incompatible_row_count = rows
                    .first()
                    .and_then(|r| r.first())
                    .and_then(SqlValue::as_i64)
                    .ok_or_else(|| {
                        MigrateError::transfer(&source_table.actual_name, "COUNT(*) returned no value")
                    })?;
            }
        }

        if !result.is_clean() {
            warn!(
                "{}: {} rows exceed destination bounds on {}",
                result.table_name,
                result.incompatible_row_count,
                result.incompatible_columns.join(", ")
            );
        }
        Ok(result)
    }
}

/// `LENGTH(<src col>) > <dst max>` for each pair, OR-ed.
fn length_predicate(db: &dyn Database, pairs: &[ColumnPair<'_>]) -> String {
    pairs
        .iter()
        .map(|p| format!("LENGTH({}) > {}", db.quote_ident(&p.source.actual_name), p.target.max_chars))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryDb;

    async fn validate(
        source: &mut MemoryDb,
        target: &mut MemoryDb,
    ) -> Result<Vec<ValidationResult>> {
        Validator::new(source, target, EngineOptions::default())
            .validate()
            .await
    }

    #[tokio::test]
    async fn test_equal_bounds_flag_long_values() {
        let mut source = MemoryDb::new()
            .table(
                "users",
                &[("id", "integer", None), ("name", "character varying", Some(255))],
            )
            .row("users", vec![1.into(), "a".repeat(10).into()])
            .row("users", vec![2.into(), "b".repeat(300).into()]);
        let mut target = MemoryDb::new()
            .table("users", &[("id", "int", None), ("name", "varchar", Some(255))]);

        let results = validate(&mut source, &mut target).await.unwrap();
        assert_eq!(results[0].incompatible_columns, vec!["name"]);
        assert_eq!(results[0].incompatible_row_ids, vec!["2"]);
        assert_eq!(results[0].incompatible_row_count, 1);
        assert!(source
            .statements
            .contains(&"SELECT id FROM users WHERE LENGTH(name) > 255".to_string()));
    }

    #[tokio::test]
    async fn test_compatible_tables_issue_no_query() {
        let mut source = MemoryDb::new()
            .table("users", &[("id", "integer", None), ("name", "varchar", Some(50))])
            .row("users", vec![1.into(), "ann".into()]);
        let mut target = MemoryDb::new()
            .table("users", &[("id", "int", None), ("name", "varchar", Some(255))]);

        let results = validate(&mut source, &mut target).await.unwrap();
        assert!(results[0].is_clean());
        assert!(results[0].incompatible_columns.is_empty());
        assert!(source.statements.is_empty());
    }

    #[tokio::test]
    async fn test_uuid_to_binary16_is_compatible() {
        let mut source = MemoryDb::new().table("things", &[("id", "uuid", None)]);
        let mut target = MemoryDb::new().table("things", &[("id", "binary", Some(16))]);

        let results = validate(&mut source, &mut target).await.unwrap();
        assert!(results[0].is_clean());
        assert!(source.statements.is_empty());
    }

    #[tokio::test]
    async fn test_without_identity_counts_rows() {
        let mut source = MemoryDb::new()
            .table("notes", &[("body", "varchar", Some(20)), ("tag", "varchar", Some(10))])
            .row("notes", vec!["x".repeat(15).into(), "t".into()])
            .row("notes", vec!["short".into(), "tag-too-long".into()])
            .row("notes", vec!["ok".into(), "ok".into()]);
        let mut target = MemoryDb::new()
            .table("notes", &[("body", "varchar", Some(10)), ("tag", "varchar", Some(5))]);

        let results = validate(&mut source, &mut target).await.unwrap();
        assert_eq!(results[0].incompatible_row_count, 2);
        assert!(results[0].incompatible_row_ids.is_empty());
        assert_eq!(
            source.statements,
            vec!["SELECT COUNT(*) FROM notes WHERE LENGTH(body) > 10 OR LENGTH(tag) > 5"]
        );
    }

    #[tokio::test]
    async fn test_destination_column_missing_from_source() {
        let mut source = MemoryDb::new().table("users", &[("id", "integer", None)]);
        let mut target = MemoryDb::new()
            .table("users", &[("id", "int", None), ("email", "varchar", Some(10))]);

        let err = validate(&mut source, &mut target).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("failed to find column 'users/email' in source schema"));
    }

    #[tokio::test]
    async fn test_missing_destination_table_is_fatal() {
        let mut source = MemoryDb::new().table("users", &[("id", "integer", None)]);
        let mut target = MemoryDb::new();

        let err = validate(&mut source, &mut target).await.unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_SCHEMA_ERROR);
    }

    #[tokio::test]
    async fn test_tables_validated_in_name_order() {
        let mut source = MemoryDb::new()
            .table("zebra", &[("id", "integer", None)])
            .table("apple", &[("id", "integer", None)]);
        let mut target = MemoryDb::new()
            .table("zebra", &[("id", "int", None)])
            .table("Apple", &[("id", "int", None)]);

        let results = validate(&mut source, &mut target).await.unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.table_name.as_str()).collect();
        assert_eq!(names, vec!["apple", "zebra"]);
    }
}
