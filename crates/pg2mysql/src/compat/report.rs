//! Side-by-side comparison of two schemas, dumped by the `schema` diagnostic.

use serde::Serialize;
use tracing::{info, warn};

use super::{classify, is_compatible, Verdict};
use crate::core::schema::Schema;

/// One source column and its destination counterpart.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnReport {
    pub column: String,
    pub source_type: String,
    pub source_max_chars: i64,
    pub target_type: String,
    pub target_max_chars: i64,
    pub compatible: bool,
    #[serde(flatten)]
    pub verdict: Verdict,
}

/// Comparison of one source table.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub source_table: String,
    /// Destination table matched by normalized name.
    pub target_table: Option<String>,
    pub columns: Vec<ColumnReport>,
    /// Source columns with no destination counterpart.
    pub missing_in_target: Vec<String>,
    /// Destination columns with no source counterpart.
    pub missing_in_source: Vec<String>,
}

/// Comparison of every source table against the destination schema.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaReport {
    pub tables: Vec<TableReport>,
    /// Destination tables with no source counterpart.
    pub extra_target_tables: Vec<String>,
}

impl SchemaReport {
    /// Compare `source` against `target`, in source table order.
    pub fn compare(source: &Schema, target: &Schema) -> Self {
        let mut tables = Vec::with_capacity(source.len());

        for src_table in source.tables() {
            let Ok(dst_table) = target.table(&src_table.normalized_name) else {
                tables.push(TableReport {
                    source_table: src_table.actual_name.clone(),
                    target_table: None,
                    columns: Vec::new(),
                    missing_in_target: src_table
                        .columns
                        .iter()
                        .map(|c| c.actual_name.clone())
                        .collect(),
                    missing_in_source: Vec::new(),
                });
                continue;
            };

            let mut columns = Vec::new();
            let mut missing_in_target = Vec::new();
            for src_col in &src_table.columns {
                match dst_table
                    .columns
                    .iter()
                    .find(|c| c.normalized_name == src_col.normalized_name)
                {
                    Some(dst_col) => columns.push(ColumnReport {
                        column: src_col.actual_name.clone(),
                        source_type: src_col.data_type.clone(),
                        source_max_chars: src_col.max_chars,
                        target_type: dst_col.data_type.clone(),
                        target_max_chars: dst_col.max_chars,
                        compatible: is_compatible(src_col, dst_col),
                        verdict: classify(src_col, dst_col),
                    }),
                    None => missing_in_target.push(src_col.actual_name.clone()),
                }
            }

            let missing_in_source = dst_table
                .columns
                .iter()
                .filter(|d| {
                    !src_table
                        .columns
                        .iter()
                        .any(|s| s.normalized_name == d.normalized_name)
                })
                .map(|d| d.actual_name.clone())
                .collect();

            tables.push(TableReport {
                source_table: src_table.actual_name.clone(),
                target_table: Some(dst_table.actual_name.clone()),
                columns,
                missing_in_target,
                missing_in_source,
            });
        }

        let extra_target_tables = target
            .tables()
            .filter(|t| source.table(&t.normalized_name).is_err())
            .map(|t| t.actual_name.clone())
            .collect();

        Self {
            tables,
            extra_target_tables,
        }
    }

    /// Number of column pairs the validator will inspect.
    pub fn incompatible_count(&self) -> usize {
        self.tables
            .iter()
            .flat_map(|t| &t.columns)
            .filter(|c| !c.compatible)
            .count()
    }

    /// Write the report to the log.
    pub fn log(&self) {
        info!(
            "Schema comparison: {} source tables, {} incompatible columns",
            self.tables.len(),
            self.incompatible_count()
        );
        for table in &self.tables {
            let Some(target) = &table.target_table else {
                warn!("  {}: missing from destination", table.source_table);
                continue;
            };
            info!("  {} -> {}", table.source_table, target);
            for col in &table.columns {
                let verdict = match &col.verdict {
                    Verdict::Safe => "safe".to_string(),
                    Verdict::Unsafe { reason } => format!("unsafe ({})", reason),
                    Verdict::NeedsReview => "needs review".to_string(),
                };
                info!(
                    "    {:<30} {}({}) -> {}({}) compatible={} {}",
                    col.column,
                    col.source_type,
                    col.source_max_chars,
                    col.target_type,
                    col.target_max_chars,
                    col.compatible,
                    verdict
                );
            }
            for name in &table.missing_in_target {
                warn!("    {}: missing from destination table", name);
            }
            for name in &table.missing_in_source {
                warn!("    {}: destination-only column", name);
            }
        }
        for name in &self.extra_target_tables {
            info!("  {}: destination-only table", name);
        }
    }
}
