//! Cross-dialect column compatibility.
//!
//! [`is_compatible`] is the rule set the validator acts on: it only looks at
//! declared bounds, plus the UUID/binary(16) special case. [`classify`] is a
//! finer, diagnostic view keyed on type families and is only reported.

mod report;

pub use report::{ColumnReport, SchemaReport, TableReport};

use serde::Serialize;

use crate::core::schema::{Column, Table};
use crate::error::Result;

/// Bound MySQL reports for `longtext`/`longblob`; treated as unbounded by [`classify`].
const MYSQL_LONG_BOUND: i64 = 4_294_967_295;

/// Smallest blob bound able to hold bytea values in practice (`mediumblob`).
const MYSQL_MEDIUM_BLOB_BOUND: i64 = 16_777_215;

/// Whether values of `source` always fit into `target`.
///
/// Equal declared bounds are reported as incompatible.
pub fn is_compatible(source: &Column, target: &Column) -> bool {
    if source.max_chars == 0 && target.max_chars == 0 {
        return true;
    }

    if source.max_chars > 0 && target.max_chars > 0 {
        return source.max_chars < target.max_chars;
    }

    is_uuid_binary_pair(source, target) || is_uuid_binary_pair(target, source)
}

fn is_uuid_binary_pair(uuid: &Column, binary: &Column) -> bool {
    uuid.is_uuid()
        && matches!(binary.data_type.to_lowercase().as_str(), "binary" | "varbinary")
        && binary.max_chars == 16
}

/// A destination column paired with the source column feeding it.
#[derive(Debug, Clone, Copy)]
pub struct ColumnPair<'a> {
    pub source: &'a Column,
    pub target: &'a Column,
}

/// Destination columns whose source values may not fit, in destination column order.
///
/// Every destination column must exist in the source table.
pub fn incompatible_columns<'a>(
    source: &'a Table,
    target: &'a Table,
) -> Result<Vec<ColumnPair<'a>>> {
    let mut pairs = Vec::new();
    for target_column in &target.columns {
        let source_column = source.column(&target_column.actual_name).map_err(|e| {
            e.context(format!(
                "failed to find column '{}/{}' in source schema",
                target.actual_name, target_column.actual_name
            ))
        })?;
        if !is_compatible(source_column, target_column) {
            pairs.push(ColumnPair {
                source: source_column,
                target: target_column,
            });
        }
    }
    Ok(pairs)
}

/// Diagnostic verdict for a source/destination type pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// Every source value is representable in the destination.
    Safe,
    /// Known pairing, but the declared bounds can truncate or reject values.
    Unsafe { reason: String },
    /// Pairing not covered by the known rules.
    NeedsReview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Integer(u8),
    VarChar,
    FixedChar,
    Boolean,
    Blob,
    Bytea,
    Binary,
    Timestamp,
    Uuid,
    Other,
}

fn family(data_type: &str) -> Family {
    match data_type.trim().to_lowercase().as_str() {
        "smallint" | "int2" => Family::Integer(2),
        "mediumint" => Family::Integer(3),
        "integer" | "int" | "int4" => Family::Integer(4),
        "bigint" | "int8" => Family::Integer(8),
        "tinyint" => Family::Integer(1),
        "character varying" | "varchar" | "text" | "tinytext" | "mediumtext" | "longtext" => {
            Family::VarChar
        }
        "character" | "char" | "bpchar" => Family::FixedChar,
        "boolean" | "bool" => Family::Boolean,
        "blob" | "tinyblob" | "mediumblob" | "longblob" => Family::Blob,
        "bytea" => Family::Bytea,
        "binary" | "varbinary" => Family::Binary,
        "timestamp" | "timestamp without time zone" | "timestamp with time zone"
        | "timestamptz" | "datetime" => Family::Timestamp,
        "uuid" => Family::Uuid,
        _ => Family::Other,
    }
}

/// Bound with `long*` types folded into unbounded (0).
fn effective_bound(column: &Column) -> i64 {
    if column.max_chars >= MYSQL_LONG_BOUND {
        0
    } else {
        column.max_chars
    }
}

fn within_bound(source: &Column, target: &Column) -> Verdict {
    let (src, dst) = (effective_bound(source), effective_bound(target));
    if dst == 0 || (src > 0 && src <= dst) {
        Verdict::Safe
    } else if src == 0 {
        Verdict::Unsafe {
            reason: format!("unbounded source into {}({})", target.data_type, dst),
        }
    } else {
        Verdict::Unsafe {
            reason: format!("bound {} exceeds destination bound {}", src, dst),
        }
    }
}

/// Classify a source/destination column pair by type family.
pub fn classify(source: &Column, target: &Column) -> Verdict {
    let (src, dst) = (family(&source.data_type), family(&target.data_type));

    match (src, dst) {
        (Family::Integer(a), Family::Integer(b)) if a > 1 && b > 1 => {
            if a <= b {
                Verdict::Safe
            } else {
                Verdict::Unsafe {
                    reason: format!("{} narrows to {}", source.data_type, target.data_type),
                }
            }
        }
        (Family::VarChar, Family::VarChar) | (Family::FixedChar, Family::FixedChar) => {
            within_bound(source, target)
        }
        (Family::Boolean, Family::Integer(1)) | (Family::Integer(1), Family::Boolean) => {
            Verdict::Safe
        }
        (Family::Bytea, Family::Blob) | (Family::Bytea, Family::Binary) => {
            if target.max_chars >= MYSQL_MEDIUM_BLOB_BOUND {
                Verdict::Safe
            } else {
                Verdict::Unsafe {
                    reason: format!(
                        "bytea into {} limited to {} bytes",
                        target.data_type, target.max_chars
                    ),
                }
            }
        }
        (Family::Blob, Family::Bytea) => Verdict::Safe,
        (Family::Timestamp, Family::Timestamp) => Verdict::Safe,
        (Family::Uuid, Family::Binary) | (Family::Binary, Family::Uuid) => {
            if is_uuid_binary_pair(source, target) || is_uuid_binary_pair(target, source) {
                Verdict::Safe
            } else {
                Verdict::Unsafe {
                    reason: "uuid requires binary(16)".to_string(),
                }
            }
        }
        (Family::Uuid, Family::Uuid) => Verdict::Safe,
        _ if source.data_type.eq_ignore_ascii_case(&target.data_type) => {
            within_bound(source, target)
        }
        _ => Verdict::NeedsReview,
    }
}
