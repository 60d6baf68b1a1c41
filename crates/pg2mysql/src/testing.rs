//! In-memory [`Database`] used by engine tests.
//!
//! Speaks a MySQL-like dialect without identifier quoting (`?` markers,
//! `col <=> ?` comparisons, `UNHEX(REPLACE(?, '-', ''))` for UUIDs) and
//! understands exactly the statement shapes the engines generate.

use async_trait::async_trait;
use chrono::{NaiveDateTime, SubsecRound};
use uuid::Uuid;

use crate::config::Flavor;
use crate::core::schema::SchemaRow;
use crate::core::traits::Database;
use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};

const UUID_MARKER: &str = "UNHEX(REPLACE(?, '-', ''))";

#[derive(Debug, Clone)]
pub struct MemoryColumn {
    pub name: String,
    pub data_type: String,
    pub max_chars: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct MemoryTable {
    pub name: String,
    pub columns: Vec<MemoryColumn>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl MemoryTable {
    fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| MigrateError::Value(format!("unknown column {}.{}", self.name, name)))
    }
}

#[derive(Debug, Default)]
pub struct MemoryDb {
    tables: Vec<MemoryTable>,
    round_time: Option<bool>,
    failing_insert: Option<SqlValue>,
    fail_enable_constraints: bool,
    fail_schema: bool,
    pub constraints_enabled: bool,
    pub constraint_toggles: Vec<bool>,
    pub statements: Vec<String>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self {
            constraints_enabled: true,
            ..Default::default()
        }
    }

    /// Add a table; columns are `(name, data_type, max_chars)`.
    pub fn table(mut self, name: &str, columns: &[(&str, &str, Option<i64>)]) -> Self {
        self.tables.push(MemoryTable {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|(n, t, m)| MemoryColumn {
                    name: n.to_string(),
                    data_type: t.to_string(),
                    max_chars: *m,
                })
                .collect(),
            rows: Vec::new(),
        });
        self
    }

    /// Append a row to an existing table, bypassing key checks.
    pub fn row(mut self, table: &str, values: Vec<SqlValue>) -> Self {
        if let Some(t) = self.tables.iter_mut().find(|t| t.name == table) {
            t.rows.push(values);
        }
        self
    }

    /// Round (true) or truncate (false) timestamps to whole seconds.
    pub fn time_resolution(mut self, round: bool) -> Self {
        self.round_time = Some(round);
        self
    }

    /// Fail every insert whose row contains `value`.
    pub fn failing_insert(mut self, value: SqlValue) -> Self {
        self.failing_insert = Some(value);
        self
    }

    pub fn failing_enable_constraints(mut self) -> Self {
        self.fail_enable_constraints = true;
        self
    }

    pub fn failing_schema(mut self) -> Self {
        self.fail_schema = true;
        self
    }

    pub fn rows(&self, table: &str) -> &[Vec<SqlValue>] {
        self.tables
            .iter()
            .find(|t| t.name == table)
            .map(|t| t.rows.as_slice())
            .unwrap_or(&[])
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable> {
        self.tables
            .iter_mut()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| MigrateError::Value(format!("unknown table {}", name)))
    }

    fn find_table(&self, name: &str) -> Result<&MemoryTable> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| MigrateError::Value(format!("unknown table {}", name)))
    }

    fn exists(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Vec<SqlValue>>> {
        let rest = sql
            .strip_prefix("SELECT EXISTS (SELECT 1 FROM ")
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| unsupported(sql))?;
        let (table_name, clauses) = rest.split_once(" WHERE ").ok_or_else(|| unsupported(sql))?;
        let table = self.find_table(table_name)?;

        let mut checks = Vec::new();
        for (clause, param) in clauses.split(" AND ").zip(params) {
            let (column, marker) = clause.split_once(" <=> ").ok_or_else(|| unsupported(sql))?;
            let value = if marker == UUID_MARKER { unhex(param) } else { param.clone() };
            checks.push((table.column_index(column)?, value));
        }

        let found = table
            .rows
            .iter()
            .any(|row| checks.iter().all(|(idx, v)| row[*idx].null_safe_eq(v)));
        Ok(vec![vec![SqlValue::I64(found as i64)]])
    }

    fn select(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Vec<SqlValue>>> {
        let rest = sql.strip_prefix("SELECT ").ok_or_else(|| unsupported(sql))?;
        let (columns, rest) = rest.split_once(" FROM ").ok_or_else(|| unsupported(sql))?;
        let (table_name, filter) = match rest.split_once(" WHERE ") {
            Some((t, f)) => (t, Some(f)),
            None => (rest, None),
        };
        let table = self.find_table(table_name)?;

        let mut rows: Vec<&Vec<SqlValue>> = table.rows.iter().collect();
        if let Some(filter) = filter {
            if let Some((id, _)) = filter.split_once(" NOT IN (") {
                let idx = table.column_index(id)?;
                rows.retain(|row| !params.iter().any(|p| row[idx].null_safe_eq(p)));
            } else {
                let mut limits = Vec::new();
                for part in filter.split(" OR ") {
                    let (column, bound) = part
                        .strip_prefix("LENGTH(")
                        .and_then(|s| s.split_once(") > "))
                        .ok_or_else(|| unsupported(sql))?;
                    let bound: usize = bound.parse().map_err(|_| unsupported(sql))?;
                    limits.push((table.column_index(column)?, bound));
                }
                rows.retain(|row| limits.iter().any(|(idx, bound)| length(&row[*idx]) > *bound));
            }
        }

        if columns == "COUNT(*)" {
            return Ok(vec![vec![SqlValue::I64(rows.len() as i64)]]);
        }

        let indexes = columns
            .split(", ")
            .map(|c| table.column_index(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .map(|row| indexes.iter().map(|i| row[*i].clone()).collect())
            .collect())
    }

    fn insert(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        if let Some(failing) = &self.failing_insert {
            if params.iter().any(|p| p == failing) {
                return Err(MigrateError::Value(format!("simulated insert failure for {}", failing)));
            }
        }

        let rest = sql.strip_prefix("INSERT INTO ").ok_or_else(|| unsupported(sql))?;
        let (table_name, rest) = rest.split_once(" (").ok_or_else(|| unsupported(sql))?;
        let (columns, markers) = rest
            .strip_suffix(')')
            .and_then(|s| s.split_once(") VALUES ("))
            .ok_or_else(|| unsupported(sql))?;
        let markers = markers.replace(UUID_MARKER, "U");
        let round_time = self.round_time;

        let table = self.table_mut(table_name)?;
        let mut row = vec![SqlValue::Null; table.columns.len()];
        for ((column, marker), param) in columns.split(", ").zip(markers.split(", ")).zip(params) {
            let value = if marker == "U" { unhex(param) } else { param.clone() };
            row[table.column_index(column)?] = value.map_time(|t| resolve_time(round_time, t));
        }

        if let Ok(id) = table.column_index("id") {
            if table.rows.iter().any(|r| r[id].null_safe_eq(&row[id])) {
                return Err(MigrateError::DuplicateKey(format!(
                    "Duplicate entry '{}' for key '{}.PRIMARY'",
                    row[id], table.name
                )));
            }
        }

        table.rows.push(row);
        Ok(1)
    }
}

fn unsupported(sql: &str) -> MigrateError {
    MigrateError::Value(format!("unsupported statement: {}", sql))
}

fn unhex(value: &SqlValue) -> SqlValue {
    match value {
        SqlValue::Text(s) => match Uuid::parse_str(s) {
            Ok(u) => SqlValue::Bytes(u.as_bytes().to_vec()),
            Err(_) => SqlValue::Null,
        },
        SqlValue::Uuid(u) => SqlValue::Bytes(u.as_bytes().to_vec()),
        other => other.clone(),
    }
}

fn length(value: &SqlValue) -> usize {
    match value {
        SqlValue::Null => 0,
        SqlValue::Text(s) => s.chars().count(),
        SqlValue::Bytes(b) => b.len(),
        other => other.to_string().len(),
    }
}

fn resolve_time(round: Option<bool>, t: NaiveDateTime) -> NaiveDateTime {
    match round {
        None => t,
        Some(true) => t.round_subsecs(0),
        Some(false) => t.trunc_subsecs(0),
    }
}

#[async_trait]
impl Database for MemoryDb {
    fn flavor(&self) -> Flavor {
        Flavor::Mysql
    }

    async fn schema_rows(&mut self) -> Result<Vec<SchemaRow>> {
        if self.fail_schema {
            return Err(MigrateError::SchemaExtraction("simulated introspection failure".into()));
        }
        Ok(self
            .tables
            .iter()
            .flat_map(|t| {
                t.columns
                    .iter()
                    .map(|c| SchemaRow::new(&t.name, &c.name, &c.data_type, c.max_chars))
            })
            .collect())
    }

    async fn disable_constraints(&mut self) -> Result<()> {
        self.constraints_enabled = false;
        self.constraint_toggles.push(false);
        Ok(())
    }

    async fn enable_constraints(&mut self) -> Result<()> {
        if self.fail_enable_constraints {
            return Err(MigrateError::Value("simulated enable failure".into()));
        }
        self.constraints_enabled = true;
        self.constraint_toggles.push(true);
        Ok(())
    }

    fn quote_ident(&self, name: &str) -> String {
        name.to_string()
    }

    fn parameter_marker(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn binary_uuid_marker(&self, _index: usize) -> String {
        UUID_MARKER.to_string()
    }

    fn comparison_clause(&self, _index: usize, column: &str, source_type: &str) -> String {
        if source_type == "uuid" {
            format!("{} <=> {}", column, UUID_MARKER)
        } else {
            format!("{} <=> ?", column)
        }
    }

    fn normalize_time(&self, t: NaiveDateTime) -> NaiveDateTime {
        resolve_time(self.round_time, t)
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Vec<SqlValue>>> {
        self.statements.push(sql.to_string());
        if sql.starts_with("SELECT EXISTS ") {
            self.exists(sql, params)
        } else {
            self.select(sql, params)
        }
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.statements.push(sql.to_string());
        if let Some(table) = sql.strip_prefix("TRUNCATE TABLE ") {
            let table = self.table_mut(table)?;
            let removed = table.rows.len() as u64;
            table.rows.clear();
            return Ok(removed);
        }
        self.insert(sql, params)
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
