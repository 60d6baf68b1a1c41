//! In-memory schema graph built from introspection rows.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::core::traits::Database;
use crate::error::{MigrateError, Result};

/// Normalized name of the column that identifies rows.
pub const IDENTITY_COLUMN: &str = "id";

/// One row of column metadata reported by a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRow {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    /// Declared character/byte bound; None when the database reports NULL.
    pub max_chars: Option<i64>,
}

impl SchemaRow {
    pub fn new(
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        data_type: impl Into<String>,
        max_chars: Option<i64>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            column_name: column_name.into(),
            data_type: data_type.into(),
            max_chars,
        }
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    /// Identifier as cased by the database.
    pub actual_name: String,

    /// Lower-cased lookup key.
    pub normalized_name: String,

    /// Type name reported by the database (e.g. "character varying", "varbinary").
    pub data_type: String,

    /// Declared maximum length; 0 means unbounded.
    pub max_chars: i64,
}

impl Column {
    pub fn new(actual_name: impl Into<String>, data_type: impl Into<String>, max_chars: i64) -> Self {
        let actual_name = actual_name.into();
        Self {
            normalized_name: normalize(&actual_name),
            actual_name,
            data_type: data_type.into(),
            max_chars,
        }
    }

    /// Whether this column identifies rows.
    pub fn is_identity(&self) -> bool {
        self.normalized_name == IDENTITY_COLUMN
    }

    /// Whether the declared type is a UUID.
    pub fn is_uuid(&self) -> bool {
        self.data_type.eq_ignore_ascii_case("uuid")
    }
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    /// Identifier as cased by the database.
    pub actual_name: String,

    /// Lower-cased lookup key.
    pub normalized_name: String,

    /// Columns in ordinal order.
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(actual_name: impl Into<String>) -> Self {
        let actual_name = actual_name.into();
        Self {
            normalized_name: normalize(&actual_name),
            actual_name,
            columns: Vec::new(),
        }
    }

    /// Append a column.
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Look up a column by name, case-insensitively.
    pub fn column(&self, name: &str) -> Result<&Column> {
        let key = normalize(name);
        let column = self
            .columns
            .iter()
            .find(|c| c.normalized_name == key)
            .ok_or_else(|| MigrateError::ColumnNotFound {
                table: self.actual_name.clone(),
                column: name.to_string(),
            })?;
        if column.actual_name != name {
            warn!(
                "Column {}.{} matched by case-insensitive name to {}",
                self.actual_name, name, column.actual_name
            );
        }
        Ok(column)
    }

    /// Position of the identity column, if any.
    pub fn identity_index(&self) -> Option<usize> {
        self.columns.iter().position(Column::is_identity)
    }

    /// The identity column, if any.
    pub fn identity_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.is_identity())
    }

    pub fn has_identity(&self) -> bool {
        self.identity_index().is_some()
    }
}

/// All base tables of one database, keyed and ordered by normalized name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    tables: BTreeMap<String, Table>,
}

impl Schema {
    /// Introspect `db` and build its schema.
    pub async fn build(db: &mut dyn Database) -> Result<Self> {
        let rows = db.schema_rows().await?;
        let schema = Self::from_rows(rows)?;
        debug!("Built {} schema with {} tables", db.flavor(), schema.len());
        Ok(schema)
    }

    /// Build a schema from introspection rows.
    pub fn from_rows(rows: impl IntoIterator<Item = SchemaRow>) -> Result<Self> {
        let mut tables: BTreeMap<String, Table> = BTreeMap::new();

        for row in rows {
            if row.table_name.is_empty() || row.column_name.is_empty() {
                return Err(MigrateError::SchemaExtraction(format!(
                    "empty table or column name in row {:?}",
                    row
                )));
            }
            let max_chars = row.max_chars.unwrap_or(0);
            if max_chars < 0 {
                return Err(MigrateError::SchemaExtraction(format!(
                    "negative bound {} for {}.{}",
                    max_chars, row.table_name, row.column_name
                )));
            }

            let table = match tables.entry(normalize(&row.table_name)) {
                Entry::Vacant(entry) => entry.insert(Table::new(&row.table_name)),
                Entry::Occupied(entry) => {
                    let table = entry.into_mut();
                    if table.actual_name != row.table_name {
                        return Err(MigrateError::SchemaExtraction(format!(
                            "tables {} and {} differ only by case",
                            table.actual_name, row.table_name
                        )));
                    }
                    table
                }
            };

            let column = Column::new(row.column_name, row.data_type, max_chars);
            if table
                .columns
                .iter()
                .any(|c| c.normalized_name == column.normalized_name)
            {
                return Err(MigrateError::SchemaExtraction(format!(
                    "duplicate column {} in table {}",
                    column.actual_name, table.actual_name
                )));
            }
            table.columns.push(column);
        }

        Ok(Self { tables })
    }

    /// Add a table, replacing any table with the same normalized name.
    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.normalized_name.clone(), table);
    }

    /// Look up a table by name, case-insensitively.
    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(&normalize(name))
            .ok_or_else(|| MigrateError::TableNotFound(name.to_string()))
    }

    /// Tables in lexicographic order of normalized name.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.to_lowercase()
}
