//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database rows are read from.
    pub source: DatabaseConfig,

    /// Database rows are written to or compared against.
    pub dest: DatabaseConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Diagnostic toggles.
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// SQL dialect of a configured database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    #[serde(alias = "postgresql", alias = "psql", alias = "pg")]
    Postgres,
    #[serde(alias = "mariadb")]
    Mysql,
}

impl Flavor {
    /// Default TCP port for the dialect.
    pub fn default_port(&self) -> u16 {
        match self {
            Flavor::Postgres => 5432,
            Flavor::Mysql => 3306,
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flavor::Postgres => write!(f, "postgres"),
            Flavor::Mysql => write!(f, "mysql"),
        }
    }
}

/// Connection settings for one side of the reconciliation.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQL dialect.
    pub flavor: Flavor,

    /// Database name.
    pub database: String,

    /// Username.
    pub username: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Database host, or a socket directory for PostgreSQL.
    pub host: String,

    /// Database port (default: the flavor's standard port).
    #[serde(default)]
    pub port: Option<u16>,

    /// SSL mode: disable, require, verify-ca, verify-full (MySQL also accepts prefer).
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,

    /// Round (true) or truncate (false) timestamps to whole seconds when writing to MySQL.
    #[serde(default)]
    pub round_time: bool,

    /// Schema introspected on PostgreSQL (default: "public").
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Bookkeeping tables ignored by introspection.
    #[serde(default = "default_exclude_tables")]
    pub exclude_tables: Vec<String>,
}

impl DatabaseConfig {
    /// The configured port or the flavor default.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.flavor.default_port())
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("flavor", &self.flavor)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("ssl_mode", &self.ssl_mode)
            .field("round_time", &self.round_time)
            .field("schema", &self.schema)
            .field("exclude_tables", &self.exclude_tables)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Truncate each destination table before copying (default: false).
    #[serde(default)]
    pub truncate_first: bool,

    /// Report progress every N inserted rows (default: 10000).
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,

    /// Largest destination id set pushed into a NOT IN filter (default: 65535).
    #[serde(default = "default_max_in_clause_ids")]
    pub max_in_clause_ids: usize,

    /// Refuse the full-row strategy above this many source rows (default: 100000, null disables).
    #[serde(default = "default_full_row_probe_limit")]
    pub full_row_probe_limit: Option<u64>,

    /// Source rows fetched per batch while copying or verifying (default: 1000).
    #[serde(default = "default_read_batch_size")]
    pub read_batch_size: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            truncate_first: false,
            progress_interval: default_progress_interval(),
            max_in_clause_ids: default_max_in_clause_ids(),
            full_row_probe_limit: default_full_row_probe_limit(),
            read_batch_size: default_read_batch_size(),
        }
    }
}

/// Diagnostic toggles, settable from YAML or `--debug` flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Log every generated statement.
    #[serde(default)]
    pub log_sql: bool,

    /// Log scanned row values.
    #[serde(default)]
    pub log_row_values: bool,

    /// Log the source/destination schema comparison before running.
    #[serde(default)]
    pub dump_schema_diff: bool,

    /// Stop right after the schema comparison dump.
    #[serde(default)]
    pub stop_after_schema_dump: bool,
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_exclude_tables() -> Vec<String> {
    vec!["schema_migrations".to_string()]
}

fn default_progress_interval() -> u64 {
    10_000
}

fn default_max_in_clause_ids() -> usize {
    65_535
}

fn default_full_row_probe_limit() -> Option<u64> {
    Some(100_000)
}

fn default_read_batch_size() -> usize {
    1_000
}
