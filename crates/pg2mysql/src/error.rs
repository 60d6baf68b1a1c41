//! Error types for the reconciliation library.

use thiserror::Error;

/// Process exit code for configuration and YAML errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Process exit code for connection failures.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Process exit code for schema introspection and lookup failures.
pub const EXIT_SCHEMA_ERROR: u8 = 3;
/// Process exit code for data read/write failures.
pub const EXIT_DATA_ERROR: u8 = 4;
/// Process exit code when the run was stopped after the schema dump.
pub const EXIT_STOPPED: u8 = 5;
/// Process exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for reconciliation operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// PostgreSQL connection or query error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// MySQL connection or query error
    #[error("MySQL error: {0}")]
    Mysql(#[from] mysql_async::Error),

    /// Connection error with context
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Schema introspection failed
    #[error("Schema extraction failed: {0}")]
    SchemaExtraction(String),

    /// A source table has no counterpart in the destination schema
    #[error("Table {0} not found in schema")]
    TableNotFound(String),

    /// A column could not be resolved by its normalized name
    #[error("Column {column} not found in table {table}")]
    ColumnNotFound { table: String, column: String },

    /// Reading, probing or writing rows failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Insert collided with an existing primary key
    #[error("Duplicate primary key: {0}")]
    DuplicateKey(String),

    /// A value could not be converted between dialects
    #[error("Value conversion error: {0}")]
    Value(String),

    /// Full-row comparison refused because the table is too large
    #[error(
        "Table {table} has {rows} rows, above the full-row probe limit of {limit}; \
         add an id column or raise migration.full_row_probe_limit"
    )]
    FullRowLimitExceeded { table: String, rows: i64, limit: u64 },

    /// The reader of a row stream stopped before all rows were sent
    #[error("row stream closed by its reader")]
    StreamClosed,

    /// The run was stopped on request after dumping the schema comparison
    #[error("user requested a stop operation")]
    StopRequested,

    /// An error annotated with the operation that produced it
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Wrap this error with a description of the failed operation.
    pub fn context(self, context: impl Into<String>) -> Self {
        MigrateError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True when the error is a primary-key collision, looking through context wrappers.
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            MigrateError::DuplicateKey(_) => true,
            MigrateError::Context { source, .. } => source.is_duplicate_key(),
            _ => false,
        }
    }

    /// Map the error to a process exit code.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::Connection { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::SchemaExtraction(_)
            | MigrateError::TableNotFound(_)
            | MigrateError::ColumnNotFound { .. } => EXIT_SCHEMA_ERROR,
            MigrateError::Postgres(_)
            | MigrateError::Mysql(_)
            | MigrateError::Transfer { .. }
            | MigrateError::DuplicateKey(_)
            | MigrateError::Value(_)
            | MigrateError::StreamClosed
            | MigrateError::FullRowLimitExceeded { .. } => EXIT_DATA_ERROR,
            MigrateError::StopRequested => EXIT_STOPPED,
            MigrateError::Io(_) => EXIT_IO_ERROR,
            MigrateError::Context { source, .. } => source.exit_code(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
