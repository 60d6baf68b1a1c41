//! Configuration validation.

use super::{Config, DatabaseConfig, Flavor};
use crate::drivers::common::SslMode;
use crate::error::{MigrateError, Result};

const MYSQL_SSL_MODES: &[&str] = &[
    "disable",
    "prefer",
    "require",
    "verify-ca",
    "verify_ca",
    "verify-full",
    "verify_identity",
];

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_database("source", &config.source)?;
    validate_database("dest", &config.dest)?;

    // Cannot reconcile a database with itself
    if config.source.flavor == config.dest.flavor
        && config.source.host == config.dest.host
        && config.source.port() == config.dest.port()
        && config.source.database == config.dest.database
    {
        return Err(MigrateError::Config(
            "source and dest cannot be the same database".into(),
        ));
    }

    if config.migration.progress_interval == 0 {
        return Err(MigrateError::Config(
            "migration.progress_interval must be at least 1".into(),
        ));
    }
    if !(1..=65_535).contains(&config.migration.max_in_clause_ids) {
        return Err(MigrateError::Config(format!(
            "migration.max_in_clause_ids must be between 1 and 65535, got {}",
            config.migration.max_in_clause_ids
        )));
    }
    if let Some(0) = config.migration.full_row_probe_limit {
        return Err(MigrateError::Config(
            "migration.full_row_probe_limit must be at least 1 (use null to disable)".into(),
        ));
    }
    if config.migration.read_batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.read_batch_size must be at least 1".into(),
        ));
    }

    if config.diagnostics.stop_after_schema_dump && !config.diagnostics.dump_schema_diff {
        return Err(MigrateError::Config(
            "diagnostics.stop_after_schema_dump requires diagnostics.dump_schema_diff".into(),
        ));
    }

    Ok(())
}

fn validate_database(side: &str, db: &DatabaseConfig) -> Result<()> {
    if db.host.is_empty() {
        return Err(MigrateError::Config(format!("{}.host is required", side)));
    }
    if db.database.is_empty() {
        return Err(MigrateError::Config(format!("{}.database is required", side)));
    }
    if db.username.is_empty() {
        return Err(MigrateError::Config(format!("{}.username is required", side)));
    }
    if let Some(0) = db.port {
        return Err(MigrateError::Config(format!("{}.port must not be 0", side)));
    }

    match db.flavor {
        Flavor::Postgres => {
            SslMode::parse(&db.ssl_mode)?;
            if db.schema.is_empty() {
                return Err(MigrateError::Config(format!("{}.schema is required", side)));
            }
        }
        Flavor::Mysql => {
            if !MYSQL_SSL_MODES.contains(&db.ssl_mode.to_lowercase().as_str()) {
                return Err(MigrateError::Config(format!(
                    "Invalid {}.ssl_mode '{}'. Valid values: {}",
                    side,
                    db.ssl_mode,
                    MYSQL_SSL_MODES.join(", ")
                )));
            }
        }
    }

    Ok(())
}
