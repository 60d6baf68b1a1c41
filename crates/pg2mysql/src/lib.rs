//! # pg2mysql
//!
//! Reconcile rows between a PostgreSQL database and a MySQL database that
//! share a schema.
//!
//! The library provides three engines over a common [`Database`] capability:
//!
//! - **Validation**: find source rows whose values exceed destination column bounds
//! - **Migration**: copy rows missing from the destination, by id or by full row
//! - **Verification**: report source rows with no identical destination row
//!
//! ## Example
//!
//! ```rust,no_run
//! use pg2mysql::{drivers, Config, EngineOptions, Migrator, NoopWatcher};
//!
//! #[tokio::main]
//! async fn main() -> pg2mysql::Result<()> {
//!     let config = Config::load("config.yml")?;
//!     let mut source = drivers::connect(&config.source).await?;
//!     let mut dest = drivers::connect(&config.dest).await?;
//!     let result = Migrator::new(
//!         source.as_mut(),
//!         dest.as_mut(),
//!         EngineOptions::from(&config),
//!         &NoopWatcher,
//!     )
//!     .migrate()
//!     .await?;
//!     println!("Migrated {} rows", result.rows_inserted);
//!     Ok(())
//! }
//! ```

pub mod compat;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod migrate;
pub mod progress;
pub mod reconcile;
pub mod validate;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use compat::{is_compatible, SchemaReport, Verdict};
pub use config::{Config, DatabaseConfig, DiagnosticsConfig, EngineOptions, Flavor, MigrationConfig};
pub use crate::core::{Column, Database, Schema, SqlValue, Table};
pub use error::{MigrateError, Result};
pub use migrate::{MigrationResult, Migrator, Strategy, TableMigrationResult};
pub use progress::{MigrationWatcher, NoopWatcher, VerificationWatcher};
pub use validate::{ValidationResult, Validator};
pub use verify::{TableVerifyResult, VerifyResult, Verifier};
