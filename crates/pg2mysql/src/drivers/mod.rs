//! Dialect adapters implementing [`Database`].
//!
//! - [`postgres`]: PostgreSQL via tokio-postgres
//! - [`mysql`]: MySQL/MariaDB via mysql_async
//! - [`common`]: TLS settings shared by both

pub mod common;
pub mod mysql;
pub mod postgres;

pub use mysql::MysqlDb;
pub use postgres::PostgresDb;

use crate::config::{DatabaseConfig, Flavor};
use crate::core::traits::Database;
use crate::error::Result;

/// Open a connection for the configured flavor.
pub async fn connect(config: &DatabaseConfig) -> Result<Box<dyn Database>> {
    let db: Box<dyn Database> = match config.flavor {
        Flavor::Postgres => Box::new(PostgresDb::connect(config).await?),
        Flavor::Mysql => Box::new(MysqlDb::connect(config).await?),
    };
    Ok(db)
}
