//! PostgreSQL adapter built on a single tokio-postgres client.

mod value;

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config as PgConfig, NoTls, Statement};
use tracing::{debug, error, info, warn};

use crate::config::{DatabaseConfig, Flavor};
use crate::core::batch::{RowBatchSender, RowBatcher};
use crate::core::schema::SchemaRow;
use crate::core::traits::Database;
use crate::core::value::SqlValue;
use crate::drivers::common::SslMode;
use crate::error::{MigrateError, Result};

const SCHEMA_QUERY: &str = r#"
    SELECT
        c.table_name::text,
        c.column_name::text,
        c.data_type::text,
        c.character_maximum_length::bigint
    FROM information_schema.columns c
    JOIN information_schema.tables t
        ON t.table_catalog = c.table_catalog
        AND t.table_schema = c.table_schema
        AND t.table_name = c.table_name
    WHERE t.table_type = 'BASE TABLE'
        AND c.table_schema = $1
        AND c.table_catalog = $2
        AND NOT (c.table_name::text = ANY($3))
    ORDER BY c.table_name, c.ordinal_position
"#;

/// PostgreSQL connection implementing [`Database`].
pub struct PostgresDb {
    client: Client,
    connection: Option<JoinHandle<()>>,
    database: String,
    schema: String,
    exclude_tables: Vec<String>,
    statements: HashMap<String, Statement>,
}

impl PostgresDb {
    /// Open a connection using the given configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port());
        pg_config.dbname(&config.database);
        pg_config.user(&config.username);
        pg_config.password(&config.password);
        pg_config.application_name("pg2mysql");

        let context = format!("connecting to {}", config.endpoint());
        let ssl_mode = SslMode::parse(&config.ssl_mode)?;

        let (client, connection) = match ssl_mode.postgres_connector()? {
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                let (client, connection) = pg_config
                    .connect(NoTls)
                    .await
                    .map_err(|e| MigrateError::connection(e, context.clone()))?;
                let handle = tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        error!("PostgreSQL connection error: {}", e);
                    }
                });
                (client, handle)
            }
            Some(tls) => {
                pg_config.ssl_mode(tokio_postgres::config::SslMode::Require);
                let (client, connection) = pg_config
                    .connect(tls)
                    .await
                    .map_err(|e| MigrateError::connection(e, context.clone()))?;
                let handle = tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        error!("PostgreSQL connection error: {}", e);
                    }
                });
                (client, handle)
            }
        };

        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(e, context))?;

        info!("Connected to PostgreSQL: {}", config.endpoint());

        Ok(Self {
            client,
            connection: Some(connection),
            database: config.database.clone(),
            schema: config.schema.clone(),
            exclude_tables: config.exclude_tables.clone(),
            statements: HashMap::new(),
        })
    }

    async fn prepare(&mut self, sql: &str) -> Result<Statement> {
        if let Some(stmt) = self.statements.get(sql) {
            return Ok(stmt.clone());
        }
        let stmt = self.client.prepare(sql).await.map_err(value::map_error)?;
        self.statements.insert(sql.to_string(), stmt.clone());
        Ok(stmt)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn parameter_marker(index: usize) -> String {
    format!("${}", index + 1)
}

/// Declared types decoded directly from the binary protocol.
fn decodes_natively(data_type: &str) -> bool {
    matches!(
        data_type.to_ascii_lowercase().as_str(),
        "boolean"
            | "smallint"
            | "integer"
            | "bigint"
            | "real"
            | "double precision"
            | "numeric"
            | "uuid"
            | "bytea"
            | "timestamp without time zone"
            | "timestamp with time zone"
            | "date"
            | "time without time zone"
            | "json"
            | "jsonb"
            | "text"
            | "character varying"
            | "character"
            | "name"
    )
}

/// Columns without a native decoding (interval, inet, money, arrays, enums, ...)
/// are read through their text output.
fn select_expression(column: &str, data_type: &str) -> String {
    if decodes_natively(data_type) {
        quote_ident(column)
    } else {
        format!("{}::text", quote_ident(column))
    }
}

fn comparison_clause(index: usize, column: &str) -> String {
    format!(
        "NOT ({} IS DISTINCT FROM {})",
        quote_ident(column),
        parameter_marker(index)
    )
}

fn bind(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

#[async_trait]
impl Database for PostgresDb {
    fn flavor(&self) -> Flavor {
        Flavor::Postgres
    }

    async fn schema_rows(&mut self) -> Result<Vec<SchemaRow>> {
        let rows = self
            .client
            .query(
                SCHEMA_QUERY,
                &[&self.schema, &self.database, &self.exclude_tables],
            )
            .await
            .map_err(|e| MigrateError::SchemaExtraction(e.to_string()))?;

        rows.iter()
            .map(|row| -> std::result::Result<SchemaRow, tokio_postgres::Error> {
                Ok(SchemaRow {
                    table_name: row.try_get(0)?,
                    column_name: row.try_get(1)?,
                    data_type: row.try_get(2)?,
                    max_chars: row.try_get(3)?,
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| MigrateError::SchemaExtraction(e.to_string()))
    }

    async fn disable_constraints(&mut self) -> Result<()> {
        debug!("PostgreSQL: constraints are left enabled");
        Ok(())
    }

    async fn enable_constraints(&mut self) -> Result<()> {
        Ok(())
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_ident(name)
    }

    fn parameter_marker(&self, index: usize) -> String {
        parameter_marker(index)
    }

    fn select_expression(&self, column: &str, data_type: &str) -> String {
        select_expression(column, data_type)
    }

    fn comparison_clause(&self, index: usize, column: &str, _source_type: &str) -> String {
        comparison_clause(index, column)
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Vec<SqlValue>>> {
        let stmt = self.prepare(sql).await?;
        let rows = self
            .client
            .query(&stmt, &bind(params))
            .await
            .map_err(value::map_error)?;
        rows.iter().map(value::row_to_values).collect()
    }

    async fn stream_rows(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        batch_size: usize,
        tx: RowBatchSender,
    ) -> Result<u64> {
        let stmt = self.prepare(sql).await?;
        let rows = self
            .client
            .query_raw(&stmt, params.iter())
            .await
            .map_err(value::map_error)?;

        tokio::pin!(rows);

        let mut batcher = RowBatcher::new(tx, batch_size);
        while let Some(row) = rows.next().await {
            let row = row.map_err(value::map_error)?;
            batcher.push(value::row_to_values(&row)?).await?;
        }
        batcher.finish().await
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let stmt = self.prepare(sql).await?;
        self.client
            .execute(&stmt, &bind(params))
            .await
            .map_err(value::map_error)
    }

    async fn close(&mut self) -> Result<()> {
        self.statements.clear();
        if let Some(handle) = self.connection.take() {
            handle.abort();
            debug!("PostgreSQL connection to {} closed", self.database);
        }
        Ok(())
    }
}
