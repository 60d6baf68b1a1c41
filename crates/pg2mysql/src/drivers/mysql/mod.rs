//! MySQL/MariaDB adapter built on a single mysql_async connection.
//!
//! A single connection is required: `FOREIGN_KEY_CHECKS` is a session
//! variable, so constraint toggling only affects statements sent on the same
//! connection.

mod value;

use async_trait::async_trait;
use chrono::{NaiveDateTime, SubsecRound};
use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder, Row};
use tracing::{debug, info};

use crate::config::{DatabaseConfig, Flavor};
use crate::core::batch::{RowBatchSender, RowBatcher};
use crate::core::schema::SchemaRow;
use crate::core::traits::Database;
use crate::core::value::SqlValue;
use crate::drivers::common::mysql_ssl_opts;
use crate::error::{MigrateError, Result};

/// MySQL connection implementing [`Database`].
pub struct MysqlDb {
    conn: Option<Conn>,
    database: String,
    exclude_tables: Vec<String>,
    round_time: bool,
}

impl MysqlDb {
    /// Open a connection using the given configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut builder = OptsBuilder::default()
            .ip_or_hostname(&config.host)
            .tcp_port(config.port())
            .db_name(Some(&config.database))
            .user(Some(&config.username))
            .pass(Some(&config.password))
            // Use utf8mb4 for full Unicode support
            .init(vec!["SET NAMES utf8mb4"]);

        if let Some(ssl) = mysql_ssl_opts(&config.ssl_mode) {
            builder = builder.ssl_opts(ssl);
        }

        let context = format!("connecting to {}", config.endpoint());
        let mut conn = Conn::new(builder)
            .await
            .map_err(|e| MigrateError::connection(e, context.clone()))?;

        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(e, context))?;

        info!("Connected to MySQL: {}", config.endpoint());

        Ok(Self {
            conn: Some(conn),
            database: config.database.clone(),
            exclude_tables: config.exclude_tables.clone(),
            round_time: config.round_time,
        })
    }

    fn conn(&mut self) -> Result<&mut Conn> {
        self.conn
            .as_mut()
            .ok_or_else(|| MigrateError::connection("connection is closed", &self.database))
    }
}

fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn binary_uuid_marker() -> &'static str {
    "UNHEX(REPLACE(?, '-', ''))"
}

fn comparison_clause(column: &str, source_type: &str) -> String {
    let marker = if source_type.eq_ignore_ascii_case("uuid") {
        binary_uuid_marker()
    } else {
        "?"
    };
    format!("{} <=> {}", quote_ident(column), marker)
}

fn normalize_time(t: NaiveDateTime, round_time: bool) -> NaiveDateTime {
    if round_time {
        t.round_subsecs(0)
    } else {
        t.trunc_subsecs(0)
    }
}

fn row_values(mut row: Row) -> Result<Vec<SqlValue>> {
    let columns = row.columns();
    columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let cell = row.take(idx).unwrap_or(mysql_async::Value::NULL);
            value::from_mysql(cell, column)
        })
        .collect()
}

fn schema_query(excluded: usize) -> String {
    let mut sql = String::from(
        "SELECT \
            CAST(c.TABLE_NAME AS CHAR(255)), \
            CAST(c.COLUMN_NAME AS CHAR(255)), \
            CAST(c.DATA_TYPE AS CHAR(255)), \
            CAST(c.CHARACTER_MAXIMUM_LENGTH AS SIGNED) \
         FROM INFORMATION_SCHEMA.COLUMNS c \
         JOIN INFORMATION_SCHEMA.TABLES t \
            ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME \
         WHERE t.TABLE_TYPE = 'BASE TABLE' AND c.TABLE_SCHEMA = ?",
    );
    if excluded > 0 {
        sql.push_str(&format!(
            " AND c.TABLE_NAME NOT IN ({})",
            vec!["?"; excluded].join(", ")
        ));
    }
    sql.push_str(" ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION");
    sql
}

#[async_trait]
impl Database for MysqlDb {
    fn flavor(&self) -> Flavor {
        Flavor::Mysql
    }

    async fn schema_rows(&mut self) -> Result<Vec<SchemaRow>> {
        let sql = schema_query(self.exclude_tables.len());
        let mut params = vec![mysql_async::Value::from(self.database.as_str())];
        params.extend(
            self.exclude_tables
                .iter()
                .map(|t| mysql_async::Value::from(t.as_str())),
        );

        let rows: Vec<(String, String, String, Option<i64>)> = self
            .conn()?
            .exec(sql.as_str(), params)
            .await
            .map_err(|e| MigrateError::SchemaExtraction(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(table, column, data_type, max_chars)| {
                SchemaRow::new(table, column, data_type, max_chars)
            })
            .collect())
    }

    async fn disable_constraints(&mut self) -> Result<()> {
        self.conn()?
            .query_drop("SET FOREIGN_KEY_CHECKS = 0")
            .await
            .map_err(value::map_error)
    }

    async fn enable_constraints(&mut self) -> Result<()> {
        self.conn()?
            .query_drop("SET FOREIGN_KEY_CHECKS = 1")
            .await
            .map_err(value::map_error)
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_ident(name)
    }

    fn parameter_marker(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn binary_uuid_marker(&self, _index: usize) -> String {
        binary_uuid_marker().to_string()
    }

    fn comparison_clause(&self, _index: usize, column: &str, source_type: &str) -> String {
        comparison_clause(column, source_type)
    }

    fn normalize_time(&self, t: NaiveDateTime) -> NaiveDateTime {
        normalize_time(t, self.round_time)
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Vec<SqlValue>>> {
        let params: Vec<mysql_async::Value> = params.iter().map(value::to_mysql).collect();
        let conn = self.conn()?;
        let rows: Vec<Row> = if params.is_empty() {
            conn.query(sql).await
        } else {
            conn.exec(sql, params).await
        }
        .map_err(value::map_error)?;

        rows.into_iter().map(row_values).collect()
    }

    async fn stream_rows(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        batch_size: usize,
        tx: RowBatchSender,
    ) -> Result<u64> {
        let params: Vec<mysql_async::Value> = params.iter().map(value::to_mysql).collect();
        let conn = self.conn()?;
        let mut batcher = RowBatcher::new(tx, batch_size);
        if params.is_empty() {
            let mut result = conn.query_iter(sql).await.map_err(value::map_error)?;
            while let Some(row) = result.next().await.map_err(value::map_error)? {
                batcher.push(row_values(row)?).await?;
            }
        } else {
            let mut result = conn.exec_iter(sql, params).await.map_err(value::map_error)?;
            while let Some(row) = result.next().await.map_err(value::map_error)? {
                batcher.push(row_values(row)?).await?;
            }
        }
        batcher.finish().await
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let params: Vec<mysql_async::Value> = params.iter().map(value::to_mysql).collect();
        let conn = self.conn()?;
        let outcome = if params.is_empty() {
            conn.query_drop(sql).await
        } else {
            conn.exec_drop(sql, params).await
        };
        outcome.map_err(value::map_error)?;
        Ok(conn.affected_rows())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.disconnect().await?;
            debug!("MySQL connection to {} closed", self.database);
        }
        Ok(())
    }
}
