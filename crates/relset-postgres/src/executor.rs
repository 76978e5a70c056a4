//! Statement execution with observability.
//!
//! Every statement the core issues goes through `QueryExecutor`, which binds
//! the positional parameters, runs the statement on the Model's connection
//! and logs its duration. Nothing here retries: a failed statement surfaces
//! to the caller as-is.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnection, Postgres};
use sqlx::Row as SqlxRow;
use tracing::{debug, instrument, warn};

use crate::types::bind_all;
use crate::{RelsetError, Result, Row, Value};

/// Configuration for statement logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Threshold for slow statement logging in milliseconds
    pub slow_query_threshold_ms: u64,
    /// Number of characters of SQL kept in log fields
    pub sql_preview_len: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold_ms: 1000, // 1 second
            sql_preview_len: 100,
        }
    }
}

impl ExecutorConfig {
    pub(crate) fn preview(&self, sql: &str) -> String {
        sql.chars().take(self.sql_preview_len).collect()
    }

    /// Log statement completion with slow query detection.
    pub(crate) fn log_query_completion(&self, sql: &str, elapsed: Duration, rows: u64) {
        let elapsed_ms = elapsed.as_millis() as u64;
        let sql_preview = self.preview(sql);

        if elapsed_ms >= self.slow_query_threshold_ms {
            warn!(
                sql = %sql_preview,
                elapsed_ms = elapsed_ms,
                threshold_ms = self.slow_query_threshold_ms,
                rows = rows,
                "Slow query detected"
            );
        } else {
            debug!(
                sql = %sql_preview,
                elapsed_ms = elapsed_ms,
                rows = rows,
                "Query completed"
            );
        }
    }

    pub(crate) fn log_query_failure(&self, sql: &str, elapsed: Duration, error: &sqlx::Error) {
        warn!(
            sql = %self.preview(sql),
            elapsed_ms = elapsed.as_millis() as u64,
            error = %error,
            "Query failed"
        );
    }
}

/// Runs statements on one borrowed connection.
pub struct QueryExecutor<'c> {
    conn: &'c mut PgConnection,
    config: &'c ExecutorConfig,
}

impl<'c> QueryExecutor<'c> {
    pub fn new(conn: &'c mut PgConnection, config: &'c ExecutorConfig) -> Self {
        Self { conn, config }
    }

    /// Execute a statement and decode every returned row.
    #[instrument(skip(self, sql, params), fields(sql_preview = %self.config.preview(sql), params = params.len()))]
    pub async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let args = bind_all(params)?;
        let start = Instant::now();

        match sqlx::query_with(sql, args).fetch_all(&mut *self.conn).await {
            Ok(rows) => {
                self.config
                    .log_query_completion(sql, start.elapsed(), rows.len() as u64);
                rows.iter().map(Row::from_sqlx).collect()
            }
            Err(e) => {
                self.config.log_query_failure(sql, start.elapsed(), &e);
                Err(RelsetError::from(e))
            }
        }
    }

    /// Execute a statement expected to return at most one row.
    #[instrument(skip(self, sql, params), fields(sql_preview = %self.config.preview(sql), params = params.len()))]
    pub async fn fetch_optional(&mut self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        let args = bind_all(params)?;
        let start = Instant::now();

        match sqlx::query_with(sql, args).fetch_optional(&mut *self.conn).await {
            Ok(row) => {
                self.config
                    .log_query_completion(sql, start.elapsed(), u64::from(row.is_some()));
                row.as_ref().map(Row::from_sqlx).transpose()
            }
            Err(e) => {
                self.config.log_query_failure(sql, start.elapsed(), &e);
                Err(RelsetError::from(e))
            }
        }
    }

    /// Execute a statement whose single row has a single column
    /// (`COUNT(*)`, `EXISTS (...)`).
    #[instrument(skip(self, sql, params), fields(sql_preview = %self.config.preview(sql), params = params.len()))]
    pub async fn fetch_scalar<T>(&mut self, sql: &str, params: &[Value]) -> Result<T>
    where
        T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
    {
        let args = bind_all(params)?;
        let start = Instant::now();

        match sqlx::query_with(sql, args).fetch_one(&mut *self.conn).await {
            Ok(row) => {
                self.config.log_query_completion(sql, start.elapsed(), 1);
                row.try_get::<T, _>(0).map_err(RelsetError::from)
            }
            Err(e) => {
                self.config.log_query_failure(sql, start.elapsed(), &e);
                Err(RelsetError::from(e))
            }
        }
    }

    /// Execute a statement and return the number of affected rows.
    #[instrument(skip(self, sql, params), fields(sql_preview = %self.config.preview(sql), params = params.len()))]
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let args = bind_all(params)?;
        let start = Instant::now();

        match sqlx::query_with(sql, args).execute(&mut *self.conn).await {
            Ok(result) => {
                let rows_affected = result.rows_affected();
                self.config
                    .log_query_completion(sql, start.elapsed(), rows_affected);
                Ok(rows_affected)
            }
            Err(e) => {
                self.config.log_query_failure(sql, start.elapsed(), &e);
                Err(RelsetError::from(e))
            }
        }
    }

    /// Execute parameterless control statements (BEGIN, SAVEPOINT, ...)
    /// through the simple query protocol.
    pub async fn execute_control(&mut self, sql: &str) -> Result<()> {
        let start = Instant::now();
        match sqlx::raw_sql(sql).execute(&mut *self.conn).await {
            Ok(_) => {
                self.config.log_query_completion(sql, start.elapsed(), 0);
                Ok(())
            }
            Err(e) => {
                self.config.log_query_failure(sql, start.elapsed(), &e);
                Err(RelsetError::from(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_config_default() {
        let config = ExecutorConfig::default();
        assert_eq!(config.slow_query_threshold_ms, 1000);
        assert_eq!(config.sql_preview_len, 100);
    }

    #[test]
    fn test_preview_truncates() {
        let config = ExecutorConfig {
            sql_preview_len: 6,
            ..Default::default()
        };
        assert_eq!(config.preview("SELECT * FROM t"), "SELECT");
        assert_eq!(config.preview("é"), "é");
    }

    #[test]
    fn test_executor_config_deserialize() {
        let config: ExecutorConfig =
            serde_json::from_str(r#"{"slow_query_threshold_ms": 250}"#).unwrap();
        assert_eq!(config.slow_query_threshold_ms, 250);
        assert_eq!(config.sql_preview_len, 100);
    }
}
