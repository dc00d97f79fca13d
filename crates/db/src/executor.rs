use std::time::Duration;

use async_trait::async_trait;
use sqlreact_core::domain::observation::{CellValue, ResultSet};
use sqlreact_core::errors::ExecutionError;
use sqlreact_core::guard::ApprovedQuery;
use sqlreact_core::ports::QueryExecutor;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Executor, Row, TypeInfo, ValueRef};
use tracing::debug;

use crate::DbPool;

/// Runs guard-approved queries against the pool and decodes rows by their runtime
/// SQLite storage class.
#[derive(Clone)]
pub struct SqliteQueryExecutor {
    pool: DbPool,
    timeout: Duration,
}

impl SqliteQueryExecutor {
    pub fn new(pool: DbPool, timeout_secs: u64) -> Self {
        Self { pool, timeout: Duration::from_secs(timeout_secs.max(1)) }
    }

    async fn fetch(&self, sql: &str) -> Result<ResultSet, sqlx::Error> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        let columns = match rows.first() {
            Some(row) => row.columns().iter().map(|column| column.name().to_string()).collect(),
            None => {
                let described = (&self.pool).describe(sql).await?;
                described.columns().iter().map(|column| column.name().to_string()).collect()
            }
        };

        let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
        Ok(ResultSet::new(columns, rows))
    }
}

#[async_trait]
impl QueryExecutor for SqliteQueryExecutor {
    async fn execute(&self, query: &ApprovedQuery) -> Result<ResultSet, ExecutionError> {
        let timeout_secs = self.timeout.as_secs();
        let result = tokio::time::timeout(self.timeout, self.fetch(query.as_str()))
            .await
            .map_err(|_| ExecutionError::Timeout { timeout_secs })?
            .map_err(execution_error)?;

        debug!(
            event_name = "db.query.executed",
            rows = result.row_count(),
            columns = result.columns.len(),
            "approved query executed"
        );
        Ok(result)
    }
}

fn decode_row(row: &SqliteRow) -> Result<Vec<CellValue>, sqlx::Error> {
    (0..row.len()).map(|index| decode_cell(row, index)).collect()
}

fn decode_cell(row: &SqliteRow, index: usize) -> Result<CellValue, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(CellValue::Null);
    }

    let storage_class = raw.type_info().name().to_ascii_uppercase();
    let value = match storage_class.as_str() {
        "INTEGER" | "BOOLEAN" => CellValue::Integer(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" | "NUMERIC" => CellValue::Real(row.try_get_unchecked::<f64, _>(index)?),
        "BLOB" => CellValue::Blob(row.try_get_unchecked::<Vec<u8>, _>(index)?),
        _ => CellValue::Text(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}

fn execution_error(error: sqlx::Error) -> ExecutionError {
    match error {
        sqlx::Error::Database(database_error) => {
            ExecutionError::Database { message: database_error.message().to_string() }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            ExecutionError::Connection { message: error.to_string() }
        }
        other => ExecutionError::Database { message: other.to_string() },
    }
}
