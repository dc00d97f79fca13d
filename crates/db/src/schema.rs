use async_trait::async_trait;
use sqlreact_core::domain::schema::{ColumnDescription, SchemaDescription};
use sqlreact_core::errors::SchemaError;
use sqlreact_core::ports::SchemaProvider;
use tracing::debug;

use crate::DbPool;

/// Describes the live SQLite catalog. Internal tables (`sqlite_*`, `_sqlx_*`) are never
/// exposed to the model.
#[derive(Clone)]
pub struct SqliteSchemaProvider {
    pool: DbPool,
    tables: Option<Vec<String>>,
}

impl SqliteSchemaProvider {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, tables: None }
    }

    /// Restrict the description to the named tables. Unknown names are skipped.
    pub fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    async fn table_names(&self) -> Result<Vec<String>, sqlx::Error> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(names
            .into_iter()
            .filter(|name| !is_internal_table(name))
            .filter(|name| match &self.tables {
                Some(allowed) => allowed.iter().any(|table| table.eq_ignore_ascii_case(name)),
                None => true,
            })
            .collect())
    }
}

#[async_trait]
impl SchemaProvider for SqliteSchemaProvider {
    async fn describe_schema(&self) -> Result<SchemaDescription, SchemaError> {
        let names = self.table_names().await.map_err(unavailable)?;

        let mut schema = SchemaDescription::new();
        for table in names {
            let columns: Vec<(String, String)> = sqlx::query_as(
                "SELECT name, type FROM pragma_table_info(?1) ORDER BY cid",
            )
            .bind(&table)
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;

            if columns.is_empty() {
                continue;
            }
            schema.insert_table(
                table,
                columns.into_iter().map(|(name, data_type)| ColumnDescription::new(name, data_type)),
            );
        }

        if schema.is_empty() {
            return Err(SchemaError::Empty);
        }

        debug!(
            event_name = "db.schema.described",
            tables = schema.table_names().count(),
            "schema description loaded"
        );
        Ok(schema)
    }
}

fn is_internal_table(name: &str) -> bool {
    name.starts_with("sqlite_") || name.starts_with("_sqlx_")
}

fn unavailable(error: sqlx::Error) -> SchemaError {
    SchemaError::Unavailable(error.to_string())
}

#[cfg(test)]
mod tests {
    use sqlreact_core::errors::SchemaError;
    use sqlreact_core::ports::SchemaProvider;

    use super::SqliteSchemaProvider;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn describes_migrated_tables_without_internal_ones() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        let schema =
            SqliteSchemaProvider::new(pool).describe_schema().await.expect("describe schema");

        assert_eq!(schema.table_names().collect::<Vec<_>>(), vec!["Departments", "Employees"]);
        assert!(!schema.has_table("_sqlx_migrations"));
        assert_eq!(
            schema.render_for_prompt(),
            "Table **Departments**: (dept_id (INTEGER), name (TEXT))\n\
             Table **Employees**: (employee_id (INTEGER), name (TEXT), department (TEXT), salary (REAL))"
        );
    }

    #[tokio::test]
    async fn table_filter_limits_the_description() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        let schema = SqliteSchemaProvider::new(pool)
            .with_tables(["employees"])
            .describe_schema()
            .await
            .expect("describe schema");

        assert_eq!(schema.table_names().collect::<Vec<_>>(), vec!["Employees"]);
    }

    #[tokio::test]
    async fn empty_database_reports_empty_schema() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        let result = SqliteSchemaProvider::new(pool).describe_schema().await;
        assert_eq!(result, Err(SchemaError::Empty));
    }

    #[tokio::test]
    async fn closed_pool_reports_unavailable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        pool.close().await;
        let result = SqliteSchemaProvider::new(pool).describe_schema().await;
        assert!(matches!(result, Err(SchemaError::Unavailable(_))));
    }
}
