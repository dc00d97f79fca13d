use async_trait::async_trait;

use crate::domain::observation::ResultSet;
use crate::domain::schema::SchemaDescription;
use crate::errors::{ExecutionError, SchemaError};
use crate::guard::ApprovedQuery;

#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn describe_schema(&self) -> Result<SchemaDescription, SchemaError>;
}

/// Runs queries the guard approved. There is no way to hand it a raw string.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &ApprovedQuery) -> Result<ResultSet, ExecutionError>;
}

#[derive(Clone, Debug)]
pub struct StaticSchemaProvider {
    schema: SchemaDescription,
}

impl StaticSchemaProvider {
    pub fn new(schema: SchemaDescription) -> Self {
        Self { schema }
    }
}

#[async_trait]
impl SchemaProvider for StaticSchemaProvider {
    async fn describe_schema(&self) -> Result<SchemaDescription, SchemaError> {
        if self.schema.is_empty() {
            return Err(SchemaError::Empty);
        }
        Ok(self.schema.clone())
    }
}
