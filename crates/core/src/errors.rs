use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema provider unavailable: {0}")]
    Unavailable(String),
    #[error("schema provider returned no queryable tables")]
    Empty,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("database error: {message}")]
    Database { message: String },
    #[error("database connection unavailable: {message}")]
    Connection { message: String },
    #[error("query timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

impl ExecutionError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Database { .. } => "database",
            Self::Connection { .. } => "connection",
            Self::Timeout { .. } => "timeout",
        }
    }
}
