pub mod config;
pub mod domain;
pub mod errors;
pub mod guard;
pub mod ports;
pub mod trace;

pub use domain::observation::{CellValue, Observation, ResultSet};
pub use domain::schema::{ColumnDescription, SchemaDescription};
pub use errors::{ExecutionError, SchemaError};
pub use guard::{ApprovedQuery, GuardVerdict, QueryGuard, Rejection, MANDATORY_LIMIT};
pub use ports::{QueryExecutor, SchemaProvider, StaticSchemaProvider};
pub use trace::{
    CompositeTraceSink, InMemoryTraceSink, JsonlTraceSink, TraceRecord, TraceSink,
    TracingTraceSink,
};
