pub mod observation;
pub mod schema;

pub use observation::{CellValue, Observation, ResultSet};
pub use schema::{ColumnDescription, SchemaDescription};
