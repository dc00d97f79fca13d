pub mod connection;
pub mod errors;
pub mod executor;
pub mod fixtures;
pub mod migrations;
pub mod schema;

pub use connection::{connect_from_config, connect_with_settings, DbPool};
pub use errors::RepositoryError;
pub use executor::SqliteQueryExecutor;
pub use fixtures::{DemoSeedDataset, SeedResult, VerificationResult};
pub use schema::SqliteSchemaProvider;
