//! Database module for MySQL connection, query execution and schema introspection

pub mod connection;
pub mod executor;
pub mod schema;

pub use connection::{connect_options, init_pool, DbPool};
pub use executor::{MySqlExecutor, QueryOutcome, SqlExecutor};
pub use schema::{ColumnInfo, SchemaCache, SchemaSnapshot};
