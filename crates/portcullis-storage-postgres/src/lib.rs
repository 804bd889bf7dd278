//! PostgreSQL `Store` backend for the Portcullis authorization server.
//!
//! Owns the connection pool, applies the schema, and implements the
//! `Store` trait against the `clients` / `endpoints` / `tokens` tables.

mod config;
mod error;
mod pool;
mod schema;
mod store;

pub use config::PostgresConfig;
pub use error::map_sqlx_error;
pub use pool::{create_pool, health_ping};
pub use schema::ensure_schema;
pub use store::PostgresStore;
