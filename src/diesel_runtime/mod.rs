//! Diesel ORM runtime infrastructure
//!
//! Connection pooling and the SQL-backed connection store.
//!
//! # Features
//!
//! - `sqlite` (default): bundled SQLite
//! - `postgres`: PostgreSQL via libpq
//! - `mysql`: MySQL/MariaDB via libmysqlclient

pub mod connection_store;
pub mod database;
pub mod schema;

// Re-export key types
pub use connection_store::DieselConnectionStore;
pub use database::{Database, DatabaseConfig, DbConnection, Pool, PooledConnection};
