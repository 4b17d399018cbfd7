//! PostgreSQL backend.
//!
//! Connection pooling via deadpool-postgres, schema-per-tenant isolation
//! through the partition resolver, and the shared-partition schema for
//! cross-tenant records (accounts, organizations, grants, shared items).
//!
//! # Example
//!
//! ```no_run
//! use latchkey_persistence::backends::postgres::{PostgresBackend, PostgresConfig};
//!
//! # async fn main_example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = PostgresBackend::new(PostgresConfig::default()).await?;
//! backend.init_schema().await?;
//! # Ok(())
//! # }
//! ```

mod backend;
pub(crate) mod schema;

pub use backend::{PostgresBackend, PostgresConfig, PostgresSslMode};
