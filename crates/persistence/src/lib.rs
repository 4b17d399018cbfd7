//! Tenant-partitioned persistence for Latchkey Vault Server.
//!
//! Storage is split two ways: a shared partition for cross-tenant records
//! (accounts, organizations, memberships, grants, organization items) and
//! one partition per user account for personal vault items. The partition
//! boundary is enforced structurally — every tenant-scoped statement runs
//! inside a transaction whose `search_path` was set to a validated
//! [`partition::PartitionName`], and nothing else is ever interpolated
//! into SQL.
//!
//! # Layout
//!
//! - [`partition`] - Name validation and the partition resolver
//! - [`backends`] - The PostgreSQL backend (pool, shared schema, tenant
//!   DDL)
//! - [`repository`] - Users, organizations, grants, and items
//! - [`context`] - Per-request authorization context
//! - [`error`] - Error hierarchy
//!
//! # Example
//!
//! ```no_run
//! use latchkey_persistence::backends::postgres::{PostgresBackend, PostgresConfig};
//! use latchkey_persistence::repository::UserRepository;
//!
//! # async fn main_example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = PostgresBackend::new(PostgresConfig::default()).await?;
//! backend.init_schema().await?;
//!
//! let users = UserRepository::new(backend.resolver());
//! let user = users.get_by_email("ada@example.com").await?;
//! println!("{} -> {}", user.email, user.partition);
//! # Ok(())
//! # }
//! ```

pub mod backends;
#[cfg(feature = "postgres")]
pub mod context;
pub mod error;
pub mod partition;
#[cfg(feature = "postgres")]
pub mod repository;

pub use error::{StorageError, StorageResult};
pub use partition::PartitionName;
