//! Tenant partitioning.
//!
//! Each user account owns a dedicated storage partition (a PostgreSQL
//! schema) holding their personal vault items; cross-tenant records live
//! in the shared partition. [`PartitionName`] is the validated identifier
//! type and [`PartitionResolver`] scopes units of work onto a partition.

mod name;
#[cfg(feature = "postgres")]
mod resolver;

pub use name::{MAX_PARTITION_NAME_LEN, PartitionName, SHARED_PARTITION};
#[cfg(feature = "postgres")]
pub use resolver::{PartitionResolver, PartitionTransaction, ScopedFuture};
