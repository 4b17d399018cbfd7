//! Repositories over the shared and tenant partitions.
//!
//! Each repository owns a [`PartitionResolver`](crate::partition::PartitionResolver)
//! clone and runs every operation as one partition-scoped transaction.
//! Cross-tenant records (accounts, organizations, grants, shared items)
//! live in the shared partition; personal vault items live in the owning
//! user's partition.

mod grants;
mod items;
mod orgs;
mod users;

pub use grants::PgGrantStore;
pub use items::{ItemRepository, NewItem, NewOrganizationItem};
pub use orgs::OrgRepository;
pub use users::{NewUser, UserRepository};

use crate::error::{ResourceError, StorageError};

/// Maps a unique-constraint violation to `AlreadyExists`; everything else
/// stays a backend error.
pub(crate) fn map_insert_err(
    err: tokio_postgres::Error,
    resource_type: &str,
    id: impl std::fmt::Display,
) -> StorageError {
    if err.code() == Some(&tokio_postgres::error::SqlState::UNIQUE_VIOLATION) {
        StorageError::Resource(ResourceError::AlreadyExists {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        })
    } else {
        err.into()
    }
}

/// `NotFound` constructor shorthand used across the repositories.
pub(crate) fn not_found(resource_type: &str, id: impl std::fmt::Display) -> StorageError {
    StorageError::Resource(ResourceError::NotFound {
        resource_type: resource_type.to_string(),
        id: id.to_string(),
    })
}
