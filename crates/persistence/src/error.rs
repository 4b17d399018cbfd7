//! Error types for the persistence layer.
//!
//! One hierarchy, composed transparently: identifier policy rejections,
//! resource state, transaction lifecycle, and backend failures. Domain
//! errors from `latchkey-vault` pass through unchanged so a policy
//! rejection raised inside a storage operation keeps its identity.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use latchkey_vault::error::{AccessError, CredentialError, KdfError, KeyError};

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Partition name failed the allow-list.
    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    /// Resource state errors.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Transaction lifecycle errors.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Backend-specific errors.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Key-derivation policy rejection.
    #[error(transparent)]
    Kdf(#[from] KdfError),

    /// Wrapped-key material error.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Credential verification failure.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Authorization failure.
    #[error(transparent)]
    Access(#[from] AccessError),
}

/// A proposed partition name failed validation.
///
/// Always a rejection, never escaped or repaired, and never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("invalid identifier: empty")]
    Empty,

    #[error("invalid identifier: longer than {max} bytes")]
    TooLong { max: usize },

    /// Fails the allow-list format (lowercase letter, then lowercase
    /// letters, digits, underscores).
    #[error("invalid identifier format")]
    BadFormat,

    #[error("invalid identifier: reserved name")]
    Reserved,
}

/// Errors related to resource state.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The requested record was not found.
    #[error("not found: {resource_type}/{id}")]
    NotFound { resource_type: String, id: String },

    /// A record with the given key already exists.
    #[error("already exists: {resource_type}/{id}")]
    AlreadyExists { resource_type: String, id: String },
}

/// Errors related to transactions.
///
/// Any statement failure inside a partition-scoped unit of work surfaces
/// as `RolledBack`: the whole logical operation aborted, and callers may
/// retry the whole operation but never part of it.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// The transaction was rolled back.
    #[error("operation aborted: {reason}")]
    RolledBack { reason: String },

    /// The transaction is no longer valid (already committed or rolled back).
    #[error("transaction no longer valid")]
    InvalidTransaction,
}

/// Errors originating from the database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection to the backend failed.
    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    /// Connection pool exhausted.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// Internal backend error.
    #[error("internal backend error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::Serialization {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for StorageError {
    fn from(err: tokio_postgres::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "postgres")]
impl From<deadpool_postgres::PoolError> for StorageError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Timeout(_) => {
                StorageError::Backend(BackendError::PoolExhausted)
            }
            other => StorageError::Backend(BackendError::ConnectionFailed {
                message: other.to_string(),
            }),
        }
    }
}
