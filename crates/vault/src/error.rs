//! Error types for the vault domain core.
//!
//! Policy rejections (`KdfError`, `KeyError`) and authorization failures
//! (`AccessError`, `CredentialError`) are kept as separate hierarchies so
//! callers can map them to distinct user-visible signals without ever
//! leaking which internal check failed.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for domain-level operations.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Key-derivation policy rejections.
    #[error(transparent)]
    Kdf(#[from] KdfError),

    /// Wrapped-key material errors.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Credential verification errors.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Authorization errors.
    #[error(transparent)]
    Access(#[from] AccessError),
}

/// Errors raised by the key-derivation policy.
///
/// These are policy rejections: they are never retried and never wrapped
/// in a storage error, because nothing was attempted against storage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KdfError {
    /// The KDF type is not one the platform supports.
    #[error("unsupported KDF type")]
    UnsupportedType,

    /// A required parameter for the selected KDF type is absent.
    #[error("missing KDF parameter: {parameter}")]
    MissingParameter { parameter: &'static str },

    /// A parameter falls outside the accepted policy range.
    #[error("KDF {parameter} out of range: must be between {min} and {max}")]
    OutOfRange {
        parameter: &'static str,
        min: u64,
        max: u64,
    },

    /// The salt is not a hex encoding of the required length.
    #[error("invalid KDF salt")]
    InvalidSalt,

    /// A prelogin configuration is weaker than the current policy minimum.
    ///
    /// The message is deliberately identical regardless of which parameter
    /// tripped the check, so an attacker probing the prelogin endpoint
    /// learns nothing about the policy internals.
    #[error("possible KDF downgrade attack detected")]
    DowngradeDetected,
}

/// Errors raised while handling wrapped key material.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// A wrapped-key string does not follow `"<version>.<iv>|<ct>|<mac>"`.
    #[error("malformed wrapped key")]
    MalformedEncString,

    /// The wrapped-key version is unknown to this server.
    #[error("unsupported wrapped key version: {version}")]
    UnsupportedVersion { version: u8 },

    /// A key rotation payload does not cover every organization membership.
    ///
    /// Applying it would strand some memberships on the old wrapping, so
    /// the whole rotation is rejected before any row is touched.
    #[error("key rotation does not cover all organization memberships")]
    IncompleteRotation,
}

/// Errors raised by credential verification.
#[derive(Error, Debug)]
pub enum CredentialError {
    /// The presented credential does not match the stored verifier.
    ///
    /// Deliberately generic: the same signal is returned whether the
    /// account exists, the hash mismatched, or the verifier is unreadable.
    #[error("invalid credentials")]
    Unauthorized,

    /// Hashing the credential for storage failed.
    #[error("credential hashing failed")]
    Hash(#[source] argon2::password_hash::Error),
}

/// Errors raised by the collection authorization engine.
#[derive(Error, Debug)]
pub enum AccessError {
    /// The principal has no access to the resource.
    ///
    /// Carries no detail about which grant was missing.
    #[error("access denied")]
    Forbidden,

    /// A grant lookup failed for a reason other than absence.
    ///
    /// Fail-closed: the computation aborts and the failure propagates
    /// unchanged. It is never treated as a grant or as absence.
    #[error("grant lookup failed")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl AccessError {
    /// Wraps a grant-store failure, preserving it as the error source.
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AccessError::Store(Box::new(err))
    }
}
