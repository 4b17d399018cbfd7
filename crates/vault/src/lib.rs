//! Latchkey Vault Server domain core.
//!
//! This crate holds the security-bearing decisions of the platform and
//! nothing else: the data model, the key-derivation policy, the envelope
//! encryption types, and the organization authorization engine. It has no
//! storage or network dependencies — the persistence crate supplies those
//! and calls in through the traits defined here.
//!
//! # Zero-knowledge invariant
//!
//! Every vault item's `data` field is ciphertext produced client-side;
//! no key the server stores can decrypt it. The server keeps:
//!
//! - KDF parameters and a salt, so clients can re-derive the master key
//!   ([`kdf`]);
//! - wrapped key material in the uniform `"<version>.<iv>|<ct>|<mac>"`
//!   convention ([`keys::EncString`]);
//! - an Argon2 re-hash of the client authentication hash for login
//!   ([`keys::MasterPasswordHash`]).
//!
//! # Modules
//!
//! - [`kdf`] - Key-derivation policy: bounds validation and downgrade
//!   detection
//! - [`keys`] - Wrapped keys, credential verification, key rotation
//! - [`authz`] - Collection access engine and the static role matrix
//! - [`user`], [`org`], [`item`] - The persisted data model
//! - [`error`] - Error hierarchy
//!
//! # Quick Start
//!
//! ```
//! use latchkey_vault::authz::{AccessRole, Permission};
//! use latchkey_vault::kdf::KdfConfig;
//!
//! // Policy checks are pure and synchronous.
//! assert!(AccessRole::Manager.can(Permission::CollectionUpdate));
//! assert!(!AccessRole::Billing.can(Permission::ItemView));
//!
//! let kdf = KdfConfig::default_argon2id();
//! assert!(kdf.validate().is_ok());
//! ```

pub mod authz;
pub mod error;
pub mod item;
pub mod kdf;
pub mod keys;
pub mod org;
pub mod user;

pub use error::VaultError;
