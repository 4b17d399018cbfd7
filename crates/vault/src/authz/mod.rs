//! Organization authorization.
//!
//! Two layers, both pure decision logic:
//!
//! - [`matrix`] — the static role → permission table, compiled as constant
//!   data ([`AccessRole::can`], [`Permission::is_write`]).
//! - [`collection`] — the effective-access engine merging direct and
//!   team-inherited grants ([`compute_collection_access`]).
//!
//! The engine's only I/O boundary is the [`CollectionGrantStore`] trait;
//! everything else is synchronous and allocation-light, safe to call from
//! any number of concurrent tasks.

mod collection;
mod matrix;

pub use collection::{CollectionAccess, CollectionGrantStore, compute_collection_access};
pub use matrix::{AccessRole, Permission};
