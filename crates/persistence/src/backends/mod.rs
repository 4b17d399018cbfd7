//! Storage backends.

#[cfg(feature = "postgres")]
pub mod postgres;
