//! Partition name validation.
//!
//! A [`PartitionName`] is the only string this crate ever interpolates
//! into a statement that cannot take it as a bound parameter (`SET LOCAL
//! search_path`, `CREATE SCHEMA`). Names are system-generated, but every
//! construction site re-validates against the allow-list anyway —
//! validation rejects, it never escapes.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IdentifierError;

/// The shared partition holding cross-tenant records (users,
/// organizations, grants, organization items).
pub const SHARED_PARTITION: &str = "public";

/// PostgreSQL identifier length limit.
pub const MAX_PARTITION_NAME_LEN: usize = 63;

/// Allow-list: lowercase letter, then lowercase letters, digits,
/// underscores. Deliberately tighter than what PostgreSQL accepts.
static NAME_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-z][a-z0-9_]*$").unwrap_or_else(|e| panic!("{e}")));

/// Reserved PostgreSQL prefixes a tenant partition may never shadow.
const RESERVED_PREFIXES: &[&str] = &["pg_", "information_schema"];

/// Exact reserved names.
const RESERVED_NAMES: &[&str] = &["information_schema", "pg_catalog", "pg_toast"];

/// A validated per-tenant storage-partition name.
///
/// Construction is the validation: holding a `PartitionName` means the
/// value passed the allow-list, so the interpolation sites take this type
/// and nothing else.
///
/// # Examples
///
/// ```
/// use latchkey_persistence::partition::PartitionName;
///
/// let name = PartitionName::new("user_ab12cd34").unwrap();
/// assert_eq!(name.as_str(), "user_ab12cd34");
/// assert_eq!(name.quoted(), "\"user_ab12cd34\"");
///
/// assert!(PartitionName::new("public; drop table users;--").is_err());
/// assert!(PartitionName::new("").is_err());
/// assert!(PartitionName::new("pg_temp").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionName(String);

impl PartitionName {
    /// Validates a proposed partition name.
    pub fn new(name: impl Into<String>) -> Result<Self, IdentifierError> {
        let name = name.into();

        if name.is_empty() {
            return Err(IdentifierError::Empty);
        }
        // The shared partition is always a valid resolution target.
        if name == SHARED_PARTITION {
            return Ok(Self(name));
        }
        if name.len() > MAX_PARTITION_NAME_LEN {
            return Err(IdentifierError::TooLong {
                max: MAX_PARTITION_NAME_LEN,
            });
        }
        if !NAME_FORMAT.is_match(&name) {
            return Err(IdentifierError::BadFormat);
        }
        if RESERVED_NAMES.contains(&name.as_str())
            || RESERVED_PREFIXES.iter().any(|p| name.starts_with(p))
        {
            return Err(IdentifierError::Reserved);
        }

        Ok(Self(name))
    }

    /// The shared partition.
    pub fn shared() -> Self {
        Self(SHARED_PARTITION.to_string())
    }

    /// Generates a fresh tenant partition name (`user_` + 8 hex chars).
    ///
    /// Generated names always pass [`PartitionName::new`]; call sites
    /// still re-validate on the way back out of storage.
    pub fn generate() -> Self {
        let bytes = Uuid::new_v4().into_bytes();
        let mut suffix = String::with_capacity(8);
        for b in &bytes[..4] {
            suffix.push_str(&format!("{b:02x}"));
        }
        Self(format!("user_{suffix}"))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the shared partition.
    pub fn is_shared(&self) -> bool {
        self.0 == SHARED_PARTITION
    }

    /// The name as a quoted identifier, for the few statements that
    /// cannot bind it as a parameter.
    ///
    /// The allow-list admits no quote characters, so wrapping is enough.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for PartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartitionName({})", self.0)
    }
}

impl FromStr for PartitionName {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PartitionName::new(s)
    }
}

impl TryFrom<String> for PartitionName {
    type Error = IdentifierError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        PartitionName::new(s)
    }
}

impl From<PartitionName> for String {
    fn from(name: PartitionName) -> Self {
        name.0
    }
}

impl AsRef<str> for PartitionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
