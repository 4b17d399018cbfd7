//! Vault items.
//!
//! Each record is one opaque ciphertext blob (`data`, produced client-side
//! as an [`EncString`]) plus a cleartext [`ItemMetadata`] value used for
//! listing and search. There is no per-field encryption and no runtime
//! struct walking: the serialization boundary is explicit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::keys::EncString;

/// What kind of credential an item holds.
///
/// The server only uses this for filtering; the typed payload lives
/// inside the ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Password,
    Note,
    CreditCard,
    BankAccount,
    Identity,
}

impl ItemKind {
    /// Storage representation, matching the serde names.
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Password => "password",
            ItemKind::Note => "note",
            ItemKind::CreditCard => "credit_card",
            ItemKind::BankAccount => "bank_account",
            ItemKind::Identity => "identity",
        }
    }
}

impl std::str::FromStr for ItemKind {
    type Err = UnknownItemKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" => Ok(ItemKind::Password),
            "note" => Ok(ItemKind::Note),
            "credit_card" => Ok(ItemKind::CreditCard),
            "bank_account" => Ok(ItemKind::BankAccount),
            "identity" => Ok(ItemKind::Identity),
            _ => Err(UnknownItemKind(s.to_string())),
        }
    }
}

/// A stored kind value outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown item kind: {0}")]
pub struct UnknownItemKind(pub String);

/// Cleartext, searchable item metadata.
///
/// Everything here is visible to the server by design; anything sensitive
/// belongs in the encrypted `data` blob instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Hostname hint for browser matching, e.g. `"github.com"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri_hint: Option<String>,
}

/// A personal vault item, stored in the owner's partition.
///
/// `data` is encrypted client-side under a per-item key wrapped by the
/// user key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker; purge is a separate, explicit operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,

    pub kind: ItemKind,
    /// Opaque ciphertext. The server stores and returns it, nothing more.
    pub data: EncString,
    pub metadata: ItemMetadata,

    pub is_favorite: bool,
}

impl Item {
    /// Returns `true` if the item is soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A shared vault item, stored in the shared partition and encrypted with
/// the organization key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationItem {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,

    pub organization_id: Uuid,
    /// `None` means an organization-wide item outside any collection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<Uuid>,

    pub kind: ItemKind,
    pub data: EncString,
    pub metadata: ItemMetadata,

    pub created_by_user_id: Uuid,
}

impl OrganizationItem {
    /// Returns `true` if the item is soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_serde_defaults() {
        let metadata: ItemMetadata = serde_json::from_str(r#"{"name":"GitHub"}"#).unwrap();
        assert_eq!(metadata.name, "GitHub");
        assert!(metadata.tags.is_empty());
        assert!(metadata.uri_hint.is_none());
    }

    #[test]
    fn test_soft_delete_flag() {
        let mut item = Item {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
            kind: ItemKind::Password,
            data: "2.YWJj|ZGVm|Z2hp".parse().unwrap(),
            metadata: ItemMetadata {
                name: "GitHub".to_string(),
                tags: vec!["work".to_string()],
                uri_hint: Some("github.com".to_string()),
            },
            is_favorite: false,
        };
        assert!(!item.is_deleted());
        item.deleted_at = Some(Utc::now());
        assert!(item.is_deleted());
    }
}
