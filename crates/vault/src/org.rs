//! Organizations, memberships, teams, collections, and grants.
//!
//! An organization owns one logical symmetric key, represented by N
//! wrapped copies: one per confirmed member (on the membership row) plus
//! the organization's own reference copy. Collections carry no keys —
//! access to them is *granted*, via [`CollectionUserGrant`] and
//! [`CollectionTeamGrant`] rows, and merged by the engine in
//! [`crate::authz`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::keys::EncString;

/// A member's role within an organization.
///
/// Stored as lowercase text. `Owner` and `Admin` bypass collection grants
/// entirely; the remaining roles see only what grants give them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgRole {
    Owner,
    Admin,
    Manager,
    Member,
    Billing,
}

impl OrgRole {
    /// Returns `true` for roles with unrestricted collection access.
    pub fn is_admin(self) -> bool {
        matches!(self, OrgRole::Owner | OrgRole::Admin)
    }

    /// Storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            OrgRole::Owner => "owner",
            OrgRole::Admin => "admin",
            OrgRole::Manager => "manager",
            OrgRole::Member => "member",
            OrgRole::Billing => "billing",
        }
    }
}

impl std::str::FromStr for OrgRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(OrgRole::Owner),
            "admin" => Ok(OrgRole::Admin),
            "manager" => Ok(OrgRole::Manager),
            "member" => Ok(OrgRole::Member),
            "billing" => Ok(OrgRole::Billing),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

impl std::fmt::Display for OrgRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored role value that is not part of the role set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown organization role: {0}")]
pub struct UnknownRole(pub String);

/// Membership lifecycle state.
///
/// A wrapped organization key is present only once the membership is
/// `Confirmed` — an invited user has nothing to decrypt yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Invited,
    Accepted,
    Confirmed,
}

impl MembershipStatus {
    /// Storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            MembershipStatus::Invited => "invited",
            MembershipStatus::Accepted => "accepted",
            MembershipStatus::Confirmed => "confirmed",
        }
    }
}

impl std::str::FromStr for MembershipStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invited" => Ok(MembershipStatus::Invited),
            "accepted" => Ok(MembershipStatus::Accepted),
            "confirmed" => Ok(MembershipStatus::Confirmed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// A stored status value outside the membership lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown membership status: {0}")]
pub struct UnknownStatus(pub String);

/// A shared vault owned by a team or company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub name: String,

    /// The organization's reference copy of its symmetric key, wrapped
    /// under the founding owner's user key. Every per-member copy on
    /// [`OrganizationUser`] decrypts (client-side) to the same key.
    #[serde(skip_serializing)]
    pub encrypted_org_key: EncString,

    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A membership row linking a user to an organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationUser {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub organization_id: Uuid,
    pub user_id: Uuid,

    pub role: OrgRole,
    /// Grants-bypass flag: treated like Owner/Admin by the engine.
    pub access_all: bool,

    /// The organization key wrapped for this member. Absent until the
    /// membership is confirmed.
    #[serde(skip_serializing)]
    pub encrypted_org_key: Option<EncString>,

    pub status: MembershipStatus,
}

impl OrganizationUser {
    /// Returns `true` if this membership bypasses collection grants.
    pub fn has_full_access(&self) -> bool {
        self.role.is_admin() || self.access_all
    }
}

/// A named subgroup of organization members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub organization_id: Uuid,
    pub name: String,
}

/// Many-to-many membership between teams and organization members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamUser {
    pub id: Uuid,
    pub team_id: Uuid,
    pub org_user_id: Uuid,
}

/// An organization-scoped shared folder.
///
/// Collections carry no key material; the organization key encrypts the
/// items, and grant rows decide who may touch them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,

    pub organization_id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Permission flags carried by a grant row.
///
/// Defaults mirror the persisted column defaults: a freshly granted
/// principal can read and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantFlags {
    #[serde(default = "default_true")]
    pub can_read: bool,
    #[serde(default)]
    pub can_write: bool,
    #[serde(default)]
    pub can_admin: bool,
    /// Metadata-only view: the principal may list items but not reveal
    /// their secrets.
    #[serde(default)]
    pub hide_passwords: bool,
}

fn default_true() -> bool {
    true
}

impl Default for GrantFlags {
    fn default() -> Self {
        Self {
            can_read: true,
            can_write: false,
            can_admin: false,
            hide_passwords: false,
        }
    }
}

/// A direct grant: (collection, organization member) → flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionUserGrant {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub org_user_id: Uuid,
    #[serde(flatten)]
    pub flags: GrantFlags,
}

/// A team grant: (collection, team) → flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionTeamGrant {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub team_id: Uuid,
    #[serde(flatten)]
    pub flags: GrantFlags,
}
