//! Static organization-role permission matrix.
//!
//! Compiled as immutable constant data: the matrix is a set of `const`
//! slices and pure membership tests, safe for unsynchronized concurrent
//! reads and impossible to mutate at runtime.

use serde::{Deserialize, Serialize};

use crate::org::OrgRole;

/// A concrete action inside an organization.
///
/// Grouped by category: organization, members, billing, collections,
/// items, activity, security.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    // Organization
    OrgView,
    OrgUpdate,
    OrgDelete,
    OrgTransferOwnership,
    OrgManageSettings,
    // Members
    MemberView,
    MemberInvite,
    MemberRemove,
    MemberUpdateRole,
    // Billing
    BillingView,
    BillingUpdate,
    BillingCancel,
    BillingDownloadInvoice,
    // Collections
    CollectionCreate,
    CollectionView,
    CollectionUpdate,
    CollectionDelete,
    // Items
    ItemCreate,
    ItemView,
    ItemUpdate,
    ItemDelete,
    ItemShare,
    ItemExport,
    // Activity / audit
    ActivityView,
    ActivityExport,
    // Security
    SecurityRotateKeys,
    SecurityRevokeSessions,
}

impl Permission {
    /// Returns `true` if this permission mutates state.
    ///
    /// Used by audit and rate-limit collaborators to classify operations;
    /// the matrix itself does not consult it.
    pub fn is_write(self) -> bool {
        use Permission::*;
        matches!(
            self,
            OrgUpdate
                | OrgDelete
                | OrgTransferOwnership
                | OrgManageSettings
                | MemberInvite
                | MemberRemove
                | MemberUpdateRole
                | BillingUpdate
                | BillingCancel
                | CollectionCreate
                | CollectionUpdate
                | CollectionDelete
                | ItemCreate
                | ItemUpdate
                | ItemDelete
                | ItemShare
                | SecurityRotateKeys
                | SecurityRevokeSessions
        )
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Permission::*;
        let s = match self {
            OrgView => "org:view",
            OrgUpdate => "org:update",
            OrgDelete => "org:delete",
            OrgTransferOwnership => "org:transfer_ownership",
            OrgManageSettings => "org:manage_settings",
            MemberView => "member:view",
            MemberInvite => "member:invite",
            MemberRemove => "member:remove",
            MemberUpdateRole => "member:update_role",
            BillingView => "billing:view",
            BillingUpdate => "billing:update",
            BillingCancel => "billing:cancel",
            BillingDownloadInvoice => "billing:download_invoice",
            CollectionCreate => "collection:create",
            CollectionView => "collection:view",
            CollectionUpdate => "collection:update",
            CollectionDelete => "collection:delete",
            ItemCreate => "item:create",
            ItemView => "item:view",
            ItemUpdate => "item:update",
            ItemDelete => "item:delete",
            ItemShare => "item:share",
            ItemExport => "item:export",
            ActivityView => "activity:view",
            ActivityExport => "activity:export",
            SecurityRotateKeys => "security:rotate_keys",
            SecurityRevokeSessions => "security:revoke_sessions",
        };
        f.write_str(s)
    }
}

/// The role axis of the permission matrix.
///
/// Extends [`OrgRole`] with `ReadOnly`, the reduced-access override a
/// subscription collaborator substitutes for the member's real role when
/// an organization's subscription has lapsed. `ReadOnly` is never a
/// membership role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRole {
    Owner,
    Admin,
    Manager,
    Member,
    Billing,
    ReadOnly,
}

impl From<OrgRole> for AccessRole {
    fn from(role: OrgRole) -> Self {
        match role {
            OrgRole::Owner => AccessRole::Owner,
            OrgRole::Admin => AccessRole::Admin,
            OrgRole::Manager => AccessRole::Manager,
            OrgRole::Member => AccessRole::Member,
            OrgRole::Billing => AccessRole::Billing,
        }
    }
}

const OWNER_PERMISSIONS: &[Permission] = &[
    Permission::OrgView,
    Permission::OrgUpdate,
    Permission::OrgDelete,
    Permission::OrgTransferOwnership,
    Permission::OrgManageSettings,
    Permission::MemberView,
    Permission::MemberInvite,
    Permission::MemberRemove,
    Permission::MemberUpdateRole,
    Permission::BillingView,
    Permission::BillingUpdate,
    Permission::BillingCancel,
    Permission::BillingDownloadInvoice,
    Permission::CollectionCreate,
    Permission::CollectionView,
    Permission::CollectionUpdate,
    Permission::CollectionDelete,
    Permission::ItemCreate,
    Permission::ItemView,
    Permission::ItemUpdate,
    Permission::ItemDelete,
    Permission::ItemShare,
    Permission::ItemExport,
    Permission::ActivityView,
    Permission::ActivityExport,
    Permission::SecurityRotateKeys,
    Permission::SecurityRevokeSessions,
];

const ADMIN_PERMISSIONS: &[Permission] = &[
    Permission::OrgView,
    Permission::OrgUpdate,
    Permission::MemberView,
    Permission::MemberInvite,
    Permission::MemberRemove,
    Permission::CollectionCreate,
    Permission::CollectionView,
    Permission::CollectionUpdate,
    Permission::CollectionDelete,
    Permission::ItemCreate,
    Permission::ItemView,
    Permission::ItemUpdate,
    Permission::ItemDelete,
    Permission::ItemShare,
    Permission::ItemExport,
    Permission::ActivityView,
    Permission::SecurityRevokeSessions,
];

const MANAGER_PERMISSIONS: &[Permission] = &[
    Permission::OrgView,
    Permission::MemberView,
    Permission::CollectionView,
    Permission::CollectionUpdate,
    Permission::ItemCreate,
    Permission::ItemView,
    Permission::ItemUpdate,
    Permission::ItemDelete,
    Permission::ItemShare,
];

const MEMBER_PERMISSIONS: &[Permission] = &[
    Permission::CollectionView,
    Permission::ItemCreate,
    Permission::ItemView,
    Permission::ItemUpdate,
    Permission::ItemDelete,
];

const BILLING_PERMISSIONS: &[Permission] = &[
    Permission::OrgView,
    Permission::BillingView,
    Permission::BillingUpdate,
    Permission::BillingDownloadInvoice,
];

const READ_ONLY_PERMISSIONS: &[Permission] = &[
    Permission::OrgView,
    Permission::CollectionView,
    Permission::ItemView,
];

impl AccessRole {
    /// All permissions this role holds.
    pub const fn permissions(self) -> &'static [Permission] {
        match self {
            AccessRole::Owner => OWNER_PERMISSIONS,
            AccessRole::Admin => ADMIN_PERMISSIONS,
            AccessRole::Manager => MANAGER_PERMISSIONS,
            AccessRole::Member => MEMBER_PERMISSIONS,
            AccessRole::Billing => BILLING_PERMISSIONS,
            AccessRole::ReadOnly => READ_ONLY_PERMISSIONS,
        }
    }

    /// Pure membership test: does this role hold `permission`?
    pub fn can(self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_holds_everything() {
        for role in [
            AccessRole::Admin,
            AccessRole::Manager,
            AccessRole::Member,
            AccessRole::Billing,
            AccessRole::ReadOnly,
        ] {
            for permission in role.permissions() {
                assert!(
                    AccessRole::Owner.can(*permission),
                    "owner missing {permission}"
                );
            }
        }
    }

    #[test]
    fn test_role_boundaries() {
        assert!(AccessRole::Admin.can(Permission::MemberInvite));
        assert!(!AccessRole::Admin.can(Permission::OrgDelete));
        assert!(!AccessRole::Admin.can(Permission::BillingView));

        assert!(AccessRole::Manager.can(Permission::CollectionUpdate));
        assert!(!AccessRole::Manager.can(Permission::CollectionCreate));
        assert!(!AccessRole::Manager.can(Permission::MemberInvite));

        assert!(AccessRole::Member.can(Permission::ItemUpdate));
        assert!(!AccessRole::Member.can(Permission::ItemShare));
        assert!(!AccessRole::Member.can(Permission::OrgView));

        assert!(AccessRole::Billing.can(Permission::BillingUpdate));
        assert!(!AccessRole::Billing.can(Permission::BillingCancel));
        assert!(!AccessRole::Billing.can(Permission::ItemView));
    }

    #[test]
    fn test_read_only_override_is_view_only() {
        for permission in AccessRole::ReadOnly.permissions() {
            assert!(!permission.is_write(), "{permission} is a write");
        }
        assert!(AccessRole::ReadOnly.can(Permission::ItemView));
        assert!(!AccessRole::ReadOnly.can(Permission::ItemCreate));
    }

    #[test]
    fn test_write_classification() {
        assert!(Permission::ItemCreate.is_write());
        assert!(Permission::SecurityRotateKeys.is_write());
        assert!(!Permission::ItemView.is_write());
        assert!(!Permission::ActivityExport.is_write());
        assert!(!Permission::BillingDownloadInvoice.is_write());
    }

    #[test]
    fn test_access_role_from_org_role() {
        assert_eq!(AccessRole::from(OrgRole::Owner), AccessRole::Owner);
        assert_eq!(AccessRole::from(OrgRole::Billing), AccessRole::Billing);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(Permission::OrgTransferOwnership.to_string(), "org:transfer_ownership");
        assert_eq!(Permission::ItemShare.to_string(), "item:share");
    }
}
