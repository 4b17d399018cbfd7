//! Effective collection access computation.
//!
//! Merges an organization member's role, direct grant, and team-inherited
//! grants into one effective flag set. The merge is a monotonic union:
//! adding a grant can only widen access, and there is no deny row.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AccessError;
use crate::org::{CollectionTeamGrant, CollectionUserGrant, OrganizationUser, TeamUser};

/// Effective access of one member to one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionAccess {
    pub can_read: bool,
    pub can_write: bool,
    pub can_admin: bool,
    /// Metadata-only restriction. Only meaningful when access came from
    /// grants: it holds iff *every* contributing grant hides passwords.
    /// Full-access members are never restricted.
    pub hide_passwords: bool,
}

impl CollectionAccess {
    /// Unrestricted access, as granted to owners, admins and `access_all`
    /// members.
    pub const FULL: CollectionAccess = CollectionAccess {
        can_read: true,
        can_write: true,
        can_admin: true,
        hide_passwords: false,
    };

    /// Returns `true` if no flag is set.
    pub fn is_none(&self) -> bool {
        !(self.can_read || self.can_write || self.can_admin)
    }
}

/// The storage boundary the engine reads grants through.
///
/// Absence is typed (`Option` / empty `Vec`), not an error: a missing
/// grant contributes nothing to the merge. Any [`AccessError`] returned
/// here aborts the computation unchanged — the engine is fail-closed and
/// never converts a lookup failure into access.
#[async_trait]
pub trait CollectionGrantStore: Send + Sync {
    /// The direct grant for (collection, member), if one exists.
    async fn direct_grant(
        &self,
        collection_id: Uuid,
        org_user_id: Uuid,
    ) -> Result<Option<CollectionUserGrant>, AccessError>;

    /// Every team grant attached to the collection.
    async fn team_grants(
        &self,
        collection_id: Uuid,
    ) -> Result<Vec<CollectionTeamGrant>, AccessError>;

    /// Every team membership of the given organization member.
    async fn team_memberships(&self, org_user_id: Uuid) -> Result<Vec<TeamUser>, AccessError>;
}

/// Computes the effective access of `org_user` to `collection_id`.
///
/// Algorithm:
///
/// 1. `None` principal: [`AccessError::Forbidden`].
/// 2. Owner/Admin role or `access_all`: [`CollectionAccess::FULL`],
///    without touching any grant row.
/// 3. Otherwise, starting from all-false, OR in the direct grant (if any)
///    and the grant of every team the member belongs to. The order of
///    team grants does not affect the result.
///
/// Any non-absence lookup failure propagates unchanged.
pub async fn compute_collection_access<S>(
    org_user: Option<&OrganizationUser>,
    collection_id: Uuid,
    store: &S,
) -> Result<CollectionAccess, AccessError>
where
    S: CollectionGrantStore + ?Sized,
{
    let Some(org_user) = org_user else {
        return Err(AccessError::Forbidden);
    };

    if org_user.has_full_access() {
        return Ok(CollectionAccess::FULL);
    }

    let mut access = CollectionAccess::default();
    let mut contributed = false;
    // hide_passwords restricts only if every contributing grant sets it.
    let mut all_hide = true;

    if let Some(direct) = store.direct_grant(collection_id, org_user.id).await? {
        access.can_read |= direct.flags.can_read;
        access.can_write |= direct.flags.can_write;
        access.can_admin |= direct.flags.can_admin;
        all_hide &= direct.flags.hide_passwords;
        contributed = true;
    }

    let memberships = store.team_memberships(org_user.id).await?;
    if !memberships.is_empty() {
        let team_ids: std::collections::HashSet<Uuid> =
            memberships.into_iter().map(|tu| tu.team_id).collect();

        for grant in store.team_grants(collection_id).await? {
            if !team_ids.contains(&grant.team_id) {
                continue;
            }
            access.can_read |= grant.flags.can_read;
            access.can_write |= grant.flags.can_write;
            access.can_admin |= grant.flags.can_admin;
            all_hide &= grant.flags.hide_passwords;
            contributed = true;
        }
    }

    access.hide_passwords = contributed && all_hide;
    Ok(access)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::org::{GrantFlags, MembershipStatus, OrgRole};
    use chrono::Utc;
    use std::collections::HashMap;

    /// In-memory grant store; `fail` switches every lookup to an error.
    #[derive(Default)]
    struct MemoryGrantStore {
        direct: HashMap<(Uuid, Uuid), CollectionUserGrant>,
        team_grants: Vec<CollectionTeamGrant>,
        memberships: Vec<TeamUser>,
        fail: bool,
    }

    impl MemoryGrantStore {
        fn grant_direct(&mut self, collection_id: Uuid, org_user_id: Uuid, flags: GrantFlags) {
            self.direct.insert(
                (collection_id, org_user_id),
                CollectionUserGrant {
                    id: Uuid::new_v4(),
                    collection_id,
                    org_user_id,
                    flags,
                },
            );
        }

        fn grant_team(&mut self, collection_id: Uuid, team_id: Uuid, flags: GrantFlags) {
            self.team_grants.push(CollectionTeamGrant {
                id: Uuid::new_v4(),
                collection_id,
                team_id,
                flags,
            });
        }

        fn join_team(&mut self, org_user_id: Uuid, team_id: Uuid) {
            self.memberships.push(TeamUser {
                id: Uuid::new_v4(),
                team_id,
                org_user_id,
            });
        }
    }

    #[async_trait]
    impl CollectionGrantStore for MemoryGrantStore {
        async fn direct_grant(
            &self,
            collection_id: Uuid,
            org_user_id: Uuid,
        ) -> Result<Option<CollectionUserGrant>, AccessError> {
            if self.fail {
                return Err(AccessError::store(std::io::Error::other("db down")));
            }
            Ok(self.direct.get(&(collection_id, org_user_id)).cloned())
        }

        async fn team_grants(
            &self,
            collection_id: Uuid,
        ) -> Result<Vec<CollectionTeamGrant>, AccessError> {
            if self.fail {
                return Err(AccessError::store(std::io::Error::other("db down")));
            }
            Ok(self
                .team_grants
                .iter()
                .filter(|g| g.collection_id == collection_id)
                .cloned()
                .collect())
        }

        async fn team_memberships(&self, org_user_id: Uuid) -> Result<Vec<TeamUser>, AccessError> {
            if self.fail {
                return Err(AccessError::store(std::io::Error::other("db down")));
            }
            Ok(self
                .memberships
                .iter()
                .filter(|tu| tu.org_user_id == org_user_id)
                .cloned()
                .collect())
        }
    }

    fn member(role: OrgRole, access_all: bool) -> OrganizationUser {
        OrganizationUser {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            organization_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role,
            access_all,
            encrypted_org_key: None,
            status: MembershipStatus::Confirmed,
        }
    }

    fn flags(read: bool, write: bool, admin: bool) -> GrantFlags {
        GrantFlags {
            can_read: read,
            can_write: write,
            can_admin: admin,
            hide_passwords: false,
        }
    }

    #[tokio::test]
    async fn test_nil_principal_is_forbidden() {
        let store = MemoryGrantStore::default();
        let result = compute_collection_access(None, Uuid::new_v4(), &store).await;
        assert!(matches!(result, Err(AccessError::Forbidden)));
    }

    #[tokio::test]
    async fn test_admin_roles_short_circuit() {
        // Grant rows are irrelevant; the store stays empty and would even
        // fail if consulted.
        let mut store = MemoryGrantStore::default();
        store.fail = true;

        for principal in [
            member(OrgRole::Owner, false),
            member(OrgRole::Admin, false),
            member(OrgRole::Member, true),
        ] {
            let access =
                compute_collection_access(Some(&principal), Uuid::new_v4(), &store).await;
            assert_eq!(access.unwrap(), CollectionAccess::FULL);
        }
    }

    #[tokio::test]
    async fn test_member_without_grants_has_nothing() {
        let store = MemoryGrantStore::default();
        let principal = member(OrgRole::Member, false);
        let access = compute_collection_access(Some(&principal), Uuid::new_v4(), &store)
            .await
            .unwrap();
        assert!(access.is_none());
        assert!(!access.hide_passwords);
    }

    #[tokio::test]
    async fn test_direct_and_team_grants_union() {
        let collection = Uuid::new_v4();
        let team = Uuid::new_v4();
        let principal = member(OrgRole::Member, false);

        let mut store = MemoryGrantStore::default();
        store.grant_direct(collection, principal.id, flags(true, false, false));
        store.join_team(principal.id, team);
        store.grant_team(collection, team, flags(false, true, false));

        let access = compute_collection_access(Some(&principal), collection, &store)
            .await
            .unwrap();
        assert_eq!(
            access,
            CollectionAccess {
                can_read: true,
                can_write: true,
                can_admin: false,
                hide_passwords: false,
            }
        );
    }

    #[tokio::test]
    async fn test_unrelated_team_grant_does_not_contribute() {
        let collection = Uuid::new_v4();
        let my_team = Uuid::new_v4();
        let other_team = Uuid::new_v4();
        let principal = member(OrgRole::Member, false);

        let mut store = MemoryGrantStore::default();
        store.join_team(principal.id, my_team);
        store.grant_team(collection, other_team, flags(true, true, true));

        let access = compute_collection_access(Some(&principal), collection, &store)
            .await
            .unwrap();
        assert!(access.is_none());
    }

    #[tokio::test]
    async fn test_merge_is_order_independent() {
        let collection = Uuid::new_v4();
        let principal = member(OrgRole::Manager, false);

        let teams: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let grant_sets = [
            flags(true, false, false),
            flags(false, true, false),
            flags(false, false, true),
        ];

        let mut forward = MemoryGrantStore::default();
        let mut reverse = MemoryGrantStore::default();
        for (team, grant) in teams.iter().zip(grant_sets.iter()) {
            forward.join_team(principal.id, *team);
            reverse.join_team(principal.id, *team);
            forward.grant_team(collection, *team, *grant);
        }
        for (team, grant) in teams.iter().zip(grant_sets.iter()).rev() {
            reverse.grant_team(collection, *team, *grant);
        }

        let a = compute_collection_access(Some(&principal), collection, &forward)
            .await
            .unwrap();
        let b = compute_collection_access(Some(&principal), collection, &reverse)
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a, CollectionAccess { can_read: true, can_write: true, can_admin: true, hide_passwords: false });
    }

    #[tokio::test]
    async fn test_adding_grants_is_monotonic() {
        let collection = Uuid::new_v4();
        let team = Uuid::new_v4();
        let principal = member(OrgRole::Member, false);

        let mut store = MemoryGrantStore::default();
        store.grant_direct(collection, principal.id, flags(true, false, false));
        let before = compute_collection_access(Some(&principal), collection, &store)
            .await
            .unwrap();

        store.join_team(principal.id, team);
        store.grant_team(collection, team, flags(false, true, false));
        let after = compute_collection_access(Some(&principal), collection, &store)
            .await
            .unwrap();

        assert!(after.can_read >= before.can_read);
        assert!(after.can_write >= before.can_write);
        assert!(after.can_admin >= before.can_admin);
    }

    #[tokio::test]
    async fn test_lookup_failure_propagates() {
        let mut store = MemoryGrantStore::default();
        store.fail = true;
        let principal = member(OrgRole::Member, false);

        let result = compute_collection_access(Some(&principal), Uuid::new_v4(), &store).await;
        assert!(matches!(result, Err(AccessError::Store(_))));
    }

    #[tokio::test]
    async fn test_hide_passwords_requires_unanimity() {
        let collection = Uuid::new_v4();
        let team = Uuid::new_v4();
        let principal = member(OrgRole::Member, false);

        // Single hiding grant: restricted.
        let mut store = MemoryGrantStore::default();
        store.grant_direct(
            collection,
            principal.id,
            GrantFlags {
                hide_passwords: true,
                ..GrantFlags::default()
            },
        );
        let access = compute_collection_access(Some(&principal), collection, &store)
            .await
            .unwrap();
        assert!(access.hide_passwords);

        // A second, non-hiding grant lifts the restriction.
        store.join_team(principal.id, team);
        store.grant_team(collection, team, flags(true, false, false));
        let access = compute_collection_access(Some(&principal), collection, &store)
            .await
            .unwrap();
        assert!(!access.hide_passwords);
    }
}
