//! Per-request authorization context.
//!
//! A [`RequestContext`] is built once per authenticated request and
//! carries everything the handlers need to make access decisions: the
//! account, its validated partition name, and its organization
//! memberships. Every check fails closed — no membership means no
//! permission, and an unresolvable partition never reaches the resolver.

use uuid::Uuid;

use latchkey_vault::authz::{
    AccessRole, CollectionAccess, CollectionGrantStore, Permission, compute_collection_access,
};
use latchkey_vault::error::AccessError;
use latchkey_vault::org::OrganizationUser;
use latchkey_vault::user::User;

use crate::error::StorageResult;
use crate::partition::{PartitionName, PartitionResolver, ScopedFuture};

/// The authenticated context of one request.
pub struct RequestContext {
    user: User,
    partition: PartitionName,
    memberships: Vec<OrganizationUser>,
    resolver: PartitionResolver,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("user_id", &self.user.id)
            .field("partition", &self.partition)
            .field("memberships", &self.memberships.len())
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    pub fn builder(resolver: PartitionResolver) -> RequestContextBuilder {
        RequestContextBuilder {
            resolver,
            user: None,
            memberships: Vec::new(),
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    /// The user's partition, re-validated at build time.
    pub fn partition(&self) -> &PartitionName {
        &self.partition
    }

    /// The membership linking this user to `organization_id`, if any.
    pub fn membership(&self, organization_id: Uuid) -> Option<&OrganizationUser> {
        self.memberships
            .iter()
            .find(|m| m.organization_id == organization_id)
    }

    /// Role-matrix check for an organization-level action.
    ///
    /// Non-members have no permissions at all.
    pub fn permits(&self, organization_id: Uuid, permission: Permission) -> bool {
        match self.membership(organization_id) {
            Some(membership) => AccessRole::from(membership.role).can(permission),
            None => false,
        }
    }

    /// Effective access to one collection, merged from the membership's
    /// role and grant rows.
    pub async fn authorize_collection<S>(
        &self,
        organization_id: Uuid,
        collection_id: Uuid,
        store: &S,
    ) -> Result<CollectionAccess, AccessError>
    where
        S: CollectionGrantStore + ?Sized,
    {
        compute_collection_access(self.membership(organization_id), collection_id, store).await
    }

    /// Runs a unit of work inside the user's own partition.
    pub async fn run<T, F>(&self, work: F) -> StorageResult<T>
    where
        F: for<'a> FnOnce(&'a crate::partition::PartitionTransaction) -> ScopedFuture<'a, T>,
    {
        self.resolver
            .with_partition(self.partition.as_str(), work)
            .await
    }
}

/// Builds a [`RequestContext`].
pub struct RequestContextBuilder {
    resolver: PartitionResolver,
    user: Option<User>,
    memberships: Vec<OrganizationUser>,
}

impl RequestContextBuilder {
    pub fn user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    pub fn memberships(mut self, memberships: Vec<OrganizationUser>) -> Self {
        self.memberships = memberships;
        self
    }

    /// Finalizes the context.
    ///
    /// Fails if no user was attached or if the stored partition name no
    /// longer passes validation — a tampered row must not resolve.
    pub fn build(self) -> StorageResult<RequestContext> {
        let user = self.user.ok_or(latchkey_vault::error::AccessError::Forbidden)?;
        let partition = PartitionName::new(user.partition.as_str())?;

        Ok(RequestContext {
            user,
            partition,
            memberships: self.memberships,
            resolver: self.resolver,
        })
    }
}
