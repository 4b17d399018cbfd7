//! Grant lookups backing the collection access engine.

use async_trait::async_trait;
use tokio_postgres::Row;
use uuid::Uuid;

use latchkey_vault::authz::CollectionGrantStore;
use latchkey_vault::error::AccessError;
use latchkey_vault::org::{CollectionTeamGrant, CollectionUserGrant, GrantFlags, TeamUser};

use crate::error::StorageResult;
use crate::partition::{PartitionResolver, SHARED_PARTITION};

/// PostgreSQL-backed [`CollectionGrantStore`].
///
/// Absent rows come back as `None` / empty; every other failure is wrapped
/// into [`AccessError::Store`] so the engine stays fail-closed.
#[derive(Debug, Clone)]
pub struct PgGrantStore {
    resolver: PartitionResolver,
}

impl PgGrantStore {
    pub fn new(resolver: PartitionResolver) -> Self {
        Self { resolver }
    }

    async fn query_direct(
        &self,
        collection_id: Uuid,
        org_user_id: Uuid,
    ) -> StorageResult<Option<CollectionUserGrant>> {
        let row = self
            .resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    Ok(txn
                        .client()?
                        .query_opt(
                            "SELECT id, collection_id, org_user_id, can_read, can_write, \
                             can_admin, hide_passwords FROM collection_users \
                             WHERE collection_id = $1 AND org_user_id = $2",
                            &[&collection_id, &org_user_id],
                        )
                        .await?)
                })
            })
            .await?;

        Ok(row.map(|r| CollectionUserGrant {
            id: r.get("id"),
            collection_id: r.get("collection_id"),
            org_user_id: r.get("org_user_id"),
            flags: flags_from_row(&r),
        }))
    }

    async fn query_team_grants(
        &self,
        collection_id: Uuid,
    ) -> StorageResult<Vec<CollectionTeamGrant>> {
        let rows = self
            .resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    Ok(txn
                        .client()?
                        .query(
                            "SELECT id, collection_id, team_id, can_read, can_write, \
                             can_admin, hide_passwords FROM collection_teams \
                             WHERE collection_id = $1",
                            &[&collection_id],
                        )
                        .await?)
                })
            })
            .await?;

        Ok(rows
            .iter()
            .map(|r| CollectionTeamGrant {
                id: r.get("id"),
                collection_id: r.get("collection_id"),
                team_id: r.get("team_id"),
                flags: flags_from_row(r),
            })
            .collect())
    }

    async fn query_memberships(&self, org_user_id: Uuid) -> StorageResult<Vec<TeamUser>> {
        let rows = self
            .resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    Ok(txn
                        .client()?
                        .query(
                            "SELECT id, team_id, org_user_id FROM team_users \
                             WHERE org_user_id = $1",
                            &[&org_user_id],
                        )
                        .await?)
                })
            })
            .await?;

        Ok(rows
            .iter()
            .map(|r| TeamUser {
                id: r.get("id"),
                team_id: r.get("team_id"),
                org_user_id: r.get("org_user_id"),
            })
            .collect())
    }
}

fn flags_from_row(row: &Row) -> GrantFlags {
    GrantFlags {
        can_read: row.get("can_read"),
        can_write: row.get("can_write"),
        can_admin: row.get("can_admin"),
        hide_passwords: row.get("hide_passwords"),
    }
}

#[async_trait]
impl CollectionGrantStore for PgGrantStore {
    async fn direct_grant(
        &self,
        collection_id: Uuid,
        org_user_id: Uuid,
    ) -> Result<Option<CollectionUserGrant>, AccessError> {
        self.query_direct(collection_id, org_user_id)
            .await
            .map_err(AccessError::store)
    }

    async fn team_grants(
        &self,
        collection_id: Uuid,
    ) -> Result<Vec<CollectionTeamGrant>, AccessError> {
        self.query_team_grants(collection_id)
            .await
            .map_err(AccessError::store)
    }

    async fn team_memberships(&self, org_user_id: Uuid) -> Result<Vec<TeamUser>, AccessError> {
        self.query_memberships(org_user_id)
            .await
            .map_err(AccessError::store)
    }
}
