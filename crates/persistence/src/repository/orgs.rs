//! Organizations, memberships, teams, collections, and grants.

use chrono::Utc;
use tokio_postgres::Row;
use uuid::Uuid;

use latchkey_vault::keys::EncString;
use latchkey_vault::org::{
    Collection, GrantFlags, MembershipStatus, Organization, OrgRole, OrganizationUser, Team,
};

use crate::error::{StorageError, StorageResult};
use crate::partition::{PartitionResolver, SHARED_PARTITION};
use crate::repository::{map_insert_err, not_found};

const MEMBERSHIP_COLUMNS: &str = "id, created_at, updated_at, organization_id, user_id, role, \
     access_all, encrypted_org_key, status";

/// Organization-scoped records in the shared partition.
#[derive(Debug, Clone)]
pub struct OrgRepository {
    resolver: PartitionResolver,
}

impl OrgRepository {
    pub fn new(resolver: PartitionResolver) -> Self {
        Self { resolver }
    }

    /// Creates an organization and its founding owner membership in one
    /// transaction.
    ///
    /// `encrypted_org_key` is the organization key wrapped under the
    /// founder's user key, client-side; the same blob becomes both the
    /// organization's reference copy and the founder's member copy.
    pub async fn create(
        &self,
        name: &str,
        founder_user_id: Uuid,
        encrypted_org_key: EncString,
    ) -> StorageResult<(Organization, OrganizationUser)> {
        let now = Utc::now();
        let org = Organization {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            name: name.to_string(),
            encrypted_org_key: encrypted_org_key.clone(),
            is_active: true,
            deleted_at: None,
        };
        let membership = OrganizationUser {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            organization_id: org.id,
            user_id: founder_user_id,
            role: OrgRole::Owner,
            access_all: true,
            encrypted_org_key: Some(encrypted_org_key),
            status: MembershipStatus::Confirmed,
        };

        let (org_row, member_row) = (org.clone(), membership.clone());
        self.resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    let client = txn.client()?;
                    client
                        .execute(
                            "INSERT INTO organizations (id, created_at, updated_at, name, \
                             encrypted_org_key, is_active) VALUES ($1, $2, $3, $4, $5, $6)",
                            &[
                                &org_row.id,
                                &org_row.created_at,
                                &org_row.updated_at,
                                &org_row.name,
                                &org_row.encrypted_org_key.to_string(),
                                &org_row.is_active,
                            ],
                        )
                        .await
                        .map_err(|e| map_insert_err(e, "organization", org_row.id))?;

                    insert_membership(client, &member_row).await?;

                    tracing::info!(
                        organization_id = %org_row.id,
                        owner_user_id = %member_row.user_id,
                        "organization created"
                    );
                    Ok(())
                })
            })
            .await?;

        Ok((org, membership))
    }

    pub async fn get(&self, id: Uuid) -> StorageResult<Organization> {
        let row = self
            .resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    Ok(txn
                        .client()?
                        .query_opt(
                            "SELECT id, created_at, updated_at, deleted_at, name, \
                             encrypted_org_key, is_active FROM organizations WHERE id = $1",
                            &[&id],
                        )
                        .await?)
                })
            })
            .await?;

        row.ok_or_else(|| not_found("organization", id))
            .and_then(|r| org_from_row(&r))
    }

    /// The membership linking `user_id` to `organization_id`, if any.
    pub async fn membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> StorageResult<Option<OrganizationUser>> {
        let row = self
            .resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    Ok(txn
                        .client()?
                        .query_opt(
                            &format!(
                                "SELECT {MEMBERSHIP_COLUMNS} FROM organization_users \
                                 WHERE organization_id = $1 AND user_id = $2"
                            ),
                            &[&organization_id, &user_id],
                        )
                        .await?)
                })
            })
            .await?;

        row.map(|r| membership_from_row(&r)).transpose()
    }

    /// Every membership a user holds, for context building.
    pub async fn memberships_for_user(
        &self,
        user_id: Uuid,
    ) -> StorageResult<Vec<OrganizationUser>> {
        let rows = self
            .resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    Ok(txn
                        .client()?
                        .query(
                            &format!(
                                "SELECT {MEMBERSHIP_COLUMNS} FROM organization_users \
                                 WHERE user_id = $1"
                            ),
                            &[&user_id],
                        )
                        .await?)
                })
            })
            .await?;

        rows.iter().map(membership_from_row).collect()
    }

    /// Invites a user into an organization. No key material yet: an
    /// invited member has nothing to decrypt.
    pub async fn invite(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: OrgRole,
    ) -> StorageResult<OrganizationUser> {
        let now = Utc::now();
        let membership = OrganizationUser {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            organization_id,
            user_id,
            role,
            access_all: false,
            encrypted_org_key: None,
            status: MembershipStatus::Invited,
        };

        let row = membership.clone();
        self.resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move { insert_membership(txn.client()?, &row).await })
            })
            .await?;

        Ok(membership)
    }

    /// The invited user accepts; key delivery still pending.
    pub async fn accept(&self, org_user_id: Uuid) -> StorageResult<()> {
        self.set_status(org_user_id, MembershipStatus::Invited, MembershipStatus::Accepted, None)
            .await
    }

    /// An admin confirms the membership, attaching the organization key
    /// wrapped under the member's user key.
    pub async fn confirm(
        &self,
        org_user_id: Uuid,
        encrypted_org_key: EncString,
    ) -> StorageResult<()> {
        self.set_status(
            org_user_id,
            MembershipStatus::Accepted,
            MembershipStatus::Confirmed,
            Some(encrypted_org_key),
        )
        .await
    }

    async fn set_status(
        &self,
        org_user_id: Uuid,
        from: MembershipStatus,
        to: MembershipStatus,
        encrypted_org_key: Option<EncString>,
    ) -> StorageResult<()> {
        let updated = self
            .resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    let client = txn.client()?;
                    let count = match &encrypted_org_key {
                        Some(key) => {
                            client
                                .execute(
                                    "UPDATE organization_users SET status = $3, \
                                     encrypted_org_key = $4, updated_at = $5 \
                                     WHERE id = $1 AND status = $2",
                                    &[
                                        &org_user_id,
                                        &from.as_str(),
                                        &to.as_str(),
                                        &key.to_string(),
                                        &Utc::now(),
                                    ],
                                )
                                .await?
                        }
                        None => {
                            client
                                .execute(
                                    "UPDATE organization_users SET status = $3, updated_at = $4 \
                                     WHERE id = $1 AND status = $2",
                                    &[&org_user_id, &from.as_str(), &to.as_str(), &Utc::now()],
                                )
                                .await?
                        }
                    };
                    Ok(count)
                })
            })
            .await?;

        // Zero rows means wrong id or wrong lifecycle state; both reject.
        if updated == 0 {
            return Err(not_found("organization_user", org_user_id));
        }
        Ok(())
    }

    /// Changes a member's role. `access_all` travels with the role change
    /// so a demotion cannot leave the bypass flag behind.
    pub async fn update_role(
        &self,
        org_user_id: Uuid,
        role: OrgRole,
        access_all: bool,
    ) -> StorageResult<()> {
        let updated = self
            .resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    Ok(txn
                        .client()?
                        .execute(
                            "UPDATE organization_users SET role = $2, access_all = $3, \
                             updated_at = $4 WHERE id = $1",
                            &[&org_user_id, &role.as_str(), &access_all, &Utc::now()],
                        )
                        .await?)
                })
            })
            .await?;

        if updated == 0 {
            return Err(not_found("organization_user", org_user_id));
        }
        Ok(())
    }

    pub async fn create_team(&self, organization_id: Uuid, name: &str) -> StorageResult<Team> {
        let now = Utc::now();
        let team = Team {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            organization_id,
            name: name.to_string(),
        };

        let row = team.clone();
        self.resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    txn.client()?
                        .execute(
                            "INSERT INTO teams (id, created_at, updated_at, organization_id, \
                             name) VALUES ($1, $2, $3, $4, $5)",
                            &[&row.id, &row.created_at, &row.updated_at, &row.organization_id, &row.name],
                        )
                        .await
                        .map_err(|e| map_insert_err(e, "team", row.id))?;
                    Ok(())
                })
            })
            .await?;

        Ok(team)
    }

    pub async fn add_team_member(&self, team_id: Uuid, org_user_id: Uuid) -> StorageResult<()> {
        self.resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    txn.client()?
                        .execute(
                            "INSERT INTO team_users (id, team_id, org_user_id) \
                             VALUES ($1, $2, $3) ON CONFLICT (team_id, org_user_id) DO NOTHING",
                            &[&Uuid::new_v4(), &team_id, &org_user_id],
                        )
                        .await?;
                    Ok(())
                })
            })
            .await
    }

    pub async fn create_collection(
        &self,
        organization_id: Uuid,
        name: &str,
        description: &str,
    ) -> StorageResult<Collection> {
        let now = Utc::now();
        let collection = Collection {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            organization_id,
            name: name.to_string(),
            description: description.to_string(),
        };

        let row = collection.clone();
        self.resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    txn.client()?
                        .execute(
                            "INSERT INTO collections (id, created_at, updated_at, \
                             organization_id, name, description) VALUES ($1, $2, $3, $4, $5, $6)",
                            &[
                                &row.id,
                                &row.created_at,
                                &row.updated_at,
                                &row.organization_id,
                                &row.name,
                                &row.description,
                            ],
                        )
                        .await
                        .map_err(|e| map_insert_err(e, "collection", row.id))?;
                    Ok(())
                })
            })
            .await?;

        Ok(collection)
    }

    pub async fn get_collection(&self, id: Uuid) -> StorageResult<Collection> {
        let row = self
            .resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    Ok(txn
                        .client()?
                        .query_opt(
                            "SELECT id, created_at, updated_at, deleted_at, organization_id, \
                             name, description FROM collections WHERE id = $1",
                            &[&id],
                        )
                        .await?)
                })
            })
            .await?;

        let row = row.ok_or_else(|| not_found("collection", id))?;
        Ok(Collection {
            id: row.get("id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            deleted_at: row.get("deleted_at"),
            organization_id: row.get("organization_id"),
            name: row.get("name"),
            description: row.get("description"),
        })
    }

    /// Upserts the direct grant for (collection, member).
    pub async fn set_user_grant(
        &self,
        collection_id: Uuid,
        org_user_id: Uuid,
        flags: GrantFlags,
    ) -> StorageResult<()> {
        self.resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    txn.client()?
                        .execute(
                            "INSERT INTO collection_users (id, collection_id, org_user_id, \
                             can_read, can_write, can_admin, hide_passwords) \
                             VALUES ($1, $2, $3, $4, $5, $6, $7) \
                             ON CONFLICT (collection_id, org_user_id) DO UPDATE SET \
                             can_read = $4, can_write = $5, can_admin = $6, hide_passwords = $7",
                            &[
                                &Uuid::new_v4(),
                                &collection_id,
                                &org_user_id,
                                &flags.can_read,
                                &flags.can_write,
                                &flags.can_admin,
                                &flags.hide_passwords,
                            ],
                        )
                        .await?;
                    Ok(())
                })
            })
            .await
    }

    /// Upserts the team grant for (collection, team).
    pub async fn set_team_grant(
        &self,
        collection_id: Uuid,
        team_id: Uuid,
        flags: GrantFlags,
    ) -> StorageResult<()> {
        self.resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    txn.client()?
                        .execute(
                            "INSERT INTO collection_teams (id, collection_id, team_id, \
                             can_read, can_write, can_admin, hide_passwords) \
                             VALUES ($1, $2, $3, $4, $5, $6, $7) \
                             ON CONFLICT (collection_id, team_id) DO UPDATE SET \
                             can_read = $4, can_write = $5, can_admin = $6, hide_passwords = $7",
                            &[
                                &Uuid::new_v4(),
                                &collection_id,
                                &team_id,
                                &flags.can_read,
                                &flags.can_write,
                                &flags.can_admin,
                                &flags.hide_passwords,
                            ],
                        )
                        .await?;
                    Ok(())
                })
            })
            .await
    }

    /// Revokes the direct grant, if present.
    pub async fn remove_user_grant(
        &self,
        collection_id: Uuid,
        org_user_id: Uuid,
    ) -> StorageResult<()> {
        self.resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    txn.client()?
                        .execute(
                            "DELETE FROM collection_users \
                             WHERE collection_id = $1 AND org_user_id = $2",
                            &[&collection_id, &org_user_id],
                        )
                        .await?;
                    Ok(())
                })
            })
            .await
    }
}

async fn insert_membership(
    client: &deadpool_postgres::Client,
    membership: &OrganizationUser,
) -> StorageResult<()> {
    client
        .execute(
            "INSERT INTO organization_users (id, created_at, updated_at, organization_id, \
             user_id, role, access_all, encrypted_org_key, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            &[
                &membership.id,
                &membership.created_at,
                &membership.updated_at,
                &membership.organization_id,
                &membership.user_id,
                &membership.role.as_str(),
                &membership.access_all,
                &membership.encrypted_org_key.as_ref().map(|k| k.to_string()),
                &membership.status.as_str(),
            ],
        )
        .await
        .map_err(|e| map_insert_err(e, "organization_user", membership.id))?;
    Ok(())
}

fn org_from_row(row: &Row) -> StorageResult<Organization> {
    let encrypted_org_key: EncString = row.get::<_, String>("encrypted_org_key").parse()?;
    Ok(Organization {
        id: row.get("id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
        name: row.get("name"),
        encrypted_org_key,
        is_active: row.get("is_active"),
    })
}

fn membership_from_row(row: &Row) -> StorageResult<OrganizationUser> {
    let role: OrgRole = row
        .get::<_, String>("role")
        .parse()
        .map_err(|e: latchkey_vault::org::UnknownRole| {
            StorageError::Backend(crate::error::BackendError::Serialization {
                message: e.to_string(),
            })
        })?;
    let status: MembershipStatus = row
        .get::<_, String>("status")
        .parse()
        .map_err(|e: latchkey_vault::org::UnknownStatus| {
            StorageError::Backend(crate::error::BackendError::Serialization {
                message: e.to_string(),
            })
        })?;
    let encrypted_org_key = row
        .get::<_, Option<String>>("encrypted_org_key")
        .map(|s| s.parse::<EncString>())
        .transpose()?;

    Ok(OrganizationUser {
        id: row.get("id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        organization_id: row.get("organization_id"),
        user_id: row.get("user_id"),
        role,
        access_all: row.get("access_all"),
        encrypted_org_key,
        status,
    })
}
