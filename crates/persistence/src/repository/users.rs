//! User account provisioning, credentials, and key rotation.

use chrono::Utc;
use tokio_postgres::Row;
use uuid::Uuid;

use latchkey_vault::error::CredentialError;
use latchkey_vault::kdf::{KdfConfig, KdfType};
use latchkey_vault::keys::{AccountKeyRotation, ClientAuthHash, EncString, MasterPasswordHash};
use latchkey_vault::user::User;

use crate::backends::postgres::schema::{partition_ddl, partition_drop_ddl};
use crate::error::{StorageError, StorageResult, TransactionError};
use crate::partition::{PartitionName, PartitionResolver, SHARED_PARTITION};
use crate::repository::{map_insert_err, not_found};

const USER_COLUMNS: &str = "id, created_at, updated_at, name, email, partition, \
     master_password_hash, protected_user_key, kdf_type, kdf_iterations, \
     kdf_memory, kdf_parallelism, kdf_salt, is_verified";

/// A signup request, prepared client-side.
///
/// `auth_hash` is the client-derived authentication hash and
/// `protected_user_key` the user key wrapped under the master key; the
/// master password itself never appears.
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub auth_hash: ClientAuthHash,
    pub protected_user_key: EncString,
    pub kdf: KdfConfig,
}

/// Accounts and their partitions, credentials, and master-password
/// rotation.
#[derive(Debug, Clone)]
pub struct UserRepository {
    resolver: PartitionResolver,
}

impl UserRepository {
    pub fn new(resolver: PartitionResolver) -> Self {
        Self { resolver }
    }

    /// Provisions a new account: the user row, the tenant partition, and
    /// the partition's tables, in one transaction. Either the account
    /// exists fully provisioned or not at all.
    pub async fn create(&self, new_user: NewUser) -> StorageResult<User> {
        new_user.kdf.validate()?;
        new_user.kdf.validate_salt()?;

        let stored_hash = MasterPasswordHash::derive(&new_user.auth_hash)?;
        let partition = PartitionName::generate();
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            name: new_user.name,
            email: new_user.email,
            partition: partition.as_str().to_string(),
            master_password_hash: stored_hash.as_str().to_string(),
            protected_user_key: new_user.protected_user_key,
            kdf_type: new_user.kdf.kind,
            kdf_iterations: new_user.kdf.iterations,
            kdf_memory: new_user.kdf.memory,
            kdf_parallelism: new_user.kdf.parallelism,
            kdf_salt: new_user.kdf.salt,
            is_verified: false,
        };

        let inserted = user.clone();
        self.resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    let client = txn.client()?;
                    client
                        .execute(
                            "INSERT INTO users (id, created_at, updated_at, name, email, \
                             partition, master_password_hash, protected_user_key, kdf_type, \
                             kdf_iterations, kdf_memory, kdf_parallelism, kdf_salt, is_verified) \
                             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
                            &[
                                &inserted.id,
                                &inserted.created_at,
                                &inserted.updated_at,
                                &inserted.name,
                                &inserted.email,
                                &inserted.partition,
                                &inserted.master_password_hash,
                                &inserted.protected_user_key.to_string(),
                                &inserted.kdf_type.as_i16(),
                                &(inserted.kdf_iterations as i32),
                                &inserted.kdf_memory.map(|m| m as i32),
                                &inserted.kdf_parallelism.map(|p| p as i32),
                                &inserted.kdf_salt,
                                &inserted.is_verified,
                            ],
                        )
                        .await
                        .map_err(|e| map_insert_err(e, "user", &inserted.email))?;

                    for ddl in partition_ddl(&partition) {
                        client.batch_execute(&ddl).await?;
                    }

                    tracing::info!(
                        user_id = %inserted.id,
                        partition = %partition,
                        "provisioned user account"
                    );
                    Ok(())
                })
            })
            .await?;

        Ok(user)
    }

    pub async fn get_by_id(&self, id: Uuid) -> StorageResult<User> {
        let row = self
            .resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    Ok(txn
                        .client()?
                        .query_opt(
                            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"),
                            &[&id],
                        )
                        .await?)
                })
            })
            .await?;

        row.ok_or_else(|| not_found("user", id))
            .and_then(|r| user_from_row(&r))
    }

    pub async fn get_by_email(&self, email: &str) -> StorageResult<User> {
        let owned_email = email.to_string();
        let row = self
            .resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    Ok(txn
                        .client()?
                        .query_opt(
                            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"),
                            &[&owned_email],
                        )
                        .await?)
                })
            })
            .await?;

        row.ok_or_else(|| not_found("user", email))
            .and_then(|r| user_from_row(&r))
    }

    /// The KDF parameters a client needs before login.
    ///
    /// Stored parameters are re-checked for downgrades on every read; a
    /// legacy config above current maximums still answers, but a weakened
    /// one does not.
    pub async fn prelogin(&self, email: &str) -> StorageResult<KdfConfig> {
        let user = self.get_by_email(email).await?;
        let config = user.kdf_config();
        config.validate_for_prelogin()?;
        Ok(config)
    }

    /// Verifies a presented authentication hash and returns the account.
    ///
    /// An unknown email and a wrong hash are indistinguishable to the
    /// caller.
    pub async fn verify_credentials(
        &self,
        email: &str,
        presented: &ClientAuthHash,
    ) -> StorageResult<User> {
        let user = match self.get_by_email(email).await {
            Ok(user) => user,
            Err(StorageError::Resource(_)) => {
                // Burn the same verification work as a mismatch so
                // response timing does not reveal whether the account
                // exists.
                let _ = MasterPasswordHash::decoy().verify(presented);
                return Err(CredentialError::Unauthorized.into());
            }
            Err(other) => return Err(other),
        };

        MasterPasswordHash::from_stored(user.master_password_hash.clone()).verify(presented)?;
        Ok(user)
    }

    pub async fn mark_verified(&self, id: Uuid) -> StorageResult<()> {
        let updated = self
            .resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    Ok(txn
                        .client()?
                        .execute(
                            "UPDATE users SET is_verified = TRUE, updated_at = $2 WHERE id = $1",
                            &[&id, &Utc::now()],
                        )
                        .await?)
                })
            })
            .await?;

        if updated == 0 {
            return Err(not_found("user", id));
        }
        Ok(())
    }

    /// Applies a master-password change atomically.
    ///
    /// The rotation must re-wrap the organization key of every confirmed
    /// membership the user holds; a partial payload rejects before any
    /// write. The current credential is re-verified under the row lock so
    /// a stale session cannot race a concurrent rotation.
    pub async fn rotate_master_password(
        &self,
        user_id: Uuid,
        current: ClientAuthHash,
        rotation: AccountKeyRotation,
    ) -> StorageResult<()> {
        if let Some(kdf) = &rotation.new_kdf {
            kdf.validate()?;
            kdf.validate_salt()?;
        }
        let new_hash = MasterPasswordHash::derive(&ClientAuthHash::new(&rotation.new_auth_hash))?;

        self.resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    let client = txn.client()?;

                    let row = client
                        .query_opt(
                            "SELECT master_password_hash FROM users WHERE id = $1 FOR UPDATE",
                            &[&user_id],
                        )
                        .await?
                        .ok_or_else(|| not_found("user", user_id))?;
                    let stored: String = row.get(0);
                    MasterPasswordHash::from_stored(stored).verify(&current)?;

                    // Only confirmed memberships hold a wrapped key copy.
                    let membership_ids: Vec<Uuid> = client
                        .query(
                            "SELECT id FROM organization_users \
                             WHERE user_id = $1 AND encrypted_org_key IS NOT NULL",
                            &[&user_id],
                        )
                        .await?
                        .iter()
                        .map(|r| r.get(0))
                        .collect();
                    rotation.check_covers(&membership_ids)?;

                    let now = Utc::now();
                    if let Some(kdf) = &rotation.new_kdf {
                        client
                            .execute(
                                "UPDATE users SET master_password_hash = $2, \
                                 protected_user_key = $3, kdf_type = $4, kdf_iterations = $5, \
                                 kdf_memory = $6, kdf_parallelism = $7, kdf_salt = $8, \
                                 updated_at = $9 WHERE id = $1",
                                &[
                                    &user_id,
                                    &new_hash.as_str(),
                                    &rotation.new_protected_user_key.to_string(),
                                    &kdf.kind.as_i16(),
                                    &(kdf.iterations as i32),
                                    &kdf.memory.map(|m| m as i32),
                                    &kdf.parallelism.map(|p| p as i32),
                                    &kdf.salt,
                                    &now,
                                ],
                            )
                            .await?;
                    } else {
                        client
                            .execute(
                                "UPDATE users SET master_password_hash = $2, \
                                 protected_user_key = $3, updated_at = $4 WHERE id = $1",
                                &[
                                    &user_id,
                                    &new_hash.as_str(),
                                    &rotation.new_protected_user_key.to_string(),
                                    &now,
                                ],
                            )
                            .await?;
                    }

                    for rotated in &rotation.rewrapped_org_keys {
                        let updated = client
                            .execute(
                                "UPDATE organization_users SET encrypted_org_key = $3, \
                                 updated_at = $4 WHERE id = $1 AND user_id = $2",
                                &[
                                    &rotated.org_user_id,
                                    &user_id,
                                    &rotated.encrypted_org_key.to_string(),
                                    &now,
                                ],
                            )
                            .await?;
                        if updated != 1 {
                            return Err(StorageError::Transaction(TransactionError::RolledBack {
                                reason: format!(
                                    "membership {} not updated during key rotation",
                                    rotated.org_user_id
                                ),
                            }));
                        }
                    }

                    tracing::info!(user_id = %user_id, "master password rotated");
                    Ok(())
                })
            })
            .await
    }

    /// Deletes an account and drops its partition, in one transaction.
    pub async fn delete(&self, id: Uuid) -> StorageResult<()> {
        let user = self.get_by_id(id).await?;
        let partition = PartitionName::new(user.partition)?;

        self.resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    let client = txn.client()?;
                    client
                        .execute("DELETE FROM users WHERE id = $1", &[&id])
                        .await?;
                    client.batch_execute(&partition_drop_ddl(&partition)).await?;
                    tracing::info!(user_id = %id, partition = %partition, "account deleted");
                    Ok(())
                })
            })
            .await
    }
}

fn user_from_row(row: &Row) -> StorageResult<User> {
    let kdf_type = KdfType::from_i16(row.get::<_, i16>("kdf_type"))?;
    let protected_user_key: EncString = row.get::<_, String>("protected_user_key").parse()?;

    Ok(User {
        id: row.get("id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        name: row.get("name"),
        email: row.get("email"),
        partition: row.get("partition"),
        master_password_hash: row.get("master_password_hash"),
        protected_user_key,
        kdf_type,
        kdf_iterations: row.get::<_, i32>("kdf_iterations") as u32,
        kdf_memory: row.get::<_, Option<i32>>("kdf_memory").map(|m| m as u32),
        kdf_parallelism: row
            .get::<_, Option<i32>>("kdf_parallelism")
            .map(|p| p as u32),
        kdf_salt: row.get("kdf_salt"),
        is_verified: row.get("is_verified"),
    })
}
