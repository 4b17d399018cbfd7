//! Vault item storage.
//!
//! Personal items live in the owning user's partition; organization items
//! live in the shared partition, keyed by organization and optionally by
//! collection. Item `data` is opaque ciphertext either way — the
//! repository validates the envelope shape and stores the blob untouched.

use chrono::Utc;
use tokio_postgres::Row;
use uuid::Uuid;

use latchkey_vault::item::{Item, ItemKind, ItemMetadata, OrganizationItem};
use latchkey_vault::keys::EncString;

use crate::error::{BackendError, StorageError, StorageResult};
use crate::partition::{PartitionResolver, SHARED_PARTITION};
use crate::repository::not_found;

const ITEM_COLUMNS: &str =
    "id, created_at, updated_at, deleted_at, kind, name, tags, uri_hint, data, is_favorite";

const ORG_ITEM_COLUMNS: &str = "id, created_at, updated_at, deleted_at, organization_id, \
     collection_id, kind, name, tags, uri_hint, data, created_by_user_id";

/// A new personal item, already encrypted client-side.
pub struct NewItem {
    pub kind: ItemKind,
    pub data: EncString,
    pub metadata: ItemMetadata,
    pub is_favorite: bool,
}

/// A new organization item.
pub struct NewOrganizationItem {
    pub organization_id: Uuid,
    /// `None` files the item organization-wide, outside any collection.
    pub collection_id: Option<Uuid>,
    pub kind: ItemKind,
    pub data: EncString,
    pub metadata: ItemMetadata,
    pub created_by_user_id: Uuid,
}

/// Personal and organization vault items.
#[derive(Debug, Clone)]
pub struct ItemRepository {
    resolver: PartitionResolver,
}

impl ItemRepository {
    pub fn new(resolver: PartitionResolver) -> Self {
        Self { resolver }
    }

    /// Creates a personal item in the given tenant partition.
    pub async fn create(&self, partition: &str, new_item: NewItem) -> StorageResult<Item> {
        let now = Utc::now();
        let item = Item {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            kind: new_item.kind,
            data: new_item.data,
            metadata: new_item.metadata,
            is_favorite: new_item.is_favorite,
        };

        let row = item.clone();
        self.resolver
            .with_partition(partition, move |txn| {
                Box::pin(async move {
                    txn.client()?
                        .execute(
                            "INSERT INTO items (id, created_at, updated_at, kind, name, tags, \
                             uri_hint, data, is_favorite) \
                             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                            &[
                                &row.id,
                                &row.created_at,
                                &row.updated_at,
                                &row.kind.as_str(),
                                &row.metadata.name,
                                &row.metadata.tags,
                                &row.metadata.uri_hint,
                                &row.data.to_string(),
                                &row.is_favorite,
                            ],
                        )
                        .await?;
                    Ok(())
                })
            })
            .await?;

        Ok(item)
    }

    pub async fn get(&self, partition: &str, id: Uuid) -> StorageResult<Item> {
        let row = self
            .resolver
            .with_partition(partition, move |txn| {
                Box::pin(async move {
                    Ok(txn
                        .client()?
                        .query_opt(
                            &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"),
                            &[&id],
                        )
                        .await?)
                })
            })
            .await?;

        row.ok_or_else(|| not_found("item", id))
            .and_then(|r| item_from_row(&r))
    }

    /// Lists items in a partition, soft-deleted ones excluded unless
    /// asked for.
    pub async fn list(&self, partition: &str, include_deleted: bool) -> StorageResult<Vec<Item>> {
        let rows = self
            .resolver
            .with_partition(partition, move |txn| {
                Box::pin(async move {
                    let sql = if include_deleted {
                        format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY updated_at DESC")
                    } else {
                        format!(
                            "SELECT {ITEM_COLUMNS} FROM items \
                             WHERE deleted_at IS NULL ORDER BY updated_at DESC"
                        )
                    };
                    Ok(txn.client()?.query(&sql, &[]).await?)
                })
            })
            .await?;

        rows.iter().map(item_from_row).collect()
    }

    /// Replaces an item's payload and metadata.
    pub async fn update(
        &self,
        partition: &str,
        id: Uuid,
        data: EncString,
        metadata: ItemMetadata,
        is_favorite: bool,
    ) -> StorageResult<()> {
        let updated = self
            .resolver
            .with_partition(partition, move |txn| {
                Box::pin(async move {
                    Ok(txn
                        .client()?
                        .execute(
                            "UPDATE items SET data = $2, name = $3, tags = $4, uri_hint = $5, \
                             is_favorite = $6, updated_at = $7 \
                             WHERE id = $1 AND deleted_at IS NULL",
                            &[
                                &id,
                                &data.to_string(),
                                &metadata.name,
                                &metadata.tags,
                                &metadata.uri_hint,
                                &is_favorite,
                                &Utc::now(),
                            ],
                        )
                        .await?)
                })
            })
            .await?;

        if updated == 0 {
            return Err(not_found("item", id));
        }
        Ok(())
    }

    /// Soft-deletes an item. Idempotent once deleted.
    pub async fn soft_delete(&self, partition: &str, id: Uuid) -> StorageResult<()> {
        let updated = self
            .resolver
            .with_partition(partition, move |txn| {
                Box::pin(async move {
                    Ok(txn
                        .client()?
                        .execute(
                            "UPDATE items SET deleted_at = $2, updated_at = $2 \
                             WHERE id = $1 AND deleted_at IS NULL",
                            &[&id, &Utc::now()],
                        )
                        .await?)
                })
            })
            .await?;

        if updated == 0 {
            // Distinguish already-deleted (fine) from missing (not).
            return match self.get(partition, id).await {
                Ok(_) => Ok(()),
                Err(e) => Err(e),
            };
        }
        Ok(())
    }

    /// Restores a soft-deleted item.
    pub async fn restore(&self, partition: &str, id: Uuid) -> StorageResult<()> {
        let updated = self
            .resolver
            .with_partition(partition, move |txn| {
                Box::pin(async move {
                    Ok(txn
                        .client()?
                        .execute(
                            "UPDATE items SET deleted_at = NULL, updated_at = $2 \
                             WHERE id = $1 AND deleted_at IS NOT NULL",
                            &[&id, &Utc::now()],
                        )
                        .await?)
                })
            })
            .await?;

        if updated == 0 {
            return Err(not_found("item", id));
        }
        Ok(())
    }

    /// Permanently removes a soft-deleted item. Items still live reject,
    /// so a purge is always a two-step deletion.
    pub async fn purge(&self, partition: &str, id: Uuid) -> StorageResult<()> {
        let deleted = self
            .resolver
            .with_partition(partition, move |txn| {
                Box::pin(async move {
                    Ok(txn
                        .client()?
                        .execute(
                            "DELETE FROM items WHERE id = $1 AND deleted_at IS NOT NULL",
                            &[&id],
                        )
                        .await?)
                })
            })
            .await?;

        if deleted == 0 {
            return Err(not_found("item", id));
        }
        Ok(())
    }

    /// Creates an organization item in the shared partition.
    pub async fn create_org_item(
        &self,
        new_item: NewOrganizationItem,
    ) -> StorageResult<OrganizationItem> {
        let now = Utc::now();
        let item = OrganizationItem {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            organization_id: new_item.organization_id,
            collection_id: new_item.collection_id,
            kind: new_item.kind,
            data: new_item.data,
            metadata: new_item.metadata,
            created_by_user_id: new_item.created_by_user_id,
        };

        let row = item.clone();
        self.resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    txn.client()?
                        .execute(
                            "INSERT INTO organization_items (id, created_at, updated_at, \
                             organization_id, collection_id, kind, name, tags, uri_hint, data, \
                             created_by_user_id) \
                             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                            &[
                                &row.id,
                                &row.created_at,
                                &row.updated_at,
                                &row.organization_id,
                                &row.collection_id,
                                &row.kind.as_str(),
                                &row.metadata.name,
                                &row.metadata.tags,
                                &row.metadata.uri_hint,
                                &row.data.to_string(),
                                &row.created_by_user_id,
                            ],
                        )
                        .await?;
                    Ok(())
                })
            })
            .await?;

        Ok(item)
    }

    /// Lists an organization's live items, optionally narrowed to one
    /// collection.
    pub async fn list_org_items(
        &self,
        organization_id: Uuid,
        collection_id: Option<Uuid>,
    ) -> StorageResult<Vec<OrganizationItem>> {
        let rows = self
            .resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    let client = txn.client()?;
                    let rows = match collection_id {
                        Some(collection_id) => {
                            client
                                .query(
                                    &format!(
                                        "SELECT {ORG_ITEM_COLUMNS} FROM organization_items \
                                         WHERE organization_id = $1 AND collection_id = $2 \
                                         AND deleted_at IS NULL ORDER BY updated_at DESC"
                                    ),
                                    &[&organization_id, &collection_id],
                                )
                                .await?
                        }
                        None => {
                            client
                                .query(
                                    &format!(
                                        "SELECT {ORG_ITEM_COLUMNS} FROM organization_items \
                                         WHERE organization_id = $1 AND deleted_at IS NULL \
                                         ORDER BY updated_at DESC"
                                    ),
                                    &[&organization_id],
                                )
                                .await?
                        }
                    };
                    Ok(rows)
                })
            })
            .await?;

        rows.iter().map(org_item_from_row).collect()
    }

    /// Soft-deletes an organization item.
    pub async fn soft_delete_org_item(&self, id: Uuid) -> StorageResult<()> {
        let updated = self
            .resolver
            .with_partition(SHARED_PARTITION, move |txn| {
                Box::pin(async move {
                    Ok(txn
                        .client()?
                        .execute(
                            "UPDATE organization_items SET deleted_at = $2, updated_at = $2 \
                             WHERE id = $1 AND deleted_at IS NULL",
                            &[&id, &Utc::now()],
                        )
                        .await?)
                })
            })
            .await?;

        if updated == 0 {
            return Err(not_found("organization_item", id));
        }
        Ok(())
    }
}

fn parse_kind(raw: String) -> StorageResult<ItemKind> {
    raw.parse().map_err(|e: latchkey_vault::item::UnknownItemKind| {
        StorageError::Backend(BackendError::Serialization {
            message: e.to_string(),
        })
    })
}

fn item_from_row(row: &Row) -> StorageResult<Item> {
    Ok(Item {
        id: row.get("id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
        kind: parse_kind(row.get("kind"))?,
        data: row.get::<_, String>("data").parse()?,
        metadata: ItemMetadata {
            name: row.get("name"),
            tags: row.get("tags"),
            uri_hint: row.get("uri_hint"),
        },
        is_favorite: row.get("is_favorite"),
    })
}

fn org_item_from_row(row: &Row) -> StorageResult<OrganizationItem> {
    Ok(OrganizationItem {
        id: row.get("id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
        organization_id: row.get("organization_id"),
        collection_id: row.get("collection_id"),
        kind: parse_kind(row.get("kind"))?,
        data: row.get::<_, String>("data").parse()?,
        metadata: ItemMetadata {
            name: row.get("name"),
            tags: row.get("tags"),
            uri_hint: row.get("uri_hint"),
        },
        created_by_user_id: row.get("created_by_user_id"),
    })
}
