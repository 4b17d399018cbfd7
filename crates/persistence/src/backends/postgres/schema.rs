//! PostgreSQL schema definitions and migrations.
//!
//! The shared partition holds every cross-tenant table; each tenant
//! partition holds exactly one table, `items`. Tenant DDL is generated
//! per partition by [`partition_ddl`] and runs inside the same
//! transaction that inserts the user row.

use crate::error::{BackendError, StorageError, StorageResult};
use crate::partition::PartitionName;

/// Current shared-schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the shared-partition schema.
pub async fn initialize_schema(client: &deadpool_postgres::Client) -> StorageResult<()> {
    let current_version = get_schema_version(client).await?;

    if current_version == 0 {
        create_schema_v1(client).await?;
        set_schema_version(client, SCHEMA_VERSION).await?;
    }

    Ok(())
}

/// Get the current schema version.
async fn get_schema_version(client: &deadpool_postgres::Client) -> StorageResult<i32> {
    client
        .execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            )",
            &[],
        )
        .await
        .map_err(|e| pg_error(format!("Failed to create schema_version table: {}", e)))?;

    let row = client
        .query_opt("SELECT version FROM schema_version LIMIT 1", &[])
        .await
        .map_err(|e| pg_error(format!("Failed to query schema version: {}", e)))?;

    Ok(row.map(|r| r.get::<_, i32>(0)).unwrap_or(0))
}

/// Set the schema version.
async fn set_schema_version(client: &deadpool_postgres::Client, version: i32) -> StorageResult<()> {
    client
        .execute("DELETE FROM schema_version", &[])
        .await
        .map_err(|e| pg_error(format!("Failed to clear schema_version: {}", e)))?;

    client
        .execute(
            "INSERT INTO schema_version (version) VALUES ($1)",
            &[&version],
        )
        .await
        .map_err(|e| pg_error(format!("Failed to set schema_version: {}", e)))?;

    Ok(())
}

/// Create the initial shared schema (version 1).
async fn create_schema_v1(client: &deadpool_postgres::Client) -> StorageResult<()> {
    let statements: &[(&str, &str)] = &[
        (
            "users",
            "CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                partition TEXT NOT NULL UNIQUE,
                master_password_hash TEXT NOT NULL,
                protected_user_key TEXT NOT NULL,
                kdf_type SMALLINT NOT NULL,
                kdf_iterations INTEGER NOT NULL,
                kdf_memory INTEGER,
                kdf_parallelism INTEGER,
                kdf_salt TEXT NOT NULL,
                is_verified BOOLEAN NOT NULL DEFAULT FALSE
            )",
        ),
        (
            "organizations",
            "CREATE TABLE IF NOT EXISTS organizations (
                id UUID PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                deleted_at TIMESTAMPTZ,
                name TEXT NOT NULL,
                encrypted_org_key TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE
            )",
        ),
        (
            "organization_users",
            "CREATE TABLE IF NOT EXISTS organization_users (
                id UUID PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                organization_id UUID NOT NULL REFERENCES organizations(id),
                user_id UUID NOT NULL REFERENCES users(id),
                role TEXT NOT NULL,
                access_all BOOLEAN NOT NULL DEFAULT FALSE,
                encrypted_org_key TEXT,
                status TEXT NOT NULL,
                UNIQUE (organization_id, user_id)
            )",
        ),
        (
            "teams",
            "CREATE TABLE IF NOT EXISTS teams (
                id UUID PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                organization_id UUID NOT NULL REFERENCES organizations(id),
                name TEXT NOT NULL
            )",
        ),
        (
            "team_users",
            "CREATE TABLE IF NOT EXISTS team_users (
                id UUID PRIMARY KEY,
                team_id UUID NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
                org_user_id UUID NOT NULL REFERENCES organization_users(id) ON DELETE CASCADE,
                UNIQUE (team_id, org_user_id)
            )",
        ),
        (
            "collections",
            "CREATE TABLE IF NOT EXISTS collections (
                id UUID PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                deleted_at TIMESTAMPTZ,
                organization_id UUID NOT NULL REFERENCES organizations(id),
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT ''
            )",
        ),
        (
            "collection_users",
            "CREATE TABLE IF NOT EXISTS collection_users (
                id UUID NOT NULL,
                collection_id UUID NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
                org_user_id UUID NOT NULL REFERENCES organization_users(id) ON DELETE CASCADE,
                can_read BOOLEAN NOT NULL DEFAULT TRUE,
                can_write BOOLEAN NOT NULL DEFAULT FALSE,
                can_admin BOOLEAN NOT NULL DEFAULT FALSE,
                hide_passwords BOOLEAN NOT NULL DEFAULT FALSE,
                PRIMARY KEY (collection_id, org_user_id)
            )",
        ),
        (
            "collection_teams",
            "CREATE TABLE IF NOT EXISTS collection_teams (
                id UUID NOT NULL,
                collection_id UUID NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
                team_id UUID NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
                can_read BOOLEAN NOT NULL DEFAULT TRUE,
                can_write BOOLEAN NOT NULL DEFAULT FALSE,
                can_admin BOOLEAN NOT NULL DEFAULT FALSE,
                hide_passwords BOOLEAN NOT NULL DEFAULT FALSE,
                PRIMARY KEY (collection_id, team_id)
            )",
        ),
        (
            "organization_items",
            "CREATE TABLE IF NOT EXISTS organization_items (
                id UUID PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                deleted_at TIMESTAMPTZ,
                organization_id UUID NOT NULL REFERENCES organizations(id),
                collection_id UUID REFERENCES collections(id),
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                tags TEXT[] NOT NULL DEFAULT '{}',
                uri_hint TEXT,
                data TEXT NOT NULL,
                created_by_user_id UUID NOT NULL REFERENCES users(id)
            )",
        ),
    ];

    for (table, ddl) in statements {
        client
            .execute(*ddl, &[])
            .await
            .map_err(|e| pg_error(format!("Failed to create {} table: {}", table, e)))?;
    }

    client
        .execute(
            "CREATE INDEX IF NOT EXISTS idx_org_items_collection
                ON organization_items (organization_id, collection_id)",
            &[],
        )
        .await
        .map_err(|e| pg_error(format!("Failed to create organization_items index: {}", e)))?;

    Ok(())
}

/// DDL for a freshly provisioned tenant partition.
///
/// Statements are schema-qualified rather than relying on search_path, so
/// they can run in the same shared-partition transaction that inserts the
/// user row. No `IF NOT EXISTS` on the schema itself: a collision means
/// the generated name is already taken and the provisioning transaction
/// must abort.
pub fn partition_ddl(partition: &PartitionName) -> Vec<String> {
    let quoted = partition.quoted();
    vec![
        format!("CREATE SCHEMA {quoted}"),
        format!(
            "CREATE TABLE {quoted}.items (
                id UUID PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                deleted_at TIMESTAMPTZ,
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                tags TEXT[] NOT NULL DEFAULT '{{}}',
                uri_hint TEXT,
                data TEXT NOT NULL,
                is_favorite BOOLEAN NOT NULL DEFAULT FALSE
            )"
        ),
    ]
}

/// DDL to drop a tenant partition and everything in it.
pub fn partition_drop_ddl(partition: &PartitionName) -> String {
    format!("DROP SCHEMA IF EXISTS {} CASCADE", partition.quoted())
}

fn pg_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        message,
        source: None,
    })
}
