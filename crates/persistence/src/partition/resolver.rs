//! Tenant partition resolver.
//!
//! Scopes a unit of work to exactly one tenant's storage partition. The
//! scoping directive is `SET LOCAL search_path`, issued *inside* a
//! transaction so it dies with the transaction — a connection-global
//! `SET` is never used, because pooled connections are reused across
//! tenants between requests and must never come back pinned.

use std::future::Future;
use std::pin::Pin;

use deadpool_postgres::{Client, Pool};

use super::name::PartitionName;
use crate::error::{StorageError, StorageResult, TransactionError};

/// A future borrowing the scoped transaction it runs against.
pub type ScopedFuture<'a, T> = Pin<Box<dyn Future<Output = StorageResult<T>> + Send + 'a>>;

/// Resolves units of work onto tenant partitions.
///
/// # Examples
///
/// ```no_run
/// # use latchkey_persistence::partition::PartitionResolver;
/// # async fn example(resolver: &PartitionResolver) -> Result<(), Box<dyn std::error::Error>> {
/// let count: i64 = resolver
///     .with_partition("user_ab12cd34", |txn| {
///         Box::pin(async move {
///             let row = txn.client()?.query_one("SELECT count(*) FROM items", &[]).await?;
///             Ok(row.get(0))
///         })
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PartitionResolver {
    pool: Pool,
}

impl std::fmt::Debug for PartitionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionResolver").finish_non_exhaustive()
    }
}

impl PartitionResolver {
    /// Creates a resolver over a connection pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Begins a transaction scoped to the given partition.
    ///
    /// Prefer [`with_partition`](Self::with_partition) unless the caller
    /// needs to interleave other work between statements.
    pub async fn begin(&self, partition: &PartitionName) -> StorageResult<PartitionTransaction> {
        let client = self.pool.get().await?;
        PartitionTransaction::new(client, partition.clone()).await
    }

    /// Runs `work` inside a transaction scoped to `partition_name`.
    ///
    /// The name is re-validated before a connection is even checked out —
    /// a sanitizer failure aborts with no statement run. On `Ok` the
    /// transaction commits; on any error it rolls back as one atomic
    /// unit and the original error propagates.
    pub async fn with_partition<T, F>(&self, partition_name: &str, work: F) -> StorageResult<T>
    where
        F: for<'a> FnOnce(&'a PartitionTransaction) -> ScopedFuture<'a, T>,
    {
        let partition = PartitionName::new(partition_name)?;
        let txn = self.begin(&partition).await?;

        match work(&txn).await {
            Ok(value) => {
                txn.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::warn!(
                        partition = partition_name,
                        error = %rollback_err,
                        "rollback after failed unit of work also failed"
                    );
                }
                Err(err)
            }
        }
    }
}

/// A transaction pinned to one tenant partition.
///
/// Every statement issued through [`client`](Self::client) resolves
/// unqualified table names against the scoped partition. The scoping ends
/// with the transaction — commit, rollback, or connection recycling all
/// clear it.
///
/// If the transaction is dropped without an explicit commit or rollback
/// (for example when the enclosing operation is cancelled), the open
/// transaction is rolled back at the connection's next checkout, before
/// any later work begins; nothing partial commits and the connection
/// does not stay pinned to the tenant.
pub struct PartitionTransaction {
    /// The client with the active transaction. `Option` so commit and
    /// rollback can take it.
    client: Option<Client>,
    active: bool,
    partition: PartitionName,
}

impl std::fmt::Debug for PartitionTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionTransaction")
            .field("active", &self.active)
            .field("partition", &self.partition)
            .finish()
    }
}

/// The transaction-scoped directive naming the resolution target.
///
/// The partition name cannot be bound as a parameter here, which is the
/// entire reason [`PartitionName`] exists.
pub(crate) fn scope_directive(partition: &PartitionName) -> String {
    format!("SET LOCAL search_path TO {}", partition.quoted())
}

/// Opens a transaction on a pooled connection.
///
/// The leading ROLLBACK ends any transaction a cancelled unit of work
/// left open on the recycled connection; a bare BEGIN there would be a
/// warning-level no-op, and the abandoned writes would commit with the
/// next tenant's. On an idle connection the ROLLBACK itself is the
/// warning-level no-op.
pub(crate) const BEGIN_FRESH: &str = "ROLLBACK; BEGIN";

impl PartitionTransaction {
    async fn new(client: Client, partition: PartitionName) -> StorageResult<Self> {
        client.batch_execute(BEGIN_FRESH).await.map_err(|e| {
            StorageError::Transaction(TransactionError::RolledBack {
                reason: format!("failed to begin transaction: {e}"),
            })
        })?;

        if let Err(e) = client.batch_execute(&scope_directive(&partition)).await {
            // Leave nothing half-scoped behind.
            if let Err(rollback_err) = client.batch_execute("ROLLBACK").await {
                tracing::warn!(error = %rollback_err, "rollback after failed scoping failed");
            }
            return Err(StorageError::Transaction(TransactionError::RolledBack {
                reason: format!("failed to scope transaction: {e}"),
            }));
        }

        tracing::debug!(partition = %partition, "partition-scoped transaction started");

        Ok(Self {
            client: Some(client),
            active: true,
            partition,
        })
    }

    /// The scoped client.
    pub fn client(&self) -> StorageResult<&Client> {
        if !self.active {
            return Err(StorageError::Transaction(
                TransactionError::InvalidTransaction,
            ));
        }
        self.client
            .as_ref()
            .ok_or(StorageError::Transaction(TransactionError::InvalidTransaction))
    }

    /// The partition this transaction is scoped to.
    pub fn partition(&self) -> &PartitionName {
        &self.partition
    }

    /// Commits the unit of work, ending the scoping with it.
    pub async fn commit(mut self) -> StorageResult<()> {
        let client = self
            .client
            .take()
            .ok_or(StorageError::Transaction(TransactionError::InvalidTransaction))?;
        self.active = false;

        client.batch_execute("COMMIT").await.map_err(|e| {
            StorageError::Transaction(TransactionError::RolledBack {
                reason: format!("commit failed: {e}"),
            })
        })
    }

    /// Rolls the unit of work back.
    pub async fn rollback(mut self) -> StorageResult<()> {
        let client = self
            .client
            .take()
            .ok_or(StorageError::Transaction(TransactionError::InvalidTransaction))?;
        self.active = false;

        client.batch_execute("ROLLBACK").await.map_err(|e| {
            StorageError::Transaction(TransactionError::RolledBack {
                reason: format!("rollback failed: {e}"),
            })
        })
    }
}

impl Drop for PartitionTransaction {
    fn drop(&mut self) {
        // Cancellation path: the open transaction is rolled back at the
        // connection's next checkout, clearing the search_path with it.
        if self.active {
            tracing::warn!(
                partition = %self.partition,
                "partition-scoped transaction dropped without commit or rollback"
            );
        }
    }
}
