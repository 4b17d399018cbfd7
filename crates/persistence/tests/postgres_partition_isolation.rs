//! Partition isolation against a real PostgreSQL instance.
//!
//! These tests require Docker: they share one testcontainers PostgreSQL
//! container for the whole test binary. Pools are built with a single
//! connection so sequential units of work are guaranteed to reuse it —
//! the scenario where tenant scoping or an abandoned transaction could
//! bleed across.
//!
//! Run with:
//!   cargo test -p latchkey-persistence --features postgres -- pg_integration
//! Skip if no Docker:
//!   cargo test -p latchkey-persistence --features postgres -- --skip pg_integration

#![cfg(feature = "postgres")]

mod pg_integration {
    use std::time::Duration;

    use latchkey_persistence::backends::postgres::{PostgresBackend, PostgresConfig};
    use latchkey_persistence::error::StorageError;
    use latchkey_persistence::repository::{ItemRepository, NewItem, NewUser, UserRepository};
    use latchkey_vault::error::CredentialError;
    use latchkey_vault::item::{ItemKind, ItemMetadata};
    use latchkey_vault::kdf::KdfConfig;
    use latchkey_vault::keys::ClientAuthHash;

    use testcontainers::ImageExt;
    use testcontainers::runners::AsyncRunner;
    use testcontainers_modules::postgres::Postgres;
    use tokio::sync::OnceCell;

    /// Shared PostgreSQL container reused across all tests in this module.
    struct SharedPg {
        host: String,
        port: u16,
        /// Kept alive for the duration of the test binary.
        _container: testcontainers::ContainerAsync<Postgres>,
    }

    static SHARED_PG: OnceCell<SharedPg> = OnceCell::const_new();

    async fn shared_pg() -> &'static SharedPg {
        SHARED_PG
            .get_or_init(|| async {
                let run_id = std::env::var("GITHUB_RUN_ID").unwrap_or_default();
                let container = Postgres::default()
                    .with_label("github.run_id", &run_id)
                    .start()
                    .await
                    .expect("Failed to start PostgreSQL container");

                let port = container
                    .get_host_port_ipv4(5432)
                    .await
                    .expect("Failed to get host port");
                let host = container
                    .get_host()
                    .await
                    .expect("Failed to get host")
                    .to_string();

                // Initialize the shared-partition schema once.
                let backend = PostgresBackend::new(config(&host, port, 5))
                    .await
                    .expect("Failed to create PostgresBackend");
                backend.init_schema().await.expect("Failed to init schema");

                SharedPg {
                    host,
                    port,
                    _container: container,
                }
            })
            .await
    }

    fn config(host: &str, port: u16, max_connections: usize) -> PostgresConfig {
        PostgresConfig {
            host: host.to_string(),
            port,
            dbname: "postgres".to_string(),
            user: "postgres".to_string(),
            password: Some("postgres".to_string()),
            max_connections,
            ..Default::default()
        }
    }

    /// A backend whose pool holds exactly one connection.
    async fn single_connection_backend() -> PostgresBackend {
        let pg = shared_pg().await;
        PostgresBackend::new(config(&pg.host, pg.port, 1))
            .await
            .expect("Failed to create PostgresBackend")
    }

    fn new_user(name: &str) -> NewUser {
        let mut kdf = KdfConfig::default_pbkdf2();
        kdf.salt = "ab".repeat(32);
        NewUser {
            name: name.to_string(),
            // Unique per call: tests share one database.
            email: format!("{name}-{}@example.com", uuid::Uuid::new_v4().simple()),
            auth_hash: ClientAuthHash::new(format!("{name}-client-auth-hash")),
            protected_user_key: "2.YWJj|ZGVm|Z2hp".parse().unwrap(),
            kdf,
        }
    }

    fn new_item(name: &str) -> NewItem {
        NewItem {
            kind: ItemKind::Password,
            data: "2.YWJj|ZGVm|Z2hp".parse().unwrap(),
            metadata: ItemMetadata {
                name: name.to_string(),
                tags: Vec::new(),
                uri_hint: None,
            },
            is_favorite: false,
        }
    }

    /// Sequential operations against different partitions on the same
    /// pooled connection never observe each other's rows.
    #[tokio::test]
    async fn pg_integration_partitions_do_not_leak_on_a_shared_connection() {
        let backend = single_connection_backend().await;
        let users = UserRepository::new(backend.resolver());
        let items = ItemRepository::new(backend.resolver());

        let a = users.create(new_user("alice")).await.unwrap();
        let b = users.create(new_user("bob")).await.unwrap();

        items.create(&a.partition, new_item("alice-login")).await.unwrap();

        // Alternate partitions over the single connection.
        assert!(items.list(&b.partition, true).await.unwrap().is_empty());

        let seen_a = items.list(&a.partition, true).await.unwrap();
        assert_eq!(seen_a.len(), 1);
        assert_eq!(seen_a[0].metadata.name, "alice-login");

        assert!(items.list(&b.partition, true).await.unwrap().is_empty());
    }

    /// A unit of work cancelled mid-transaction must roll back — the next
    /// tenant's commit on the same connection must not publish its writes.
    #[tokio::test]
    async fn pg_integration_cancelled_work_is_not_committed_by_next_tenant() {
        let backend = single_connection_backend().await;
        let users = UserRepository::new(backend.resolver());
        let items = ItemRepository::new(backend.resolver());
        let resolver = backend.resolver();

        let a = users.create(new_user("carol")).await.unwrap();
        let b = users.create(new_user("dave")).await.unwrap();

        // Insert, then stall until cancelled mid-transaction.
        let abandoned = resolver.with_partition(&a.partition, |txn| {
            Box::pin(async move {
                txn.client()?
                    .execute(
                        "INSERT INTO items (id, created_at, updated_at, kind, name, tags, data) \
                         VALUES ($1, now(), now(), 'password', 'phantom', '{}', $2)",
                        &[&uuid::Uuid::new_v4(), &"2.YWJj|ZGVm|Z2hp"],
                    )
                    .await?;
                std::future::pending::<()>().await;
                Ok(())
            })
        });
        let cancelled = tokio::time::timeout(Duration::from_millis(250), abandoned).await;
        assert!(cancelled.is_err());

        // The next tenant reuses the connection, works, and commits.
        items.create(&b.partition, new_item("dave-login")).await.unwrap();

        // The cancelled insert must not have ridden along.
        assert!(items.list(&a.partition, true).await.unwrap().is_empty());
        assert_eq!(items.list(&b.partition, true).await.unwrap().len(), 1);
    }

    /// Unknown emails and wrong hashes answer identically.
    #[tokio::test]
    async fn pg_integration_unknown_email_is_unauthorized() {
        let backend = single_connection_backend().await;
        let users = UserRepository::new(backend.resolver());

        let result = users
            .verify_credentials("nobody@example.com", &ClientAuthHash::new("whatever"))
            .await;
        assert!(matches!(
            result,
            Err(StorageError::Credential(CredentialError::Unauthorized))
        ));
    }
}
