//! Integration tests for the storage layer
//!
//! These tests run the adapters end to end:
//! - Insert ids and single-row fetches
//! - Transaction handling and error normalization
//! - Migration runs and their atomicity
//! - Finder caching
//! - Concurrent access

#[cfg(feature = "sqlite")]
mod sqlite_tests {
    use service_bus_storage::core::functions::{fetch_all, fetch_one};
    use service_bus_storage::core::migration::{Migration, MigrationLoader, MigrationStatements};
    use service_bus_storage::prelude::*;
    use std::path::Path;
    use std::sync::Arc;

    async fn adapter_with_users() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().expect("Failed to create adapter");
        adapter
            .execute(
                "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL)",
                &[],
            )
            .await
            .expect("Failed to create table");
        adapter
    }

    async fn count(executor: &dyn QueryExecutor, table: &str) -> i64 {
        let row = fetch_one(
            executor
                .execute(&format!("SELECT COUNT(*) AS n FROM {}", table), &[])
                .await
                .expect("Count failed"),
        )
        .await
        .expect("Fetch failed")
        .expect("No row");
        row.get("n").and_then(SqlValue::as_long).expect("Column not found")
    }

    #[tokio::test]
    async fn test_last_insert_id_sequence() {
        let adapter = adapter_with_users().await;

        let mut first = adapter
            .execute("INSERT INTO users (name) VALUES (?)", &["Alice".into()])
            .await
            .expect("Insert failed");
        assert_eq!(
            first.last_insert_id(None).await.expect("Id lookup failed").as_deref(),
            Some("1")
        );

        let mut second = adapter
            .execute("INSERT INTO users (name) VALUES (?)", &["Bob".into()])
            .await
            .expect("Insert failed");
        assert_eq!(
            second.last_insert_id(None).await.expect("Id lookup failed").as_deref(),
            Some("2")
        );
    }

    #[tokio::test]
    async fn test_fetch_one_cardinality() {
        let adapter = adapter_with_users().await;

        let none = fetch_one(adapter.execute("SELECT * FROM users", &[]).await.unwrap())
            .await
            .unwrap();
        assert!(none.is_none());

        adapter
            .execute("INSERT INTO users (name) VALUES (?), (?)", &["a".into(), "b".into()])
            .await
            .unwrap();

        let one = fetch_one(
            adapter
                .execute("SELECT name FROM users WHERE id = ?", &[1.into()])
                .await
                .unwrap(),
        )
        .await
        .unwrap()
        .expect("Row not found");
        assert_eq!(one.get("name"), Some(&SqlValue::from("a")));

        let err = fetch_one(adapter.execute("SELECT * FROM users", &[]).await.unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::OneResultExpected { count: 2 }));
        assert!(err.to_string().contains("\"2\""));
    }

    #[tokio::test]
    async fn test_duplicate_key_in_one_statement() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter
            .execute("CREATE TABLE tokens (id TEXT PRIMARY KEY)", &[])
            .await
            .unwrap();

        let err = adapter
            .execute("INSERT INTO tokens (id) VALUES (?), (?)", &["t".into(), "t".into()])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StorageError::UniqueConstraintViolationCheckFailed { .. }
        ));
        assert_eq!(count(&adapter, "tokens").await, 0);
    }

    #[tokio::test]
    async fn test_invalid_sql_is_normalized() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        let err = adapter.execute("SELEC * FROM nowhere", &[]).await.unwrap_err();
        assert!(matches!(err, StorageError::StorageInteractingFailed { .. }));
    }

    #[tokio::test]
    async fn test_transactional_rollback_returns_original_error() {
        let adapter = adapter_with_users().await;

        let err = adapter
            .transactional(|tx| {
                Box::pin(async move {
                    tx.execute("INSERT INTO users (name) VALUES (?)", &["ghost".into()])
                        .await?;
                    Err::<(), _>(StorageError::storage_interacting("business rule rejected"))
                })
            })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("business rule rejected"));
        assert_eq!(count(&adapter, "users").await, 0);
    }

    #[tokio::test]
    async fn test_transactional_commit() {
        let adapter = adapter_with_users().await;

        let inserted = adapter
            .transactional(|tx| {
                Box::pin(async move {
                    let mut total = 0;
                    for name in ["a", "b", "c"] {
                        total += tx
                            .execute("INSERT INTO users (name) VALUES (?)", &[name.into()])
                            .await?
                            .affected_rows();
                    }
                    Ok(total)
                })
            })
            .await
            .expect("Transaction failed");

        assert_eq!(inserted, 3);
        assert_eq!(count(&adapter, "users").await, 3);
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let adapter = Arc::new(adapter_with_users().await);

        let mut handles = vec![];
        for i in 0..10 {
            let adapter = Arc::clone(&adapter);
            handles.push(tokio::spawn(async move {
                adapter
                    .execute(
                        "INSERT INTO users (name) VALUES (?)",
                        &[format!("User{}", i).into()],
                    )
                    .await
                    .map(|result| result.affected_rows())
            }));
        }

        for handle in handles {
            let affected = handle.await.expect("Task panicked").expect("Insert failed");
            assert_eq!(affected, 1);
        }

        assert_eq!(count(adapter.as_ref(), "users").await, 10);
    }

    #[tokio::test]
    async fn test_query_helpers() {
        let adapter = adapter_with_users().await;
        for name in ["alpha", "beta", "gamma"] {
            let query = insert_query("users", &serde_json::json!({ "name": name }))
                .unwrap()
                .compile();
            adapter.execute(&query.sql, &query.parameters).await.unwrap();
        }

        let rows = fetch_all(
            find(
                &adapter,
                "users",
                &[not_equals_criteria("name", "beta")],
                Some(10),
                &[OrderBy::desc("id")],
            )
            .await
            .unwrap(),
        )
        .await
        .unwrap();
        let names: Vec<_> = rows
            .iter()
            .filter_map(|row| row.get("name").and_then(SqlValue::as_str))
            .collect();
        assert_eq!(names, vec!["gamma", "alpha"]);

        let removed = remove(&adapter, "users", &[equals_criteria("name", "alpha")])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(count(&adapter, "users").await, 2);
    }

    #[tokio::test]
    async fn test_cached_finder_answers_from_cache() {
        let adapter = Arc::new(adapter_with_users().await);
        adapter
            .execute("INSERT INTO users (name) VALUES ('cached')", &[])
            .await
            .unwrap();

        let executor: Arc<dyn QueryExecutor> = adapter.clone();
        let finder = CachedSqlFinder::new("users", executor);

        let first = finder.find_one_by_id(1.into()).await.unwrap().expect("Row not found");
        adapter.execute("DELETE FROM users", &[]).await.unwrap();
        let second = finder.find_one_by_id(1.into()).await.unwrap().expect("Cache miss");
        assert_eq!(first, second);

        let same = Criteria::equals("name", "x");
        let key_a = finder
            .cache_key(&select_query("users").where_criteria(same.clone()).compile())
            .unwrap();
        let key_b = finder
            .cache_key(&select_query("users").where_criteria(same).compile())
            .unwrap();
        let key_c = finder
            .cache_key(
                &select_query("users")
                    .where_criteria(Criteria::equals("name", "y"))
                    .compile(),
            )
            .unwrap();
        assert_eq!(key_a, key_b);
        assert_ne!(key_a, key_c);
    }

    #[tokio::test]
    async fn test_simple_finder_sees_changes() {
        let adapter = Arc::new(adapter_with_users().await);
        adapter
            .execute("INSERT INTO users (name) VALUES ('live')", &[])
            .await
            .unwrap();

        let finder = SimpleSqlFinder::new("users", adapter.clone());
        assert!(finder.find_one_by_id(1.into()).await.unwrap().is_some());

        adapter.execute("DELETE FROM users", &[]).await.unwrap();
        assert!(finder.find_one_by_id(1.into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blob_data() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter
            .execute("CREATE TABLE files (id INTEGER PRIMARY KEY, data BLOB)", &[])
            .await
            .unwrap();

        let payload = vec![0u8, 1, 2, 255];
        adapter
            .execute("INSERT INTO files (data) VALUES (?)", &[payload.clone().into()])
            .await
            .unwrap();

        let row = fetch_one(adapter.execute("SELECT data FROM files", &[]).await.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get("data").and_then(SqlValue::as_bytes), Some(&payload[..]));
    }

    // Migration fixtures

    #[derive(Default)]
    struct Version201912201932;

    impl Migration for Version201912201932 {
        fn up(&self, statements: &mut MigrationStatements) {
            statements.add("SELECT date('now')", &[]);
        }

        fn down(&self, statements: &mut MigrationStatements) {
            statements.add("SELECT date('now')", &[]);
        }
    }

    #[derive(Default)]
    struct Version202001152036;

    impl Migration for Version202001152036 {
        fn up(&self, statements: &mut MigrationStatements) {
            statements.add("SELECT date('now')", &[]);
        }

        fn down(&self, _statements: &mut MigrationStatements) {}
    }

    #[derive(Default)]
    struct Version202002010000;

    impl Migration for Version202002010000 {
        fn up(&self, statements: &mut MigrationStatements) {
            statements.add(
                "INSERT INTO audit (entry) VALUES (?)",
                &["first migration".into()],
            );
        }

        fn down(&self, _statements: &mut MigrationStatements) {}
    }

    #[derive(Default)]
    struct Version202002020000;

    impl Migration for Version202002020000 {
        fn up(&self, statements: &mut MigrationStatements) {
            statements.add("INSERT INTO missing_table (entry) VALUES ('never')", &[]);
        }

        fn down(&self, _statements: &mut MigrationStatements) {}
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").expect("Failed to write migration file");
    }

    fn stub_loader(dir: &Path) -> MigrationLoader {
        touch(dir, "Version201912201932.sql");
        touch(dir, "Version202001152036.sql");
        MigrationLoader::new(dir)
            .register::<Version201912201932>("Version201912201932")
            .register::<Version202001152036>("Version202001152036")
    }

    #[tokio::test]
    async fn test_migrations_up_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(SqliteAdapter::in_memory().unwrap());
        let processor = MigrationProcessor::new(adapter.clone(), stub_loader(dir.path()));

        assert_eq!(processor.up().await.unwrap(), 2);
        assert_eq!(processor.up().await.unwrap(), 0);

        let versions = fetch_all(
            adapter
                .execute("SELECT version FROM migration ORDER BY version", &[])
                .await
                .unwrap(),
        )
        .await
        .unwrap();
        let versions: Vec<_> = versions
            .iter()
            .filter_map(|row| row.get("version").and_then(SqlValue::as_str))
            .collect();
        assert_eq!(versions, vec!["201912201932", "202001152036"]);
    }

    #[tokio::test]
    async fn test_migrations_down() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(SqliteAdapter::in_memory().unwrap());
        let processor = MigrationProcessor::new(adapter, stub_loader(dir.path()));

        assert_eq!(processor.down().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_migration_rolls_back_everything() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Version202002010000.sql");
        touch(dir.path(), "Version202002020000.sql");

        let adapter = Arc::new(SqliteAdapter::in_memory().unwrap());
        adapter
            .execute("CREATE TABLE migration ( version varchar NOT NULL )", &[])
            .await
            .unwrap();
        adapter
            .execute("CREATE TABLE audit (entry TEXT)", &[])
            .await
            .unwrap();

        let loader = MigrationLoader::new(dir.path())
            .register::<Version202002010000>("Version202002010000")
            .register::<Version202002020000>("Version202002020000");
        let processor = MigrationProcessor::new(adapter.clone(), loader);

        let err = processor.up().await.unwrap_err();
        assert!(matches!(err, StorageError::StorageInteractingFailed { .. }));

        assert_eq!(count(adapter.as_ref(), "migration").await, 0);
        assert_eq!(count(adapter.as_ref(), "audit").await, 0);
    }

    #[tokio::test]
    async fn test_migrations_through_trait_object() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter_from_dsn("sqlite:///:memory:").unwrap();
        let processor = MigrationProcessor::new(adapter, stub_loader(dir.path()));

        assert_eq!(processor.up().await.unwrap(), 2);
    }
}

#[cfg(feature = "postgres")]
mod postgres_tests {
    use service_bus_storage::core::functions::{fetch_one, unescape_binary_row};
    use service_bus_storage::prelude::*;

    fn get_postgres_url() -> Option<String> {
        std::env::var("POSTGRES_URL").ok()
    }

    #[tokio::test]
    #[ignore] // Run with: cargo test --features postgres -- --ignored
    async fn test_postgres_sequence() {
        let Some(url) = get_postgres_url() else {
            eprintln!("Skipping test: POSTGRES_URL not set");
            return;
        };

        let adapter = PostgresAdapter::from_dsn(&url).expect("Invalid POSTGRES_URL");
        adapter
            .execute("CREATE SEQUENCE IF NOT EXISTS storage_test_seq", &[])
            .await
            .expect("Failed to create sequence");

        let first: i64 = sequence(&adapter, "storage_test_seq")
            .await
            .expect("nextval failed")
            .parse()
            .expect("Not a number");
        let second: i64 = sequence(&adapter, "storage_test_seq")
            .await
            .expect("nextval failed")
            .parse()
            .expect("Not a number");
        assert_eq!(second, first + 1);

        adapter
            .execute("DROP SEQUENCE storage_test_seq", &[])
            .await
            .expect("Failed to drop sequence");
    }

    #[tokio::test]
    #[ignore] // Run with: cargo test --features postgres -- --ignored
    async fn test_postgres_bytea_roundtrip() {
        let Some(url) = get_postgres_url() else {
            eprintln!("Skipping test: POSTGRES_URL not set");
            return;
        };

        let adapter = PostgresAdapter::from_dsn(&url).expect("Invalid POSTGRES_URL");
        for stored in [vec![1u8, 2, 3], br"\x6869".to_vec(), br"a\\b".to_vec()] {
            let row = fetch_one(
                adapter
                    .execute("SELECT ?::bytea AS payload", &[stored.clone().into()])
                    .await
                    .expect("Query failed"),
            )
            .await
            .expect("Fetch failed")
            .expect("No row");

            let row = unescape_binary_row(&adapter, row);
            assert_eq!(
                row.get("payload").and_then(SqlValue::as_bytes),
                Some(stored.as_slice())
            );
        }
    }

    #[tokio::test]
    #[ignore] // Run with: cargo test --features postgres -- --ignored
    async fn test_postgres_server_rendered_types() {
        let Some(url) = get_postgres_url() else {
            eprintln!("Skipping test: POSTGRES_URL not set");
            return;
        };

        let adapter = PostgresAdapter::from_dsn(&url).expect("Invalid POSTGRES_URL");
        let row = fetch_one(
            adapter
                .execute(
                    "SELECT SUM(v) AS total, AVG(v)::numeric(10, 2) AS mean, \
                     DATE '2000-01-02' AS day, INTERVAL '1 day 2 hours' AS span, \
                     ARRAY[1, 2, 3] AS list \
                     FROM (VALUES (1::bigint), (2::bigint)) AS t(v)",
                    &[],
                )
                .await
                .expect("Query failed"),
        )
        .await
        .expect("Fetch failed")
        .expect("No row");

        assert_eq!(row.get("total"), Some(&SqlValue::from("3")));
        assert_eq!(row.get("mean"), Some(&SqlValue::from("1.50")));
        assert_eq!(row.get("day"), Some(&SqlValue::from("2000-01-02")));
        assert_eq!(row.get("span"), Some(&SqlValue::from("1 day 02:00:00")));
        assert_eq!(row.get("list"), Some(&SqlValue::from("{1,2,3}")));
    }
}
