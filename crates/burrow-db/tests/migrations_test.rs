//! Integration tests for the embedded schema.

use sqlx::Row;

use burrow_db::pool;
use burrow_test_utils::TestDb;

#[tokio::test]
async fn migrations_create_all_tables() {
    let db = TestDb::create().await;
    let pool = db.pool.clone();

    let rows = sqlx::query(
        "SELECT tablename::text AS name FROM pg_tables \
         WHERE schemaname = 'public' AND tablename <> '_sqlx_migrations' \
         ORDER BY tablename",
    )
    .fetch_all(&pool)
    .await
    .expect("listing tables should succeed");
    let names: Vec<String> = rows.iter().map(|r| r.get("name")).collect();
    assert_eq!(names, vec!["conversations", "messages", "projects"]);

    db.destroy().await;
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let db = TestDb::create().await;
    let pool = db.pool.clone();

    pool::run_migrations(&pool)
        .await
        .expect("re-running migrations should be a no-op");

    let counts = pool::table_counts(&pool).await.expect("counts should succeed");
    assert_eq!(
        counts,
        vec![
            ("projects".to_string(), 0),
            ("conversations".to_string(), 0),
            ("messages".to_string(), 0),
        ]
    );

    db.destroy().await;
}

#[tokio::test]
async fn message_role_is_constrained() {
    let db = TestDb::create().await;
    let pool = db.pool.clone();
    let (_project, conversation) = db.seed_conversation("t").await;

    let result = sqlx::query(
        "INSERT INTO messages (conversation_id, role, content) VALUES ($1, 'system', 'x')",
    )
    .bind(conversation.id)
    .execute(&pool)
    .await;
    assert!(result.is_err(), "role check constraint should reject 'system'");

    db.destroy().await;
}

#[tokio::test]
async fn destroyed_databases_are_gone() {
    let db = TestDb::create().await;
    let observer = TestDb::create().await;
    let name = db.name().to_string();
    assert!(name.starts_with("burrow_test_"));

    db.destroy().await;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(&name)
            .fetch_one(&observer.pool)
            .await
            .unwrap();
    assert!(!exists, "{name} should have been dropped");

    observer.destroy().await;
}
