//! Tests for the project / conversation / message query modules.

use uuid::Uuid;

use burrow_db::models::MessageRole;
use burrow_db::queries::conversations as conv_db;
use burrow_db::queries::messages::{self as msg_db, NewMessage};
use burrow_db::queries::projects as project_db;
use burrow_test_utils::TestDb;

#[tokio::test]
async fn insert_and_get_project() {
    let db = TestDb::create().await;
    let pool = db.pool.clone();

    let project = project_db::insert_project(&pool, "etl", "ada@example.com")
        .await
        .expect("insert should succeed");
    assert_eq!(project.name, "etl");
    assert_eq!(project.user_email, "ada@example.com");

    let fetched = project_db::get_project(&pool, project.id)
        .await
        .unwrap()
        .expect("project should exist");
    assert_eq!(fetched.id, project.id);

    assert!(project_db::get_project(&pool, Uuid::new_v4()).await.unwrap().is_none());

    db.destroy().await;
}

#[tokio::test]
async fn list_projects_is_scoped_to_owner() {
    let db = TestDb::create().await;
    let pool = db.pool.clone();

    project_db::insert_project(&pool, "a", "one@example.com").await.unwrap();
    project_db::insert_project(&pool, "b", "one@example.com").await.unwrap();
    project_db::insert_project(&pool, "c", "two@example.com").await.unwrap();

    let mine = project_db::list_projects_for_owner(&pool, "one@example.com")
        .await
        .unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().all(|p| p.user_email == "one@example.com"));

    db.destroy().await;
}

#[tokio::test]
async fn owned_lookup_requires_matching_owner() {
    let db = TestDb::create().await;
    let project = db.seed_project_for("etl", "alice@example.com").await;

    let mine = project_db::get_owned_project(&db.pool, project.id, "alice@example.com")
        .await
        .unwrap();
    assert_eq!(mine.map(|p| p.id), Some(project.id));

    let foreign = project_db::get_owned_project(&db.pool, project.id, "mallory@example.com")
        .await
        .unwrap();
    assert!(foreign.is_none());

    db.destroy().await;
}

#[tokio::test]
async fn new_conversation_has_no_session_token() {
    let db = TestDb::create().await;
    let (_project, conversation) = db.seed_conversation("hello").await;

    assert_eq!(conversation.title, "hello");
    assert!(conversation.session_id.is_none());
    assert!(conversation.cluster_id.is_none());

    db.destroy().await;
}

#[tokio::test]
async fn get_conversation_is_scoped_to_project() {
    let db = TestDb::create().await;
    let pool = db.pool.clone();
    let (project, conversation) = db.seed_conversation("scoped").await;
    let other = db.seed_project("other").await;

    let found = conv_db::get_conversation(&pool, project.id, conversation.id)
        .await
        .unwrap();
    assert!(found.is_some());

    let foreign = conv_db::get_conversation(&pool, other.id, conversation.id)
        .await
        .unwrap();
    assert!(foreign.is_none(), "conversation must not resolve under another project");

    db.destroy().await;
}

#[tokio::test]
async fn session_and_cluster_updates_replace_values() {
    let db = TestDb::create().await;
    let pool = db.pool.clone();
    let (project, conversation) = db.seed_conversation("resume").await;

    conv_db::update_session_id(&pool, conversation.id, "sess-1").await.unwrap();
    conv_db::update_session_id(&pool, conversation.id, "sess-2").await.unwrap();
    conv_db::update_cluster_id(&pool, conversation.id, "0101-abc").await.unwrap();

    let fetched = conv_db::get_conversation(&pool, project.id, conversation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.session_id.as_deref(), Some("sess-2"));
    assert_eq!(fetched.cluster_id.as_deref(), Some("0101-abc"));

    let missing = conv_db::update_session_id(&pool, Uuid::new_v4(), "x").await;
    assert!(missing.is_err());

    db.destroy().await;
}

#[tokio::test]
async fn messages_are_listed_in_insert_order() {
    let db = TestDb::create().await;
    let pool = db.pool.clone();
    let (project, conversation) = db.seed_conversation("transcript").await;

    msg_db::insert_message(
        &pool,
        &NewMessage {
            conversation_id: conversation.id,
            role: MessageRole::User,
            content: "list files",
            is_error: false,
        },
    )
    .await
    .unwrap();
    msg_db::insert_message(
        &pool,
        &NewMessage {
            conversation_id: conversation.id,
            role: MessageRole::Assistant,
            content: "Error: boom",
            is_error: true,
        },
    )
    .await
    .unwrap();

    let messages = msg_db::list_messages(&pool, conversation.id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert!(messages[1].is_error);
    assert!(messages[0].timestamp <= messages[1].timestamp);

    let summaries = conv_db::list_conversations_for_project(&pool, project.id)
        .await
        .unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].message_count, 2);

    db.destroy().await;
}

#[tokio::test]
async fn deleting_project_cascades() {
    let db = TestDb::create().await;
    let pool = db.pool.clone();
    let (project, conversation) = db.seed_conversation("doomed").await;
    msg_db::insert_message(
        &pool,
        &NewMessage {
            conversation_id: conversation.id,
            role: MessageRole::User,
            content: "hi",
            is_error: false,
        },
    )
    .await
    .unwrap();

    assert!(project_db::delete_project(&pool, project.id).await.unwrap());
    assert!(conv_db::get_conversation_by_id(&pool, conversation.id).await.unwrap().is_none());
    assert!(msg_db::list_messages(&pool, conversation.id).await.unwrap().is_empty());

    db.destroy().await;
}
