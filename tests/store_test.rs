//! Store Integration Tests
//!
//! SQLite persistence for forms, aliases, and linkage rows, including the
//! cascade semantics the form commands rely on.

use std::sync::Arc;

use formbot::alias::AliasKind;
use formbot::error::ProxyError;
use formbot::store::{AliasStore, LinkStore, ProxiedMessage, SqliteStore};

const USER: u64 = 42;

async fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().expect("in-memory store"))
}

#[tokio::test]
async fn test_form_round_trip() {
    let store = store().await;
    let created = store
        .create_form(USER, "neoli", Some("https://cdn.example/neoli.png"))
        .await
        .unwrap();

    let fetched = store.form_by_id(&created.id).await.unwrap().unwrap();
    assert_eq!(fetched.name, "neoli");
    assert_eq!(fetched.user_id, USER);
    assert_eq!(
        fetched.avatar_url.as_deref(),
        Some("https://cdn.example/neoli.png")
    );
}

#[tokio::test]
async fn test_form_by_name_is_case_insensitive() {
    let store = store().await;
    store.create_form(USER, "Neoli", None).await.unwrap();

    assert!(store.form_by_name(USER, "neoli").await.unwrap().is_some());
    assert!(store.form_by_name(USER, "NEOLI").await.unwrap().is_some());
    assert!(store.form_by_name(USER, "other").await.unwrap().is_none());
    // Names are per-owner.
    assert!(store.form_by_name(7, "neoli").await.unwrap().is_none());
}

#[tokio::test]
async fn test_grouped_aliases_by_form() {
    let store = store().await;
    let a = store.create_form(USER, "a", None).await.unwrap();
    let b = store.create_form(USER, "b", None).await.unwrap();

    store
        .create_alias(USER, &a.id, "n:text", "n:text", AliasKind::Prefix)
        .await
        .unwrap();
    store
        .create_alias(USER, &a.id, "neo:text", "neo:text", AliasKind::Prefix)
        .await
        .unwrap();
    store
        .create_alias(USER, &b.id, "{text}", "{text}", AliasKind::Pattern)
        .await
        .unwrap();

    let grouped = store.aliases_grouped_by_form(USER).await.unwrap();
    assert_eq!(grouped.len(), 2);
    assert_eq!(grouped[&a.id].len(), 2);
    assert_eq!(grouped[&b.id].len(), 1);
    assert_eq!(grouped[&b.id][0].kind, AliasKind::Pattern);
}

#[tokio::test]
async fn test_alias_collision_detection() {
    let store = store().await;
    let form = store.create_form(USER, "neoli", None).await.unwrap();
    store
        .create_alias(USER, &form.id, "N:Text", "n:text", AliasKind::Prefix)
        .await
        .unwrap();

    let collision = store
        .find_alias_collision(USER, "n:text")
        .await
        .unwrap()
        .expect("collision should be found");
    assert_eq!(collision.trigger_raw, "N:Text");

    // Same trigger for a different user is no collision.
    assert!(store.find_alias_collision(7, "n:text").await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_trigger_rejected_by_unique_index() {
    let store = store().await;
    let form = store.create_form(USER, "neoli", None).await.unwrap();
    store
        .create_alias(USER, &form.id, "n:text", "n:text", AliasKind::Prefix)
        .await
        .unwrap();

    let err = store
        .create_alias(USER, &form.id, "n:text", "n:text", AliasKind::Prefix)
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::Storage(_)));
}

#[tokio::test]
async fn test_delete_alias_reports_removal() {
    let store = store().await;
    let form = store.create_form(USER, "neoli", None).await.unwrap();
    store
        .create_alias(USER, &form.id, "n:text", "n:text", AliasKind::Prefix)
        .await
        .unwrap();

    assert!(store.delete_alias(USER, "n:text").await.unwrap());
    assert!(!store.delete_alias(USER, "n:text").await.unwrap());
}

#[tokio::test]
async fn test_form_delete_cascades_to_aliases() {
    let store = store().await;
    let doomed = store.create_form(USER, "doomed", None).await.unwrap();
    let kept = store.create_form(USER, "kept", None).await.unwrap();
    store
        .create_alias(USER, &doomed.id, "d:text", "d:text", AliasKind::Prefix)
        .await
        .unwrap();
    store
        .create_alias(USER, &kept.id, "k:text", "k:text", AliasKind::Prefix)
        .await
        .unwrap();

    store.delete_form(USER, &doomed.id).await.unwrap();

    assert!(store.form_by_id(&doomed.id).await.unwrap().is_none());
    let grouped = store.aliases_grouped_by_form(USER).await.unwrap();
    assert!(!grouped.contains_key(&doomed.id));
    assert_eq!(grouped[&kept.id].len(), 1);
}

#[tokio::test]
async fn test_delete_form_owned_by_someone_else() {
    let store = store().await;
    let form = store.create_form(USER, "neoli", None).await.unwrap();

    let err = store.delete_form(7, &form.id).await.unwrap_err();
    assert!(matches!(err, ProxyError::NotFound(_)));
    // The form survives the refused delete.
    assert!(store.form_by_id(&form.id).await.unwrap().is_some());
}

fn link(message_id: u64) -> ProxiedMessage {
    ProxiedMessage {
        id: uuid::Uuid::now_v7().to_string(),
        user_id: USER,
        form_id: "form-1".to_string(),
        guild_id: 10,
        channel_id: 20,
        webhook_id: 30,
        webhook_token: "tok".to_string(),
        message_id,
        original_message_id: Some(999),
        created_at: 1_700_000_000,
    }
}

#[tokio::test]
async fn test_linkage_lifecycle() {
    let store = store().await;
    let row = link(888);
    store.insert_link(&row).await.unwrap();

    let fetched = store.find_by_message_id(888).await.unwrap().unwrap();
    assert_eq!(fetched.id, row.id);
    assert_eq!(fetched.user_id, USER);
    assert_eq!(fetched.webhook_id, 30);
    assert_eq!(fetched.original_message_id, Some(999));

    store.delete_by_row_id(&row.id).await.unwrap();
    assert!(store.find_by_message_id(888).await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_message_id_rejected() {
    let store = store().await;
    store.insert_link(&link(888)).await.unwrap();

    let err = store.insert_link(&link(888)).await.unwrap_err();
    assert!(matches!(err, ProxyError::Storage(_)));
}

#[tokio::test]
async fn test_open_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("formbot.db");

    let form_id = {
        let store = SqliteStore::open(&path).unwrap();
        let form = store.create_form(USER, "neoli", None).await.unwrap();
        store
            .create_alias(USER, &form.id, "n:text", "n:text", AliasKind::Prefix)
            .await
            .unwrap();
        form.id
    };

    let store = SqliteStore::open(&path).unwrap();
    assert!(store.form_by_id(&form_id).await.unwrap().is_some());
    let grouped = store.aliases_grouped_by_form(USER).await.unwrap();
    assert_eq!(grouped[&form_id].len(), 1);
}
