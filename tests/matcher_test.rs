//! Alias Matcher Integration Tests
//!
//! Matching semantics against a real SQLite-backed store with the
//! read-through cache in front.

use std::sync::Arc;

use formbot::alias::{classify, normalize};
use formbot::cache::AliasCache;
use formbot::matcher::AliasMatcher;
use formbot::store::{AliasStore, SqliteStore};

const USER: u64 = 1001;

async fn store_with_aliases(triggers: &[&str]) -> Arc<SqliteStore> {
    let store = Arc::new(SqliteStore::open_in_memory().expect("in-memory store"));
    let form = store
        .create_form(USER, "neoli", None)
        .await
        .expect("create form");
    for raw in triggers {
        let norm = normalize(raw).expect("valid trigger");
        let kind = classify(&norm);
        store
            .create_alias(USER, &form.id, raw, &norm, kind)
            .await
            .expect("create alias");
    }
    store
}

fn matcher(store: Arc<SqliteStore>) -> AliasMatcher<SqliteStore> {
    AliasMatcher::new(store, AliasCache::new(300))
}

#[tokio::test]
async fn test_longest_prefix_wins() {
    let store = store_with_aliases(&["n:text", "neoli:text"]).await;
    let matcher = matcher(store);

    let result = matcher
        .match_text(USER, "neoli:text hello world")
        .await
        .unwrap()
        .expect("should match");

    assert_eq!(result.alias.trigger_norm, "neoli:text");
    assert_eq!(result.rendered_text, "hello world");
}

#[tokio::test]
async fn test_exact_trigger_no_content() {
    let store = store_with_aliases(&["n:text"]).await;
    let matcher = matcher(store);

    let result = matcher
        .match_text(USER, "n:text")
        .await
        .unwrap()
        .expect("should match");
    assert_eq!(result.rendered_text, "");
}

#[tokio::test]
async fn test_no_aliases_returns_none() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let matcher = matcher(store);

    assert!(matcher.match_text(USER, "anything at all").await.unwrap().is_none());
}

#[tokio::test]
async fn test_no_match_is_none_not_error() {
    let store = store_with_aliases(&["n:text"]).await;
    let matcher = matcher(store);

    assert!(matcher.match_text(USER, "m:text hello").await.unwrap().is_none());
}

#[tokio::test]
async fn test_case_insensitive_matching() {
    let store = store_with_aliases(&["Neoli:Text"]).await;
    let matcher = matcher(store);

    let result = matcher
        .match_text(USER, "NEOLI:TEXT shouting")
        .await
        .unwrap()
        .expect("should match");
    assert_eq!(result.rendered_text, "shouting");
}

#[tokio::test]
async fn test_pattern_matches_only_bracketed_input() {
    let store = store_with_aliases(&["{text}"]).await;
    let matcher = matcher(store);

    let result = matcher
        .match_text(USER, "{hello world}")
        .await
        .unwrap()
        .expect("should match");
    assert_eq!(result.rendered_text, "hello world");

    assert!(matcher.match_text(USER, "[hello]").await.unwrap().is_none());
}

#[tokio::test]
async fn test_prefix_takes_precedence_over_pattern() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let form = store.create_form(USER, "neoli", None).await.unwrap();
    // A pattern that matches everything bracketed, and a prefix alias whose
    // trigger also starts the same input.
    store
        .create_alias(USER, &form.id, "{text}", "{text}", classify("{text}"))
        .await
        .unwrap();
    store
        .create_alias(USER, &form.id, "{n}:text", "{n}:text", formbot::AliasKind::Prefix)
        .await
        .unwrap();

    let matcher = matcher(store);
    let result = matcher
        .match_text(USER, "{n}:text hi}")
        .await
        .unwrap()
        .expect("should match");
    assert_eq!(result.alias.trigger_norm, "{n}:text");
    assert_eq!(result.rendered_text, "hi}");
}

#[tokio::test]
async fn test_round_trip_reconstruction() {
    let store = store_with_aliases(&["neoli:text"]).await;
    let matcher = matcher(store);

    let content = "some message   body";
    let input = format!("neoli:text {content}");
    let result = matcher.match_text(USER, &input).await.unwrap().unwrap();

    let rebuilt = format!("{} {}", result.alias.trigger_norm, result.rendered_text);
    assert_eq!(rebuilt, input);
}

#[tokio::test]
async fn test_users_do_not_share_aliases() {
    let store = store_with_aliases(&["n:text"]).await;
    let matcher = matcher(store);

    assert!(matcher.match_text(9999, "n:text hi").await.unwrap().is_none());
}

#[tokio::test]
async fn test_cache_serves_stale_until_invalidated() {
    let store = store_with_aliases(&["n:text"]).await;
    let matcher = matcher(store.clone());

    // Prime the cache.
    assert!(matcher.match_text(USER, "n:text hi").await.unwrap().is_some());

    // Mutate the store behind the cache's back.
    assert!(store.delete_alias(USER, "n:text").await.unwrap());

    // Still matches from cache, then stops after explicit invalidation.
    assert!(matcher.match_text(USER, "n:text hi").await.unwrap().is_some());
    matcher.cache().invalidate(USER).await;
    assert!(matcher.match_text(USER, "n:text hi").await.unwrap().is_none());
}
