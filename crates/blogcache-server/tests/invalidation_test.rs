//! Tests de invalidacion por tipo, patron y total.

mod helpers;

use axum::http::StatusCode;
use blogcache_core::{CacheKey, ListQuery};
use blogcache_engine::SetOptions;
use helpers::{app, assert_error_body, assert_report_counts};
use serde_json::json;

#[tokio::test]
async fn fresh_entries_are_marked_stale() {
    let app = app();
    app.manager
        .set(&CacheKey::post("intro"), json!(1), &SetOptions::default());

    let response = app.client.delete("/cache/types/post").await;
    response.assert_status(StatusCode::OK);
    assert_report_counts(&response.json(), 0, 0, 1);
    assert!(app.manager.cache().is_stale("post:intro"));
}

#[tokio::test]
async fn forced_type_invalidation_removes_entries() {
    let app = app();
    app.manager
        .set(&CacheKey::post("intro"), json!(1), &SetOptions::default());
    app.manager
        .set(&CacheKey::categories(), json!([]), &SetOptions::default());

    let report = app.client.delete("/cache/types/post?force=true").await.json();

    assert_report_counts(&report, 1, 0, 0);
    assert_eq!(report["contentTypes"], json!(["post"]));
    assert!(!app.manager.cache().contains("post:intro"));
    assert!(app.manager.cache().contains("categories:all"));
}

#[tokio::test]
async fn tag_filter_limits_type_invalidation() {
    let app = app();
    let design = CacheKey::posts(ListQuery::new(1, 10).with_category("design"));
    let rust = CacheKey::posts(ListQuery::new(1, 10).with_category("rust"));
    app.manager.set(&design, json!([]), &SetOptions::default());
    app.manager.set(&rust, json!([]), &SetOptions::default());

    let report = app
        .client
        .delete("/cache/types/posts?force=true&tags=category:design")
        .await
        .json();

    assert_eq!(report["immediate"], 1);
    assert_eq!(report["skipped"], 1);
    assert!(app.manager.cache().contains(rust.as_str()));
}

#[tokio::test]
async fn unknown_content_type_returns_400() {
    let response = app().client.delete("/cache/types/comments").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_error_body(&response.json(), "Bad Request");
}

#[tokio::test]
async fn invalidate_all_clears_every_cache_key() {
    let app = app();
    app.manager
        .set(&CacheKey::post("intro"), json!(1), &SetOptions::default());
    app.manager
        .set(&CacheKey::search("revit", 1, 10), json!([]), &SetOptions::default());

    let report = app.client.delete("/cache").await.json();

    assert_eq!(report["matched"], 2);
    assert!(app.manager.cache().keys().is_empty());
}

#[tokio::test]
async fn pattern_invalidation() {
    let app = app();
    app.manager.set(
        &CacheKey::posts(ListQuery::new(1, 10)),
        json!([]),
        &SetOptions::default(),
    );
    app.manager.set(
        &CacheKey::posts(ListQuery::new(2, 10)),
        json!([]),
        &SetOptions::default(),
    );
    app.manager
        .set(&CacheKey::post("intro"), json!(1), &SetOptions::default());

    let report = app
        .client
        .post("/cache/invalidate", json!({"pattern": "posts:*"}))
        .await
        .json();

    assert_eq!(report["matched"], 2);
    assert_eq!(report["patterns"], json!(["posts:*"]));
    assert!(app.manager.cache().contains("post:intro"));
}

#[tokio::test]
async fn empty_pattern_is_rejected() {
    app()
        .client
        .post("/cache/invalidate", json!({"pattern": "  "}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn queued_invalidation_is_accepted_then_drained() {
    let app = app();
    app.manager
        .set(&CacheKey::post("intro"), json!(1), &SetOptions::default());

    let response = app
        .client
        .post("/cache/queue", json!({"keys": ["post:intro"], "cascade": false}))
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    assert_eq!(response.json()["queued"], 1);
    assert!(app.manager.cache().contains("post:intro"));

    assert_eq!(app.manager.process_invalidation_queue().await, 1);
    assert!(!app.manager.cache().contains("post:intro"));
}
