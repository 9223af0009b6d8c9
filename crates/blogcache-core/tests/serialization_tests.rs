mod common;

use blogcache_core::{CacheEntry, CacheKey, ListQuery, Priority, Tier};
use common::post_payload;
use serde_json::{Value, json};

#[test]
fn test_stale_flag_is_persisted_only_when_set() {
    let mut entry = CacheEntry::new(json!([1, 2, 3]), 0, 100, Priority::Normal);
    let raw = entry.to_json().unwrap();
    assert!(!raw.contains("stale"));

    entry.stale = true;
    let raw = entry.to_json().unwrap();
    let value: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["stale"], true);

    let restored = CacheEntry::from_json("posts:1_10_null_null", &raw).unwrap();
    assert!(restored.stale);
}

#[test]
fn test_access_stats_are_not_persisted() {
    let mut entry = CacheEntry::new(post_payload("a"), 10, 100, Priority::Normal);
    entry.touch(50);
    entry.touch(60);

    let restored = CacheEntry::from_json("post:a", &entry.to_json().unwrap()).unwrap();
    assert_eq!(restored.access_count, 0);
    assert_eq!(restored.last_accessed_at, 10);
}

#[test]
fn test_list_query_deserializes_without_filters() {
    let query: ListQuery = serde_json::from_str(r#"{"page": 3, "limit": 9}"#).unwrap();
    assert_eq!(query, ListQuery::new(3, 9));
    assert_eq!(CacheKey::posts(query).as_str(), "posts:3_9_null_null");
}

#[test]
fn test_key_in_json_document() {
    let doc = json!({ "keys": [CacheKey::categories(), CacheKey::post("x")] });
    assert_eq!(doc["keys"][0], "categories:all");
    assert_eq!(doc["keys"][1], "post:x");
}

#[test]
fn test_tier_list_serialization() {
    let tiers = vec![Tier::Memory, Tier::Durable];
    assert_eq!(serde_json::to_string(&tiers).unwrap(), r#"["memory","durable"]"#);

    let back: Vec<Tier> = serde_json::from_str(r#"["session"]"#).unwrap();
    assert_eq!(back, vec![Tier::Session]);
}
