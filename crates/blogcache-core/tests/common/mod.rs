#![allow(dead_code)]
use blogcache_core::{CacheEntry, CacheSettings, Priority};
use serde_json::{Value, json};

/// Helper to build an entry from a JSON string slice.
/// Panics if the JSON is invalid (intended for tests).
pub fn entry_from_json(json: &str, created_at: u64, ttl_ms: u64) -> CacheEntry {
    let payload: Value = serde_json::from_str(json).expect("Failed to parse test payload");
    CacheEntry::new(payload, created_at, ttl_ms, Priority::Normal)
}

/// Returns a post payload fixture.
pub fn post_payload(slug: &str) -> Value {
    json!({
        "post": {
            "slug": slug,
            "title": format!("Post {slug}"),
            "category": { "slug": "design", "name": "Design" },
            "content": "<p>Hello</p>"
        }
    })
}

/// Settings loaded from a JSON document, defaults for everything else.
pub fn settings_from_json(json: &str) -> CacheSettings {
    serde_json::from_str(json).expect("Failed to parse test settings")
}
