use std::sync::Arc;

use blogcache_storage::{FileStorage, MemoryStorage, StorageAdapter};
use tempfile::TempDir;

#[test]
fn test_file_storage_survives_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.set("categories:all", "[1,2,3]").unwrap();
    }

    let reopened = FileStorage::open(dir.path()).unwrap();
    assert_eq!(
        reopened.get("categories:all").unwrap().as_deref(),
        Some("[1,2,3]")
    );
}

#[test]
fn test_adapters_behind_trait_object() {
    let dir = TempDir::new().unwrap();
    let adapters: Vec<Arc<dyn StorageAdapter>> = vec![
        Arc::new(MemoryStorage::new("memory")),
        Arc::new(FileStorage::open(dir.path()).unwrap()),
    ];

    for adapter in &adapters {
        adapter.set("post:a", "1").unwrap();
        adapter.set("post:b", "2").unwrap();
        adapter.set("blogcache:metrics", "{}").unwrap();

        let mut keys = adapter.keys_with_prefix("post:").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["post:a", "post:b"], "adapter {}", adapter.name());
    }

    assert!(!adapters[0].is_durable());
    assert!(adapters[1].is_durable());
}

#[test]
fn test_concurrent_writers() {
    let storage = Arc::new(MemoryStorage::new("memory"));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let storage = Arc::clone(&storage);
            std::thread::spawn(move || {
                for j in 0..50 {
                    storage.set(&format!("post:{i}-{j}"), "x").unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(storage.len(), 400);
}
