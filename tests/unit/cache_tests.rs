/*!
 * Tests for the persistent TTL content cache
 */

use std::time::Duration;

use lexicard::generation::cache::{CACHE_FORMAT_VERSION, ContentCache, cache_key};
use lexicard::models::TermRecord;

use crate::common;

const DAY: Duration = Duration::from_secs(24 * 3600);

#[test]
fn test_cache_get_withNormalizedKey_shouldHit() {
    let cache = ContentCache::in_memory(DAY);
    cache.put("Animals:5", "value".to_string()).unwrap();

    assert_eq!(cache.get("  animals:5 "), Some("value".to_string()));
    assert_eq!(cache.get("animals:6"), None);

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[test]
fn test_cache_reopen_shouldRestoreTermLists() {
    let dir = common::create_temp_dir();
    let path = dir.path().join("cache").join("word_pairs_cache.json");
    let terms = vec![
        TermRecord::new("cat", "猫", "mao1").unwrap(),
        TermRecord::new("dog", "狗", "gou3").unwrap(),
    ];

    {
        let cache = ContentCache::open(&path, DAY);
        cache.put("animals:2", terms.clone()).unwrap();
    }
    assert!(path.exists());

    let reopened: ContentCache<Vec<TermRecord>> = ContentCache::open(&path, DAY);
    let restored = reopened.get("animals:2").unwrap();
    assert_eq!(restored.len(), 2);
    assert_eq!(restored[0].source_term(), "cat");
    assert_eq!(restored[1].target_term(), "狗");
}

#[test]
fn test_cache_open_withStaleDocument_shouldTreatEntriesAsExpired() {
    let dir = common::create_temp_dir();
    let path = dir.path().join("image_cache.json");
    let document = serde_json::json!({
        "version": CACHE_FORMAT_VERSION,
        "created_at": "2020-01-01T00:00:00Z",
        "entries": [{
            "key": cache_key("cat"),
            "payload": "https://img.example/cat.jpg",
            "written_at": "2020-01-01T00:00:00Z"
        }]
    });
    std::fs::write(&path, document.to_string()).unwrap();

    let cache: ContentCache<String> = ContentCache::open(&path, DAY);

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats().expired, 1);
    assert!(cache.get("cat").is_none());
}

#[test]
fn test_cache_open_withCorruptFile_shouldStartEmpty() {
    let dir = common::create_temp_dir();
    let path = dir.path().join("image_cache.json");
    std::fs::write(&path, "{{{ definitely not json").unwrap();

    let cache: ContentCache<String> = ContentCache::open(&path, DAY);
    assert!(cache.is_empty());

    cache.put("dog", "https://img.example/dog.jpg".to_string()).unwrap();
    let reopened: ContentCache<String> = ContentCache::open(&path, DAY);
    assert_eq!(reopened.get("dog").as_deref(), Some("https://img.example/dog.jpg"));
}

#[test]
fn test_cache_clear_shouldDeleteBackingFile() {
    let dir = common::create_temp_dir();
    let path = dir.path().join("image_cache.json");
    let cache = ContentCache::open(&path, DAY);
    cache.put("cat", "url".to_string()).unwrap();
    assert!(path.exists());

    assert_eq!(cache.clear().unwrap(), 1);

    assert!(!path.exists());
    assert!(cache.is_empty());
    assert_eq!(cache.stats().hits, 0);
}
