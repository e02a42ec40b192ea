//! Tests for history reads
//!
//! These tests verify:
//! - Older versions stay readable under the Keep policy
//! - Deletions count as a version
//! - The Invalidate policy leaves a single valid version, also in a
//!   two-sector ring after remount
//! - GC drops superseded versions

use sectorkv::{HistoryPolicy, KvError, MemFlash, Store, StoreConfig};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_store(history: HistoryPolicy) -> Store<MemFlash> {
    let config = StoreConfig::builder().history(history).build();
    Store::mount(MemFlash::nor(3 * 4096), config).unwrap()
}

fn history(store: &Store<MemFlash>, key: u32, back: u32) -> Result<Vec<u8>, KvError> {
    let mut buf = vec![0u8; 256];
    let n = store.read_history(key, &mut buf, back)?;
    buf.truncate(n);
    Ok(buf)
}

// =============================================================================
// Keep Policy Tests
// =============================================================================

#[test]
fn test_history_walks_back_versions() {
    let store = setup_store(HistoryPolicy::Keep);
    store.write(1, b"AAAA").unwrap();
    store.write(1, b"BBBBBBBBBB").unwrap();
    store.write(1, b"CC").unwrap();

    assert_eq!(history(&store, 1, 0).unwrap(), b"CC");
    assert_eq!(history(&store, 1, 1).unwrap(), b"BBBBBBBBBB");
    assert_eq!(history(&store, 1, 2).unwrap(), b"AAAA");
    assert!(matches!(history(&store, 1, 3), Err(KvError::NotFound)));
}

#[test]
fn test_history_ignores_other_keys() {
    let store = setup_store(HistoryPolicy::Keep);
    store.write(1, b"one-a").unwrap();
    store.write(2, b"two-a").unwrap();
    store.write(1, b"one-b").unwrap();
    store.write(2, b"two-b").unwrap();

    assert_eq!(history(&store, 1, 1).unwrap(), b"one-a");
    assert_eq!(history(&store, 2, 1).unwrap(), b"two-a");
}

#[test]
fn test_deletion_is_a_version() {
    let store = setup_store(HistoryPolicy::Keep);
    store.write(1, b"AAAA").unwrap();
    store.write(1, b"BBBBBBBBBB").unwrap();
    store.delete(1).unwrap();

    assert!(matches!(history(&store, 1, 0), Err(KvError::NotFound)));
    assert_eq!(history(&store, 1, 1).unwrap(), b"BBBBBBBBBB");
    assert_eq!(history(&store, 1, 2).unwrap(), b"AAAA");
}

#[test]
fn test_history_crosses_closed_sector() {
    let store = setup_store(HistoryPolicy::Keep);
    store.write(1, b"old value").unwrap();
    store.force_sector_rotation().unwrap();
    store.write(1, b"new value").unwrap();

    assert_eq!(history(&store, 1, 0).unwrap(), b"new value");
    assert_eq!(history(&store, 1, 1).unwrap(), b"old value");
}

#[test]
fn test_gc_drops_superseded_versions() {
    let store = setup_store(HistoryPolicy::Keep);
    store.write(1, b"old value").unwrap();
    store.force_sector_rotation().unwrap();
    store.write(1, b"new value").unwrap();

    // Second rotation collects the sector holding the old version
    store.force_sector_rotation().unwrap();

    assert_eq!(history(&store, 1, 0).unwrap(), b"new value");
    assert!(matches!(history(&store, 1, 1), Err(KvError::NotFound)));
}

#[test]
fn test_history_survives_remount() {
    let store = setup_store(HistoryPolicy::Keep);
    store.write(1, b"first").unwrap();
    store.write(1, b"second").unwrap();

    let config = store.config();
    let store = Store::mount(store.into_device(), config).unwrap();
    assert_eq!(history(&store, 1, 1).unwrap(), b"first");
}

// =============================================================================
// Invalidate Policy Tests
// =============================================================================

#[test]
fn test_invalidate_keeps_only_latest() {
    let store = setup_store(HistoryPolicy::Invalidate);
    store.write(1, b"AAAA").unwrap();
    store.write(1, b"BBBBBBBBBB").unwrap();

    assert_eq!(history(&store, 1, 0).unwrap(), b"BBBBBBBBBB");
    assert!(matches!(history(&store, 1, 1), Err(KvError::NotFound)));
}

#[test]
fn test_invalidate_on_delete() {
    let store = setup_store(HistoryPolicy::Invalidate);
    store.write(1, b"AAAA").unwrap();
    store.delete(1).unwrap();

    assert!(matches!(history(&store, 1, 0), Err(KvError::NotFound)));
    assert!(matches!(history(&store, 1, 1), Err(KvError::NotFound)));
}

#[test]
fn test_invalidate_after_rotation() {
    let store = setup_store(HistoryPolicy::Invalidate);
    store.write(1, b"before").unwrap();
    store.write(2, b"other").unwrap();
    store.force_sector_rotation().unwrap();
    store.write(1, b"after").unwrap();

    assert_eq!(history(&store, 1, 0).unwrap(), b"after");
    assert!(matches!(history(&store, 1, 1), Err(KvError::NotFound)));
    assert_eq!(history(&store, 2, 0).unwrap(), b"other");

    let config = store.config();
    let store = Store::mount(store.into_device(), config).unwrap();
    assert_eq!(history(&store, 1, 0).unwrap(), b"after");
    assert_eq!(history(&store, 2, 0).unwrap(), b"other");
}

#[test]
fn test_invalidate_in_two_sector_ring_survives_remount() {
    let config = StoreConfig::builder()
        .sector_count(2)
        .history(HistoryPolicy::Invalidate)
        .build();
    let store = Store::mount(MemFlash::nor(2 * 4096), config.clone()).unwrap();
    store.write(1, b"one").unwrap();
    store.write(2, b"two").unwrap();
    // GC moves both records into sector 1 and erases sector 0; the overwrite
    // then zeroes the moved copy of 2
    store.force_sector_rotation().unwrap();
    store.write(2, b"dos").unwrap();

    let store = Store::mount(store.into_device(), config).unwrap();
    assert_eq!(history(&store, 1, 0).unwrap(), b"one");
    assert_eq!(history(&store, 2, 0).unwrap(), b"dos");
    assert!(matches!(history(&store, 2, 1), Err(KvError::NotFound)));
}
