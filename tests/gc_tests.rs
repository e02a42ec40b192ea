//! Tests for sector rotation and garbage collection
//!
//! These tests verify:
//! - Live values survive many rotations
//! - Free space accounting under churn
//! - NoSpace once the region holds only live data
//! - Two-sector rings

use sectorkv::{KvError, MemFlash, Store, StoreConfig};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_store(sector_count: u32) -> Store<MemFlash> {
    let config = StoreConfig::builder().sector_count(sector_count).build();
    Store::mount(MemFlash::nor(sector_count as usize * 4096), config).unwrap()
}

fn remount(store: Store<MemFlash>) -> Store<MemFlash> {
    let config = store.config();
    Store::mount(store.into_device(), config).unwrap()
}

fn round_value(round: u8, key: u32) -> Vec<u8> {
    let mut value = vec![key as u8; 100];
    value[0] = round;
    value
}

// =============================================================================
// Liveness Tests
// =============================================================================

#[test]
fn test_overwrites_keep_latest_values() {
    let store = setup_store(3);

    for round in 0..5u8 {
        for key in 0..60u32 {
            store.write(key, &round_value(round, key)).unwrap();
        }
    }

    for key in 0..60u32 {
        assert_eq!(store.read_value(key).unwrap().to_vec(), round_value(4, key));
    }
    // 60 live keys, each a 100 byte value plus one slot
    assert_eq!(store.calc_free_space().unwrap(), 8064 - 60 * 116);

    let store = remount(store);
    for key in 0..60u32 {
        assert_eq!(store.read_value(key).unwrap().to_vec(), round_value(4, key));
    }
    assert_eq!(store.calc_free_space().unwrap(), 8064 - 60 * 116);

    let flash = store.into_device();
    assert!(flash.erase_count() > 3);
}

#[test]
fn test_forced_rotation_preserves_values() {
    let store = setup_store(3);
    for key in 0..10u32 {
        store.write(key, &[key as u8; 30]).unwrap();
    }

    for _ in 0..7 {
        store.force_sector_rotation().unwrap();
    }

    for key in 0..10u32 {
        assert_eq!(store.read_value(key).unwrap().to_vec(), vec![key as u8; 30]);
    }
    assert_eq!(store.calc_free_space().unwrap(), 8064 - 10 * 48);
    assert_eq!(store.active_sector_free_space().unwrap(), 4016);

    let store = remount(store);
    for key in 0..10u32 {
        assert_eq!(store.read_value(key).unwrap().to_vec(), vec![key as u8; 30]);
    }
}

#[test]
fn test_deleted_keys_are_not_collected() {
    let store = setup_store(3);
    store.write(1, &[1u8; 40]).unwrap();
    store.write(2, &[2u8; 40]).unwrap();
    store.delete(1).unwrap();

    for _ in 0..4 {
        store.force_sector_rotation().unwrap();
    }

    assert!(matches!(store.read_value(1), Err(KvError::NotFound)));
    assert_eq!(store.read_value(2).unwrap().to_vec(), vec![2u8; 40]);
    assert_eq!(store.calc_free_space().unwrap(), 8064 - (40 + 16));
}

// =============================================================================
// Capacity Tests
// =============================================================================

#[test]
fn test_region_fills_up() {
    let store = setup_store(3);

    let mut stored = 0u32;
    loop {
        match store.write(stored, &[stored as u8; 50]) {
            Ok(n) => {
                assert_eq!(n, 50);
                stored += 1;
            }
            Err(KvError::NoSpace) => break,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(stored, 118);
    assert_eq!(store.calc_free_space().unwrap(), 40);

    // A deletion always fits and releases the value
    store.delete(0).unwrap();
    assert_eq!(store.calc_free_space().unwrap(), 108);

    assert_eq!(store.write(1000, &[0u8; 50]).unwrap(), 50);
    assert!(matches!(store.write(1001, &[0u8; 50]), Err(KvError::NoSpace)));

    for key in 1..stored {
        assert_eq!(store.read_value(key).unwrap().to_vec(), vec![key as u8; 50]);
    }
    assert!(matches!(store.read_value(0), Err(KvError::NotFound)));
}

// =============================================================================
// Two-Sector Ring Tests
// =============================================================================

#[test]
fn test_two_sector_ring() {
    let store = setup_store(2);
    assert_eq!(store.calc_free_space().unwrap(), 4032);

    for round in 0..4u8 {
        for key in 0..10u32 {
            store.write(key, &[round, key as u8].repeat(20)).unwrap();
        }
    }

    for key in 0..10u32 {
        assert_eq!(store.read_value(key).unwrap().to_vec(), [3, key as u8].repeat(20));
    }
    assert_eq!(store.calc_free_space().unwrap(), 4032 - 10 * 56);

    let store = remount(store);
    for key in 0..10u32 {
        assert_eq!(store.read_value(key).unwrap().to_vec(), [3, key as u8].repeat(20));
    }
    assert_eq!(store.calc_free_space().unwrap(), 4032 - 10 * 56);
}
