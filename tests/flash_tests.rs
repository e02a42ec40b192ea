//! Tests for flash devices
//!
//! These tests verify:
//! - NOR program/erase semantics of the file-backed image
//! - Image header validation
//! - A store persisted in an image survives reopening

use sectorkv::{FileFlash, Flash, FlashError, FlashParameters, KvError, Store, StoreConfig};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_image(dir: &TempDir, size: u64) -> FileFlash {
    FileFlash::create(dir.path().join("flash.img"), size, FlashParameters::nor()).unwrap()
}

// =============================================================================
// Device Tests
// =============================================================================

#[test]
fn test_created_image_is_erased() {
    let dir = TempDir::new().unwrap();
    let flash = setup_image(&dir, 8192);

    assert_eq!(flash.size(), 8192);
    assert_eq!(flash.parameters(), FlashParameters::nor());

    let mut buf = [0u8; 64];
    flash.read(4000, &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 0xFF));
}

#[test]
fn test_program_only_clears_bits() {
    let dir = TempDir::new().unwrap();
    let mut flash = setup_image(&dir, 4096);

    flash.program(0, &[0xF0, 0xF0, 0xF0, 0xF0]).unwrap();
    flash.program(0, &[0x3C, 0x3C, 0x3C, 0x3C]).unwrap();

    let mut buf = [0u8; 4];
    flash.read(0, &mut buf).unwrap();
    assert_eq!(buf, [0x30; 4]);

    flash.erase(0, 4096).unwrap();
    flash.read(0, &mut buf).unwrap();
    assert_eq!(buf, [0xFF; 4]);
}

#[test]
fn test_misaligned_and_out_of_bounds() {
    let dir = TempDir::new().unwrap();
    let mut flash = setup_image(&dir, 4096);

    assert!(matches!(
        flash.program(2, &[0; 4]),
        Err(FlashError::Misaligned { .. })
    ));
    assert!(matches!(
        flash.program(0, &[0; 3]),
        Err(FlashError::Misaligned { .. })
    ));
    assert!(matches!(
        flash.erase(100, 4096),
        Err(FlashError::Misaligned { .. })
    ));

    let mut buf = [0u8; 8];
    assert!(matches!(
        flash.read(4092, &mut buf),
        Err(FlashError::OutOfBounds { .. })
    ));
}

#[test]
fn test_reopen_keeps_parameters_and_content() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flash.img");
    let params = FlashParameters {
        write_block_size: 8,
        erase_page_size: 1024,
        ..FlashParameters::nor()
    };

    {
        let mut flash = FileFlash::create(&path, 4096, params).unwrap();
        flash.program(1024, b"12345678").unwrap();
        flash.sync().unwrap();
    }

    let flash = FileFlash::open(&path).unwrap();
    assert_eq!(flash.parameters(), params);
    assert_eq!(flash.size(), 4096);
    assert_eq!(flash.path(), path.as_path());

    let mut buf = [0u8; 8];
    flash.read(1024, &mut buf).unwrap();
    assert_eq!(&buf, b"12345678");
}

#[test]
fn test_open_rejects_foreign_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("not-an-image.bin");
    std::fs::write(&path, vec![0u8; 256]).unwrap();

    assert!(matches!(FileFlash::open(&path), Err(FlashError::Io(_))));
}

// =============================================================================
// Store On Image Tests
// =============================================================================

#[test]
fn test_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.img");

    {
        let flash = FileFlash::create(&path, 3 * 4096, FlashParameters::nor()).unwrap();
        let store = Store::mount(flash, StoreConfig::default()).unwrap();
        store.write(1, b"persisted value").unwrap();
        store.write(2, b"short").unwrap();
        store.write(3, b"doomed").unwrap();
        store.delete(3).unwrap();
        store.into_device().sync().unwrap();
    }

    let flash = FileFlash::open(&path).unwrap();
    let store = Store::mount(flash, StoreConfig::default()).unwrap();
    assert_eq!(store.read_value(1).unwrap().to_vec(), b"persisted value");
    assert_eq!(store.read_value(2).unwrap().to_vec(), b"short");
    assert!(matches!(store.read_value(3), Err(KvError::NotFound)));
}

#[test]
fn test_store_rotates_on_image() {
    let dir = TempDir::new().unwrap();
    let flash = setup_image(&dir, 3 * 4096);
    let store = Store::mount(flash, StoreConfig::default()).unwrap();

    for round in 0..3u8 {
        for key in 0..30u32 {
            store.write(key, &[round; 120]).unwrap();
        }
    }
    for key in 0..30u32 {
        assert_eq!(store.read_value(key).unwrap().to_vec(), vec![2u8; 120]);
    }
}
