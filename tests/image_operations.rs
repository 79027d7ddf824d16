//! End-to-end tests for image operations
//!
//! Every test works on a fresh image in its own temporary directory

use chainfs::{Image, ImageError};
use std::collections::HashSet;
use tempfile::TempDir;

const ONE_MIB: u64 = 1024 * 1024;

/// Data region starts on a block boundary (65 × 4096) and fills the image
const ALIGNED_SIZE: u64 = 304 * 4096;

fn new_image(total_size: u64) -> (TempDir, Image) {
    let dir = TempDir::new().unwrap();
    let image = Image::create(dir.path().join("test.img"), total_size).unwrap();
    (dir, image)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

#[test]
fn test_fresh_image_free_space() {
    let (_dir, image) = new_image(ALIGNED_SIZE);
    let layout = *image.layout();

    assert_eq!(layout.data_offset, 65 * 4096);
    assert_eq!(
        image.free_space().unwrap(),
        layout.total_size - layout.data_offset
    );
    assert!(image.list().unwrap().is_empty());
}

#[test]
fn test_one_mebibyte_scenario() {
    let (dir, image) = new_image(ONE_MIB);
    let layout = *image.layout();
    assert_eq!(layout.data_offset, 266_048);
    assert_eq!(layout.block_count, 191);

    let data = pattern(5000);
    image.import_file(&data, "a.bin").unwrap();

    assert_eq!(image.free_space().unwrap(), 189 * 4096);

    let listing: Vec<_> = image.list().unwrap().iter().collect();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "a.bin");
    assert_eq!(listing[0].size, 5000);
    assert_eq!(listing[0].first_block, Some(0));

    assert_eq!(image.read_file("a.bin").unwrap(), data);

    // Raw bytes: table entry 0 links to 1, entry 1 ends the chain
    let raw = std::fs::read(dir.path().join("test.img")).unwrap();
    let table = layout.table_offset as usize;
    assert_eq!(&raw[table..table + 4], &1u32.to_le_bytes());
    assert_eq!(&raw[table + 4..table + 8], &u32::MAX.to_le_bytes());
    assert_eq!(&raw[table + 8..table + 12], &0u32.to_le_bytes());

    let slot = layout.directory_offset as usize;
    assert_eq!(&raw[slot..slot + 5], b"a.bin");
    assert_eq!(raw[slot + 5], 0);
    assert_eq!(&raw[slot + 255..slot + 259], &5000u32.to_le_bytes());
    assert_eq!(&raw[slot + 259..slot + 263], &0u32.to_le_bytes());
    assert_eq!(raw[slot + 263], 0);

    // Tail of the second block stays zeroed
    let second = layout.block_offset(1) as usize;
    assert_eq!(&raw[second..second + 904], &data[4096..]);
    assert!(raw[second + 904..second + 4096].iter().all(|&b| b == 0));
}

#[test]
fn test_round_trip_lengths() {
    let (dir, image) = new_image(ONE_MIB);

    for len in [0usize, 1, 4095, 4096, 4097] {
        let name = format!("file-{}", len);
        let data = pattern(len);
        image.import_file(&data, &name).unwrap();

        let out = dir.path().join(format!("{}.out", name));
        let written = image.export_to_path(&name, &out).unwrap();

        assert_eq!(written, len as u64);
        assert_eq!(std::fs::read(&out).unwrap(), data, "length {}", len);
    }
}

#[test]
fn test_import_path_round_trip() {
    let (dir, image) = new_image(ONE_MIB);
    let source = dir.path().join("source.bin");
    std::fs::write(&source, pattern(10_000)).unwrap();

    image.import_path(&source, "copied").unwrap();
    assert_eq!(image.read_file("copied").unwrap(), pattern(10_000));
}

#[test]
fn test_export_to_writer() {
    let (_dir, image) = new_image(ONE_MIB);
    image.import_file(&pattern(9000), "big").unwrap();

    let mut out = Vec::new();
    let written = image.export_file("big", &mut out).unwrap();
    assert_eq!(written, 9000);
    assert_eq!(out, pattern(9000));
}

#[test]
fn test_list_is_idempotent() {
    let (_dir, image) = new_image(ONE_MIB);
    for name in ["one", "two", "three"] {
        image.import_file(name.as_bytes(), name).unwrap();
    }

    let first: Vec<_> = image.list().unwrap().iter().collect();
    let second: Vec<_> = image.list().unwrap().iter().collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}

#[test]
fn test_protected_file_survives_delete() {
    let (_dir, image) = new_image(ONE_MIB);
    image.import_file(b"keep me", "keep").unwrap();
    image.protect("keep", true).unwrap();
    let free = image.free_space().unwrap();

    let result = image.delete("keep");
    assert!(matches!(result, Err(ImageError::Protected(_))));
    assert!(image.metadata("keep").unwrap().protected);
    assert_eq!(image.free_space().unwrap(), free);
    assert_eq!(image.read_file("keep").unwrap(), b"keep me");

    image.protect("keep", false).unwrap();
    image.delete("keep").unwrap();
    assert!(!image.exists("keep").unwrap());
}

#[test]
fn test_delete_restores_free_space() {
    let (_dir, image) = new_image(ONE_MIB);
    let before = image.free_space().unwrap();

    image.import_file(&pattern(12_345), "temp").unwrap();
    assert_eq!(image.free_space().unwrap(), before - 4 * 4096);

    image.delete("temp").unwrap();
    assert_eq!(image.free_space().unwrap(), before);
    assert!(matches!(
        image.read_file("temp"),
        Err(ImageError::NotFound(_))
    ));
}

#[test]
fn test_rename() {
    let (_dir, image) = new_image(ONE_MIB);
    image.import_file(b"alpha", "a").unwrap();
    image.import_file(b"beta", "b").unwrap();

    let result = image.rename("a", "b");
    assert!(matches!(result, Err(ImageError::NameConflict(_))));
    assert_eq!(image.read_file("b").unwrap(), b"beta");

    image.rename("a", "c").unwrap();
    assert!(!image.exists("a").unwrap());
    assert_eq!(image.read_file("c").unwrap(), b"alpha");

    assert!(matches!(
        image.rename("missing", "d"),
        Err(ImageError::NotFound(_))
    ));
}

#[test]
fn test_rename_keeps_slot_and_flags() {
    let (_dir, image) = new_image(ONE_MIB);
    image.import_file(b"first", "first").unwrap();
    image.import_file(b"second", "second").unwrap();
    image.protect("first", true).unwrap();

    image.rename("first", "renamed").unwrap();

    let names: Vec<String> = image.list().unwrap().iter().map(|f| f.name).collect();
    assert_eq!(names, vec!["renamed", "second"]);
    assert!(image.metadata("renamed").unwrap().protected);
}

#[test]
fn test_name_validation() {
    let (_dir, image) = new_image(ONE_MIB);

    let long = "x".repeat(256);
    assert!(matches!(
        image.import_file(b"data", &long),
        Err(ImageError::NameTooLong { len: 256, max: 255 })
    ));
    assert!(matches!(
        image.import_file(b"data", ""),
        Err(ImageError::InvalidName(_))
    ));

    let longest = "y".repeat(255);
    image.import_file(b"data", &longest).unwrap();
    assert_eq!(image.metadata(&longest).unwrap().name, longest);

    image.import_file(b"data", "short").unwrap();
    assert!(matches!(
        image.rename("short", &long),
        Err(ImageError::NameTooLong { .. })
    ));
}

#[test]
fn test_insufficient_space_leaves_image_unchanged() {
    let (dir, image) = new_image(ONE_MIB);
    let path = dir.path().join("test.img");

    image.import_file(&pattern(100 * 4096), "bulk").unwrap();
    let free = image.free_space().unwrap();
    let before = std::fs::read(&path).unwrap();

    let result = image.import_file(&vec![1u8; free as usize + 1], "too-big");
    match result {
        Err(ImageError::InsufficientSpace {
            requested,
            available,
        }) => {
            assert_eq!(requested, free + 1);
            assert_eq!(available, free);
        }
        other => panic!("expected InsufficientSpace, got {:?}", other),
    }

    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn test_fill_exactly() {
    let (_dir, image) = new_image(ONE_MIB);
    let free = image.free_space().unwrap();

    image.import_file(&pattern(free as usize), "everything").unwrap();
    assert_eq!(image.free_space().unwrap(), 0);

    // Empty files still fit with no blocks left
    image.import_file(b"", "empty").unwrap();
    assert!(matches!(
        image.import_file(b"x", "one-more"),
        Err(ImageError::InsufficientSpace { .. })
    ));
}

#[test]
fn test_directory_full() {
    let dir = TempDir::new().unwrap();
    let image = chainfs::ImageBuilder::new()
        .path(dir.path().join("small-dir.img"))
        .total_size(ONE_MIB)
        .max_entries(3)
        .build()
        .unwrap();

    for i in 0..3 {
        image.import_file(b"x", &format!("f{}", i)).unwrap();
    }
    let free = image.free_space().unwrap();

    assert!(matches!(
        image.import_file(b"x", "f3"),
        Err(ImageError::DirectoryFull)
    ));
    assert_eq!(image.free_space().unwrap(), free);
}

#[test]
fn test_chains_do_not_share_blocks() {
    let (_dir, image) = new_image(ONE_MIB);

    // Interleave imports and deletes to force non-contiguous chains
    for i in 0..10 {
        image.import_file(&pattern(3 * 4096), &format!("f{}", i)).unwrap();
    }
    for i in (0..10).step_by(2) {
        image.delete(&format!("f{}", i)).unwrap();
    }
    image.import_file(&pattern(9 * 4096), "spread").unwrap();

    let report = image.verify().unwrap();
    assert!(report.is_clean(), "{:?}", report);
    assert!(image.stats().unwrap().fragmentation > 0.0);

    let mut seen = HashSet::new();
    for file in &image.list().unwrap() {
        assert!(seen.insert(file.name.clone()), "duplicate {}", file.name);
    }
    assert_eq!(image.read_file("spread").unwrap(), pattern(9 * 4096));
}

#[test]
fn test_first_fit_ascending() {
    let (_dir, image) = new_image(ONE_MIB);
    image.import_file(&pattern(4096), "a").unwrap();
    image.import_file(&pattern(4096), "b").unwrap();
    image.import_file(&pattern(4096), "c").unwrap();
    image.delete("b").unwrap();

    // Lowest free block is reused first
    image.import_file(&pattern(2 * 4096), "d").unwrap();
    assert_eq!(image.metadata("d").unwrap().first_block, Some(1));
    assert_eq!(image.read_file("d").unwrap(), pattern(2 * 4096));
}

#[test]
fn test_too_small_image() {
    let dir = TempDir::new().unwrap();
    let result = Image::create(dir.path().join("tiny.img"), 200_000);
    assert!(matches!(result, Err(ImageError::SizeTooSmall { .. })));
}
