#![no_main]
use chainfs::Image;
use libfuzzer_sys::fuzz_target;

// Arbitrary bytes as an image file: open and every read-only operation must
// fail cleanly, never panic or loop
fuzz_target!(|data: &[u8]| {
    let dir = match tempfile::TempDir::new() {
        Ok(d) => d,
        Err(_) => return,
    };
    let path = dir.path().join("fuzz.img");
    if std::fs::write(&path, data).is_err() {
        return;
    }

    let image = match Image::open(&path) {
        Ok(i) => i,
        Err(_) => return,
    };

    let _ = image.free_space();
    let _ = image.stats();
    let _ = image.verify();

    if let Ok(listing) = image.list() {
        for file in &listing {
            let _ = image.read_file(&file.name);
        }
    }
});
