#![no_main]
use chainfs::Image;
use libfuzzer_sys::{
    arbitrary::{Arbitrary, Unstructured},
    fuzz_target,
};

#[derive(Debug, Arbitrary)]
enum Op {
    Import { name_idx: u8, data: Vec<u8> },
    Delete { name_idx: u8 },
    Rename { from_idx: u8, to_idx: u8 },
    Protect { name_idx: u8, enabled: bool },
    Export { name_idx: u8 },
}

// Random operation sequences must keep the image consistent
fuzz_target!(|input: &[u8]| {
    let mut u = Unstructured::new(input);

    let ops: Vec<Op> = match u.arbitrary() {
        Ok(ops) => ops,
        Err(_) => return,
    };

    let dir = match tempfile::TempDir::new() {
        Ok(d) => d,
        Err(_) => return,
    };
    let image = match Image::create(dir.path().join("fuzz.img"), 1024 * 1024) {
        Ok(i) => i,
        Err(_) => return,
    };

    let name = |idx: u8| format!("file{}", idx % 16);

    for op in ops.iter().take(64) {
        match op {
            Op::Import { name_idx, data } => {
                let _ = image.import_file(data, &name(*name_idx));
            }
            Op::Delete { name_idx } => {
                let _ = image.delete(&name(*name_idx));
            }
            Op::Rename { from_idx, to_idx } => {
                let _ = image.rename(&name(*from_idx), &name(*to_idx));
            }
            Op::Protect { name_idx, enabled } => {
                let _ = image.protect(&name(*name_idx), *enabled);
            }
            Op::Export { name_idx } => {
                let _ = image.read_file(&name(*name_idx));
            }
        }
    }

    let report = image.verify().expect("verify after operations");
    assert!(report.is_clean(), "inconsistent image: {:?}", report);
});
