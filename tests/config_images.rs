//! Images built from TOML geometry files

use anyhow::Result;
use chainfs::{ImageBuilder, ImageConfig, ImageError};
use tempfile::TempDir;

#[test]
fn test_image_from_toml_file() -> Result<()> {
    let dir = TempDir::new()?;
    let config_path = dir.path().join("image.toml");
    std::fs::write(
        &config_path,
        "total_size = 1048576\nblock_size = 512\nmax_entries = 100\n",
    )?;

    let config = ImageConfig::load(&config_path)?;
    let image = ImageBuilder::new()
        .path(dir.path().join("small-blocks.img"))
        .config(config)
        .build()?;

    let layout = *image.layout();
    assert_eq!(layout.block_size, 512);
    assert_eq!(layout.table_size, 2048 * 4);
    assert_eq!(layout.data_offset, 1024 + 2048 * 4 + 100 * 264);

    let data = vec![0x5Au8; 1500];
    image.import_file(&data, "three-small-blocks")?;
    assert_eq!(image.stats()?.used_blocks, 3);
    assert_eq!(image.read_file("three-small-blocks")?, data);

    Ok(())
}

#[test]
fn test_config_round_trips_through_toml() -> Result<()> {
    let config = ImageConfig {
        total_size: 8 * 1024 * 1024,
        block_size: 8192,
        header_size: 2048,
        max_entries: 500,
    };

    let text = toml::to_string(&config)?;
    assert_eq!(ImageConfig::from_toml_str(&text)?, config);
    Ok(())
}

#[test]
fn test_oversized_image_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let result = ImageBuilder::new()
        .path(dir.path().join("huge.img"))
        .total_size(u32::MAX as u64 + 1)
        .build();

    assert!(matches!(result, Err(ImageError::InvalidConfig(_))));
    Ok(())
}
