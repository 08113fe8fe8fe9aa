//! End-to-end tests: descriptors and slabs on disk, loaded through the
//! file context.

use std::path::Path;

use super::test_utils::*;
use geotile_streamer::format::OutputFormat;
use geotile_streamer::geo::{BBox, Crs};
use geotile_streamer::pyramid::{PyramidLoader, WindowLimits};
use geotile_streamer::raster::Interpolation;
use geotile_streamer::storage::{slab_file_path, ContextBook, TileCache};
use geotile_streamer::tms::TmsBook;
use geotile_streamer::{CompositionError, ConfigError, OutputEncoder};

const TMS_JSON: &str = r#"{
    "crs": "EPSG:2154",
    "title": "Local grid",
    "tileMatrices": [
        {"id": "0", "cellSize": 2.0, "tileWidth": 16, "tileHeight": 16,
         "matrixWidth": 2, "matrixHeight": 2, "pointOfOrigin": [700000.0, 6600064.0]},
        {"id": "1", "cellSize": 1.0, "tileWidth": 16, "tileHeight": 16,
         "matrixWidth": 4, "matrixHeight": 4, "pointOfOrigin": [700000.0, 6600064.0]}
    ]
}"#;

const PYRAMID_JSON: &str = r#"{
    "tile_matrix_set": "LOCAL",
    "format": "TIFF_RAW_UINT8",
    "raster_specifications": {"photometric": "gray", "channels": 1, "nodata": "255"},
    "levels": [
        {"id": "0", "storage": {"type": "FILE", "image_directory": "IMAGE/0", "path_depth": 2},
         "tiles_per_width": 2, "tiles_per_height": 2},
        {"id": "1", "storage": {"type": "FILE", "image_directory": "IMAGE/1", "path_depth": 2},
         "tiles_per_width": 2, "tiles_per_height": 2}
    ]
}"#;

const X0: f64 = 700000.0;
const Y0: f64 = 6600064.0;

/// Write the slabs of a `matrix_size` square level below `root`, skipping
/// slab `missing` if given.
async fn write_level(root: &Path, matrix_size: i64, value: &dyn Fn(i64, i64) -> u8, missing: Option<(u32, u32)>) {
    let slabs = (matrix_size / 2) as u32;
    for y in 0..slabs {
        for x in 0..slabs {
            if missing == Some((x, y)) {
                continue;
            }
            let tiles: Vec<Option<Vec<u8>>> = (0..4i64)
                .map(|index| {
                    let col = i64::from(x) * 2 + index % 2;
                    let row = i64::from(y) * 2 + index / 2;
                    Some(raw_tile(col, row, value))
                })
                .collect();

            let path = slab_file_path(&root.display().to_string(), x, y, 2);
            let parent = Path::new(&path).parent().unwrap();
            tokio::fs::create_dir_all(parent).await.unwrap();
            tokio::fs::write(&path, build_slab(&tiles)).await.unwrap();
        }
    }
}

/// Lay out a TMS directory and a pyramid on disk; returns the descriptor path.
async fn write_dataset(dir: &Path, missing: Option<(u32, u32)>) -> String {
    let tms_dir = dir.join("tms");
    tokio::fs::create_dir_all(&tms_dir).await.unwrap();
    tokio::fs::write(tms_dir.join("LOCAL.json"), TMS_JSON).await.unwrap();

    let pyramid_dir = dir.join("ortho");
    write_level(&pyramid_dir.join("IMAGE/0"), 2, &|_, _| 40, None).await;
    write_level(&pyramid_dir.join("IMAGE/1"), 4, &pixel_value, missing).await;

    let descriptor = pyramid_dir.join("ortho.json");
    tokio::fs::write(&descriptor, PYRAMID_JSON).await.unwrap();
    descriptor.display().to_string()
}

#[tokio::test]
async fn test_load_and_render_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = write_dataset(dir.path(), None).await;

    let tms_book = TmsBook::load_dir(dir.path().join("tms")).await.unwrap();
    let mut context_book = ContextBook::default();
    let pyramid = PyramidLoader::new(&tms_book, &mut context_book)
        .load(&descriptor)
        .await
        .unwrap();

    assert_eq!(pyramid.levels().len(), 2);
    assert_eq!(pyramid.lowest_level(), "1");
    assert_eq!(pyramid.highest_level(), "0");
    assert_eq!(pyramid.nodata(), &[255.0]);

    // Pixels 8..40 x 4..36 of level "1"
    let bbox = BBox::new(X0 + 8.0, Y0 - 36.0, X0 + 40.0, Y0 - 4.0);
    let crs = Crs::from_code("EPSG:2154").unwrap();
    let image = pyramid
        .getbbox(WindowLimits::default(), bbox, 32, 32, &crs, Interpolation::Cubic, 0)
        .await
        .unwrap();

    let values = pixels(image.as_ref());
    for y in 0..32i64 {
        for x in 0..32i64 {
            assert_eq!(
                values[(y * 32 + x) as usize],
                f32::from(pixel_value(8 + x, 4 + y))
            );
        }
    }

    let bil = OutputEncoder::new().encode(image.as_ref(), OutputFormat::Bil).unwrap();
    assert_eq!(bil.len(), 32 * 32 * 4);
}

#[tokio::test]
async fn test_missing_slab_file_renders_nodata() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = write_dataset(dir.path(), Some((1, 0))).await;

    let tms_book = TmsBook::load_dir(dir.path().join("tms")).await.unwrap();
    let mut context_book = ContextBook::default();
    let pyramid = PyramidLoader::new(&tms_book, &mut context_book)
        .load(&descriptor)
        .await
        .unwrap();

    // Whole level "1": slab (1, 0) holds tiles 2..4 x 0..2
    let bbox = BBox::new(X0, Y0 - 64.0, X0 + 64.0, Y0);
    let crs = Crs::from_code("EPSG:2154").unwrap();
    let image = pyramid
        .getbbox(WindowLimits::default(), bbox, 64, 64, &crs, Interpolation::Nearest, 0)
        .await
        .unwrap();

    let values = pixels(image.as_ref());
    for y in 0..64i64 {
        for x in 0..64i64 {
            let expected = if x >= 32 && y < 32 {
                NODATA
            } else {
                f32::from(pixel_value(x, y))
            };
            assert_eq!(values[(y * 64 + x) as usize], expected, "pixel ({}, {})", x, y);
        }
    }
}

#[tokio::test]
async fn test_shared_tile_cache_is_attached_to_levels() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = write_dataset(dir.path(), None).await;

    let tms_book = TmsBook::load_dir(dir.path().join("tms")).await.unwrap();
    let cache = std::sync::Arc::new(TileCache::new());
    let mut context_book = ContextBook::default().with_tile_cache(cache.clone());
    let pyramid = PyramidLoader::new(&tms_book, &mut context_book)
        .load(&descriptor)
        .await
        .unwrap();

    let level = pyramid.get_level("0").unwrap();
    assert!(level.get_encoded_tile(1, 1).await.is_some());
    assert_eq!(cache.len().await, 1);

    let tile = level.get_tile(1, 1).await.unwrap();
    assert_eq!(tile.buffer().width, 16);
}

#[tokio::test]
async fn test_unknown_tms_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = write_dataset(dir.path(), None).await;

    let tms_book = TmsBook::new();
    let mut context_book = ContextBook::default();
    let result = PyramidLoader::new(&tms_book, &mut context_book)
        .load(&descriptor)
        .await;

    assert!(matches!(
        result,
        Err(ConfigError::UnknownTms { ref tms, .. }) if tms == "LOCAL"
    ));
}

/// Write a broadcast descriptor next to the dataset, taking the given
/// `(bottom, top)` level ranges of the ortho pyramid.
async fn write_broadcast(dir: &Path, ranges: &[(&str, &str)]) -> String {
    let sources: Vec<String> = ranges
        .iter()
        .map(|(bottom, top)| {
            format!(
                r#"{{"path": "ortho/ortho.json", "bottom_level": "{}", "top_level": "{}"}}"#,
                bottom, top
            )
        })
        .collect();
    let json = format!(r#"{{"pyramids": [{}]}}"#, sources.join(", "));

    let path = dir.join("layer.json");
    tokio::fs::write(&path, json).await.unwrap();
    path.display().to_string()
}

#[tokio::test]
async fn test_broadcast_descriptor_composes_sources() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), None).await;
    let layer = write_broadcast(dir.path(), &[("1", "1"), ("0", "0")]).await;

    let tms_book = TmsBook::load_dir(dir.path().join("tms")).await.unwrap();
    let mut context_book = ContextBook::default();
    let pyramid = PyramidLoader::new(&tms_book, &mut context_book)
        .load(&layer)
        .await
        .unwrap();

    assert_eq!(pyramid.levels().len(), 2);
    assert_eq!(pyramid.lowest_level(), "1");
    assert_eq!(pyramid.highest_level(), "0");

    let bbox = BBox::new(X0 + 8.0, Y0 - 36.0, X0 + 40.0, Y0 - 4.0);
    let crs = Crs::from_code("EPSG:2154").unwrap();
    let image = pyramid
        .getbbox(WindowLimits::default(), bbox, 32, 32, &crs, Interpolation::Nearest, 0)
        .await
        .unwrap();

    let values = pixels(image.as_ref());
    assert_eq!(values[0], f32::from(pixel_value(8, 4)));
    assert_eq!(values[32 * 32 - 1], f32::from(pixel_value(39, 35)));
}

#[tokio::test]
async fn test_broadcast_with_overlapping_ranges_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), None).await;
    let layer = write_broadcast(dir.path(), &[("1", "0"), ("0", "0")]).await;

    let tms_book = TmsBook::load_dir(dir.path().join("tms")).await.unwrap();
    let mut context_book = ContextBook::default();
    let result = PyramidLoader::new(&tms_book, &mut context_book)
        .load_broadcast(&layer)
        .await;

    assert!(matches!(
        result,
        Err(ConfigError::Composition(CompositionError::DuplicateLevel(ref id))) if id == "0"
    ));
}

#[tokio::test]
async fn test_broadcast_with_missing_source_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), None).await;
    let layer = dir.path().join("layer.json");
    tokio::fs::write(
        &layer,
        r#"{"pyramids": [{"path": "gone.json", "bottom_level": "1", "top_level": "0"}]}"#,
    )
    .await
    .unwrap();

    let tms_book = TmsBook::load_dir(dir.path().join("tms")).await.unwrap();
    let mut context_book = ContextBook::default();
    let result = PyramidLoader::new(&tms_book, &mut context_book)
        .load(&layer.display().to_string())
        .await;

    assert!(matches!(result, Err(ConfigError::Read { .. })));
}
