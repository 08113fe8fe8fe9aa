//! Tile-window assembly tests.
//!
//! These tests run against an 8x8-tile level held in memory, whose pixel
//! values encode their global position, so every output pixel can be traced
//! back to the tile it came from.

use std::collections::HashMap;
use std::sync::Arc;

use super::test_utils::*;
use geotile_streamer::geo::BBox;
use geotile_streamer::pyramid::{Level, PixelWindow, WindowLimits};
use geotile_streamer::raster::Interpolation;
use geotile_streamer::storage::TileCache;
use geotile_streamer::tms::TileMatrix;

const PREFIX: &str = "ortho/IMAGE/0";

/// Level origin: pixel `(px, py)` covers `[px, px + 1] x [256 - py - 1, 256 - py]`.
const Y0: f64 = 256.0;

fn level_matrix() -> TileMatrix {
    tile_matrix("0", 1.0, 0.0, Y0, (8, 8))
}

fn level_with(stored: &dyn Fn(i64, i64) -> StoredTile) -> (Level, Arc<MockContext>) {
    let tm = level_matrix();
    let mut objects = HashMap::new();
    store_level(&mut objects, &tm, PREFIX, 4, &pixel_value, stored);

    let context = Arc::new(MockContext::new(objects));
    let level = raster_level(&tm, context.clone(), PREFIX, 4);
    (level, context)
}

fn expect(px: i64, py: i64) -> f32 {
    let size = i64::from(TILE_SIZE) * 8;
    if px < 0 || py < 0 || px >= size || py >= size {
        NODATA
    } else {
        f32::from(pixel_value(px, py))
    }
}

fn assert_window(values: &[f32], window: PixelWindow, expected: &dyn Fn(i64, i64) -> f32) {
    let width = window.width() as usize;
    assert_eq!(values.len(), width * window.height() as usize);

    for (i, value) in values.iter().enumerate() {
        let px = window.xmin + (i % width) as i64;
        let py = window.ymin + (i / width) as i64;
        assert_eq!(*value, expected(px, py), "pixel ({}, {})", px, py);
    }
}

// =============================================================================
// Window Coverage
// =============================================================================

#[tokio::test]
async fn test_window_covers_exact_pixels() {
    let (level, _) = level_with(&all_valid);
    let window = PixelWindow::new(5, 7, 45, 30);

    let image = level.get_window(window, WindowLimits::default()).await.unwrap();

    assert_eq!(image.width(), 40);
    assert_eq!(image.height(), 23);
    assert_eq!(image.channels(), 1);
    assert_window(&pixels(image.as_ref()), window, &expect);
}

#[tokio::test]
async fn test_window_inside_one_tile() {
    let (level, _) = level_with(&all_valid);
    let window = PixelWindow::new(18, 34, 30, 40);

    let image = level.get_window(window, WindowLimits::default()).await.unwrap();

    assert_eq!((image.width(), image.height()), (12, 6));
    assert_window(&pixels(image.as_ref()), window, &expect);
}

#[tokio::test]
async fn test_window_with_negative_coordinates() {
    let (level, _) = level_with(&all_valid);
    let window = PixelWindow::new(-20, -4, 10, 12);

    let image = level.get_window(window, WindowLimits::default()).await.unwrap();

    assert_eq!((image.width(), image.height()), (30, 16));
    assert_window(&pixels(image.as_ref()), window, &expect);
}

#[tokio::test]
async fn test_window_past_the_matrix_edge() {
    let (level, _) = level_with(&all_valid);
    let window = PixelWindow::new(120, 100, 140, 136);

    let image = level.get_window(window, WindowLimits::default()).await.unwrap();

    assert_window(&pixels(image.as_ref()), window, &expect);
}

#[tokio::test]
async fn test_missing_and_corrupt_tiles_become_nodata() {
    let stored = |col: i64, row: i64| match (col, row) {
        (1, 0) => StoredTile::Missing,
        (2, 1) => StoredTile::Corrupt,
        _ => StoredTile::Valid,
    };
    let (level, _) = level_with(&stored);
    let window = PixelWindow::new(0, 0, 48, 32);

    let image = level.get_window(window, WindowLimits::default()).await.unwrap();

    assert_eq!((image.width(), image.height()), (48, 32));
    let hole = |px: i64, py: i64| {
        let tile = (px / 16, py / 16);
        if tile == (1, 0) || tile == (2, 1) {
            NODATA
        } else {
            expect(px, py)
        }
    };
    assert_window(&pixels(image.as_ref()), window, &hole);
}

#[tokio::test]
async fn test_too_many_tiles() {
    let (level, context) = level_with(&all_valid);
    let limits = WindowLimits {
        max_tile_x: 2,
        max_tile_y: 8,
    };

    let result = level.get_window(PixelWindow::new(0, 0, 48, 16), limits).await;

    let err = result.err().unwrap();
    assert_eq!(
        err,
        geotile_streamer::RetrievalError::TooManyTiles {
            axis: 'x',
            count: 3,
            limit: 2
        }
    );
    assert_eq!(context.open_count(), 0);
}

#[tokio::test]
async fn test_empty_window_is_rejected() {
    let (level, context) = level_with(&all_valid);

    // Zero rows inside a populated tile
    let result = level
        .get_window(PixelWindow::new(0, 5, 16, 5), WindowLimits::default())
        .await;
    assert_eq!(
        result.err(),
        Some(geotile_streamer::RetrievalError::EmptyWindow { axis: 'y' })
    );

    // Inverted columns
    let result = level
        .get_window(PixelWindow::new(20, 0, 10, 16), WindowLimits::default())
        .await;
    assert_eq!(
        result.err(),
        Some(geotile_streamer::RetrievalError::EmptyWindow { axis: 'x' })
    );
    assert_eq!(context.open_count(), 0);
}

// =============================================================================
// Bounding Boxes
// =============================================================================

#[tokio::test]
async fn test_aligned_bbox_matches_window() {
    let (level, _) = level_with(&all_valid);
    let window = PixelWindow::new(5, 7, 45, 30);
    let bbox = BBox::new(5.0, Y0 - 30.0, 45.0, Y0 - 7.0);

    let from_bbox = level
        .get_bbox(&bbox, 40, 23, Interpolation::Cubic, WindowLimits::default())
        .await
        .unwrap();
    let from_window = level.get_window(window, WindowLimits::default()).await.unwrap();

    assert_eq!(pixels(from_bbox.as_ref()), pixels(from_window.as_ref()));
    assert_window(&pixels(from_bbox.as_ref()), window, &expect);
}

#[tokio::test]
async fn test_nearest_downsampling_picks_every_other_pixel() {
    let (level, _) = level_with(&all_valid);
    // Pixels 16..80 horizontally and 64..128 vertically, halved
    let bbox = BBox::new(16.0, Y0 - 128.0, 80.0, Y0 - 64.0);

    let image = level
        .get_bbox(&bbox, 32, 32, Interpolation::Nearest, WindowLimits::default())
        .await
        .unwrap();

    assert_eq!((image.width(), image.height()), (32, 32));
    let values = pixels(image.as_ref());
    for j in 0..32i64 {
        for i in 0..32i64 {
            let value = values[(j * 32 + i) as usize];
            assert_eq!(value, expect(17 + 2 * i, 65 + 2 * j), "output ({}, {})", i, j);
        }
    }
}

#[tokio::test]
async fn test_linear_resampling_stays_within_source_range() {
    let (level, _) = level_with(&all_valid);
    let bbox = BBox::new(20.5, Y0 - 100.25, 90.5, Y0 - 30.25);

    let image = level
        .get_bbox(&bbox, 50, 30, Interpolation::Linear, WindowLimits::default())
        .await
        .unwrap();

    assert_eq!((image.width(), image.height()), (50, 30));
    assert!(pixels(image.as_ref())
        .iter()
        .all(|v| (0.0..=238.0 + 1e-3).contains(v)));
}

// =============================================================================
// Encoded Tiles
// =============================================================================

#[tokio::test]
async fn test_encoded_tile_is_served_as_stored() {
    let (level, _) = level_with(&all_valid);

    let tile = level.get_encoded_tile(3, 2).await.unwrap();

    assert_eq!(tile.data.as_ref(), raw_tile(3, 2, &pixel_value).as_slice());
    assert!(level.get_encoded_tile(8, 0).await.is_none());
    assert!(level.get_encoded_tile(-1, 0).await.is_none());
}

#[tokio::test]
async fn test_absent_tile_has_no_encoded_form() {
    let stored = |col: i64, row: i64| {
        if (col, row) == (0, 0) {
            StoredTile::Missing
        } else {
            StoredTile::Valid
        }
    };
    let (level, _) = level_with(&stored);

    assert!(level.get_encoded_tile(0, 0).await.is_none());
    assert!(level.get_tile(0, 0).await.is_none());
    assert!(level.get_tile(1, 0).await.is_some());
}

#[tokio::test]
async fn test_tile_cache_avoids_second_read() {
    let (level, context) = level_with(&all_valid);
    let cache = Arc::new(TileCache::new());
    let level = level.with_tile_cache(cache.clone());

    let first = level.get_encoded_tile(5, 6).await.unwrap();
    let opens = context.open_count();
    let second = level.get_encoded_tile(5, 6).await.unwrap();

    assert_eq!(first.data, second.data);
    assert_eq!(context.open_count(), opens);
    assert_eq!(cache.len().await, 1);
}
