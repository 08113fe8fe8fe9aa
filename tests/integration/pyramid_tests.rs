//! Pyramid-level retrieval tests: level choice, DPI, reprojection and
//! composition.

use std::collections::HashMap;
use std::sync::Arc;

use super::test_utils::*;
use geotile_streamer::format::{OutputEncoder, OutputFormat, Photometric, TileFormat};
use geotile_streamer::geo::{BBox, Crs};
use geotile_streamer::pyramid::{BroadcastPyramid, Pyramid, WindowLimits};
use geotile_streamer::raster::Interpolation;
use geotile_streamer::tms::TileMatrix;
use geotile_streamer::{CompositionError, RetrievalError};

/// Three levels over a 128x128 square: "0" (res 4), "1" (res 2), "2" (res 1).
///
/// Levels "0" and "1" hold constants 10 and 30; level "2" holds the
/// position-encoding pattern.
fn square_pyramid(tms_id: &str) -> Pyramid {
    let matrices: Vec<TileMatrix> = vec![
        tile_matrix("0", 4.0, 0.0, 128.0, (2, 2)),
        tile_matrix("1", 2.0, 0.0, 128.0, (4, 4)),
        tile_matrix("2", 1.0, 0.0, 128.0, (8, 8)),
    ];
    let tms = tile_matrix_set(tms_id, "EPSG:3857", matrices.clone());

    let values: [&dyn Fn(i64, i64) -> u8; 3] = [&|_, _| 10, &|_, _| 30, &pixel_value];

    let mut objects = HashMap::new();
    for (tm, value) in matrices.iter().zip(values) {
        store_level(&mut objects, tm, &tm.id, 4, value, &all_valid);
    }
    let context = Arc::new(MockContext::new(objects));

    let levels = matrices
        .iter()
        .map(|tm| raster_level(tm, context.clone(), &tm.id, 4))
        .collect();

    Pyramid::new(
        tms,
        TileFormat::TiffRawU8,
        Some(Photometric::Gray),
        1,
        vec![NODATA],
        levels,
    )
    .unwrap()
}

fn mercator() -> Crs {
    Crs::from_code("EPSG:3857").unwrap()
}

// =============================================================================
// Level Selection
// =============================================================================

#[test]
fn test_level_bounds() {
    let pyramid = square_pyramid("SQUARE");
    assert_eq!(pyramid.lowest_level(), "2");
    assert_eq!(pyramid.highest_level(), "0");
    assert_eq!(pyramid.best_level(1.0, 1.0), "2");
    assert_eq!(pyramid.best_level(2.0, 2.0), "1");
    assert_eq!(pyramid.best_level(3.0, 3.0), "1");
    assert_eq!(pyramid.best_level(100.0, 100.0), "0");
    assert_eq!(pyramid.best_level(0.1, 0.1), "2");
}

#[tokio::test]
async fn test_native_resolution_reads_finest_level() {
    let pyramid = square_pyramid("SQUARE");
    let bbox = BBox::new(32.0, 32.0, 96.0, 96.0);

    let image = pyramid
        .getbbox(
            WindowLimits::default(),
            bbox,
            64,
            64,
            &mercator(),
            Interpolation::Cubic,
            0,
        )
        .await
        .unwrap();

    assert_eq!((image.width(), image.height()), (64, 64));
    let values = pixels(image.as_ref());
    for y in 0..64i64 {
        for x in 0..64i64 {
            assert_eq!(
                values[(y * 64 + x) as usize],
                f32::from(pixel_value(32 + x, 32 + y))
            );
        }
    }
}

#[tokio::test]
async fn test_coarse_request_reads_coarse_level() {
    let pyramid = square_pyramid("SQUARE");
    let bbox = BBox::new(32.0, 32.0, 96.0, 96.0);

    let image = pyramid
        .getbbox(
            WindowLimits::default(),
            bbox,
            8,
            8,
            &mercator(),
            Interpolation::Linear,
            0,
        )
        .await
        .unwrap();

    assert_eq!((image.width(), image.height()), (8, 8));
    assert!(pixels(image.as_ref()).iter().all(|v| (v - 10.0).abs() < 1e-3));
}

#[tokio::test]
async fn test_dpi_scales_requested_resolution() {
    let pyramid = square_pyramid("SQUARE");
    let bbox = BBox::new(32.0, 32.0, 96.0, 96.0);

    // 181 / 90.7 doubles the resolution: level "1" instead of "2"
    let image = pyramid
        .getbbox(
            WindowLimits::default(),
            bbox,
            64,
            64,
            &mercator(),
            Interpolation::Nearest,
            181,
        )
        .await
        .unwrap();

    assert_eq!((image.width(), image.height()), (64, 64));
    assert!(pixels(image.as_ref()).iter().all(|v| *v == 30.0));
}

#[tokio::test]
async fn test_window_limits_are_enforced() {
    let pyramid = square_pyramid("SQUARE");
    let limits = WindowLimits {
        max_tile_x: 2,
        max_tile_y: 2,
    };

    let result = pyramid
        .getbbox(
            limits,
            BBox::new(0.0, 64.0, 64.0, 128.0),
            64,
            64,
            &mercator(),
            Interpolation::Nearest,
            0,
        )
        .await;

    assert!(matches!(
        result.err(),
        Some(RetrievalError::TooManyTiles { axis: 'x', limit: 2, .. })
    ));
}

#[tokio::test]
async fn test_zero_size_is_rejected() {
    let pyramid = square_pyramid("SQUARE");

    let result = pyramid
        .getbbox(
            WindowLimits::default(),
            BBox::new(0.0, 0.0, 64.0, 64.0),
            0,
            64,
            &mercator(),
            Interpolation::Nearest,
            0,
        )
        .await;

    assert_eq!(
        result.err(),
        Some(RetrievalError::InvalidSize {
            width: 0,
            height: 64
        })
    );
}

#[tokio::test]
async fn test_rendered_image_encodes_to_png() {
    let pyramid = square_pyramid("SQUARE");

    let rendered = pyramid
        .getbbox(
            WindowLimits::default(),
            BBox::new(32.0, 32.0, 96.0, 96.0),
            64,
            64,
            &mercator(),
            Interpolation::Nearest,
            0,
        )
        .await
        .unwrap();

    let png = OutputEncoder::new().encode(rendered.as_ref(), OutputFormat::Png).unwrap();
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

    let decoded = image::load_from_memory(&png).unwrap().to_luma8();
    assert_eq!(decoded.dimensions(), (64, 64));
    assert_eq!(decoded.get_pixel(3, 5).0[0], pixel_value(35, 37));
}

// =============================================================================
// Reprojection
// =============================================================================

const CONSTANT: u8 = 100;

/// A whole-world EPSG:4326 pyramid, one level at 0.5 degree, constant 100.
fn world_pyramid() -> Pyramid {
    let tm = tile_matrix("0", 0.5, -180.0, 90.0, (45, 23));
    let tms = tile_matrix_set("WGS84", "EPSG:4326", vec![tm.clone()]);

    let mut objects = HashMap::new();
    store_level(&mut objects, &tm, "world", 16, &|_, _| CONSTANT, &all_valid);
    let context = Arc::new(MockContext::new(objects));

    Pyramid::new(
        tms,
        TileFormat::TiffRawU8,
        Some(Photometric::Gray),
        1,
        vec![NODATA],
        vec![raster_level(&tm, context, "world", 16)],
    )
    .unwrap()
}

#[tokio::test]
async fn test_reprojected_request_inside_domain() {
    let pyramid = world_pyramid();

    let image = pyramid
        .getbbox(
            WindowLimits::default(),
            BBox::new(-1.0e6, 1.0e6, 1.0e6, 3.0e6),
            32,
            32,
            &mercator(),
            Interpolation::Cubic,
            0,
        )
        .await
        .unwrap();

    assert_eq!((image.width(), image.height()), (32, 32));
    assert!(pixels(image.as_ref())
        .iter()
        .all(|v| (v - f32::from(CONSTANT)).abs() < 1e-2));
}

#[tokio::test]
async fn test_request_overflowing_crs_domain_is_padded() {
    let pyramid = world_pyramid();

    // Mercator stops at y = 20037508.34; the top half lies outside
    let image = pyramid
        .getbbox(
            WindowLimits::default(),
            BBox::new(0.0, 19.0e6, 2.0e6, 21.0e6),
            20,
            20,
            &mercator(),
            Interpolation::Nearest,
            0,
        )
        .await
        .unwrap();

    assert_eq!((image.width(), image.height()), (20, 20));
    let values = pixels(image.as_ref());
    for (i, value) in values.iter().enumerate() {
        let row = i / 20;
        if row < 10 {
            assert_eq!(*value, NODATA, "row {}", row);
        } else {
            assert_eq!(*value, f32::from(CONSTANT), "row {}", row);
        }
    }
}

#[tokio::test]
async fn test_request_outside_crs_domain_fails() {
    let pyramid = world_pyramid();

    let result = pyramid
        .getbbox(
            WindowLimits::default(),
            BBox::new(0.0, 21.0e6, 2.0e6, 22.0e6),
            20,
            20,
            &mercator(),
            Interpolation::Nearest,
            0,
        )
        .await;

    assert_eq!(
        result.err(),
        Some(RetrievalError::OutOfCrsDomain {
            crs: "EPSG:3857".to_string()
        })
    );
}

// =============================================================================
// Composition
// =============================================================================

#[test]
fn test_broadcast_composes_level_ranges() {
    let fine = Arc::new(square_pyramid("SQUARE"));
    let coarse = Arc::new(square_pyramid("SQUARE"));

    let pyramid = BroadcastPyramid::new()
        .add(fine, "2", "2")
        .add(coarse, "1", "0")
        .build()
        .unwrap();

    assert_eq!(pyramid.levels().len(), 3);
    assert_eq!(pyramid.lowest_level(), "2");
    assert_eq!(pyramid.highest_level(), "0");
}

#[test]
fn test_broadcast_rejects_overlapping_ranges() {
    let a = Arc::new(square_pyramid("SQUARE"));
    let b = Arc::new(square_pyramid("SQUARE"));

    let result = BroadcastPyramid::new()
        .add(a, "2", "1")
        .add(b, "1", "0")
        .build();

    assert_eq!(
        result.err(),
        Some(CompositionError::DuplicateLevel("1".to_string()))
    );
}

#[test]
fn test_broadcast_rejects_foreign_tms() {
    let a = Arc::new(square_pyramid("SQUARE"));
    let b = Arc::new(square_pyramid("OTHER"));

    let result = BroadcastPyramid::new().add(a, "2", "2").add(b, "1", "0").build();

    assert!(matches!(
        result.err(),
        Some(CompositionError::Mismatch { field: "TMS", .. })
    ));
}
