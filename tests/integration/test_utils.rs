//! Test utilities for integration tests.
//!
//! This module provides an in-memory storage context that tracks reads, a
//! slab builder and helpers that lay out whole pyramid levels of raw 8-bit
//! tiles whose pixel values identify their position.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use geotile_streamer::error::IoError;
use geotile_streamer::format::{TileFormat, SLAB_HEADER_SIZE};
use geotile_streamer::geo::Crs;
use geotile_streamer::io::RangeReader;
use geotile_streamer::pyramid::{Level, SlabLayout};
use geotile_streamer::raster::{read_all, Image};
use geotile_streamer::storage::{slab_address, slab_object_key, ContextKind, StorageContext};
use geotile_streamer::tms::{TileMatrix, TileMatrixSet};

/// Tile side used by the fixtures.
pub const TILE_SIZE: u32 = 16;

/// No-data value of fixture levels; never produced by [`pixel_value`].
pub const NODATA: f32 = 255.0;

/// Bucket name of the in-memory context.
pub const TRAY: &str = "pyramids";

/// Value of the pixel at global pixel coordinates `(px, py)` of a level.
///
/// Periodic, so any window can be checked against it.
pub fn pixel_value(px: i64, py: i64) -> u8 {
    (px.rem_euclid(15) * 16 + py.rem_euclid(15)) as u8
}

// =============================================================================
// Mock Range Reader
// =============================================================================

/// A range reader over bytes held in memory.
pub struct MemoryReader {
    data: Bytes,
    identifier: String,
}

#[async_trait]
impl RangeReader for MemoryReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let start = offset as usize;
        let end = start + len;
        if end > self.data.len() {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.data.len() as u64,
            });
        }
        Ok(self.data.slice(start..end))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// Mock Storage Context
// =============================================================================

/// An object-storage context backed by a map, counting every open.
pub struct MockContext {
    objects: HashMap<String, Bytes>,
    open_count: AtomicUsize,
}

impl MockContext {
    pub fn new(objects: HashMap<String, Bytes>) -> Self {
        Self {
            objects,
            open_count: AtomicUsize::new(0),
        }
    }

    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageContext for MockContext {
    fn kind(&self) -> ContextKind {
        ContextKind::S3
    }

    fn tray(&self) -> &str {
        TRAY
    }

    async fn open(&self, key: &str) -> Result<Box<dyn RangeReader>, IoError> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        let data = self
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| IoError::NotFound(key.to_string()))?;
        Ok(Box::new(MemoryReader {
            data,
            identifier: key.to_string(),
        }))
    }
}

// =============================================================================
// Slabs
// =============================================================================

/// Build a slab from its tiles; `None` marks an absent tile (size 0).
pub fn build_slab(tiles: &[Option<Vec<u8>>]) -> Bytes {
    let n = tiles.len();
    let mut offsets = Vec::with_capacity(n);
    let mut sizes = Vec::with_capacity(n);
    let mut next = SLAB_HEADER_SIZE as usize + 8 * n;

    for tile in tiles {
        let size = tile.as_ref().map_or(0, |t| t.len());
        offsets.push(if size == 0 { 0 } else { next as u32 });
        sizes.push(size as u32);
        next += size;
    }

    let mut out = vec![0u8; SLAB_HEADER_SIZE as usize];
    for offset in offsets {
        out.extend_from_slice(&offset.to_le_bytes());
    }
    for size in sizes {
        out.extend_from_slice(&size.to_le_bytes());
    }
    for tile in tiles.iter().flatten() {
        out.extend_from_slice(tile);
    }
    Bytes::from(out)
}

/// Raw gray tile `(col, row)` filled with `value(px, py)`.
pub fn raw_tile(col: i64, row: i64, value: &dyn Fn(i64, i64) -> u8) -> Vec<u8> {
    let size = i64::from(TILE_SIZE);
    let mut data = Vec::with_capacity((size * size) as usize);
    for y in 0..size {
        for x in 0..size {
            data.push(value(col * size + x, row * size + y));
        }
    }
    data
}

/// What to store for a tile of a fixture level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredTile {
    Valid,
    Missing,
    Corrupt,
}

/// Store every tile of `tm` in slabs of `tiles_per_side` squared tiles under
/// `prefix`.
pub fn store_level(
    objects: &mut HashMap<String, Bytes>,
    tm: &TileMatrix,
    prefix: &str,
    tiles_per_side: u32,
    value: &dyn Fn(i64, i64) -> u8,
    stored: &dyn Fn(i64, i64) -> StoredTile,
) {
    let mut slabs: HashMap<(u32, u32), Vec<Option<Vec<u8>>>> = HashMap::new();
    let per_slab = (tiles_per_side * tiles_per_side) as usize;

    for row in 0..i64::from(tm.matrix_height) {
        for col in 0..i64::from(tm.matrix_width) {
            let address = slab_address(col, row, tiles_per_side, tiles_per_side)
                .expect("non-negative tile");
            let tile = match stored(col, row) {
                StoredTile::Valid => Some(raw_tile(col, row, value)),
                StoredTile::Missing => None,
                StoredTile::Corrupt => Some(vec![1, 2, 3]),
            };
            slabs
                .entry((address.x, address.y))
                .or_insert_with(|| vec![None; per_slab])[address.index as usize] = tile;
        }
    }

    for ((x, y), tiles) in slabs {
        objects.insert(slab_object_key(prefix, x, y), build_slab(&tiles));
    }
}

/// Square tile matrix `id` with `TILE_SIZE` tiles.
pub fn tile_matrix(id: &str, res: f64, x0: f64, y0: f64, matrix_size: (u32, u32)) -> TileMatrix {
    TileMatrix {
        id: id.to_string(),
        res,
        x0,
        y0,
        tile_width: TILE_SIZE,
        tile_height: TILE_SIZE,
        matrix_width: matrix_size.0,
        matrix_height: matrix_size.1,
    }
}

pub fn tile_matrix_set(id: &str, crs: &str, matrices: Vec<TileMatrix>) -> Arc<TileMatrixSet> {
    let crs = Crs::from_code(crs).expect("known CRS");
    Arc::new(TileMatrixSet::new(id, crs, matrices).expect("valid TMS"))
}

/// Raw gray level reading from `context`, slabs named `prefix_x_y`.
pub fn raster_level(
    tm: &TileMatrix,
    context: Arc<dyn StorageContext>,
    prefix: &str,
    tiles_per_side: u32,
) -> Level {
    let layout = SlabLayout {
        context,
        root: prefix.to_string(),
        path_depth: 0,
        tiles_per_width: tiles_per_side,
        tiles_per_height: tiles_per_side,
    };
    Level::new(tm.clone(), TileFormat::TiffRawU8, 1, vec![NODATA], layout)
}

/// Every sample of a single-channel image, row-major.
pub fn pixels(image: &dyn Image) -> Vec<f32> {
    read_all(image)
}

pub fn all_valid(_: i64, _: i64) -> StoredTile {
    StoredTile::Valid
}
