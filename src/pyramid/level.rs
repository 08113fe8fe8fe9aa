//! One resolution level of a pyramid.
//!
//! A level knows where its tiles live (storage context, slab layout and
//! addressing) and how to assemble them into logical images:
//!
//! ```text
//! get_bbox / get_bbox_reprojected
//!        │  pixel window (+ kernel padding)
//!        ▼
//!   get_window ──► get_tile(col, row) ──► get_encoded_tile ──► slab
//!        │              │ absent / failed
//!        │              ▼
//!        │         NoDataImage
//!        ▼
//!   Mosaic of cropped tiles
//! ```
//!
//! Tiles are fetched one after the other within a request; a tile that cannot
//! be read or decoded is replaced by no-data and never fails the request.

use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::error::RetrievalError;
use crate::format::{decode_tile, read_slab_tile, TileFormat};
use crate::geo::{BBox, Crs};
use crate::raster::{
    Grid, Image, Interpolation, Kernel, Mosaic, NoDataImage, ReprojectedImage, ResampledImage,
    SampleFormat, TileImage,
};
use crate::storage::{slab_address, slab_key, ContextKind, StorageContext, TileCache, TileCacheKey};
use crate::tms::{TileMatrix, TileMatrixLimits};

/// Tolerance, in pixels, under which a request is considered grid-aligned.
pub const EPS: f64 = 1.0 / 256.0;

/// Default maximum number of tiles a window may touch on each axis.
pub const DEFAULT_MAX_TILES: u32 = 256;

// =============================================================================
// Window Limits
// =============================================================================

/// Upper bound on the tiles a single window may touch.
///
/// A window touching `max_tile_x` tiles or more horizontally (or
/// `max_tile_y` vertically) is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimits {
    pub max_tile_x: u32,
    pub max_tile_y: u32,
}

impl Default for WindowLimits {
    fn default() -> Self {
        Self {
            max_tile_x: DEFAULT_MAX_TILES,
            max_tile_y: DEFAULT_MAX_TILES,
        }
    }
}

// =============================================================================
// Pixel Window
// =============================================================================

/// Integer pixel rectangle in a level's pixel space.
///
/// `xmin`/`ymin` are inclusive, `xmax`/`ymax` exclusive. Rows grow
/// southwards from the tile matrix origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub xmin: i64,
    pub ymin: i64,
    pub xmax: i64,
    pub ymax: i64,
}

impl PixelWindow {
    pub const fn new(xmin: i64, ymin: i64, xmax: i64, ymax: i64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    pub fn width(&self) -> i64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> i64 {
        self.ymax - self.ymin
    }
}

/// Tiles touched by a pixel range along one axis, with the edge crops that
/// make their union cover the range exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSpan {
    /// Index of the first tile
    pub first: i64,
    /// Number of tiles; zero or less when the range is empty
    pub count: i64,
    /// Pixels dropped at the start of the first tile
    pub head_crop: u32,
    /// Pixels dropped at the end of the last tile
    pub tail_crop: u32,
}

impl TileSpan {
    /// Span of pixels `[min, max)` over tiles of `tile_size` pixels.
    pub fn new(min: i64, max: i64, tile_size: u32) -> Self {
        let size = i64::from(tile_size);
        let first = min.div_euclid(size);
        let last = (max - 1).div_euclid(size);
        let count = if max <= min { 0 } else { last - first + 1 };

        Self {
            first,
            count,
            head_crop: min.rem_euclid(size) as u32,
            tail_crop: (size - (max - 1).rem_euclid(size) - 1) as u32,
        }
    }

    /// Crops `(start, end)` of the `i`-th tile of the span.
    pub fn crops(&self, i: i64) -> (u32, u32) {
        let start = if i == 0 { self.head_crop } else { 0 };
        let end = if i == self.count - 1 { self.tail_crop } else { 0 };
        (start, end)
    }
}

// =============================================================================
// Slab Layout & Tables
// =============================================================================

/// Where and how a level's tiles are packed in storage.
#[derive(Debug, Clone)]
pub struct SlabLayout {
    pub context: Arc<dyn StorageContext>,
    /// Directory (file storage) or object prefix (object storage)
    pub root: String,
    /// Number of directory levels in slab file paths
    pub path_depth: u32,
    pub tiles_per_width: u32,
    pub tiles_per_height: u32,
}

impl SlabLayout {
    pub fn tiles_per_slab(&self) -> u32 {
        self.tiles_per_width * self.tiles_per_height
    }
}

/// Attribute of a vector table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub count: f64,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Vector table stored in the tiles of a vector level.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Table {
    pub name: String,
    pub geometry: String,
    pub attributes: Vec<Attribute>,
}

/// A tile as stored, without decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedTile {
    pub data: Bytes,
    pub mime_type: &'static str,
}

// =============================================================================
// Level
// =============================================================================

/// One resolution step of a pyramid, bound to one tile matrix.
///
/// Cloning a level copies its geometry, format and addressing; the storage
/// context and tile cache are shared.
#[derive(Debug, Clone)]
pub struct Level {
    tile_matrix: TileMatrix,
    format: TileFormat,
    channels: usize,
    nodata: Vec<f32>,
    layout: SlabLayout,
    limits: TileMatrixLimits,
    tables: Vec<Table>,
    tile_cache: Option<Arc<TileCache>>,
}

impl Level {
    /// Create a level covering the whole tile matrix.
    pub fn new(
        tile_matrix: TileMatrix,
        format: TileFormat,
        channels: usize,
        nodata: Vec<f32>,
        layout: SlabLayout,
    ) -> Self {
        Self {
            limits: tile_matrix.full_limits(),
            tile_matrix,
            format,
            channels,
            nodata,
            layout,
            tables: Vec::new(),
            tile_cache: None,
        }
    }

    /// Restrict the level to the tiles inside `limits` (clamped to the matrix).
    pub fn with_limits(mut self, limits: &TileMatrixLimits) -> Self {
        self.limits = limits.clamp_to(&self.tile_matrix);
        self.limits.tile_matrix = self.tile_matrix.id.clone();
        self
    }

    pub fn with_tables(mut self, tables: Vec<Table>) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_tile_cache(mut self, cache: Arc<TileCache>) -> Self {
        self.tile_cache = Some(cache);
        self
    }

    pub fn id(&self) -> &str {
        &self.tile_matrix.id
    }

    pub fn tile_matrix(&self) -> &TileMatrix {
        &self.tile_matrix
    }

    pub fn res(&self) -> f64 {
        self.tile_matrix.res
    }

    pub fn format(&self) -> TileFormat {
        self.format
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn nodata(&self) -> &[f32] {
        &self.nodata
    }

    pub fn layout(&self) -> &SlabLayout {
        &self.layout
    }

    pub fn limits(&self) -> &TileMatrixLimits {
        &self.limits
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn sample_format(&self) -> SampleFormat {
        self.format.sample_format().unwrap_or(SampleFormat::U8)
    }

    /// Geographic extent of the tiles inside the level limits.
    pub fn bbox(&self) -> BBox {
        self.tile_matrix.bbox_from_tile_limits(&self.limits)
    }

    /// Storage key of the slab holding tile `(col, row)` and its index there.
    ///
    /// `None` for negative indices.
    pub fn slab_location(&self, col: i64, row: i64) -> Option<(String, u32)> {
        let address = slab_address(
            col,
            row,
            self.layout.tiles_per_width,
            self.layout.tiles_per_height,
        )?;
        let key = slab_key(
            self.layout.context.kind(),
            &self.layout.root,
            address.x,
            address.y,
            self.layout.path_depth,
        );
        Some((key, address.index))
    }

    /// Read tile `(col, row)` as stored.
    ///
    /// Returns `None` outside the level limits, for absent tiles and on
    /// storage failure (logged).
    pub async fn get_encoded_tile(&self, col: i64, row: i64) -> Option<EncodedTile> {
        if col < 0 || row < 0 {
            error!(level = %self.id(), col, row, "Negative tile indices");
            return None;
        }
        if !self.limits.contains(col, row) {
            debug!(level = %self.id(), col, row, "Tile outside level limits");
            return None;
        }

        let (key, index) = self.slab_location(col, row)?;
        let cache_key = TileCacheKey::new(self.slab_identifier(&key), index);

        if let Some(cache) = &self.tile_cache {
            if let Some(data) = cache.get(&cache_key).await {
                return Some(self.encoded(data));
            }
        }

        match read_slab_tile(
            self.layout.context.as_ref(),
            &key,
            index,
            self.layout.tiles_per_slab(),
        )
        .await
        {
            Ok(Some(data)) => {
                if let Some(cache) = &self.tile_cache {
                    cache.put(cache_key, data.clone()).await;
                }
                Some(self.encoded(data))
            }
            Ok(None) => {
                debug!(level = %self.id(), col, row, slab = %key, "Tile absent from slab");
                None
            }
            Err(e) => {
                warn!(level = %self.id(), col, row, slab = %key, error = %e, "Cannot read tile");
                None
            }
        }
    }

    /// Read and decode tile `(col, row)`.
    ///
    /// Returns `None` whenever the tile cannot be provided; decoding failures
    /// are logged.
    pub async fn get_tile(&self, col: i64, row: i64) -> Option<TileImage> {
        let encoded = self.get_encoded_tile(col, row).await?;

        match decode_tile(
            &encoded.data,
            self.format,
            self.tile_matrix.tile_width,
            self.tile_matrix.tile_height,
            self.channels,
        ) {
            Ok(buffer) => Some(TileImage::new(buffer, self.tile_matrix.tile_bbox(col, row))),
            Err(e) => {
                warn!(level = %self.id(), col, row, error = %e, "Cannot decode tile");
                None
            }
        }
    }

    /// Assemble the pixels of `window` out of tiles.
    ///
    /// Missing tiles are filled with no-data. A window within one tile is
    /// returned as that (cropped) tile, otherwise as a mosaic.
    pub async fn get_window(
        &self,
        window: PixelWindow,
        limits: WindowLimits,
    ) -> Result<Box<dyn Image>, RetrievalError> {
        let tm = &self.tile_matrix;
        let span_x = TileSpan::new(window.xmin, window.xmax, tm.tile_width);
        let span_y = TileSpan::new(window.ymin, window.ymax, tm.tile_height);

        if span_x.count >= i64::from(limits.max_tile_x) {
            return Err(RetrievalError::TooManyTiles {
                axis: 'x',
                count: span_x.count,
                limit: limits.max_tile_x,
            });
        }
        if span_y.count >= i64::from(limits.max_tile_y) {
            return Err(RetrievalError::TooManyTiles {
                axis: 'y',
                count: span_y.count,
                limit: limits.max_tile_y,
            });
        }
        if span_x.count <= 0 {
            return Err(RetrievalError::EmptyWindow { axis: 'x' });
        }
        if span_y.count <= 0 {
            return Err(RetrievalError::EmptyWindow { axis: 'y' });
        }

        debug!(
            level = %self.id(),
            tiles_x = span_x.count,
            tiles_y = span_y.count,
            "Assembling window"
        );

        let mut rows: Vec<Vec<Box<dyn Image>>> = Vec::with_capacity(span_y.count as usize);
        for j in 0..span_y.count {
            let (top, bottom) = span_y.crops(j);
            let mut tiles: Vec<Box<dyn Image>> = Vec::with_capacity(span_x.count as usize);

            for i in 0..span_x.count {
                let (left, right) = span_x.crops(i);
                let tile = self
                    .get_cropped_tile(span_x.first + i, span_y.first + j, left, top, right, bottom)
                    .await;
                tiles.push(tile);
            }
            rows.push(tiles);
        }

        if rows.len() == 1 && rows[0].len() == 1 {
            if let Some(tile) = rows.pop().and_then(|mut row| row.pop()) {
                return Ok(tile);
            }
        }

        let mosaic = Mosaic::new(rows).ok_or(RetrievalError::EmptyWindow { axis: 'x' })?;
        Ok(Box::new(mosaic))
    }

    async fn get_cropped_tile(
        &self,
        col: i64,
        row: i64,
        left: u32,
        top: u32,
        right: u32,
        bottom: u32,
    ) -> Box<dyn Image> {
        let tm = &self.tile_matrix;
        let res = tm.res;
        let tile_w = f64::from(tm.tile_width);
        let tile_h = f64::from(tm.tile_height);

        let bbox = BBox::new(
            tm.x0 + col as f64 * tile_w * res + f64::from(left) * res,
            tm.y0 - (row + 1) as f64 * tile_h * res + f64::from(bottom) * res,
            tm.x0 + (col + 1) as f64 * tile_w * res - f64::from(right) * res,
            tm.y0 - row as f64 * tile_h * res - f64::from(top) * res,
        );

        match self.get_tile(col, row).await {
            Some(tile) => Box::new(tile.crop(left, top, right, bottom, bbox)),
            None => Box::new(NoDataImage::new(
                tm.tile_width - left - right,
                tm.tile_height - top - bottom,
                &self.nodata,
                self.sample_format(),
                bbox,
            )),
        }
    }

    /// Render `bbox` (native CRS) as a `width x height` image.
    ///
    /// Requests aligned on the level's pixel grid at native resolution are
    /// served straight from [`Level::get_window`]; anything else is
    /// resampled from a window padded by the kernel support.
    pub async fn get_bbox(
        &self,
        bbox: &BBox,
        width: u32,
        height: u32,
        interpolation: Interpolation,
        limits: WindowLimits,
    ) -> Result<Box<dyn Image>, RetrievalError> {
        let tm = &self.tile_matrix;
        let res = tm.res;

        let xmin = (bbox.xmin - tm.x0) / res;
        let xmax = (bbox.xmax - tm.x0) / res;
        let ymin = (tm.y0 - bbox.ymax) / res;
        let ymax = (tm.y0 - bbox.ymin) / res;

        let aligned = PixelWindow::new(
            (xmin + EPS).floor() as i64,
            (ymin + EPS).floor() as i64,
            (xmax - EPS).ceil() as i64,
            (ymax - EPS).ceil() as i64,
        );

        if aligned.width() == i64::from(width)
            && aligned.height() == i64::from(height)
            && (xmin - aligned.xmin as f64).abs() < EPS
            && (ymin - aligned.ymin as f64).abs() < EPS
            && (xmax - aligned.xmax as f64).abs() < EPS
            && (ymax - aligned.ymax as f64).abs() < EPS
        {
            return self.get_window(aligned, limits).await;
        }

        let ratio_x = (xmax - xmin) / f64::from(width);
        let ratio_y = (ymax - ymin) / f64::from(height);

        let interpolation = resampling_interpolation(interpolation);
        let kernel = Kernel::new(interpolation);

        let padded = PixelWindow::new(
            (xmin - kernel.size(ratio_x)).floor() as i64,
            (ymin - kernel.size(ratio_y)).floor() as i64,
            (xmax + kernel.size(ratio_x)).ceil() as i64,
            (ymax + kernel.size(ratio_y)).ceil() as i64,
        );

        let source = self.get_window(padded, limits).await?;
        let within = BBox::new(
            xmin - padded.xmin as f64,
            ymin - padded.ymin as f64,
            xmax - padded.xmin as f64,
            ymax - padded.ymin as f64,
        );

        Ok(Box::new(ResampledImage::new(
            source,
            width,
            height,
            ratio_x,
            ratio_y,
            within,
            interpolation,
            *bbox,
        )))
    }

    /// Render `bbox`, given in `dst_crs`, out of this level stored in
    /// `src_crs`.
    ///
    /// Every output pixel center is reprojected into the source CRS; the
    /// enclosing window, padded by the kernel support, is fetched and sampled
    /// through the reprojected grid.
    #[allow(clippy::too_many_arguments)]
    pub async fn get_bbox_reprojected(
        &self,
        bbox: &BBox,
        width: u32,
        height: u32,
        src_crs: &Crs,
        dst_crs: &Crs,
        interpolation: Interpolation,
        limits: WindowLimits,
    ) -> Result<Box<dyn Image>, RetrievalError> {
        let (grid, window, ratio_x, ratio_y, interpolation) =
            self.sampling_grid(bbox, width, height, src_crs, dst_crs, interpolation)?;

        let source = self.get_window(window, limits).await?;

        Ok(Box::new(ReprojectedImage::new(
            source,
            grid,
            ratio_x,
            ratio_y,
            interpolation,
            &self.nodata,
            *bbox,
        )))
    }

    /// Reprojected grid mapped into the pixel space of the window to fetch.
    fn sampling_grid(
        &self,
        bbox: &BBox,
        width: u32,
        height: u32,
        src_crs: &Crs,
        dst_crs: &Crs,
        interpolation: Interpolation,
    ) -> Result<(Grid, PixelWindow, f64, f64, Interpolation), RetrievalError> {
        let tm = &self.tile_matrix;
        let res = tm.res;

        let mut grid = Grid::new(width, height, bbox);
        grid.reproject(dst_crs, src_crs)
            .map_err(RetrievalError::InvalidBBox)?;

        let extent = grid.bbox();
        if extent.has_nan() {
            return Err(RetrievalError::InvalidBBox(format!(
                "{} in {} has points outside {}",
                bbox, dst_crs, src_crs
            )));
        }

        let interpolation = reprojection_interpolation(interpolation);
        let kernel = Kernel::new(interpolation);

        let ratio_x = extent.width() / (res * f64::from(width));
        let ratio_y = extent.height() / (res * f64::from(height));
        let buf_x = kernel.size(ratio_x);
        let buf_y = kernel.size(ratio_y);

        let window = PixelWindow::new(
            ((extent.xmin - tm.x0) / res - buf_x).floor() as i64,
            ((tm.y0 - extent.ymax) / res - buf_y).floor() as i64,
            ((extent.xmax - tm.x0) / res + buf_x).ceil() as i64,
            ((tm.y0 - extent.ymin) / res + buf_y).ceil() as i64,
        );

        let window_xmin = tm.x0 + res * window.xmin as f64;
        let window_ymax = tm.y0 - res * window.ymin as f64;
        grid.affine_transform(
            1.0 / res,
            -window_xmin / res - 0.5,
            -1.0 / res,
            window_ymax / res - 0.5,
        );

        Ok((grid, window, ratio_x, ratio_y, interpolation))
    }

    fn encoded(&self, data: Bytes) -> EncodedTile {
        EncodedTile {
            data,
            mime_type: self.format.mime_type(),
        }
    }

    fn slab_identifier(&self, key: &str) -> String {
        match self.layout.context.kind() {
            ContextKind::File => key.to_string(),
            ContextKind::S3 => format!("s3://{}/{}", self.layout.context.tray(), key),
        }
    }
}

/// Lanczos kernels resample same-CRS requests with 3 lobes.
fn resampling_interpolation(interpolation: Interpolation) -> Interpolation {
    if interpolation >= Interpolation::Lanczos2 {
        Interpolation::Lanczos3
    } else {
        interpolation
    }
}

/// Lanczos kernels sample reprojected grids with 2 lobes.
fn reprojection_interpolation(interpolation: Interpolation) -> Interpolation {
    if interpolation >= Interpolation::Lanczos2 {
        Interpolation::Lanczos2
    } else {
        interpolation
    }
}
