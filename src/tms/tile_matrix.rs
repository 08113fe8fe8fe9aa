//! Grid geometry of one resolution step.

use crate::geo::BBox;

/// One resolution level of a tile matrix set.
///
/// The origin `(x0, y0)` is the top-left corner of tile `(0, 0)`; columns
/// grow eastwards and rows southwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TileMatrix {
    pub id: String,
    /// Ground size of one pixel, in CRS units
    pub res: f64,
    pub x0: f64,
    pub y0: f64,
    pub tile_width: u32,
    pub tile_height: u32,
    /// Number of tile columns
    pub matrix_width: u32,
    /// Number of tile rows
    pub matrix_height: u32,
}

impl TileMatrix {
    /// Check the invariants descriptors must satisfy.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.res > 0.0) {
            return Err(format!("tile matrix {}: cellSize must be > 0", self.id));
        }
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(format!("tile matrix {}: tile size must be >= 1", self.id));
        }
        if self.matrix_width == 0 || self.matrix_height == 0 {
            return Err(format!("tile matrix {}: matrix size must be >= 1", self.id));
        }
        Ok(())
    }

    /// Tile limits covering `bbox`, clamped to the matrix.
    pub fn bbox_to_tile_limits(&self, bbox: &BBox) -> TileMatrixLimits {
        let tile_w = self.res * f64::from(self.tile_width);
        let tile_h = self.res * f64::from(self.tile_height);

        let col = |x: f64| clamp_index(((x - self.x0) / tile_w).floor(), self.matrix_width);
        let row = |y: f64| clamp_index(((self.y0 - y) / tile_h).floor(), self.matrix_height);

        TileMatrixLimits::new(
            &self.id,
            row(bbox.ymax),
            row(bbox.ymin),
            col(bbox.xmin),
            col(bbox.xmax),
        )
    }

    /// Outer extent of the tiles inside `limits`.
    pub fn bbox_from_tile_limits(&self, limits: &TileMatrixLimits) -> BBox {
        let tile_w = self.res * f64::from(self.tile_width);
        let tile_h = self.res * f64::from(self.tile_height);

        BBox::new(
            self.x0 + tile_w * f64::from(limits.min_col),
            self.y0 - tile_h * (f64::from(limits.max_row) + 1.0),
            self.x0 + tile_w * (f64::from(limits.max_col) + 1.0),
            self.y0 - tile_h * f64::from(limits.min_row),
        )
    }

    /// Extent of a single tile.
    pub fn tile_bbox(&self, col: i64, row: i64) -> BBox {
        let tile_w = self.res * f64::from(self.tile_width);
        let tile_h = self.res * f64::from(self.tile_height);

        let xmin = self.x0 + tile_w * col as f64;
        let ymax = self.y0 - tile_h * row as f64;
        BBox::new(xmin, ymax - tile_h, xmin + tile_w, ymax)
    }

    /// Limits covering the whole matrix.
    pub fn full_limits(&self) -> TileMatrixLimits {
        TileMatrixLimits::new(
            &self.id,
            0,
            self.matrix_height - 1,
            0,
            self.matrix_width - 1,
        )
    }
}

fn clamp_index(value: f64, count: u32) -> u32 {
    let max = f64::from(count.saturating_sub(1));
    value.max(0.0).min(max) as u32
}

// =============================================================================
// Tile Matrix Limits
// =============================================================================

/// Inclusive rectangle of tile indices within one tile matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileMatrixLimits {
    pub tile_matrix: String,
    pub min_row: u32,
    pub max_row: u32,
    pub min_col: u32,
    pub max_col: u32,
}

impl TileMatrixLimits {
    pub fn new(tile_matrix: &str, min_row: u32, max_row: u32, min_col: u32, max_col: u32) -> Self {
        Self {
            tile_matrix: tile_matrix.to_string(),
            min_row,
            max_row,
            min_col,
            max_col,
        }
    }

    /// True if tile `(col, row)` lies within the limits.
    pub fn contains(&self, col: i64, row: i64) -> bool {
        col >= i64::from(self.min_col)
            && col <= i64::from(self.max_col)
            && row >= i64::from(self.min_row)
            && row <= i64::from(self.max_row)
    }

    /// Restrict the limits to the indices that exist in `tm`.
    pub fn clamp_to(&self, tm: &TileMatrix) -> TileMatrixLimits {
        let max_col = tm.matrix_width - 1;
        let max_row = tm.matrix_height - 1;
        TileMatrixLimits::new(
            &self.tile_matrix,
            self.min_row.min(max_row),
            self.max_row.min(max_row),
            self.min_col.min(max_col),
            self.max_col.min(max_col),
        )
    }
}
