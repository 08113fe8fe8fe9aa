//! Logical images assembled from tiles.
//!
//! Every image kind (decoded tile, no-data fill, mosaic, canvas, resampled
//! or reprojected view) implements [`Image`], which exposes the result one
//! row at a time as `f32` samples. Images are built after every tile has
//! been fetched, so reading them never touches storage. Resampled and
//! reprojected views pull the source rows they need as output rows are read.

mod grid;
mod kernel;
mod mosaic;
mod reproject;
mod resample;
mod rows;
mod tile;

pub use grid::Grid;
pub use kernel::{Interpolation, Kernel, Weights};
pub use mosaic::{Canvas, Mosaic};
pub use reproject::ReprojectedImage;
pub use resample::ResampledImage;
pub use rows::RowCache;
pub use tile::{NoDataImage, TileImage};

use crate::geo::BBox;

/// Sample type of the stored pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    U8,
    F32,
}

/// A logical raster image.
pub trait Image: Send + Sync {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Samples per pixel.
    fn channels(&self) -> usize;

    fn sample_format(&self) -> SampleFormat;

    /// Geographic footprint, in the CRS the image was produced in.
    fn bbox(&self) -> BBox;

    /// Write row `y` into `out`, interleaved, `width * channels` samples.
    ///
    /// # Panics
    /// Panics if `y >= height` or `out` is shorter than one row.
    fn read_row(&self, y: u32, out: &mut [f32]);

    /// True for synthetic fills standing in for absent data.
    fn is_no_data(&self) -> bool {
        false
    }
}

/// Read every row of `image` into one interleaved buffer.
pub fn read_all(image: &dyn Image) -> Vec<f32> {
    let row_len = image.width() as usize * image.channels();
    let mut out = vec![0.0; row_len * image.height() as usize];
    for (y, row) in out.chunks_exact_mut(row_len.max(1)).enumerate() {
        if y as u32 >= image.height() {
            break;
        }
        image.read_row(y as u32, row);
    }
    out
}

// =============================================================================
// Pixel Buffer
// =============================================================================

/// Decoded samples of one tile.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    U8(Vec<u8>),
    F32(Vec<f32>),
}

impl PixelData {
    pub fn len(&self) -> usize {
        match self {
            PixelData::U8(v) => v.len(),
            PixelData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A decoded tile: `width * height * channels` interleaved samples.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub data: PixelData,
}

impl PixelBuffer {
    pub fn sample_format(&self) -> SampleFormat {
        match self.data {
            PixelData::U8(_) => SampleFormat::U8,
            PixelData::F32(_) => SampleFormat::F32,
        }
    }

    /// Copy columns `[x_start, x_end)` of row `y` into `out`.
    pub fn copy_row(&self, y: u32, x_start: u32, x_end: u32, out: &mut [f32]) {
        let row_start = y as usize * self.width as usize * self.channels;
        let from = row_start + x_start as usize * self.channels;
        let to = row_start + x_end as usize * self.channels;

        match &self.data {
            PixelData::U8(v) => {
                for (dst, src) in out.iter_mut().zip(&v[from..to]) {
                    *dst = f32::from(*src);
                }
            }
            PixelData::F32(v) => out[..to - from].copy_from_slice(&v[from..to]),
        }
    }
}
