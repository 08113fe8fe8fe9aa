use super::{Image, PixelBuffer, SampleFormat};
use crate::geo::BBox;

/// A decoded tile, optionally cropped on its four edges.
#[derive(Debug, Clone)]
pub struct TileImage {
    buffer: PixelBuffer,
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
    bbox: BBox,
}

impl TileImage {
    /// Wrap a full, uncropped tile.
    pub fn new(buffer: PixelBuffer, bbox: BBox) -> Self {
        Self {
            buffer,
            left: 0,
            top: 0,
            right: 0,
            bottom: 0,
            bbox,
        }
    }

    /// Drop `left`, `top`, `right` and `bottom` pixels from the edges.
    ///
    /// Crops are clamped so at least one pixel remains on each axis. `bbox`
    /// is the footprint of the cropped region.
    pub fn crop(mut self, left: u32, top: u32, right: u32, bottom: u32, bbox: BBox) -> Self {
        let max_x = self.buffer.width.saturating_sub(1);
        let max_y = self.buffer.height.saturating_sub(1);
        self.left = left.min(max_x);
        self.right = right.min(max_x - self.left);
        self.top = top.min(max_y);
        self.bottom = bottom.min(max_y - self.top);
        self.bbox = bbox;
        self
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }
}

impl Image for TileImage {
    fn width(&self) -> u32 {
        self.buffer.width - self.left - self.right
    }

    fn height(&self) -> u32 {
        self.buffer.height - self.top - self.bottom
    }

    fn channels(&self) -> usize {
        self.buffer.channels
    }

    fn sample_format(&self) -> SampleFormat {
        self.buffer.sample_format()
    }

    fn bbox(&self) -> BBox {
        self.bbox
    }

    fn read_row(&self, y: u32, out: &mut [f32]) {
        self.buffer.copy_row(
            self.top + y,
            self.left,
            self.buffer.width - self.right,
            out,
        );
    }
}

/// A synthetic image where every pixel carries the no-data value.
#[derive(Debug, Clone)]
pub struct NoDataImage {
    width: u32,
    height: u32,
    nodata: Vec<f32>,
    sample_format: SampleFormat,
    bbox: BBox,
}

impl NoDataImage {
    /// `nodata` holds one value per channel.
    pub fn new(width: u32, height: u32, nodata: &[f32], sample_format: SampleFormat, bbox: BBox) -> Self {
        Self {
            width,
            height,
            nodata: nodata.to_vec(),
            sample_format,
            bbox,
        }
    }
}

impl Image for NoDataImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn channels(&self) -> usize {
        self.nodata.len()
    }

    fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }

    fn bbox(&self) -> BBox {
        self.bbox
    }

    fn read_row(&self, _y: u32, out: &mut [f32]) {
        fill_no_data(&mut out[..self.width as usize * self.nodata.len()], &self.nodata);
    }

    fn is_no_data(&self) -> bool {
        true
    }
}

/// Fill an interleaved row with the per-channel no-data values.
pub(crate) fn fill_no_data(row: &mut [f32], nodata: &[f32]) {
    if nodata.is_empty() {
        return;
    }
    for pixel in row.chunks_exact_mut(nodata.len()) {
        pixel.copy_from_slice(nodata);
    }
}
