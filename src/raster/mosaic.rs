use super::tile::fill_no_data;
use super::{Image, SampleFormat};
use crate::geo::BBox;

/// Row-major grid of images joined edge to edge.
///
/// All images of a grid row share one height and all images of a grid
/// column share one width.
pub struct Mosaic {
    tiles: Vec<Vec<Box<dyn Image>>>,
    /// Image row at which each grid row starts, plus the total height
    row_starts: Vec<u32>,
    width: u32,
    channels: usize,
    sample_format: SampleFormat,
    bbox: BBox,
}

impl Mosaic {
    /// Assemble a grid of images.
    ///
    /// Returns `None` if the grid is empty or not rectangular.
    pub fn new(tiles: Vec<Vec<Box<dyn Image>>>) -> Option<Self> {
        let first = tiles.first()?.first()?;
        let channels = first.channels();
        let sample_format = first.sample_format();
        let columns = tiles[0].len();

        let width: u32 = tiles[0].iter().map(|t| t.width()).sum();
        let mut row_starts = Vec::with_capacity(tiles.len() + 1);
        let mut y = 0;
        let mut bbox = first.bbox();

        for row in &tiles {
            if row.len() != columns {
                return None;
            }
            let row_width: u32 = row.iter().map(|t| t.width()).sum();
            let height = row[0].height();
            if row_width != width || row.iter().any(|t| t.height() != height || t.channels() != channels) {
                return None;
            }
            for tile in row {
                let b = tile.bbox();
                bbox = BBox::new(
                    bbox.xmin.min(b.xmin),
                    bbox.ymin.min(b.ymin),
                    bbox.xmax.max(b.xmax),
                    bbox.ymax.max(b.ymax),
                );
            }
            row_starts.push(y);
            y += height;
        }
        row_starts.push(y);

        Some(Self {
            tiles,
            row_starts,
            width,
            channels,
            sample_format,
            bbox,
        })
    }

    /// Number of grid cells filled with synthetic no-data.
    pub fn no_data_tiles(&self) -> usize {
        self.tiles.iter().flatten().filter(|t| t.is_no_data()).count()
    }
}

impl Image for Mosaic {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.row_starts.last().copied().unwrap_or(0)
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }

    fn bbox(&self) -> BBox {
        self.bbox
    }

    fn read_row(&self, y: u32, out: &mut [f32]) {
        // Last grid row starting at or before y
        let grid_row = self.row_starts.partition_point(|&start| start <= y) - 1;
        let local_y = y - self.row_starts[grid_row];

        let mut offset = 0;
        for tile in &self.tiles[grid_row] {
            let len = tile.width() as usize * self.channels;
            tile.read_row(local_y, &mut out[offset..offset + len]);
            offset += len;
        }
    }

    fn is_no_data(&self) -> bool {
        self.tiles.iter().flatten().all(|t| t.is_no_data())
    }
}

// =============================================================================
// Canvas
// =============================================================================

/// A no-data background with one image laid over it at a pixel offset.
///
/// Parts of the image falling outside the canvas are clipped.
pub struct Canvas {
    width: u32,
    height: u32,
    nodata: Vec<f32>,
    sample_format: SampleFormat,
    bbox: BBox,
    inner: Option<(Box<dyn Image>, i64, i64)>,
}

impl Canvas {
    pub fn new(width: u32, height: u32, nodata: &[f32], sample_format: SampleFormat, bbox: BBox) -> Self {
        Self {
            width,
            height,
            nodata: nodata.to_vec(),
            sample_format,
            bbox,
            inner: None,
        }
    }

    /// Place `image` with its top-left corner at `(x, y)`.
    ///
    /// The image must have the canvas channel count.
    pub fn with_image(mut self, image: Box<dyn Image>, x: i64, y: i64) -> Self {
        self.inner = Some((image, x, y));
        self
    }
}

impl Image for Canvas {
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

    fn read_row(&self, y: u32, out: &mut [f32]) {
        let channels = self.nodata.len();
        let row = &mut out[..self.width as usize * channels];
        fill_no_data(row, &self.nodata);

        let Some((image, offset_x, offset_y)) = &self.inner else {
            return;
        };

        let inner_y = i64::from(y) - offset_y;
        if inner_y < 0 || inner_y >= i64::from(image.height()) {
            return;
        }

        let mut inner_row = vec![0.0; image.width() as usize * channels];
        image.read_row(inner_y as u32, &mut inner_row);

        let start = (*offset_x).max(0);
        let end = (offset_x + i64::from(image.width())).min(i64::from(self.width));
        if start >= end {
            return;
        }

        let dst = start as usize * channels..end as usize * channels;
        let src_start = (start - offset_x) as usize * channels;
        row[dst.clone()].copy_from_slice(&inner_row[src_start..src_start + dst.len()]);
    }

    fn is_no_data(&self) -> bool {
        self.inner.as_ref().map_or(true, |(image, _, _)| image.is_no_data())
    }
}
