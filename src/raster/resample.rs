use super::{Image, Interpolation, Kernel, RowCache, SampleFormat, Weights};
use crate::geo::BBox;

/// A source image resampled onto a new pixel grid in the same CRS.
///
/// `window` is the region of the source to render, in source pixel
/// coordinates (edges, not centers). Output pixel `i` samples the source
/// at `window.xmin + (i + 0.5) * ratio_x - 0.5`, and likewise vertically.
pub struct ResampledImage {
    source: RowCache,
    width: u32,
    height: u32,
    channels: usize,
    sample_format: SampleFormat,
    bbox: BBox,
    columns: Vec<Weights>,
    rows: Vec<Weights>,
}

impl ResampledImage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Box<dyn Image>,
        width: u32,
        height: u32,
        ratio_x: f64,
        ratio_y: f64,
        window: BBox,
        interpolation: Interpolation,
        bbox: BBox,
    ) -> Self {
        let kernel = Kernel::new(interpolation);
        let source_width = source.width() as usize;
        let source_height = source.height() as usize;

        let columns = (0..width)
            .map(|i| {
                let center = window.xmin + (f64::from(i) + 0.5) * ratio_x - 0.5;
                kernel.weights(center, ratio_x, source_width)
            })
            .collect();
        let rows: Vec<Weights> = (0..height)
            .map(|j| {
                let center = window.ymin + (f64::from(j) + 0.5) * ratio_y - 0.5;
                kernel.weights(center, ratio_y, source_height)
            })
            .collect();

        // Consecutive output rows share source rows
        let taps = rows.iter().map(|w| w.values.len()).max().unwrap_or(1);
        let channels = source.channels();
        let sample_format = source.sample_format();

        Self {
            source: RowCache::new(source, taps + 1),
            width,
            height,
            channels,
            sample_format,
            bbox,
            columns,
            rows,
        }
    }
}

impl Image for ResampledImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
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
        let channels = self.channels;
        let row_weights = &self.rows[y as usize];

        let out = &mut out[..self.width as usize * channels];
        out.fill(0.0);

        for (dy, wy) in row_weights.values.iter().enumerate() {
            if *wy == 0.0 {
                continue;
            }
            let source_row = self.source.row(row_weights.start + dy);

            for (i, column) in self.columns.iter().enumerate() {
                let pixel = &mut out[i * channels..(i + 1) * channels];
                for (dx, wx) in column.values.iter().enumerate() {
                    let w = wx * wy;
                    if w == 0.0 {
                        continue;
                    }
                    let src = (column.start + dx) * channels;
                    for c in 0..channels {
                        pixel[c] += w * source_row[src + c];
                    }
                }
            }
        }
    }
}
