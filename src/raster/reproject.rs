use super::tile::fill_no_data;
use super::{Grid, Image, Interpolation, Kernel, RowCache, SampleFormat, Weights};
use crate::geo::BBox;

/// A source window sampled through a reprojected grid.
///
/// The grid holds, for every output pixel, its center in the source's pixel
/// index space. Centers falling outside the source become no-data.
pub struct ReprojectedImage {
    source: RowCache,
    source_width: usize,
    source_height: usize,
    grid: Grid,
    kernel: Kernel,
    ratio_x: f64,
    ratio_y: f64,
    channels: usize,
    sample_format: SampleFormat,
    nodata: Vec<f32>,
    bbox: BBox,
}

impl ReprojectedImage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Box<dyn Image>,
        grid: Grid,
        ratio_x: f64,
        ratio_y: f64,
        interpolation: Interpolation,
        nodata: &[f32],
        bbox: BBox,
    ) -> Self {
        let kernel = Kernel::new(interpolation);
        let taps = (2.0 * kernel.size(ratio_y)).ceil() as usize + 2;

        Self {
            source_width: source.width() as usize,
            source_height: source.height() as usize,
            channels: source.channels(),
            sample_format: source.sample_format(),
            source: RowCache::new(source, taps),
            grid,
            kernel,
            ratio_x,
            ratio_y,
            nodata: nodata.to_vec(),
            bbox,
        }
    }

    fn is_outside(&self, u: f64, v: f64) -> bool {
        u.is_nan()
            || v.is_nan()
            || u < -0.5
            || v < -0.5
            || u > self.source_width as f64 - 0.5
            || v > self.source_height as f64 - 0.5
    }
}

impl Image for ReprojectedImage {
    fn width(&self) -> u32 {
        self.grid.width()
    }

    fn height(&self) -> u32 {
        self.grid.height()
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

        let taps: Vec<Option<(Weights, Weights)>> = (0..self.grid.width())
            .map(|i| {
                let (u, v) = self.grid.point(i, y);
                if self.is_outside(u, v) {
                    return None;
                }
                Some((
                    self.kernel.weights(u, self.ratio_x, self.source_width),
                    self.kernel.weights(v, self.ratio_y, self.source_height),
                ))
            })
            .collect();

        // Source rows touched by this output row
        let span = taps.iter().flatten().fold(None, |span, (_, wy)| {
            let (first, last) = (wy.start, wy.start + wy.values.len() - 1);
            match span {
                None => Some((first, last)),
                Some((lo, hi)) => Some((first.min(lo), last.max(hi))),
            }
        });
        let rows: Vec<_> = match span {
            Some((lo, hi)) => {
                self.source.reserve(hi - lo + 1);
                (lo..=hi).map(|r| self.source.row(r)).collect()
            }
            None => Vec::new(),
        };
        let first_row = span.map_or(0, |(lo, _)| lo);

        for (i, tap) in taps.iter().enumerate() {
            let pixel = &mut out[i * channels..(i + 1) * channels];
            let Some((wx, wy)) = tap else {
                fill_no_data(pixel, &self.nodata);
                continue;
            };

            pixel.fill(0.0);
            for (dy, weight_y) in wy.values.iter().enumerate() {
                let source_row = &rows[wy.start + dy - first_row];
                for (dx, weight_x) in wx.values.iter().enumerate() {
                    let w = weight_x * weight_y;
                    if w == 0.0 {
                        continue;
                    }
                    let src = (wx.start + dx) * channels;
                    for c in 0..channels {
                        pixel[c] += w * source_row[src + c];
                    }
                }
            }
        }
    }
}
