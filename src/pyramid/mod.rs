//! Pyramids: level selection and cross-CRS orchestration.
//!
//! A pyramid is the set of levels of one dataset, all bound to tile matrices
//! of one tile matrix set. Given a request bbox, an output size and a CRS,
//! [`Pyramid::getbbox`] picks the level whose resolution best matches the
//! request and lets it render the image, reprojecting when the request CRS
//! differs from the native one.
//!
//! # Example
//!
//! ```ignore
//! use geotile_streamer::pyramid::{PyramidLoader, WindowLimits};
//! use geotile_streamer::raster::Interpolation;
//!
//! let pyramid = PyramidLoader::new(&tms_book, &mut context_book)
//!     .load("/data/ortho.json")
//!     .await?;
//!
//! let image = pyramid
//!     .getbbox(WindowLimits::default(), bbox, 512, 512, &crs, Interpolation::Cubic, 0)
//!     .await?;
//! ```

mod level;
mod loader;

pub use level::{
    Attribute, EncodedTile, Level, PixelWindow, SlabLayout, Table, TileSpan, WindowLimits,
    DEFAULT_MAX_TILES, EPS,
};
pub use loader::{parse_nodata, PyramidLoader, DEFAULT_NODATA};

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{CompositionError, RetrievalError};
use crate::format::{Photometric, TileFormat};
use crate::geo::{BBox, Crs};
use crate::raster::{Canvas, Image, Interpolation, NoDataImage, SampleFormat};
use crate::tms::TileMatrixSet;

/// DPI assumed by resolutions computed from a request size.
pub const STANDARD_DPI: f64 = 90.7;

/// Levels whose resolution ratio to the request falls below this are
/// considered too coarse.
const MIN_RESOLUTION_RATIO: f64 = 0.8;

/// A multi-resolution tiled dataset.
#[derive(Debug, Clone)]
pub struct Pyramid {
    levels: BTreeMap<String, Level>,
    tms: Arc<TileMatrixSet>,
    format: TileFormat,
    photometric: Option<Photometric>,
    channels: usize,
    nodata: Vec<f32>,
    /// Finest level
    lowest_level: String,
    /// Coarsest level
    highest_level: String,
}

impl Pyramid {
    /// Assemble a pyramid out of its levels.
    ///
    /// Every level must be bound to a tile matrix of `tms` and share the
    /// pyramid's format and channel count.
    pub fn new(
        tms: Arc<TileMatrixSet>,
        format: TileFormat,
        photometric: Option<Photometric>,
        channels: usize,
        nodata: Vec<f32>,
        levels: Vec<Level>,
    ) -> Result<Self, String> {
        if levels.is_empty() {
            return Err("pyramid has no level".to_string());
        }

        let mut pyramid = Self::empty(tms, format, photometric, channels, nodata);
        for level in levels {
            if pyramid.tms.get_tile_matrix(level.id()).is_none() {
                return Err(format!(
                    "level {} is not a tile matrix of TMS {}",
                    level.id(),
                    pyramid.tms.id()
                ));
            }
            if level.format() != format || level.channels() != channels {
                return Err(format!(
                    "level {} does not share the pyramid format ({} {} != {} {})",
                    level.id(),
                    level.format(),
                    level.channels(),
                    format,
                    channels
                ));
            }
            if pyramid.levels.contains_key(level.id()) {
                return Err(format!("level {} is defined twice", level.id()));
            }
            pyramid.levels.insert(level.id().to_string(), level);
        }
        pyramid.refresh_bounds();

        debug!(
            tms = %pyramid.tms.id(),
            levels = pyramid.levels.len(),
            lowest = %pyramid.lowest_level,
            highest = %pyramid.highest_level,
            "Created pyramid"
        );
        Ok(pyramid)
    }

    fn empty(
        tms: Arc<TileMatrixSet>,
        format: TileFormat,
        photometric: Option<Photometric>,
        channels: usize,
        nodata: Vec<f32>,
    ) -> Self {
        Self {
            levels: BTreeMap::new(),
            tms,
            format,
            photometric,
            channels,
            nodata,
            lowest_level: String::new(),
            highest_level: String::new(),
        }
    }

    pub fn tms(&self) -> &Arc<TileMatrixSet> {
        &self.tms
    }

    /// Native CRS of the pyramid.
    pub fn crs(&self) -> &Crs {
        self.tms.crs()
    }

    pub fn format(&self) -> TileFormat {
        self.format
    }

    pub fn photometric(&self) -> Option<Photometric> {
        self.photometric
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn nodata(&self) -> &[f32] {
        &self.nodata
    }

    pub fn is_raster(&self) -> bool {
        self.format.is_raster()
    }

    pub fn levels(&self) -> &BTreeMap<String, Level> {
        &self.levels
    }

    pub fn get_level(&self, id: &str) -> Option<&Level> {
        self.levels.get(id)
    }

    /// Id of the finest level.
    pub fn lowest_level(&self) -> &str {
        &self.lowest_level
    }

    /// Id of the coarsest level.
    pub fn highest_level(&self) -> &str {
        &self.highest_level
    }

    fn sample_format(&self) -> SampleFormat {
        self.format.sample_format().unwrap_or(SampleFormat::U8)
    }

    fn refresh_bounds(&mut self) {
        let finest = self.levels.values().min_by(|a, b| a.res().total_cmp(&b.res()));
        let coarsest = self.levels.values().max_by(|a, b| a.res().total_cmp(&b.res()));
        if let (Some(finest), Some(coarsest)) = (finest, coarsest) {
            self.lowest_level = finest.id().to_string();
            self.highest_level = coarsest.id().to_string();
        }
    }

    /// Id of the level best matching the requested resolutions.
    ///
    /// Levels are scanned in id order. A level is too coarse when the
    /// request resolution is less than 0.8 times its own; among the others
    /// the coarsest wins. When every level seen so far is too coarse, any
    /// finer one replaces it.
    pub fn best_level(&self, resolution_x: f64, resolution_y: f64) -> &str {
        let target = (resolution_x * resolution_y).sqrt();

        let mut best: Option<(f64, &Level)> = None;
        for level in self.levels.values() {
            let d = target / level.res();
            best = match best {
                None => Some((d, level)),
                Some((b, _))
                    if (b < MIN_RESOLUTION_RATIO && d > b)
                        || (b >= MIN_RESOLUTION_RATIO && d >= MIN_RESOLUTION_RATIO && d < b) =>
                {
                    Some((d, level))
                }
                kept => kept,
            };
        }

        best.map_or(self.lowest_level.as_str(), |(_, level)| level.id())
    }

    /// Render `bbox`, given in `dst_crs`, as a `width x height` image.
    ///
    /// A non-zero `dpi` scales the request resolution by `dpi / 90.7` before
    /// the level is chosen.
    #[allow(clippy::too_many_arguments)]
    pub async fn getbbox(
        &self,
        limits: WindowLimits,
        bbox: BBox,
        width: u32,
        height: u32,
        dst_crs: &Crs,
        interpolation: Interpolation,
        dpi: u32,
    ) -> Result<Box<dyn Image>, RetrievalError> {
        if width == 0 || height == 0 {
            return Err(RetrievalError::InvalidSize { width, height });
        }

        let native = self.crs();
        let same_crs = dst_crs.is_equivalent(native);

        let extent = if same_crs {
            bbox
        } else {
            bbox.reproject(dst_crs, native)
                .ok_or_else(|| RetrievalError::ReprojectionFailed {
                    from: dst_crs.code().to_string(),
                    to: native.code().to_string(),
                })?
        };

        let mut resolution_x = extent.width() / f64::from(width);
        let mut resolution_y = extent.height() / f64::from(height);

        if dpi != 0 {
            let factor = f64::from(dpi) / STANDARD_DPI;
            resolution_x *= factor;
            resolution_y *= factor;
            if resolution_x.is_nan() || resolution_y.is_nan() {
                return Err(RetrievalError::InvalidDpi(dpi));
            }
        }

        let level_id = self.best_level(resolution_x, resolution_y);
        let level = self
            .levels
            .get(level_id)
            .ok_or_else(|| RetrievalError::UnknownLevel(level_id.to_string()))?;

        debug!(
            level = %level.id(),
            resolution_x,
            resolution_y,
            crs = %dst_crs,
            "Selected level"
        );

        if same_crs {
            level.get_bbox(&bbox, width, height, interpolation, limits).await
        } else {
            self.create_reprojected_image(level, bbox, dst_crs, width, height, interpolation, limits)
                .await
        }
    }

    /// Render a request in a foreign CRS, degrading at the CRS domain edges.
    ///
    /// The part of `bbox` outside the validity domain of `dst_crs` is filled
    /// with no-data; a request entirely outside it fails.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_reprojected_image(
        &self,
        level: &Level,
        bbox: BBox,
        dst_crs: &Crs,
        width: u32,
        height: u32,
        interpolation: Interpolation,
        limits: WindowLimits,
    ) -> Result<Box<dyn Image>, RetrievalError> {
        let native = self.crs();
        let out_of_domain = || RetrievalError::OutOfCrsDomain {
            crs: dst_crs.code().to_string(),
        };

        let domain = dst_crs.native_definition_area().ok_or_else(out_of_domain)?;

        if domain.contains(&bbox) {
            return level
                .get_bbox_reprojected(&bbox, width, height, native, dst_crs, interpolation, limits)
                .await;
        }

        let cropped = bbox.intersection(&domain).ok_or_else(out_of_domain)?;

        let resolution_x = bbox.width() / f64::from(width);
        let resolution_y = bbox.height() / f64::from(height);
        let cropped = cropped.phase(&bbox, resolution_x, resolution_y);

        let cropped_width = (cropped.width() / resolution_x + 0.5) as u32;
        let cropped_height = (cropped.height() / resolution_y + 0.5) as u32;

        let background = || -> Box<dyn Image> {
            Box::new(NoDataImage::new(
                width,
                height,
                &self.nodata,
                self.sample_format(),
                bbox,
            ))
        };

        if cropped.has_null_area() || cropped_width == 0 || cropped_height == 0 {
            debug!(bbox = %bbox, crs = %dst_crs, "Request barely touches the CRS domain");
            return Ok(background());
        }

        info!(
            bbox = %bbox,
            cropped = %cropped,
            crs = %dst_crs,
            "Request overflows the CRS domain, cropping"
        );

        match level
            .get_bbox_reprojected(
                &cropped,
                cropped_width,
                cropped_height,
                native,
                dst_crs,
                interpolation,
                limits,
            )
            .await
        {
            Ok(inner) => {
                let x = ((cropped.xmin - bbox.xmin) / resolution_x).round() as i64;
                let y = ((bbox.ymax - cropped.ymax) / resolution_y).round() as i64;
                let canvas = Canvas::new(width, height, &self.nodata, self.sample_format(), bbox)
                    .with_image(inner, x, y);
                Ok(Box::new(canvas))
            }
            Err(e) => {
                warn!(bbox = %cropped, error = %e, "Cannot render the cropped request");
                Ok(background())
            }
        }
    }

    /// Copy the levels of `source` from `bottom_id` up to `top_id` (both
    /// included, finest to coarsest) into this pyramid.
    pub fn add_levels(
        &mut self,
        source: &Pyramid,
        bottom_id: &str,
        top_id: &str,
    ) -> Result<(), CompositionError> {
        let mismatch = |field: &'static str, expected: String, actual: String| {
            Err(CompositionError::Mismatch {
                field,
                expected,
                actual,
            })
        };

        if self.tms.id() != source.tms.id() {
            return mismatch("TMS", self.tms.id().to_string(), source.tms.id().to_string());
        }
        if self.format != source.format {
            return mismatch("Format", self.format.to_string(), source.format.to_string());
        }
        if self.photometric != source.photometric {
            let name = |p: Option<Photometric>| p.map_or("none".to_string(), |p| p.to_string());
            return mismatch("Photometric", name(self.photometric), name(source.photometric));
        }
        if self.channels != source.channels {
            return mismatch(
                "Channels count",
                self.channels.to_string(),
                source.channels.to_string(),
            );
        }

        let mut ordered: Vec<&Level> = source.levels.values().collect();
        ordered.sort_by(|a, b| a.res().total_cmp(&b.res()));

        let mut started = false;
        for level in ordered {
            if !started {
                if level.id() != bottom_id {
                    continue;
                }
                started = true;
            }

            if self.levels.contains_key(level.id()) {
                return Err(CompositionError::DuplicateLevel(level.id().to_string()));
            }
            self.levels.insert(level.id().to_string(), level.clone());
            self.refresh_bounds();

            if level.id() == top_id {
                return Ok(());
            }
        }

        if started {
            Err(CompositionError::TopNotFound(top_id.to_string()))
        } else {
            Err(CompositionError::BottomNotFound(bottom_id.to_string()))
        }
    }
}

// =============================================================================
// Broadcast Pyramid
// =============================================================================

/// Builder of a pyramid composed of level ranges of several sources.
///
/// The pyramid is only produced when every range composes.
#[derive(Debug, Default)]
pub struct BroadcastPyramid {
    sources: Vec<(Arc<Pyramid>, String, String)>,
}

impl BroadcastPyramid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the levels of `source` from `bottom_id` (finest) to `top_id`.
    pub fn add(mut self, source: Arc<Pyramid>, bottom_id: &str, top_id: &str) -> Self {
        self.sources
            .push((source, bottom_id.to_string(), top_id.to_string()));
        self
    }

    pub fn build(self) -> Result<Pyramid, CompositionError> {
        let (first, _, _) = self.sources.first().ok_or(CompositionError::NoSource)?;
        let mut pyramid = Pyramid::empty(
            first.tms.clone(),
            first.format,
            first.photometric,
            first.channels,
            first.nodata.clone(),
        );

        for (source, bottom_id, top_id) in &self.sources {
            pyramid.add_levels(source, bottom_id, top_id)?;
        }

        info!(
            levels = pyramid.levels.len(),
            lowest = %pyramid.lowest_level,
            highest = %pyramid.highest_level,
            "Composed broadcast pyramid"
        );
        Ok(pyramid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileContext;
    use crate::tms::TileMatrix;

    fn tms(id: &str, resolutions: &[f64]) -> Arc<TileMatrixSet> {
        let matrices = resolutions
            .iter()
            .map(|&res| TileMatrix {
                id: format!("{}", res),
                res,
                x0: 0.0,
                y0: 0.0,
                tile_width: 256,
                tile_height: 256,
                matrix_width: 4,
                matrix_height: 4,
            })
            .collect();
        Arc::new(TileMatrixSet::new(id, Crs::from_code("EPSG:3857").unwrap(), matrices).unwrap())
    }

    fn pyramid(tms: &Arc<TileMatrixSet>, ids: &[&str], format: TileFormat) -> Pyramid {
        let layout = SlabLayout {
            context: Arc::new(FileContext::new()),
            root: "/nowhere".to_string(),
            path_depth: 2,
            tiles_per_width: 16,
            tiles_per_height: 16,
        };
        let levels = ids
            .iter()
            .map(|id| {
                let tm = tms.get_tile_matrix(id).unwrap().clone();
                Level::new(tm, format, 1, vec![0.0], layout.clone())
            })
            .collect();
        Pyramid::new(tms.clone(), format, Some(Photometric::Gray), 1, vec![0.0], levels).unwrap()
    }

    #[test]
    fn test_best_level() {
        let tms = tms("PM", &[1.0, 2.0, 4.0, 8.0]);
        let pyramid = pyramid(&tms, &["1", "2", "4", "8"], TileFormat::TiffRawU8);

        assert_eq!(pyramid.best_level(1.0, 1.0), "1");
        assert_eq!(pyramid.best_level(3.0, 3.0), "2");
        assert_eq!(pyramid.best_level(0.1, 0.1), "1");
        assert_eq!(pyramid.best_level(100.0, 100.0), "8");
        // Geometric mean of both axes
        assert_eq!(pyramid.best_level(2.0, 8.0), "4");
    }

    #[test]
    fn test_bounds() {
        let tms = tms("PM", &[1.0, 2.0, 4.0, 8.0]);
        let pyramid = pyramid(&tms, &["2", "8", "4"], TileFormat::TiffRawU8);
        assert_eq!(pyramid.lowest_level(), "2");
        assert_eq!(pyramid.highest_level(), "8");
        assert!(pyramid.get_level("1").is_none());
    }

    #[test]
    fn test_level_outside_tms_is_rejected() {
        let tms_a = tms("A", &[1.0, 2.0]);
        let tms_b = tms("B", &[5.0]);
        let foreign = pyramid(&tms_b, &["5"], TileFormat::TiffRawU8);
        let level = foreign.get_level("5").unwrap().clone();

        let result = Pyramid::new(tms_a, TileFormat::TiffRawU8, None, 1, vec![0.0], vec![level]);
        assert!(result.is_err());
    }

    #[test]
    fn test_add_levels() {
        let tms = tms("PM", &[1.0, 2.0, 4.0, 8.0]);
        let fine = Arc::new(pyramid(&tms, &["1", "2", "4", "8"], TileFormat::TiffRawU8));
        let coarse = Arc::new(pyramid(&tms, &["1", "2", "4", "8"], TileFormat::TiffRawU8));

        let composed = BroadcastPyramid::new()
            .add(fine, "1", "2")
            .add(coarse, "4", "8")
            .build()
            .unwrap();

        assert_eq!(composed.levels().len(), 4);
        assert_eq!(composed.lowest_level(), "1");
        assert_eq!(composed.highest_level(), "8");
    }

    #[test]
    fn test_overlapping_ranges_fail() {
        let tms = tms("PM", &[1.0, 2.0, 4.0, 8.0]);
        let a = Arc::new(pyramid(&tms, &["1", "2", "4", "8"], TileFormat::TiffRawU8));
        let b = Arc::new(pyramid(&tms, &["1", "2", "4", "8"], TileFormat::TiffRawU8));

        let result = BroadcastPyramid::new().add(a, "1", "4").add(b, "4", "8").build();
        assert_eq!(result.err(), Some(CompositionError::DuplicateLevel("4".to_string())));
    }

    #[test]
    fn test_missing_bottom_and_top() {
        let tms = tms("PM", &[1.0, 2.0, 4.0, 8.0]);
        let source = pyramid(&tms, &["1", "2", "4"], TileFormat::TiffRawU8);

        let mut target = Pyramid::empty(tms.clone(), TileFormat::TiffRawU8, Some(Photometric::Gray), 1, vec![0.0]);
        assert_eq!(
            target.add_levels(&source, "8", "8"),
            Err(CompositionError::BottomNotFound("8".to_string()))
        );

        let mut target = Pyramid::empty(tms, TileFormat::TiffRawU8, Some(Photometric::Gray), 1, vec![0.0]);
        // Top finer than bottom is never reached
        assert_eq!(
            target.add_levels(&source, "2", "1"),
            Err(CompositionError::TopNotFound("1".to_string()))
        );
    }

    #[test]
    fn test_format_mismatch() {
        let tms = tms("PM", &[1.0, 2.0]);
        let raw = Arc::new(pyramid(&tms, &["1"], TileFormat::TiffRawU8));
        let png = Arc::new(pyramid(&tms, &["2"], TileFormat::TiffPngU8));

        let result = BroadcastPyramid::new().add(raw, "1", "1").add(png, "2", "2").build();
        assert!(matches!(
            result,
            Err(CompositionError::Mismatch { field: "Format", .. })
        ));
    }

    #[test]
    fn test_no_source() {
        assert_eq!(BroadcastPyramid::new().build().err(), Some(CompositionError::NoSource));
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let tms = tms("PM", &[1.0, 2.0]);
        let pyramid = pyramid(&tms, &["1", "2"], TileFormat::TiffRawU8);
        let crs = Crs::from_code("EPSG:3857").unwrap();
        let bbox = BBox::new(0.0, -100.0, 100.0, 0.0);

        let err = pyramid
            .getbbox(WindowLimits::default(), bbox, 0, 10, &crs, Interpolation::Nearest, 0)
            .await
            .err();
        assert_eq!(err, Some(RetrievalError::InvalidSize { width: 0, height: 10 }));
    }
}
