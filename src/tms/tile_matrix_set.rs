use std::collections::BTreeMap;

use tracing::debug;

use super::{TileMatrix, TileMatrixLimits};
use crate::geo::{BBox, Crs};

/// Tolerance on the resolution doubling between quad-tree levels.
const QUAD_TREE_TOLERANCE: f64 = 0.0001;

/// Accepted resolution ratios when matching a foreign tile matrix.
const CORRESPONDING_MIN_RATIO: f64 = 0.8;
const CORRESPONDING_MAX_RATIO: f64 = 1.5;

/// An ordered family of tile matrices sharing one CRS.
///
/// Immutable once built; shared between pyramids through `Arc`.
#[derive(Debug, Clone)]
pub struct TileMatrixSet {
    id: String,
    crs: Crs,
    title: String,
    description: String,
    keywords: Vec<String>,
    tile_matrices: BTreeMap<String, TileMatrix>,
    is_quad_tree: bool,
}

impl TileMatrixSet {
    /// Build a set from its matrices, validating each of them.
    pub fn new(id: &str, crs: Crs, matrices: Vec<TileMatrix>) -> Result<Self, String> {
        if matrices.is_empty() {
            return Err(format!("tile matrix set {} has no tile matrix", id));
        }

        let mut tile_matrices = BTreeMap::new();
        for tm in matrices {
            tm.validate()?;
            if tile_matrices.contains_key(&tm.id) {
                return Err(format!("tile matrix {} is defined twice in {}", tm.id, id));
            }
            tile_matrices.insert(tm.id.clone(), tm);
        }

        let mut tms = Self {
            id: id.to_string(),
            crs,
            title: String::new(),
            description: String::new(),
            keywords: Vec::new(),
            tile_matrices,
            is_quad_tree: false,
        };
        tms.is_quad_tree = tms.detect_quad_tree();

        debug!(
            tms = %tms.id,
            matrices = tms.tile_matrices.len(),
            quad_tree = tms.is_quad_tree,
            "Built tile matrix set"
        );

        Ok(tms)
    }

    /// Attach the descriptive metadata.
    pub fn with_metadata(mut self, title: &str, description: &str, keywords: Vec<String>) -> Self {
        self.title = title.to_string();
        self.description = description.to_string();
        self.keywords = keywords;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_quad_tree(&self) -> bool {
        self.is_quad_tree
    }

    pub fn get_tile_matrix(&self, id: &str) -> Option<&TileMatrix> {
        self.tile_matrices.get(id)
    }

    /// Tile matrices keyed by id.
    pub fn tile_matrices(&self) -> &BTreeMap<String, TileMatrix> {
        &self.tile_matrices
    }

    /// Tile matrices sorted by resolution, finest first when `ascending`.
    pub fn ordered_tile_matrices(&self, ascending: bool) -> Vec<&TileMatrix> {
        let mut ordered: Vec<&TileMatrix> = self.tile_matrices.values().collect();
        ordered.sort_by(|a, b| a.res.total_cmp(&b.res));
        if !ascending {
            ordered.reverse();
        }
        ordered
    }

    /// Tile limits of `tm` covering `bbox`.
    pub fn tile_limits_from_bbox(&self, tm: &TileMatrix, bbox: &BBox) -> TileMatrixLimits {
        tm.bbox_to_tile_limits(bbox)
    }

    /// Extent of the tiles of `tm` inside `limits`.
    pub fn bbox_from_tile_limits(&self, tm: &TileMatrix, limits: &TileMatrixLimits) -> BBox {
        tm.bbox_from_tile_limits(limits)
    }

    /// Each level, from the finest, must double the resolution of the previous
    /// one and keep its origin and tile size.
    fn detect_quad_tree(&self) -> bool {
        let ordered = self.ordered_tile_matrices(true);
        let Some((reference, rest)) = ordered.split_first() else {
            return false;
        };

        let mut res = reference.res;
        for tm in rest {
            let doubles = (res * 2.0 - tm.res).abs() < QUAD_TREE_TOLERANCE * res;
            let same_grid = tm.x0 == reference.x0
                && tm.y0 == reference.y0
                && tm.tile_width == reference.tile_width
                && tm.tile_height == reference.tile_height;

            if !(doubles && same_grid) {
                return false;
            }
            res = tm.res;
        }
        true
    }

    /// Find the tile matrix of this set whose resolution best matches
    /// `foreign_tm` from another set.
    ///
    /// Resolutions are compared through the ratio of both CRS extents over
    /// their common geographic definition area. Only candidates within
    /// `[0.8, 1.5]` of the target are considered.
    pub fn corresponding_tile_matrix(
        &self,
        foreign_tm: &TileMatrix,
        foreign_tms: &TileMatrixSet,
    ) -> Option<&TileMatrix> {
        let common = self
            .crs
            .definition_area()
            .intersection(&foreign_tms.crs.definition_area())?;

        let geographic = Crs::wgs84();
        let this_area = common.reproject(&geographic, &self.crs)?;
        let foreign_area = common.reproject(&geographic, &foreign_tms.crs)?;

        let ratio_x = this_area.width() / foreign_area.width();
        let ratio_y = this_area.height() / foreign_area.height();
        let resolution = ((foreign_tm.res * ratio_x) * (foreign_tm.res * ratio_y)).sqrt();

        let mut best: Option<(&TileMatrix, f64)> = None;
        for tm in self.tile_matrices.values() {
            let d = resolution / tm.res;
            if !(CORRESPONDING_MIN_RATIO..=CORRESPONDING_MAX_RATIO).contains(&d) {
                continue;
            }
            match best {
                Some((_, ratio)) if (d - 1.0).abs() >= (ratio - 1.0).abs() => {}
                _ => best = Some((tm, d)),
            }
        }

        best.map(|(tm, _)| tm)
    }
}
