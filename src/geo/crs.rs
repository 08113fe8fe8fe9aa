//! Coordinate reference systems and point/bbox reprojection.
//!
//! Projection definitions come from the `crs-definitions` database and the
//! math from `proj4rs`. A [`Crs`] only stores the PROJ string; the
//! [`Reprojector`] that actually holds `proj4rs` projections is built per
//! request and dropped before any await point.

use std::fmt;

use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use super::BBox;

/// Geographic extent used when nothing better is known for a CRS.
const WORLD: BBox = BBox::new(-180.0, -90.0, 180.0, 90.0);

/// Latitude limit of the spherical mercator square.
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_6;

/// Number of intervals per edge when reprojecting a bbox.
const DENSIFY_POINTS: usize = 64;

/// Codes that only differ by authority or axis order.
const EQUIVALENT_CODES: &[&[&str]] = &[
    &["EPSG:4326", "CRS:84", "OGC:CRS84", "WGS84G"],
    &["EPSG:3857", "EPSG:3785"],
];

const LONGLAT_WGS84: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// A coordinate reference system identified by its request code.
#[derive(Debug, Clone)]
pub struct Crs {
    /// Code as written in descriptors and requests ("EPSG:3857")
    code: String,
    proj_string: String,
    geographic: bool,
    /// Validity domain in longitude/latitude degrees
    definition_area: BBox,
}

impl Crs {
    /// Resolve a request code such as `EPSG:2154` or `CRS:84`.
    pub fn from_code(code: &str) -> Result<Self, String> {
        let normalized = code.trim().to_uppercase();

        if matches!(normalized.as_str(), "CRS:84" | "OGC:CRS84" | "WGS84G") {
            return Self::from_proj_string(&normalized, LONGLAT_WGS84);
        }

        let number = normalized
            .strip_prefix("EPSG:")
            .ok_or_else(|| format!("unsupported CRS authority in '{}'", code))?;
        let epsg: u16 = number
            .parse()
            .map_err(|_| format!("invalid EPSG code '{}'", code))?;

        let proj = crs_definitions::from_code(epsg)
            .map(|def| def.proj4)
            .ok_or_else(|| format!("{} is not in the CRS database", normalized))?;

        let mut crs = Self::from_proj_string(&normalized, proj)?;
        crs.definition_area = known_definition_area(epsg).unwrap_or(crs.definition_area);
        Ok(crs)
    }

    /// Build a CRS from an explicit PROJ string.
    ///
    /// The definition area defaults to the whole world, or to the mercator
    /// square for `+proj=merc`.
    pub fn from_proj_string(code: &str, proj_string: &str) -> Result<Self, String> {
        Proj::from_proj_string(proj_string)
            .map_err(|e| format!("invalid projection for {}: {:?}", code, e))?;

        let geographic = proj_string.contains("+proj=longlat");
        let definition_area = if proj_string.contains("+proj=merc") {
            BBox::new(-180.0, -MERCATOR_MAX_LAT, 180.0, MERCATOR_MAX_LAT)
        } else {
            WORLD
        };

        Ok(Self {
            code: code.to_string(),
            proj_string: proj_string.to_string(),
            geographic,
            definition_area,
        })
    }

    /// Override the validity domain (longitude/latitude degrees).
    pub fn with_definition_area(mut self, area: BBox) -> Self {
        self.definition_area = area;
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn proj_string(&self) -> &str {
        &self.proj_string
    }

    pub fn is_geographic(&self) -> bool {
        self.geographic
    }

    /// Validity domain in longitude/latitude degrees.
    pub fn definition_area(&self) -> BBox {
        self.definition_area
    }

    /// Validity domain expressed in this CRS's own units.
    pub fn native_definition_area(&self) -> Option<BBox> {
        if self.geographic {
            return Some(self.definition_area);
        }
        let geographic = Crs::wgs84();
        let reprojector = Reprojector::new(&geographic, self).ok()?;
        reprojector.bbox(&self.definition_area)
    }

    /// True if `bbox`, given in this CRS, lies within the validity domain.
    pub fn contains_bbox(&self, bbox: &BBox) -> bool {
        match self.native_definition_area() {
            Some(area) => area.contains(bbox),
            None => false,
        }
    }

    /// True if both codes designate the same coordinate system.
    pub fn is_equivalent(&self, other: &Crs) -> bool {
        if self.code == other.code {
            return true;
        }
        let same_group = EQUIVALENT_CODES
            .iter()
            .any(|group| group.contains(&self.code.as_str()) && group.contains(&other.code.as_str()));
        if same_group {
            return true;
        }
        canonical_tokens(&self.proj_string) == canonical_tokens(&other.proj_string)
    }

    /// Reproject a single point from this CRS into `to`.
    pub fn reproject_point(&self, to: &Crs, x: f64, y: f64) -> Option<(f64, f64)> {
        Reprojector::new(self, to).ok()?.point(x, y)
    }

    pub(crate) fn wgs84() -> Crs {
        Crs {
            code: "CRS:84".to_string(),
            proj_string: LONGLAT_WGS84.to_string(),
            geographic: true,
            definition_area: WORLD,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

impl BBox {
    /// Reproject this bbox from `from` into `to`.
    ///
    /// The edges are densified before transformation so curved boundaries
    /// are enclosed. Returns `None` when no edge point survives the
    /// transformation.
    pub fn reproject(&self, from: &Crs, to: &Crs) -> Option<BBox> {
        if from.is_equivalent(to) {
            return Some(*self);
        }
        Reprojector::new(from, to).ok()?.bbox(self)
    }
}

/// Validity domains of common codes whose PROJ string does not tell them.
fn known_definition_area(epsg: u16) -> Option<BBox> {
    match epsg {
        3857 | 3785 => Some(BBox::new(-180.0, -MERCATOR_MAX_LAT, 180.0, MERCATOR_MAX_LAT)),
        3395 => Some(BBox::new(-180.0, -80.0, 180.0, 84.0)),
        2154 => Some(BBox::new(-9.86, 41.15, 10.38, 51.56)),
        32601..=32660 => {
            let west = -180.0 + 6.0 * f64::from(epsg - 32601);
            Some(BBox::new(west, 0.0, west + 6.0, 84.0))
        }
        32701..=32760 => {
            let west = -180.0 + 6.0 * f64::from(epsg - 32701);
            Some(BBox::new(west, -80.0, west + 6.0, 0.0))
        }
        _ => None,
    }
}

fn canonical_tokens(proj_string: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = proj_string
        .split_whitespace()
        .filter(|t| *t != "+no_defs" && *t != "+type=crs" && !t.starts_with("+towgs84=0,0,0"))
        .collect();
    tokens.sort_unstable();
    tokens
}

// =============================================================================
// Reprojector
// =============================================================================

/// Point transformer between two CRSs.
///
/// Converts degrees to and from the radians `proj4rs` works with for
/// geographic systems.
pub struct Reprojector {
    source: Proj,
    target: Proj,
    source_is_geographic: bool,
    target_is_geographic: bool,
}

impl Reprojector {
    pub fn new(from: &Crs, to: &Crs) -> Result<Self, String> {
        let source = Proj::from_proj_string(&from.proj_string)
            .map_err(|e| format!("invalid source projection {}: {:?}", from, e))?;
        let target = Proj::from_proj_string(&to.proj_string)
            .map_err(|e| format!("invalid target projection {}: {:?}", to, e))?;

        Ok(Self {
            source,
            target,
            source_is_geographic: from.geographic,
            target_is_geographic: to.geographic,
        })
    }

    /// Transform one point, `None` on failure or non-finite output.
    pub fn point(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let mut point = if self.source_is_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        transform(&self.source, &self.target, &mut point).ok()?;

        let (out_x, out_y) = if self.target_is_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };

        if out_x.is_finite() && out_y.is_finite() {
            Some((out_x, out_y))
        } else {
            None
        }
    }

    /// Transform a bbox through its densified edges.
    pub fn bbox(&self, bbox: &BBox) -> Option<BBox> {
        let points = bbox
            .densify(DENSIFY_POINTS)
            .into_iter()
            .filter_map(|(x, y)| self.point(x, y));
        BBox::enclosing(points)
    }
}
