//! Axis-aligned bounding boxes in CRS units or in pixel space.

use std::fmt;

/// A bounding box `(xmin, ymin, xmax, ymax)`.
///
/// The same type is used for geographic extents and for fractional pixel
/// windows; in pixel space `y` grows downwards, so `ymin` is the top edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BBox {
    pub const fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Parse `xmin,ymin,xmax,ymax`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let values: Vec<f64> = s
            .split(',')
            .map(|v| {
                v.trim()
                    .parse::<f64>()
                    .map_err(|e| format!("invalid bbox value '{}': {}", v, e))
            })
            .collect::<Result<_, _>>()?;

        if values.len() != 4 {
            return Err(format!("bbox needs 4 values, got {}", values.len()));
        }

        let bbox = Self::new(values[0], values[1], values[2], values[3]);
        if bbox.xmin >= bbox.xmax || bbox.ymin >= bbox.ymax {
            return Err(format!("bbox {} is empty or inverted", bbox));
        }
        Ok(bbox)
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn has_nan(&self) -> bool {
        self.xmin.is_nan() || self.ymin.is_nan() || self.xmax.is_nan() || self.ymax.is_nan()
    }

    pub fn has_null_area(&self) -> bool {
        !(self.xmax > self.xmin && self.ymax > self.ymin)
    }

    /// True if `other` lies entirely within this box (edges included).
    pub fn contains(&self, other: &BBox) -> bool {
        other.xmin >= self.xmin
            && other.xmax <= self.xmax
            && other.ymin >= self.ymin
            && other.ymax <= self.ymax
    }

    /// True if both boxes share a region of non-zero area.
    pub fn intersects(&self, other: &BBox) -> bool {
        self.xmin < other.xmax
            && other.xmin < self.xmax
            && self.ymin < other.ymax
            && other.ymin < self.ymax
    }

    pub fn intersection(&self, other: &BBox) -> Option<BBox> {
        if !self.intersects(other) {
            return None;
        }
        Some(BBox::new(
            self.xmin.max(other.xmin),
            self.ymin.max(other.ymin),
            self.xmax.min(other.xmax),
            self.ymax.min(other.ymax),
        ))
    }

    /// Snap every edge onto the pixel grid of `reference`.
    ///
    /// The grid starts at `reference.xmin` horizontally and `reference.ymax`
    /// vertically, with steps `resx` and `resy`. Each edge moves to the nearest
    /// grid line, so a box cropped out of `reference` maps onto whole pixels
    /// of the full canvas.
    pub fn phase(&self, reference: &BBox, resx: f64, resy: f64) -> BBox {
        let snap_x = |x: f64| reference.xmin + ((x - reference.xmin) / resx).round() * resx;
        let snap_y = |y: f64| reference.ymax - ((reference.ymax - y) / resy).round() * resy;
        BBox::new(
            snap_x(self.xmin),
            snap_y(self.ymin),
            snap_x(self.xmax),
            snap_y(self.ymax),
        )
    }

    /// Points along the four edges, `per_edge` intervals each.
    pub(crate) fn densify(&self, per_edge: usize) -> Vec<(f64, f64)> {
        let per_edge = per_edge.max(1);
        let mut points = Vec::with_capacity(per_edge * 4);
        for i in 0..per_edge {
            let t = i as f64 / per_edge as f64;
            let x = self.xmin + t * self.width();
            let y = self.ymin + t * self.height();
            points.push((x, self.ymin));
            points.push((self.xmax - t * self.width(), self.ymax));
            points.push((self.xmin, self.ymax - t * self.height()));
            points.push((self.xmax, y));
        }
        points
    }

    /// Smallest box enclosing all finite points, `None` if there is none.
    pub(crate) fn enclosing<I>(points: I) -> Option<BBox>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut out: Option<BBox> = None;
        for (x, y) in points {
            if !x.is_finite() || !y.is_finite() {
                continue;
            }
            out = Some(match out {
                None => BBox::new(x, y, x, y),
                Some(b) => BBox::new(b.xmin.min(x), b.ymin.min(y), b.xmax.max(x), b.ymax.max(y)),
            });
        }
        out
    }
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.xmin, self.ymin, self.xmax, self.ymax)
    }
}
