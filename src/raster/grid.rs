//! Per-request sampling grid used by reprojection.

use crate::geo::{BBox, Crs, Reprojector};

/// Coordinates of every output pixel center.
///
/// Starts in the destination CRS, is reprojected into the source CRS and
/// finally mapped into the pixel space of the fetched source window.
#[derive(Debug, Clone)]
pub struct Grid {
    width: u32,
    height: u32,
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl Grid {
    /// Pixel centers of a `width x height` image covering `bbox`.
    pub fn new(width: u32, height: u32, bbox: &BBox) -> Self {
        let res_x = bbox.width() / f64::from(width);
        let res_y = bbox.height() / f64::from(height);
        let count = width as usize * height as usize;

        let mut xs = Vec::with_capacity(count);
        let mut ys = Vec::with_capacity(count);
        for j in 0..height {
            let y = bbox.ymax - (f64::from(j) + 0.5) * res_y;
            for i in 0..width {
                xs.push(bbox.xmin + (f64::from(i) + 0.5) * res_x);
                ys.push(y);
            }
        }

        Self {
            width,
            height,
            xs,
            ys,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Reproject every point from `from` into `to`.
    ///
    /// Points that fail to transform become NaN. Fails only when no point
    /// could be transformed at all.
    pub fn reproject(&mut self, from: &Crs, to: &Crs) -> Result<(), String> {
        if from.is_equivalent(to) {
            return Ok(());
        }

        let reprojector = Reprojector::new(from, to)?;
        let mut transformed = 0usize;
        for (x, y) in self.xs.iter_mut().zip(self.ys.iter_mut()) {
            match reprojector.point(*x, *y) {
                Some((px, py)) => {
                    *x = px;
                    *y = py;
                    transformed += 1;
                }
                None => {
                    *x = f64::NAN;
                    *y = f64::NAN;
                }
            }
        }

        if transformed == 0 && !self.xs.is_empty() {
            return Err(format!("no grid point could be reprojected from {} to {}", from, to));
        }
        Ok(())
    }

    /// Enclosing box of all points; NaN as soon as one point is NaN.
    pub fn bbox(&self) -> BBox {
        let mut bbox = BBox::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (&x, &y) in self.xs.iter().zip(&self.ys) {
            if x.is_nan() || y.is_nan() {
                return BBox::new(f64::NAN, f64::NAN, f64::NAN, f64::NAN);
            }
            bbox.xmin = bbox.xmin.min(x);
            bbox.ymin = bbox.ymin.min(y);
            bbox.xmax = bbox.xmax.max(x);
            bbox.ymax = bbox.ymax.max(y);
        }
        bbox
    }

    /// Apply `x = a * x + b` and `y = c * y + d` to every point.
    pub fn affine_transform(&mut self, a: f64, b: f64, c: f64, d: f64) {
        for x in &mut self.xs {
            *x = a * *x + b;
        }
        for y in &mut self.ys {
            *y = c * *y + d;
        }
    }

    /// Coordinates of output pixel `(i, j)`.
    pub fn point(&self, i: u32, j: u32) -> (f64, f64) {
        let index = j as usize * self.width as usize + i as usize;
        (self.xs[index], self.ys[index])
    }
}
