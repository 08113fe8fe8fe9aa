//! Geometry primitives: bounding boxes and coordinate reference systems.

mod bbox;
mod crs;

pub use bbox::BBox;
pub use crs::{Crs, Reprojector};
