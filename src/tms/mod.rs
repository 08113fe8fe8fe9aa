//! Tile matrix sets: the grid geometry of every resolution level.

mod book;
mod tile_matrix;
mod tile_matrix_set;

pub use book::{parse_tms, TmsBook};
pub use tile_matrix::{TileMatrix, TileMatrixLimits};
pub use tile_matrix_set::TileMatrixSet;
