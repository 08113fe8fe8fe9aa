//! # GeoTile Streamer
//!
//! Resolution selection and tile-window retrieval for tiled geographic
//! pyramids stored on disk or in S3-compatible object storage.
//!
//! Given a geographic extent, an output size and a CRS, the library picks
//! the pyramid level best matching the requested resolution, maps the extent
//! onto the level's tiles, reads and decodes them out of slabs, fills absent
//! tiles with no-data and assembles the result into one logical image,
//! resampling or reprojecting it when needed.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`geo`] - Bounding boxes, CRS definitions and reprojection
//! - [`tms`] - Tile matrix sets and their descriptors
//! - [`raster`] - Logical images: tiles, mosaics, resampling, reprojection
//! - [`io`] - Range readers over files and S3 objects
//! - [`storage`] - Storage contexts, slab addressing and the tile cache
//! - [`mod@format`] - Slab reading, tile codecs and output encoding
//! - [`pyramid`] - Levels, pyramids and descriptor loading
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use geotile_streamer::geo::{BBox, Crs};
//! use geotile_streamer::pyramid::{PyramidLoader, WindowLimits};
//! use geotile_streamer::raster::Interpolation;
//! use geotile_streamer::storage::ContextBook;
//! use geotile_streamer::tms::TmsBook;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tms_book = TmsBook::load_dir("/etc/tms").await?;
//!     let mut context_book = ContextBook::default();
//!     let pyramid = PyramidLoader::new(&tms_book, &mut context_book)
//!         .load("/data/ortho/ortho.json")
//!         .await?;
//!
//!     let crs = Crs::from_code("EPSG:4326")?;
//!     let image = pyramid
//!         .getbbox(
//!             WindowLimits::default(),
//!             BBox::new(2.2, 48.8, 2.4, 48.9),
//!             512,
//!             256,
//!             &crs,
//!             Interpolation::Cubic,
//!             0,
//!         )
//!         .await?;
//!
//!     println!("{}x{}", image.width(), image.height());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod geo;
pub mod io;
pub mod pyramid;
pub mod raster;
pub mod storage;
pub mod tms;

// Re-export commonly used types
pub use config::{CheckConfig, Cli, Command, RenderConfig, SourceConfig};
pub use error::{CompositionError, ConfigError, DecodeError, EncodeError, IoError, RetrievalError};
pub use format::{OutputEncoder, OutputFormat, Photometric, TileFormat};
pub use geo::{BBox, Crs};
pub use pyramid::{BroadcastPyramid, Level, Pyramid, PyramidLoader, WindowLimits};
pub use raster::{Image, Interpolation};
pub use storage::{ContextBook, StorageContext, TileCache};
pub use tms::{TileMatrix, TileMatrixSet, TmsBook};
