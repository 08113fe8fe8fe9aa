//! Pyramid descriptor loading.
//!
//! A pyramid descriptor is a JSON document naming its tile matrix set, its
//! tile format and, for every level, where the slabs are stored:
//!
//! ```json
//! {
//!   "tile_matrix_set": "PM",
//!   "format": "TIFF_JPG_UINT8",
//!   "raster_specifications": {"photometric": "rgb", "channels": 3, "nodata": "255,255,255"},
//!   "levels": [{
//!     "id": "12",
//!     "storage": {"type": "FILE", "image_directory": "IMAGE/12", "path_depth": 2},
//!     "tiles_per_width": 16,
//!     "tiles_per_height": 16,
//!     "tile_limits": {"min_row": 1400, "max_row": 1500, "min_col": 2000, "max_col": 2100}
//!   }]
//! }
//! ```
//!
//! A broadcast descriptor instead composes level ranges of other pyramids,
//! from the finest (`bottom_level`) to the coarsest (`top_level`). Relative
//! paths are resolved against the descriptor's location:
//!
//! ```json
//! {
//!   "pyramids": [
//!     {"path": "ortho_2024.json", "bottom_level": "19", "top_level": "14"},
//!     {"path": "s3://archive/ortho_2010.json", "bottom_level": "13", "top_level": "0"}
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{BroadcastPyramid, Level, Pyramid, SlabLayout, Table};
use crate::error::ConfigError;
use crate::format::{Photometric, TileFormat};
use crate::storage::{ContextBook, ContextKind};
use crate::tms::{TileMatrixLimits, TmsBook};

/// No-data value used for channels the descriptor leaves empty.
pub const DEFAULT_NODATA: f32 = -99999.0;

const DEFAULT_PATH_DEPTH: u32 = 2;

// =============================================================================
// Descriptor Schema
// =============================================================================

#[derive(Debug, Deserialize)]
struct PyramidDescriptor {
    tile_matrix_set: String,
    format: String,
    #[serde(default)]
    raster_specifications: Option<RasterSpecifications>,
    levels: Vec<LevelDescriptor>,
}

#[derive(Debug, Deserialize)]
struct RasterSpecifications {
    photometric: String,
    channels: usize,
    #[serde(default)]
    nodata: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LevelDescriptor {
    id: String,
    storage: StorageDescriptor,
    tiles_per_width: u32,
    tiles_per_height: u32,
    #[serde(default)]
    tile_limits: Option<TileLimitsDescriptor>,
    #[serde(default)]
    tables: Vec<Table>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
enum StorageDescriptor {
    File {
        image_directory: String,
        #[serde(default = "default_path_depth")]
        path_depth: u32,
    },
    S3 {
        bucket_name: String,
        image_prefix: String,
    },
}

#[derive(Debug, Deserialize)]
struct BroadcastDescriptor {
    pyramids: Vec<BroadcastSource>,
}

#[derive(Debug, Deserialize)]
struct BroadcastSource {
    path: String,
    bottom_level: String,
    top_level: String,
}

fn is_broadcast(json: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Value>(json)
        .is_ok_and(|doc| doc.get("pyramids").is_some())
}

/// Location of a pyramid named by a broadcast descriptor at `descriptor`.
fn source_location(descriptor: &str, path: &str, base_dir: Option<&Path>) -> String {
    if path.starts_with("s3://") || Path::new(path).is_absolute() {
        return path.to_string();
    }
    match base_dir {
        Some(base) => base.join(path).display().to_string(),
        None => match descriptor.rsplit_once('/') {
            Some((dir, _)) => format!("{}/{}", dir, path),
            None => path.to_string(),
        },
    }
}

fn default_path_depth() -> u32 {
    DEFAULT_PATH_DEPTH
}

#[derive(Debug, Deserialize)]
struct TileLimitsDescriptor {
    min_row: u32,
    max_row: u32,
    min_col: u32,
    max_col: u32,
}

/// Parse a comma-separated no-data string into one value per channel.
///
/// Empty items take [`DEFAULT_NODATA`]; extra values are ignored.
pub fn parse_nodata(value: &str, channels: usize) -> Result<Vec<f32>, String> {
    let values = value
        .split(',')
        .map(|item| {
            let item = item.trim();
            if item.is_empty() {
                Ok(DEFAULT_NODATA)
            } else {
                item.parse::<f32>()
                    .map_err(|_| format!("invalid nodata value '{}'", item))
            }
        })
        .collect::<Result<Vec<f32>, String>>()?;

    if values.len() < channels {
        return Err(format!(
            "nodata has {} values for {} channels",
            values.len(),
            channels
        ));
    }
    Ok(values.into_iter().take(channels).collect())
}

// =============================================================================
// Pyramid Loader
// =============================================================================

/// Loads pyramid descriptors against explicit registries.
///
/// Tile matrix sets come from the [`TmsBook`]; storage contexts are created
/// or reused through the [`ContextBook`], so levels of every pyramid loaded
/// with the same book share them.
pub struct PyramidLoader<'a> {
    tms_book: &'a TmsBook,
    context_book: &'a mut ContextBook,
}

impl<'a> PyramidLoader<'a> {
    pub fn new(tms_book: &'a TmsBook, context_book: &'a mut ContextBook) -> Self {
        Self {
            tms_book,
            context_book,
        }
    }

    /// Load the descriptor at `location`, a file path or `s3://bucket/key`.
    ///
    /// Broadcast descriptors are composed from the pyramids they name.
    pub async fn load(&mut self, location: &str) -> Result<Pyramid, ConfigError> {
        let (json, base_dir) = self.read(location).await?;
        if is_broadcast(&json) {
            self.compose(location, &json, base_dir.as_deref()).await
        } else {
            self.parse_logged(location, &json, base_dir.as_deref()).await
        }
    }

    /// Load the broadcast descriptor at `location`.
    ///
    /// Fails as a whole if any source pyramid cannot be loaded or any level
    /// range does not compose.
    pub async fn load_broadcast(&mut self, location: &str) -> Result<Pyramid, ConfigError> {
        let (json, base_dir) = self.read(location).await?;
        self.compose(location, &json, base_dir.as_deref()).await
    }

    async fn read(&mut self, location: &str) -> Result<(Bytes, Option<PathBuf>), ConfigError> {
        let (context, key) = self
            .context_book
            .resolve(location)
            .await
            .ok_or_else(|| ConfigError::Invalid {
                path: location.to_string(),
                message: "unsupported descriptor location".to_string(),
            })?;

        let json = context
            .read_full(&key)
            .await
            .map_err(|source| ConfigError::Read {
                path: location.to_string(),
                source,
            })?;

        let base_dir = match context.kind() {
            ContextKind::File => Path::new(&key).parent().map(|p| p.to_path_buf()),
            ContextKind::S3 => None,
        };
        Ok((json, base_dir))
    }

    async fn parse_logged(
        &mut self,
        location: &str,
        json: &[u8],
        base_dir: Option<&Path>,
    ) -> Result<Pyramid, ConfigError> {
        let pyramid = self.parse(location, json, base_dir).await?;
        info!(
            path = location,
            levels = pyramid.levels().len(),
            format = %pyramid.format(),
            "Loaded pyramid"
        );
        Ok(pyramid)
    }

    async fn compose(
        &mut self,
        location: &str,
        json: &[u8],
        base_dir: Option<&Path>,
    ) -> Result<Pyramid, ConfigError> {
        let descriptor: BroadcastDescriptor =
            serde_json::from_slice(json).map_err(|e| ConfigError::Parse {
                path: location.to_string(),
                message: e.to_string(),
            })?;

        let mut broadcast = BroadcastPyramid::new();
        for source in &descriptor.pyramids {
            let path = source_location(location, &source.path, base_dir);
            let (json, source_dir) = self.read(&path).await?;
            let pyramid = self.parse_logged(&path, &json, source_dir.as_deref()).await?;
            broadcast = broadcast.add(Arc::new(pyramid), &source.bottom_level, &source.top_level);
        }

        let pyramid = broadcast.build().map_err(|e| {
            warn!(path = location, error = %e, "Cannot compose broadcast pyramid");
            ConfigError::from(e)
        })?;
        info!(
            path = location,
            sources = descriptor.pyramids.len(),
            levels = pyramid.levels().len(),
            "Loaded broadcast pyramid"
        );
        Ok(pyramid)
    }

    /// Build a pyramid from descriptor bytes.
    ///
    /// Relative image directories are resolved against `base_dir`.
    pub async fn parse(
        &mut self,
        path: &str,
        json: &[u8],
        base_dir: Option<&Path>,
    ) -> Result<Pyramid, ConfigError> {
        let descriptor: PyramidDescriptor =
            serde_json::from_slice(json).map_err(|e| ConfigError::Parse {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        let invalid = |message: String| ConfigError::Invalid {
            path: path.to_string(),
            message,
        };

        let tms = self
            .tms_book
            .get(&descriptor.tile_matrix_set)
            .ok_or_else(|| ConfigError::UnknownTms {
                path: path.to_string(),
                tms: descriptor.tile_matrix_set.clone(),
            })?;

        let format: TileFormat = descriptor.format.parse().map_err(invalid)?;

        let (photometric, channels, nodata) = if format.is_raster() {
            let specs = descriptor
                .raster_specifications
                .as_ref()
                .ok_or_else(|| invalid("raster pyramid without raster_specifications".to_string()))?;

            let photometric: Photometric = specs.photometric.parse().map_err(invalid)?;
            if specs.channels == 0 {
                return Err(invalid("channels must be >= 1".to_string()));
            }
            let nodata = match &specs.nodata {
                Some(value) => parse_nodata(value, specs.channels).map_err(invalid)?,
                None => vec![DEFAULT_NODATA; specs.channels],
            };
            (Some(photometric), specs.channels, nodata)
        } else {
            (None, 0, Vec::new())
        };

        if descriptor.levels.is_empty() {
            return Err(invalid("no level".to_string()));
        }

        let mut levels = Vec::with_capacity(descriptor.levels.len());
        for level in descriptor.levels {
            let tm = tms
                .get_tile_matrix(&level.id)
                .ok_or_else(|| {
                    invalid(format!("level {} is not in TMS {}", level.id, tms.id()))
                })?
                .clone();

            if level.tiles_per_width == 0 || level.tiles_per_height == 0 {
                return Err(invalid(format!("level {}: slab size must be >= 1", level.id)));
            }

            let (kind, tray, root, path_depth) = match level.storage {
                StorageDescriptor::File {
                    image_directory,
                    path_depth,
                } => {
                    let directory = Path::new(&image_directory);
                    let root = match base_dir {
                        Some(base) if directory.is_relative() => base.join(directory),
                        _ => directory.to_path_buf(),
                    };
                    (ContextKind::File, String::new(), root.display().to_string(), path_depth)
                }
                StorageDescriptor::S3 {
                    bucket_name,
                    image_prefix,
                } => (ContextKind::S3, bucket_name, image_prefix, 0),
            };

            let context = self.context_book.get_or_create(kind, &tray).await;
            debug!(level = %level.id, kind = %kind, root = %root, "Level storage");

            let layout = SlabLayout {
                context,
                root,
                path_depth,
                tiles_per_width: level.tiles_per_width,
                tiles_per_height: level.tiles_per_height,
            };

            let mut built = Level::new(tm, format, channels, nodata.clone(), layout)
                .with_tables(level.tables);
            if let Some(limits) = level.tile_limits {
                built = built.with_limits(&TileMatrixLimits::new(
                    &level.id,
                    limits.min_row,
                    limits.max_row,
                    limits.min_col,
                    limits.max_col,
                ));
            }
            if let Some(cache) = self.context_book.tile_cache() {
                built = built.with_tile_cache(cache);
            }
            levels.push(built);
        }

        Pyramid::new(Arc::clone(&tms), format, photometric, channels, nodata, levels).map_err(invalid)
    }
}
