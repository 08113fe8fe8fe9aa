//! Registry of tile matrix sets loaded from JSON descriptors.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use super::{TileMatrix, TileMatrixSet};
use crate::error::{ConfigError, IoError};
use crate::geo::Crs;

// =============================================================================
// Descriptor Schema
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TmsDescriptor {
    crs: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    keywords: Vec<String>,
    tile_matrices: Vec<TileMatrixDescriptor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TileMatrixDescriptor {
    id: String,
    cell_size: f64,
    tile_width: u32,
    tile_height: u32,
    matrix_width: u32,
    matrix_height: u32,
    point_of_origin: [f64; 2],
}

impl From<TileMatrixDescriptor> for TileMatrix {
    fn from(d: TileMatrixDescriptor) -> Self {
        TileMatrix {
            id: d.id,
            res: d.cell_size,
            x0: d.point_of_origin[0],
            y0: d.point_of_origin[1],
            tile_width: d.tile_width,
            tile_height: d.tile_height,
            matrix_width: d.matrix_width,
            matrix_height: d.matrix_height,
        }
    }
}

/// Parse one TMS descriptor; `id` is the file stem.
pub fn parse_tms(id: &str, path: &str, json: &[u8]) -> Result<TileMatrixSet, ConfigError> {
    let descriptor: TmsDescriptor = serde_json::from_slice(json).map_err(|e| ConfigError::Parse {
        path: path.to_string(),
        message: e.to_string(),
    })?;

    let invalid = |message: String| ConfigError::Invalid {
        path: path.to_string(),
        message,
    };

    let crs = Crs::from_code(&descriptor.crs).map_err(invalid)?;
    let matrices = descriptor
        .tile_matrices
        .into_iter()
        .map(TileMatrix::from)
        .collect();

    let tms = TileMatrixSet::new(id, crs, matrices).map_err(invalid)?;
    Ok(tms.with_metadata(&descriptor.title, &descriptor.description, descriptor.keywords))
}

// =============================================================================
// TMS Book
// =============================================================================

/// Read-only registry of tile matrix sets, keyed by id.
///
/// Built once at startup and passed explicitly to the pyramid loader.
#[derive(Debug, Default, Clone)]
pub struct TmsBook {
    sets: HashMap<String, Arc<TileMatrixSet>>,
}

impl TmsBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` file of `dir`.
    ///
    /// A descriptor that fails to load is logged and skipped; the call fails
    /// only if the directory cannot be listed.
    pub async fn load_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let read_error = |e: std::io::Error| ConfigError::Read {
            path: dir.display().to_string(),
            source: IoError::File {
                path: dir.display().to_string(),
                message: e.to_string(),
            },
        };

        let mut book = Self::new();
        let mut entries = tokio::fs::read_dir(dir).await.map_err(read_error)?;

        while let Some(entry) = entries.next_entry().await.map_err(read_error)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let shown = path.display().to_string();
            let json = match tokio::fs::read(&path).await {
                Ok(json) => json,
                Err(e) => {
                    warn!(path = %shown, error = %e, "Cannot read TMS descriptor");
                    continue;
                }
            };

            match parse_tms(id, &shown, &json) {
                Ok(tms) => {
                    info!(tms = id, "Loaded tile matrix set");
                    book.insert(tms);
                }
                Err(e) => warn!(error = %e, "Skipping tile matrix set"),
            }
        }

        Ok(book)
    }

    pub fn insert(&mut self, tms: TileMatrixSet) {
        self.sets.insert(tms.id().to_string(), Arc::new(tms));
    }

    pub fn get(&self, id: &str) -> Option<Arc<TileMatrixSet>> {
        self.sets.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
