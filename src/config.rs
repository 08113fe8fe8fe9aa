//! Configuration management for GeoTile Streamer.
//!
//! This module provides the command-line interface, which supports:
//! - Command-line arguments via clap
//! - Environment variables with `GEOTILE_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Environment Variables
//!
//! - `GEOTILE_TMS_DIR` - Directory of tile matrix set descriptors
//! - `GEOTILE_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `GEOTILE_S3_REGION` - AWS region (default: us-east-1)
//! - `GEOTILE_CACHE_TILES` - Encoded tile cache size in bytes (default: 64MB)
//! - `GEOTILE_MAX_TILE_X` - Max tiles per window horizontally (default: 256)
//! - `GEOTILE_MAX_TILE_Y` - Max tiles per window vertically (default: 256)
//! - `GEOTILE_JPEG_QUALITY` - JPEG output quality (default: 85)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::format::{OutputFormat, DEFAULT_JPEG_QUALITY};
use crate::geo::BBox;
use crate::pyramid::{WindowLimits, DEFAULT_MAX_TILES};
use crate::raster::Interpolation;
use crate::storage::{S3Settings, DEFAULT_TILE_CACHE_CAPACITY};

// =============================================================================
// Default Values
// =============================================================================

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default interpolation kernel.
pub const DEFAULT_INTERPOLATION: &str = "bicubic";

/// Largest output image side accepted by `render`.
pub const MAX_OUTPUT_SIZE: u32 = 10_000;

// =============================================================================
// CLI Arguments
// =============================================================================

/// GeoTile Streamer - tile-window retrieval for geographic pyramids.
#[derive(Parser, Debug, Clone)]
#[command(name = "geotile-streamer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Load a pyramid and print its levels.
    Check(CheckConfig),

    /// Render a bbox of a pyramid into an image file.
    Render(RenderConfig),
}

/// Options shared by every command that loads a pyramid.
#[derive(Args, Debug, Clone)]
pub struct SourceConfig {
    /// Directory of tile matrix set descriptors.
    #[arg(long, env = "GEOTILE_TMS_DIR")]
    pub tms_dir: PathBuf,

    /// Pyramid or broadcast descriptor: a file path or `s3://bucket/key`.
    #[arg(long)]
    pub pyramid: String,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "GEOTILE_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "GEOTILE_S3_REGION")]
    pub s3_region: String,

    /// Size of the encoded tile cache in bytes (0 disables it).
    #[arg(long, default_value_t = DEFAULT_TILE_CACHE_CAPACITY, env = "GEOTILE_CACHE_TILES")]
    pub cache_tiles: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl SourceConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.pyramid.trim().is_empty() {
            return Err("Pyramid descriptor is required. Set --pyramid".to_string());
        }
        if self.s3_region.is_empty() {
            return Err("s3_region must not be empty".to_string());
        }
        Ok(())
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            endpoint: self.s3_endpoint.clone(),
            region: self.s3_region.clone(),
        }
    }
}

/// Arguments of the `check` command.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    #[command(flatten)]
    pub source: SourceConfig,
}

impl CheckConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.source.validate()
    }
}

/// Arguments of the `render` command.
#[derive(Args, Debug, Clone)]
pub struct RenderConfig {
    #[command(flatten)]
    pub source: SourceConfig,

    /// Requested extent: `xmin,ymin,xmax,ymax` in the request CRS.
    #[arg(long, value_parser = BBox::parse, allow_hyphen_values = true)]
    pub bbox: BBox,

    /// Output width in pixels.
    #[arg(long)]
    pub width: u32,

    /// Output height in pixels.
    #[arg(long)]
    pub height: u32,

    /// Request CRS (defaults to the pyramid's native CRS).
    #[arg(long)]
    pub crs: Option<String>,

    /// Interpolation kernel: nn, linear, bicubic, lanczos.
    #[arg(long, default_value = DEFAULT_INTERPOLATION)]
    pub interpolation: Interpolation,

    /// Display DPI; 0 keeps the request resolution.
    #[arg(long, default_value_t = 0)]
    pub dpi: u32,

    /// Output format: png, jpeg or bil.
    #[arg(long, default_value = "png")]
    pub format: OutputFormat,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "GEOTILE_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Maximum number of tiles a window may touch horizontally.
    #[arg(long, default_value_t = DEFAULT_MAX_TILES, env = "GEOTILE_MAX_TILE_X")]
    pub max_tile_x: u32,

    /// Maximum number of tiles a window may touch vertically.
    #[arg(long, default_value_t = DEFAULT_MAX_TILES, env = "GEOTILE_MAX_TILE_Y")]
    pub max_tile_y: u32,

    /// Output file.
    #[arg(short, long)]
    pub output: PathBuf,
}

impl RenderConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.source.validate()?;

        if self.width == 0 || self.height == 0 {
            return Err("width and height must be greater than 0".to_string());
        }
        if self.width > MAX_OUTPUT_SIZE || self.height > MAX_OUTPUT_SIZE {
            return Err(format!(
                "width and height must not exceed {}",
                MAX_OUTPUT_SIZE
            ));
        }
        if self.bbox.has_nan() || self.bbox.has_null_area() {
            return Err(format!("bbox {} has a null area", self.bbox));
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }
        if self.max_tile_x == 0 || self.max_tile_y == 0 {
            return Err("max_tile_x and max_tile_y must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn window_limits(&self) -> WindowLimits {
        WindowLimits {
            max_tile_x: self.max_tile_x,
            max_tile_y: self.max_tile_y,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
