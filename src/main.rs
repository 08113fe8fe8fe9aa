//! GeoTile Streamer - tile-window retrieval for geographic pyramids.
//!
//! This binary loads pyramid descriptors and renders requested extents.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geotile_streamer::{
    config::{CheckConfig, Cli, Command, RenderConfig, SourceConfig},
    format::OutputEncoder,
    geo::Crs,
    pyramid::{Pyramid, PyramidLoader},
    storage::{ContextBook, TileCache},
    tms::TmsBook,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Check(config) => run_check(config).await,
        Command::Render(config) => run_render(config).await,
    }
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    init_logging(config.source.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let pyramid = match load_pyramid(&config.source).await {
        Ok(pyramid) => pyramid,
        Err(message) => {
            error!("{}", message);
            return ExitCode::FAILURE;
        }
    };

    let tms = pyramid.tms();
    println!("Pyramid {}", config.source.pyramid);
    println!("═════════════════════════════════");
    println!("  TMS:       {} ({})", tms.id(), tms.crs());
    println!("  Quad-tree: {}", tms.is_quad_tree());
    println!("  Format:    {}", pyramid.format());
    if let Some(photometric) = pyramid.photometric() {
        println!(
            "  Pixels:    {} x {} channel(s), nodata {:?}",
            photometric,
            pyramid.channels(),
            pyramid.nodata()
        );
    }
    println!();

    let mut levels: Vec<_> = pyramid.levels().values().collect();
    levels.sort_by(|a, b| a.res().total_cmp(&b.res()));

    println!("  {:>8}  {:>16}  {:>20}  {:>10}", "level", "resolution", "tiles (cols x rows)", "slab");
    for level in levels {
        let limits = level.limits();
        println!(
            "  {:>8}  {:>16.6}  {:>20}  {:>10}",
            level.id(),
            level.res(),
            format!(
                "{} x {}",
                limits.max_col - limits.min_col + 1,
                limits.max_row - limits.min_row + 1
            ),
            format!(
                "{}x{}",
                level.layout().tiles_per_width,
                level.layout().tiles_per_height
            ),
        );
    }
    println!();
    println!(
        "  Resolution range: {} (level {}) to {} (level {})",
        pyramid
            .get_level(pyramid.lowest_level())
            .map_or(f64::NAN, |l| l.res()),
        pyramid.lowest_level(),
        pyramid
            .get_level(pyramid.highest_level())
            .map_or(f64::NAN, |l| l.res()),
        pyramid.highest_level(),
    );

    ExitCode::SUCCESS
}

// =============================================================================
// Render Command
// =============================================================================

async fn run_render(config: RenderConfig) -> ExitCode {
    init_logging(config.source.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let pyramid = match load_pyramid(&config.source).await {
        Ok(pyramid) => pyramid,
        Err(message) => {
            error!("{}", message);
            return ExitCode::FAILURE;
        }
    };

    if !pyramid.is_raster() {
        error!("Pyramid {} stores vector tiles and cannot be rendered", config.source.pyramid);
        return ExitCode::FAILURE;
    }

    let crs = match &config.crs {
        Some(code) => match Crs::from_code(code) {
            Ok(crs) => crs,
            Err(e) => {
                error!("Invalid CRS: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => pyramid.crs().clone(),
    };

    info!(
        bbox = %config.bbox,
        width = config.width,
        height = config.height,
        crs = %crs,
        interpolation = %config.interpolation,
        "Rendering"
    );

    let image = match pyramid
        .getbbox(
            config.window_limits(),
            config.bbox,
            config.width,
            config.height,
            &crs,
            config.interpolation,
            config.dpi,
        )
        .await
    {
        Ok(image) => image,
        Err(e) => {
            error!("Cannot render request: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let encoder = OutputEncoder::with_quality(config.jpeg_quality);
    let data = match encoder.encode(image.as_ref(), config.format) {
        Ok(data) => data,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tokio::fs::write(&config.output, &data).await {
        error!("Cannot write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    info!(
        path = %config.output.display(),
        bytes = data.len(),
        mime = config.format.mime_type(),
        "Image written"
    );
    ExitCode::SUCCESS
}

// =============================================================================
// Helpers
// =============================================================================

async fn load_pyramid(source: &SourceConfig) -> Result<Pyramid, String> {
    let tms_book = TmsBook::load_dir(&source.tms_dir)
        .await
        .map_err(|e| e.to_string())?;
    info!(count = tms_book.len(), dir = %source.tms_dir.display(), "Loaded tile matrix sets");

    let mut context_book = ContextBook::new(source.s3_settings());
    if source.cache_tiles > 0 {
        context_book = context_book.with_tile_cache(Arc::new(TileCache::with_capacity(source.cache_tiles)));
    }

    PyramidLoader::new(&tms_book, &mut context_book)
        .load(&source.pyramid)
        .await
        .map_err(|e| e.to_string())
}

/// Initialize logging with tracing-subscriber.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "geotile_streamer=debug"
    } else {
        "geotile_streamer=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
