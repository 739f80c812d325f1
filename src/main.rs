//! tilescope - view a very large image through a tiled, bounded-memory core.
//!
//! This binary stands in for the scroll/zoom widget: it loads an image,
//! builds the zoom pyramid, then walks a scripted pan and zoom path through
//! the viewport, reporting tile traffic along the way.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tilescope::{
    build_overview, Config, LevelInfo, RectF, ResampleDecoder, SourceImage, TiledViewport,
    ViewportStats,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    // Session start: the one fatal error class.
    let source = match SourceImage::open(&config.image) {
        Ok(source) => Arc::new(source),
        Err(e) => {
            error!("Cannot open {}: {}", config.image.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let decoder = Arc::new(ResampleDecoder::new());
    let viewport = match TiledViewport::new(source.clone(), decoder.clone(), config.tiling()) {
        Ok(viewport) => viewport,
        Err(e) => {
            error!("Cannot start tiling session: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Image: {}", config.image.display());
    info!(
        "  {}x{} px, tile edge {}, prefetch margin {}",
        source.width(),
        source.height(),
        config.tile_edge,
        config.prefetch_margin
    );
    info!("Pyramid:");
    for level in viewport.pyramid().levels() {
        info!(
            "  level {}: {}x{} px, {}x{} tiles",
            level.level, level.width, level.height, level.tiles_x, level.tiles_y
        );
    }

    if !config.no_backdrop {
        match build_overview(&source, decoder.as_ref(), config.backdrop_dimension) {
            Ok(backdrop) => {
                info!(
                    "Backdrop: {}x{} px ({} KB)",
                    backdrop.width(),
                    backdrop.height(),
                    backdrop.byte_size() / 1024
                );
                viewport.set_backdrop(backdrop).await;
            }
            // The walk still works without a backdrop, just with blanks.
            Err(e) => warn!("Backdrop rendition failed: {}", e),
        }
    }

    run_walk(&viewport, &config).await;
    report(&viewport, &config).await;

    ExitCode::SUCCESS
}

// =============================================================================
// Scripted Walk
// =============================================================================

/// Drive the viewport the way a user session would: look at the overview,
/// zoom in to full resolution, pan across, then jump back out.
async fn run_walk(viewport: &TiledViewport, config: &Config) {
    let vw = config.viewport_width as f64;
    let vh = config.viewport_height as f64;
    let coarsest = viewport.pyramid().coarsest_level();

    // Zoom in, coarsest to full resolution, anchored at the origin.
    for level in (0..=coarsest).rev() {
        step(viewport, RectF::new(0.0, 0.0, vw, vh), level).await;
    }

    // Pan across the full-resolution level.
    if let Some(level0) = viewport.pyramid().level(0) {
        let mut x = vw;
        let mut panned = 0;
        while x < level0.width as f64 && panned < 8 {
            step(viewport, RectF::new(x, 0.0, vw, vh), 0).await;
            x += vw;
            panned += 1;
        }
    }

    // Pinch-zoom jump straight back to the overview.
    step(viewport, RectF::new(0.0, 0.0, vw, vh), coarsest).await;
}

async fn step(viewport: &TiledViewport, rect: RectF, level: u32) {
    viewport.on_viewport_changed(rect, level).await;
    viewport.wait_settled().await;

    let drawables = viewport.drawable_tiles().await;
    let exact = drawables.iter().filter(|d| !d.is_fallback()).count();
    let fallback = drawables.len() - exact;
    let (resident, resident_bytes) = viewport.cache_stats().await;

    info!(
        "  level {} @ ({:.0},{:.0}): {} exact, {} fallback, {} resident ({} KB)",
        level,
        rect.x,
        rect.y,
        exact,
        fallback,
        resident,
        resident_bytes / 1024
    );
}

// =============================================================================
// Session Summary
// =============================================================================

#[derive(Debug, Serialize)]
struct SessionSummary {
    image: String,
    width: u32,
    height: u32,
    tile_edge: u32,
    levels: Vec<LevelInfo>,
    stats: ViewportStats,
    resident_tiles: usize,
    resident_bytes: usize,
}

async fn report(viewport: &TiledViewport, config: &Config) {
    let stats = viewport.stats().await;
    let (resident_tiles, resident_bytes) = viewport.cache_stats().await;

    if config.stats_json {
        let summary = SessionSummary {
            image: config.image.display().to_string(),
            width: viewport.pyramid().source_width(),
            height: viewport.pyramid().source_height(),
            tile_edge: viewport.pyramid().tile_edge(),
            levels: viewport.pyramid().levels().to_vec(),
            stats,
            resident_tiles,
            resident_bytes,
        };
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => error!("Cannot serialize summary: {}", e),
        }
        return;
    }

    info!("Session summary:");
    info!("  reconciliations:    {}", stats.reconciliations);
    info!("  renders dispatched: {}", stats.renders_dispatched);
    info!("  renders completed:  {}", stats.renders_completed);
    info!("  renders failed:     {}", stats.renders_failed);
    info!("  cache hits:         {}", stats.cache_hits);
    info!("  tiles evicted:      {}", stats.tiles_evicted);
    info!(
        "  resident at exit:   {} tiles ({} KB)",
        resident_tiles,
        resident_bytes / 1024
    );
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tilescope=debug"
    } else {
        "tilescope=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
