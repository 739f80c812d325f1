//! Configuration for the tiling core and the demo binary.
//!
//! [`TilingConfig`] is the library-facing knob set: tile edge, prefetch
//! margin, and cache bounds. [`Config`] is the clap-derived CLI for the
//! demo binary; every option can also be set via environment variables with
//! the `TILESCOPE_` prefix.
//!
//! # Environment Variables
//!
//! - `TILESCOPE_TILE_EDGE` - Tile edge length in pixels (default: 256)
//! - `TILESCOPE_PREFETCH_MARGIN` - Extra tile rings around the viewport (default: 1)
//! - `TILESCOPE_CACHE_BYTES` - Tile cache byte budget, 0 = unlimited (default: 64MB)
//! - `TILESCOPE_CACHE_TILES` - Max resident tiles, 0 = unlimited (default: 0)
//! - `TILESCOPE_BACKDROP_DIMENSION` - Longer edge of the backdrop rendition (default: 1024)

use std::path::PathBuf;

use clap::Parser;

use crate::overview::DEFAULT_OVERVIEW_DIMENSION;
use crate::pyramid::DEFAULT_TILE_EDGE;
use crate::tile::DEFAULT_CACHE_BYTE_BUDGET;

// =============================================================================
// Default Values
// =============================================================================

/// Default prefetch margin: one extra ring of tiles around the viewport.
pub const DEFAULT_PREFETCH_MARGIN: u32 = 1;

/// Default viewport width for the demo walk.
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1024;

/// Default viewport height for the demo walk.
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 768;

// =============================================================================
// TilingConfig
// =============================================================================

/// Knobs for a tiling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilingConfig {
    /// Tile edge length in pixels.
    pub tile_edge: u32,

    /// Extra rings of tiles kept around the visible rectangle.
    pub prefetch_margin: u32,

    /// Tile cache byte budget; 0 means unlimited.
    pub max_bytes: usize,

    /// Maximum resident tile count; 0 means unlimited.
    pub max_tiles: usize,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            tile_edge: DEFAULT_TILE_EDGE,
            prefetch_margin: DEFAULT_PREFETCH_MARGIN,
            max_bytes: DEFAULT_CACHE_BYTE_BUDGET,
            max_tiles: 0,
        }
    }
}

impl TilingConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_edge == 0 {
            return Err("tile_edge must be at least 1 pixel".to_string());
        }
        if self.max_bytes != 0 && self.max_bytes < self.tile_edge as usize * 4 {
            return Err("max_bytes is smaller than a single tile row".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// tilescope - view a very large image through a tiled, bounded-memory core.
///
/// Loads the image, builds its zoom pyramid, then walks a scripted pan and
/// zoom path through the viewport, reporting which tiles were rendered,
/// served from cache, and evicted along the way.
#[derive(Parser, Debug, Clone)]
#[command(name = "tilescope")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Path to the source image (PNG or JPEG).
    pub image: PathBuf,

    // =========================================================================
    // Tiling Configuration
    // =========================================================================
    /// Tile edge length in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_EDGE, env = "TILESCOPE_TILE_EDGE")]
    pub tile_edge: u32,

    /// Extra rings of tiles prefetched around the visible rectangle.
    #[arg(long, default_value_t = DEFAULT_PREFETCH_MARGIN, env = "TILESCOPE_PREFETCH_MARGIN")]
    pub prefetch_margin: u32,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Tile cache byte budget (0 = unlimited).
    #[arg(long, default_value_t = DEFAULT_CACHE_BYTE_BUDGET, env = "TILESCOPE_CACHE_BYTES")]
    pub cache_bytes: usize,

    /// Maximum resident tile count (0 = unlimited).
    #[arg(long, default_value_t = 0, env = "TILESCOPE_CACHE_TILES")]
    pub cache_tiles: usize,

    // =========================================================================
    // Backdrop Configuration
    // =========================================================================
    /// Longer edge of the whole-image backdrop rendition, in pixels.
    #[arg(long, default_value_t = DEFAULT_OVERVIEW_DIMENSION, env = "TILESCOPE_BACKDROP_DIMENSION")]
    pub backdrop_dimension: u32,

    /// Skip building the whole-image backdrop.
    #[arg(long, default_value_t = false)]
    pub no_backdrop: bool,

    // =========================================================================
    // Demo Walk Configuration
    // =========================================================================
    /// Viewport width in logical pixels for the scripted walk.
    #[arg(long, default_value_t = DEFAULT_VIEWPORT_WIDTH)]
    pub viewport_width: u32,

    /// Viewport height in logical pixels for the scripted walk.
    #[arg(long, default_value_t = DEFAULT_VIEWPORT_HEIGHT)]
    pub viewport_height: u32,

    // =========================================================================
    // Output Configuration
    // =========================================================================
    /// Print the final session summary as JSON.
    #[arg(long, default_value_t = false)]
    pub stats_json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// The library-facing tiling configuration.
    pub fn tiling(&self) -> TilingConfig {
        TilingConfig {
            tile_edge: self.tile_edge,
            prefetch_margin: self.prefetch_margin,
            max_bytes: self.cache_bytes,
            max_tiles: self.cache_tiles,
        }
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.tiling().validate()?;
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err("viewport dimensions must be nonzero".to_string());
        }
        if !self.no_backdrop && self.backdrop_dimension == 0 {
            return Err(
                "backdrop_dimension must be nonzero (or pass --no-backdrop)".to_string(),
            );
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
