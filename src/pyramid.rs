//! Zoom-level pyramid and tile grid math.
//!
//! A [`Pyramid`] derives a chain of discrete zoom levels from the source
//! image dimensions and the configured tile edge. Level 0 is full resolution
//! (scale 1.0); each subsequent level halves both dimensions, down to the
//! coarsest level that fits inside a single tile.
//!
//! Every level carries a fixed grid of `tiles_x` x `tiles_y` cells of
//! `tile_edge` pixels (edge cells clipped to the level bounds). A
//! [`TileKey`] addresses one cell; the pyramid maps keys to destination
//! rectangles in the level's logical space and to source rectangles in
//! full-resolution pixels.
//!
//! # Grid invariants
//!
//! - The grid fully covers the level: every logical point belongs to exactly
//!   one cell, and no cell extends past the clipped level bounds.
//! - `tiles_x = ceil(level_width / tile_edge)`, same for rows.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::error::SourceError;
use crate::geometry::{PixelRect, RectF};

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_EDGE: u32 = 256;

// =============================================================================
// TileKey
// =============================================================================

/// Composite identity of one tile: `(zoom level, column, row)`.
///
/// Level 0 is full resolution; higher levels are coarser. Column and row
/// index the level's grid from the top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileKey {
    /// Zoom level (0 = full resolution).
    pub level: u32,

    /// Column index, 0-based from the left.
    pub col: u32,

    /// Row index, 0-based from the top.
    pub row: u32,
}

impl TileKey {
    /// Create a new tile key.
    pub fn new(level: u32, col: u32, row: u32) -> Self {
        Self { level, col, row }
    }

    /// The key of the tile `levels_up` coarser levels above this one that
    /// covers the same source region.
    pub fn ancestor(&self, levels_up: u32) -> TileKey {
        TileKey {
            level: self.level + levels_up,
            col: self.col >> levels_up,
            row: self.row >> levels_up,
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}/{},{}", self.level, self.col, self.row)
    }
}

// =============================================================================
// LevelInfo
// =============================================================================

/// Metadata for a single zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelInfo {
    /// Zoom level index (0 = full resolution).
    pub level: u32,

    /// Width of this level in logical pixels.
    pub width: u32,

    /// Height of this level in logical pixels.
    pub height: u32,

    /// Number of tile columns.
    pub tiles_x: u32,

    /// Number of tile rows.
    pub tiles_y: u32,

    /// Downsample factor relative to level 0 (`2^level`).
    pub downsample: u64,
}

impl LevelInfo {
    /// Scale factor applied to source pixels at this level (`2^-level`).
    pub fn scale(&self) -> f64 {
        1.0 / self.downsample as f64
    }

    /// Total number of tiles in this level's grid.
    pub fn tile_count(&self) -> u64 {
        self.tiles_x as u64 * self.tiles_y as u64
    }
}

// =============================================================================
// Pyramid
// =============================================================================

/// The zoom-level chain and grid geometry for one source image.
///
/// Cheap to clone and share; holds no pixel data.
#[derive(Debug, Clone)]
pub struct Pyramid {
    source_width: u32,
    source_height: u32,
    tile_edge: u32,
    levels: Vec<LevelInfo>,
}

impl Pyramid {
    /// Build the level chain for a `source_width` x `source_height` image.
    ///
    /// Levels halve until the whole image fits inside one tile, so there is
    /// always at least one level.
    ///
    /// # Errors
    ///
    /// [`SourceError::EmptyImage`] for zero dimensions,
    /// [`SourceError::InvalidTileEdge`] for a zero tile edge.
    pub fn new(source_width: u32, source_height: u32, tile_edge: u32) -> Result<Self, SourceError> {
        if source_width == 0 || source_height == 0 {
            return Err(SourceError::EmptyImage);
        }
        if tile_edge == 0 {
            return Err(SourceError::InvalidTileEdge);
        }

        let mut levels = Vec::new();
        let mut level = 0u32;
        loop {
            let downsample = 1u64 << level;
            let width = (source_width as u64).div_ceil(downsample).max(1) as u32;
            let height = (source_height as u64).div_ceil(downsample).max(1) as u32;
            let tiles_x = width.div_ceil(tile_edge);
            let tiles_y = height.div_ceil(tile_edge);
            levels.push(LevelInfo {
                level,
                width,
                height,
                tiles_x,
                tiles_y,
                downsample,
            });
            if width <= tile_edge && height <= tile_edge {
                break;
            }
            level += 1;
        }

        Ok(Self {
            source_width,
            source_height,
            tile_edge,
            levels,
        })
    }

    /// Source image width in pixels.
    pub fn source_width(&self) -> u32 {
        self.source_width
    }

    /// Source image height in pixels.
    pub fn source_height(&self) -> u32 {
        self.source_height
    }

    /// Tile edge length in pixels.
    pub fn tile_edge(&self) -> u32 {
        self.tile_edge
    }

    /// Number of zoom levels (always at least 1).
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Metadata for one level, if it exists.
    pub fn level(&self, level: u32) -> Option<&LevelInfo> {
        self.levels.get(level as usize)
    }

    /// All levels, finest first.
    pub fn levels(&self) -> &[LevelInfo] {
        &self.levels
    }

    /// Index of the coarsest level.
    pub fn coarsest_level(&self) -> u32 {
        // levels is non-empty by construction
        (self.levels.len() - 1) as u32
    }

    /// Grid size `(tiles_x, tiles_y)` for one level.
    pub fn grid_size(&self, level: u32) -> Option<(u32, u32)> {
        self.level(level).map(|info| (info.tiles_x, info.tiles_y))
    }

    /// Whether `key` addresses a cell inside its level's grid.
    pub fn contains_key(&self, key: TileKey) -> bool {
        match self.level(key.level) {
            Some(info) => key.col < info.tiles_x && key.row < info.tiles_y,
            None => false,
        }
    }

    /// The level whose resolution best matches a continuous scale factor.
    ///
    /// Picks the coarsest level that is still at least as fine as `scale`,
    /// so pinch-zoom at scale 0.3 maps to level 1 (scale 0.5), not level 2.
    pub fn level_for_scale(&self, scale: f64) -> u32 {
        if scale <= 0.0 {
            return self.coarsest_level();
        }
        let wanted = 1.0 / scale;
        let mut best = 0u32;
        for info in &self.levels {
            if (info.downsample as f64) <= wanted {
                best = info.level;
            } else {
                break;
            }
        }
        best
    }

    /// Destination rectangle of `key` in its own level's logical space,
    /// clipped to the level bounds.
    pub fn dest_rect(&self, key: TileKey) -> Option<RectF> {
        let info = self.level(key.level)?;
        if key.col >= info.tiles_x || key.row >= info.tiles_y {
            return None;
        }
        let x = key.col as u64 * self.tile_edge as u64;
        let y = key.row as u64 * self.tile_edge as u64;
        let w = (self.tile_edge as u64).min(info.width as u64 - x);
        let h = (self.tile_edge as u64).min(info.height as u64 - y);
        Some(RectF::new(x as f64, y as f64, w as f64, h as f64))
    }

    /// Source rectangle of `key` in full-resolution pixels, clipped to the
    /// source bounds.
    pub fn source_rect(&self, key: TileKey) -> Option<PixelRect> {
        let info = self.level(key.level)?;
        if key.col >= info.tiles_x || key.row >= info.tiles_y {
            return None;
        }
        let ds = info.downsample;
        let x = key.col as u64 * self.tile_edge as u64;
        let y = key.row as u64 * self.tile_edge as u64;
        let sx = x * ds;
        let sy = y * ds;
        let sw = (self.tile_edge as u64 * ds).min(self.source_width as u64 - sx);
        let sh = (self.tile_edge as u64 * ds).min(self.source_height as u64 - sy);
        Some(PixelRect::new(sx as u32, sy as u32, sw as u32, sh as u32))
    }

    /// The set of tile keys whose destination rectangle intersects `rect` at
    /// `level`, expanded by `margin` extra tile rings and clamped to the grid.
    ///
    /// Returns an empty set for an unknown level or a rect entirely outside
    /// the level bounds.
    pub fn required_tiles(&self, rect: RectF, level: u32, margin: u32) -> HashSet<TileKey> {
        let mut required = HashSet::new();
        let Some(info) = self.level(level) else {
            return required;
        };
        if rect.is_empty() {
            return required;
        }

        let edge = self.tile_edge as f64;
        let x0 = rect.x.max(0.0);
        let y0 = rect.y.max(0.0);
        let x1 = rect.right().min(info.width as f64);
        let y1 = rect.bottom().min(info.height as f64);
        if x1 <= x0 || y1 <= y0 {
            return required;
        }

        let col_min = ((x0 / edge).floor() as u32).saturating_sub(margin);
        let row_min = ((y0 / edge).floor() as u32).saturating_sub(margin);
        let col_max = ((x1 / edge).ceil() as u32 - 1)
            .saturating_add(margin)
            .min(info.tiles_x - 1);
        let row_max = ((y1 / edge).ceil() as u32 - 1)
            .saturating_add(margin)
            .min(info.tiles_y - 1);

        for row in row_min..=row_max {
            for col in col_min..=col_max {
                required.insert(TileKey::new(level, col, row));
            }
        }
        required
    }
}

// =============================================================================
// Tests
// =============================================================================
