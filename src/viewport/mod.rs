//! Viewport reconciliation.
//!
//! This module owns the mapping from "what is on screen" to "which tiles
//! must exist", and drives the renderer and cache to close the gap:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      TiledViewport                       │
//! │                                                          │
//! │  on_viewport_changed(rect, level)                        │
//! │    1. compute RequiredSet          (pyramid)             │
//! │    2. dispatch renders for misses  (spawn_blocking)      │
//! │    3. retain + evict               (cache)               │
//! │                                                          │
//! │  apply task (single consumer of render completions)      │
//! │    4. re-check RequiredSet, insert into cache,           │
//! │       record failures, settle                            │
//! │                                                          │
//! │  drawable_tiles()                                        │
//! │    backdrop, coarse fallbacks, exact tiles               │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # State machine
//!
//! [`ViewportPhase::Idle`] before the first viewport, then
//! [`ViewportPhase::Reconciling`] while any required tile is still being
//! rendered, and [`ViewportPhase::Settled`] once every required key is
//! resident or has failed for this generation. A new viewport change at any
//! point supersedes the in-flight required set; renders already dispatched
//! run to completion and land in the cache, where they are immediately
//! eviction-eligible unless the new viewport still requires them.

mod tiled;

pub use tiled::TiledViewport;

use std::sync::Arc;

use serde::Serialize;

use crate::geometry::RectF;
use crate::pyramid::TileKey;
use crate::source::PixelBuffer;
use crate::tile::Tile;

// =============================================================================
// Viewport
// =============================================================================

/// The visible rectangle plus the current zoom level.
///
/// The rectangle lives in the logical coordinate space of `level`: an image
/// of 4096px shown at level 2 spans logical `0..1024`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Visible rectangle in the level's logical space.
    pub rect: RectF,

    /// Current zoom level (0 = full resolution).
    pub level: u32,
}

impl Viewport {
    /// Create a new viewport.
    pub fn new(rect: RectF, level: u32) -> Self {
        Self { rect, level }
    }
}

// =============================================================================
// Drawable tiles
// =============================================================================

/// Where a drawable bitmap came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOrigin {
    /// The exact tile required at the current level.
    Exact(TileKey),

    /// A coarser resident tile standing in for missing finer tiles.
    Fallback(TileKey),

    /// The whole-image backdrop rendition.
    Backdrop,
}

/// One bitmap the surface should composite, and where.
///
/// `dest` is expressed in the logical space of the *current* viewport level,
/// whatever level the pixels were rendered at; fallback bitmaps cover the
/// scaled-up footprint of their coarser tile. Entries are ordered for
/// painter's-algorithm compositing: backdrop first, then coarse fallbacks,
/// then exact tiles.
#[derive(Debug, Clone)]
pub struct DrawableTile {
    /// The bitmap to composite. Cheap to clone (shared pixel data).
    pub pixels: PixelBuffer,

    /// Destination rectangle in the current level's logical space.
    pub dest: RectF,

    /// Provenance of the bitmap.
    pub origin: TileOrigin,
}

impl DrawableTile {
    pub(crate) fn exact(tile: &Arc<Tile>) -> Self {
        Self {
            pixels: tile.pixels.clone(),
            dest: tile.dest,
            origin: TileOrigin::Exact(tile.key),
        }
    }

    /// Whether this entry is anything other than the exact required tile.
    pub fn is_fallback(&self) -> bool {
        !matches!(self.origin, TileOrigin::Exact(_))
    }
}

// =============================================================================
// Phase and stats
// =============================================================================

/// Lifecycle phase of the viewport state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViewportPhase {
    /// No viewport has been set yet.
    Idle,

    /// A viewport change is being reconciled; renders are in flight.
    Reconciling,

    /// Every required tile is resident or has failed for this generation.
    Settled,
}

/// Counters accumulated over the life of a [`TiledViewport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ViewportStats {
    /// Viewport changes processed.
    pub reconciliations: u64,

    /// Render requests handed to the worker pool.
    pub renders_dispatched: u64,

    /// Renders that completed with a tile.
    pub renders_completed: u64,

    /// Renders that failed, or whose tile could not be admitted to the cache.
    pub renders_failed: u64,

    /// Required keys already resident at reconciliation time.
    pub cache_hits: u64,

    /// Tiles freed by visibility eviction.
    pub tiles_evicted: u64,
}
