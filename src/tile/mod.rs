//! Tile rendering and caching.
//!
//! This module materializes and stores the tiles the viewport asks for:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             TiledViewport               │
//! └──────────┬───────────────────┬──────────┘
//!            │ miss              │ retain / evict
//!            ▼                   ▼
//! ┌────────────────────┐ ┌────────────────────┐
//! │    TileRenderer    │ │     TileCache      │
//! │ (decode + resample │ │ (visibility-driven │
//! │  one grid cell)    │ │  bounded store)    │
//! └──────────┬─────────┘ └────────────────────┘
//!            │
//!            ▼
//! ┌────────────────────┐
//! │   RegionDecoder    │
//! └────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`Tile`]: one rendered grid cell, immutable once created
//! - [`TileRenderer`]: pure `(source, key) -> Tile` function
//! - [`TileCache`]: bounded store keyed by [`crate::TileKey`], evicting
//!   strictly by visibility rather than recency

mod cache;
mod renderer;

pub use cache::{TileCache, DEFAULT_CACHE_BYTE_BUDGET};
pub use renderer::TileRenderer;

use crate::geometry::RectF;
use crate::pyramid::TileKey;
use crate::source::PixelBuffer;

/// One rendered tile: the materialized entity for a [`TileKey`].
///
/// `dest` is the tile's placement rectangle in its own level's logical
/// space; edge tiles are clipped to the level bounds, so `pixels` may be
/// smaller than the configured tile edge. Never mutated after creation and
/// shared behind `Arc`, so concurrent readers never race a writer.
#[derive(Debug, Clone)]
pub struct Tile {
    /// Identity of this tile.
    pub key: TileKey,

    /// Placement rectangle in the tile's level's logical space.
    pub dest: RectF,

    /// The rendered RGBA8 bitmap.
    pub pixels: PixelBuffer,
}

impl Tile {
    /// Size of the tile's pixel data in bytes.
    pub fn byte_size(&self) -> usize {
        self.pixels.byte_size()
    }
}
