//! Tile renderer: one grid cell in, one bitmap out.
//!
//! The renderer is a pure function of its inputs: the immutable source
//! image, the pyramid geometry, and a tile key. It computes the tile's
//! destination rectangle at the key's zoom level and the matching
//! full-resolution source rectangle, then asks the region decoder to
//! extract and resample.
//!
//! Rendering the same key from the same source twice yields pixel-identical
//! tiles. There is no shared mutable state, so a renderer clone can run on
//! any number of worker threads at once.

use std::sync::Arc;

use crate::error::{DecodeError, RenderError};
use crate::pyramid::{Pyramid, TileKey};
use crate::source::{RegionDecoder, SourceImage};

use super::Tile;

/// Renders tiles from an immutable source image.
///
/// Cheap to clone: all fields are shared handles.
#[derive(Clone)]
pub struct TileRenderer {
    source: Arc<SourceImage>,
    decoder: Arc<dyn RegionDecoder>,
    pyramid: Arc<Pyramid>,
}

impl TileRenderer {
    /// Create a renderer over `source` with the given decode capability.
    pub fn new(
        source: Arc<SourceImage>,
        decoder: Arc<dyn RegionDecoder>,
        pyramid: Arc<Pyramid>,
    ) -> Self {
        Self {
            source,
            decoder,
            pyramid,
        }
    }

    /// The pyramid this renderer draws from.
    pub fn pyramid(&self) -> &Arc<Pyramid> {
        &self.pyramid
    }

    /// Render the tile addressed by `key`.
    ///
    /// # Errors
    ///
    /// - [`RenderError::InvalidLevel`] / [`RenderError::OutOfBounds`] if the
    ///   key addresses a cell beyond the grid at its zoom level. A correct
    ///   caller never produces such keys; they are still checked here.
    /// - [`RenderError::Decode`] / [`RenderError::Allocation`] if the decode
    ///   capability cannot produce pixels for the region.
    pub fn render(&self, key: TileKey) -> Result<Tile, RenderError> {
        let info = self
            .pyramid
            .level(key.level)
            .ok_or_else(|| RenderError::InvalidLevel {
                level: key.level,
                levels: self.pyramid.level_count(),
            })?;
        if key.col >= info.tiles_x || key.row >= info.tiles_y {
            return Err(RenderError::OutOfBounds {
                key,
                cols: info.tiles_x,
                rows: info.tiles_y,
            });
        }

        // Both rects exist for any in-grid key.
        let dest = self.pyramid.dest_rect(key).ok_or(RenderError::OutOfBounds {
            key,
            cols: info.tiles_x,
            rows: info.tiles_y,
        })?;
        let region = self
            .pyramid
            .source_rect(key)
            .ok_or(RenderError::OutOfBounds {
                key,
                cols: info.tiles_x,
                rows: info.tiles_y,
            })?;

        let pixels = self
            .decoder
            .decode_region(&self.source, region, dest.width as u32, dest.height as u32)
            .map_err(|e| match e {
                DecodeError::Allocation(bytes) => RenderError::Allocation { key, bytes },
                other => RenderError::Decode {
                    key,
                    reason: other.to_string(),
                },
            })?;

        Ok(Tile { key, dest, pixels })
    }
}

// =============================================================================
// Tests
// =============================================================================
