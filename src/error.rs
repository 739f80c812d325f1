use thiserror::Error;

use crate::pyramid::TileKey;

/// Errors that make a source image unusable for a tiling session.
///
/// These are the only fatal errors in the crate: everything downstream of a
/// successfully opened [`crate::SourceImage`] degrades per tile instead of
/// failing the session.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Image has zero width or height
    #[error("source image has zero width or height")]
    EmptyImage,

    /// Tile edge length is zero
    #[error("tile edge must be at least 1 pixel")]
    InvalidTileEdge,

    /// Pixel buffer length does not match the declared dimensions
    #[error("pixel buffer holds {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    BufferSizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// I/O error while reading the image file
    #[error("failed to read image: {0}")]
    Io(String),

    /// File exists but cannot be decoded into pixels
    #[error("unsupported image: {0}")]
    Unsupported(String),
}

/// Errors from the region-decode capability.
///
/// A [`crate::source::RegionDecoder`] reports these; the renderer attaches
/// the tile key and maps them into [`RenderError`].
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// Requested region extends past the source image bounds
    #[error("region {x},{y} {width}x{height} exceeds the source bounds")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    /// Destination buffer could not be allocated
    #[error("allocation of {0} bytes for the destination buffer failed")]
    Allocation(usize),

    /// Decoder could not produce pixel data for the region
    #[error("cannot produce pixel data: {0}")]
    Failed(String),
}

/// Per-tile render failures.
///
/// None of these are fatal to the session: the viewport marks the key
/// unresolvable for the current generation and draws a coarser fallback.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// Zoom level does not exist in the pyramid
    #[error("level {level} out of range, pyramid has {levels} levels")]
    InvalidLevel { level: u32, levels: usize },

    /// Tile coordinates fall outside the grid at their zoom level
    #[error("tile {key} is outside the {cols}x{rows} grid at its level")]
    OutOfBounds { key: TileKey, cols: u32, rows: u32 },

    /// The decode capability failed for this tile's region
    #[error("decode failed for tile {key}: {reason}")]
    Decode { key: TileKey, reason: String },

    /// The tile's pixel buffer could not be allocated
    #[error("could not allocate {bytes} bytes for tile {key}")]
    Allocation { key: TileKey, bytes: usize },
}

/// Errors from the tile cache.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The retained set alone exceeds the configured byte budget
    #[error("retained tiles need {needed} bytes, cache budget is {budget}")]
    BudgetExceeded { needed: usize, budget: usize },

    /// The retained set alone exceeds the configured tile count limit
    #[error("retained tiles need {needed} slots, cache holds at most {max_tiles}")]
    TileLimitExceeded { needed: usize, max_tiles: usize },
}
