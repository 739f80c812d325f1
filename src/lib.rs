//! # tilescope
//!
//! A tiled, multi-resolution rendering core for very large images.
//!
//! Given a fully-resident source image and a viewport (visible rectangle +
//! zoom level), tilescope decides which fixed-size tiles intersect the
//! viewport, renders each one at the resolution the zoom level needs,
//! caches rendered tiles, and discards tiles the moment they scroll out of
//! view. Resident memory stays bounded no matter how large the image is.
//!
//! ## Features
//!
//! - **Zoom pyramid**: discrete power-of-two levels derived from the image
//!   dimensions, down to a single-tile overview
//! - **Visibility-driven cache**: tiles outside the current viewport (plus
//!   a prefetch ring) are evicted immediately, never aged out
//! - **Off-thread rendering**: decode and resample run on the blocking
//!   worker pool; viewport changes never wait for a render
//! - **Graceful degradation**: a tile that fails to render is covered by
//!   the nearest coarser resident tile, or the whole-image backdrop
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`geometry`] - logical and pixel rectangle types
//! - [`source`] - immutable source image and the region-decode capability
//! - [`pyramid`] - zoom levels, tile keys, and grid math
//! - [`tile`] - tile renderer and the visibility-driven cache
//! - [`viewport`] - the reconciliation state machine
//! - [`overview`] - bounded whole-image rendition (backdrop / thumbnail)
//! - [`config`] - tiling knobs and the demo CLI
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tilescope::{
//!     RectF, ResampleDecoder, SourceImage, TiledViewport, TilingConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tilescope::SourceError> {
//!     let source = Arc::new(SourceImage::open("huge.png")?);
//!     let viewport = TiledViewport::new(
//!         source,
//!         Arc::new(ResampleDecoder::new()),
//!         TilingConfig::default(),
//!     )?;
//!
//!     // The scroll view reports what is on screen...
//!     viewport
//!         .on_viewport_changed(RectF::new(0.0, 0.0, 1024.0, 768.0), 0)
//!         .await;
//!     viewport.wait_settled().await;
//!
//!     // ...and composites whatever is ready.
//!     for drawable in viewport.drawable_tiles().await {
//!         println!("paint {:?} at {:?}", drawable.origin, drawable.dest);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod geometry;
pub mod overview;
pub mod pyramid;
pub mod source;
pub mod tile;
pub mod viewport;

// Re-export commonly used types
pub use config::{Config, TilingConfig, DEFAULT_PREFETCH_MARGIN};
pub use error::{CacheError, DecodeError, RenderError, SourceError};
pub use geometry::{PixelRect, RectF};
pub use overview::{build_overview, DEFAULT_OVERVIEW_DIMENSION};
pub use pyramid::{LevelInfo, Pyramid, TileKey, DEFAULT_TILE_EDGE};
pub use source::{PixelBuffer, RegionDecoder, ResampleDecoder, SourceImage, BYTES_PER_PIXEL};
pub use tile::{Tile, TileCache, TileRenderer, DEFAULT_CACHE_BYTE_BUDGET};
pub use viewport::{
    DrawableTile, TiledViewport, TileOrigin, Viewport, ViewportPhase, ViewportStats,
};
