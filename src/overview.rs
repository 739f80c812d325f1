//! Whole-image overview rendition.
//!
//! Downsizes the entire source image into a single bitmap bounded by a
//! maximum edge length, independent of the tile grid. The rendition serves
//! two purposes: a thumbnail of the session's image, and a backdrop layer
//! installed on the viewport so regions whose tiles are still rendering (or
//! failed) show a blurry preview instead of a blank.
//!
//! Memory for the overview is bounded by `max_dimension^2` pixels no matter
//! how large the source is.

use crate::error::DecodeError;
use crate::geometry::PixelRect;
use crate::source::{PixelBuffer, RegionDecoder, SourceImage};

/// Default bound on the overview's longer edge, in pixels.
pub const DEFAULT_OVERVIEW_DIMENSION: u32 = 1024;

/// Render the whole image scaled to fit within `max_dimension` on its
/// longer edge, preserving aspect ratio. Never upscales.
///
/// # Errors
///
/// [`DecodeError`] if `max_dimension` is zero or the decode capability
/// cannot produce the rendition.
pub fn build_overview(
    source: &SourceImage,
    decoder: &dyn RegionDecoder,
    max_dimension: u32,
) -> Result<PixelBuffer, DecodeError> {
    if max_dimension == 0 {
        return Err(DecodeError::Failed(
            "overview dimension must be nonzero".to_string(),
        ));
    }

    let (width, height) = source.dimensions();
    let longer = width.max(height);
    let scale = (max_dimension as f64 / longer as f64).min(1.0);
    let dest_width = ((width as f64 * scale).round() as u32).max(1);
    let dest_height = ((height as f64 * scale).round() as u32).max(1);

    decoder.decode_region(
        source,
        PixelRect::new(0, 0, width, height),
        dest_width,
        dest_height,
    )
}

// =============================================================================
// Tests
// =============================================================================
