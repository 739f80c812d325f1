//! Source image handle and the region-decode capability.
//!
//! The tiling core never touches pixels directly: it hands a source rectangle
//! and a destination size to a [`RegionDecoder`] and gets a [`PixelBuffer`]
//! back. Any implementation that can extract and resample a region of the
//! source suffices; [`ResampleDecoder`] is the built-in one, backed by the
//! `image` crate.
//!
//! # Ownership
//!
//! A [`SourceImage`] is immutable after construction and shared across render
//! workers behind an `Arc`. Decoded tiles hold their pixels in `Bytes`, so
//! cloning a buffer is a reference-count bump, never a pixel copy.

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use image::imageops::FilterType;
use image::{ImageBuffer, Rgba};

use crate::error::{DecodeError, SourceError};
use crate::geometry::PixelRect;

/// Bytes per pixel for the RGBA8 layout used throughout the crate.
pub const BYTES_PER_PIXEL: usize = 4;

// =============================================================================
// PixelBuffer
// =============================================================================

/// An immutable RGBA8 bitmap, row-major, tightly packed.
///
/// This is the payload of a rendered tile. Cheap to clone: the pixel data
/// lives in a shared `Bytes` buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Bytes,
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl PixelBuffer {
    /// Wrap raw RGBA8 data, validating the length against the dimensions.
    pub fn from_rgba(width: u32, height: u32, data: Bytes) -> Result<Self, SourceError> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(SourceError::BufferSizeMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The raw RGBA8 bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Size of the backing buffer in bytes.
    pub fn byte_size(&self) -> usize {
        self.data.len()
    }
}

// =============================================================================
// SourceImage
// =============================================================================

/// The full-resolution pixel source, fully resident and read-only.
///
/// Constructed once at session start; every tile derives its pixels from it
/// without mutation, so it is shared across render workers without locking.
#[derive(Clone)]
pub struct SourceImage {
    width: u32,
    height: u32,
    data: Bytes,
}

impl fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl SourceImage {
    /// Create a source image from raw RGBA8 data.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::EmptyImage`] for zero dimensions and
    /// [`SourceError::BufferSizeMismatch`] if the buffer length does not
    /// match `width * height * 4`.
    pub fn from_rgba8(width: u32, height: u32, data: impl Into<Bytes>) -> Result<Self, SourceError> {
        if width == 0 || height == 0 {
            return Err(SourceError::EmptyImage);
        }
        let data = data.into();
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(SourceError::BufferSizeMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Create a source image from a decoded `image` crate image.
    pub fn from_image(image: image::DynamicImage) -> Result<Self, SourceError> {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_rgba8(width, height, rgba.into_raw())
    }

    /// Open and fully decode an image file (PNG or JPEG).
    ///
    /// This is the session-start entry point for the demo binary; failures
    /// here are the one fatal error class in the crate.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let image = image::open(path.as_ref()).map_err(|e| match e {
            image::ImageError::IoError(io) => SourceError::Io(io.to_string()),
            other => SourceError::Unsupported(other.to_string()),
        })?;
        Self::from_image(image)
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)` in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The raw RGBA8 bytes, row-major.
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

// =============================================================================
// RegionDecoder
// =============================================================================

/// The decode capability consumed by the tile renderer.
///
/// Given a region of the source image in full-resolution pixels and a
/// destination size, produce a resampled RGBA8 buffer. Implementations must
/// be pure with respect to the source: the same inputs always yield the same
/// pixels, and the source is never mutated.
///
/// Called from blocking worker threads, potentially concurrently.
pub trait RegionDecoder: Send + Sync {
    /// Extract `region` from `source` and resample it to
    /// `dest_width` x `dest_height` pixels.
    fn decode_region(
        &self,
        source: &SourceImage,
        region: PixelRect,
        dest_width: u32,
        dest_height: u32,
    ) -> Result<PixelBuffer, DecodeError>;
}

// =============================================================================
// ResampleDecoder
// =============================================================================

/// Built-in region decoder: crop, then bilinear resample.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResampleDecoder;

impl ResampleDecoder {
    /// Create a new resampling decoder.
    pub fn new() -> Self {
        Self
    }
}

impl RegionDecoder for ResampleDecoder {
    fn decode_region(
        &self,
        source: &SourceImage,
        region: PixelRect,
        dest_width: u32,
        dest_height: u32,
    ) -> Result<PixelBuffer, DecodeError> {
        if !region.fits_within(source.width(), source.height()) {
            return Err(DecodeError::RegionOutOfBounds {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
            });
        }
        if dest_width == 0 || dest_height == 0 {
            return Err(DecodeError::Failed(
                "destination size must be nonzero".to_string(),
            ));
        }

        // Copy the region rows out of the shared source buffer.
        let row_bytes = region.width as usize * BYTES_PER_PIXEL;
        let region_bytes = row_bytes * region.height as usize;
        let mut cropped = Vec::new();
        cropped
            .try_reserve_exact(region_bytes)
            .map_err(|_| DecodeError::Allocation(region_bytes))?;
        let src_stride = source.width() as usize * BYTES_PER_PIXEL;
        let data = source.data();
        for y in region.y..region.bottom() {
            let start = y as usize * src_stride + region.x as usize * BYTES_PER_PIXEL;
            cropped.extend_from_slice(&data[start..start + row_bytes]);
        }

        if region.width == dest_width && region.height == dest_height {
            return PixelBuffer::from_rgba(dest_width, dest_height, Bytes::from(cropped))
                .map_err(|e| DecodeError::Failed(e.to_string()));
        }

        let cropped: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_raw(region.width, region.height, cropped).ok_or_else(|| {
                DecodeError::Failed("region buffer does not match its dimensions".to_string())
            })?;
        let resized = image::imageops::resize(&cropped, dest_width, dest_height, FilterType::Triangle);

        PixelBuffer::from_rgba(dest_width, dest_height, Bytes::from(resized.into_raw()))
            .map_err(|e| DecodeError::Failed(e.to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================
