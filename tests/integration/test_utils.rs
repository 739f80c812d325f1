//! Shared fixtures for the integration tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tilescope::{
    DecodeError, PixelBuffer, PixelRect, RegionDecoder, ResampleDecoder, SourceImage,
    BYTES_PER_PIXEL,
};

/// A synthetic gradient image: each pixel encodes its own coordinates, so
/// crops land on predictable bytes.
pub fn gradient_source(width: u32, height: u32) -> Arc<SourceImage> {
    let mut data = Vec::with_capacity(width as usize * height as usize * BYTES_PER_PIXEL);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255]);
        }
    }
    Arc::new(SourceImage::from_rgba8(width, height, data).unwrap())
}

/// Wraps the real decoder and counts invocations, to observe how many
/// renders a reconciliation actually dispatched.
#[derive(Default)]
pub struct CountingDecoder {
    inner: ResampleDecoder,
    calls: AtomicUsize,
}

impl CountingDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RegionDecoder for CountingDecoder {
    fn decode_region(
        &self,
        source: &SourceImage,
        region: PixelRect,
        dest_width: u32,
        dest_height: u32,
    ) -> Result<PixelBuffer, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.decode_region(source, region, dest_width, dest_height)
    }
}

/// Fails every region finer than `min_downsample_ok`, succeeds otherwise.
///
/// The downsample factor is inferred from the region-to-destination size
/// ratio, so keep test image dimensions divisible by the tile grid.
pub struct FailingDecoder {
    inner: ResampleDecoder,
    pub min_downsample_ok: u32,
}

impl FailingDecoder {
    pub fn new(min_downsample_ok: u32) -> Self {
        Self {
            inner: ResampleDecoder::new(),
            min_downsample_ok,
        }
    }
}

impl RegionDecoder for FailingDecoder {
    fn decode_region(
        &self,
        source: &SourceImage,
        region: PixelRect,
        dest_width: u32,
        dest_height: u32,
    ) -> Result<PixelBuffer, DecodeError> {
        let downsample = region.width / dest_width.max(1);
        if downsample < self.min_downsample_ok {
            return Err(DecodeError::Failed("synthetic decode failure".to_string()));
        }
        self.inner.decode_region(source, region, dest_width, dest_height)
    }
}

/// Fails each distinct region's first decode with an allocation error and
/// succeeds afterwards, to exercise the evict-and-retry recovery path.
#[derive(Default)]
pub struct FlakyAllocDecoder {
    inner: ResampleDecoder,
    seen: Mutex<HashSet<(u32, u32)>>,
}

impl FlakyAllocDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegionDecoder for FlakyAllocDecoder {
    fn decode_region(
        &self,
        source: &SourceImage,
        region: PixelRect,
        dest_width: u32,
        dest_height: u32,
    ) -> Result<PixelBuffer, DecodeError> {
        let first_attempt = self
            .seen
            .lock()
            .expect("seen set poisoned")
            .insert((region.x, region.y));
        if first_attempt {
            return Err(DecodeError::Allocation(
                dest_width as usize * dest_height as usize * BYTES_PER_PIXEL,
            ));
        }
        self.inner.decode_region(source, region, dest_width, dest_height)
    }
}

/// Delays every decode whose downsample factor is at least
/// `slow_from_downsample`, so coarse renders can be made to outlive a
/// viewport change. Optionally fails fine regions like [`FailingDecoder`].
pub struct SlowDecoder {
    inner: ResampleDecoder,
    pub delay: Duration,
    pub slow_from_downsample: u32,
    pub fail_below_downsample: u32,
}

impl SlowDecoder {
    pub fn new(delay: Duration, slow_from_downsample: u32) -> Self {
        Self {
            inner: ResampleDecoder::new(),
            delay,
            slow_from_downsample,
            fail_below_downsample: 0,
        }
    }

    pub fn failing_below(mut self, downsample: u32) -> Self {
        self.fail_below_downsample = downsample;
        self
    }
}

impl RegionDecoder for SlowDecoder {
    fn decode_region(
        &self,
        source: &SourceImage,
        region: PixelRect,
        dest_width: u32,
        dest_height: u32,
    ) -> Result<PixelBuffer, DecodeError> {
        let downsample = region.width / dest_width.max(1);
        if downsample < self.fail_below_downsample {
            return Err(DecodeError::Failed("synthetic decode failure".to_string()));
        }
        if downsample >= self.slow_from_downsample {
            std::thread::sleep(self.delay);
        }
        self.inner.decode_region(source, region, dest_width, dest_height)
    }
}
