//! Frame model.
//!
//! - `Frame`: an RGB pixel buffer tagged with its ordinal index in the source sequence.
//! - `StreamInfo`: what a source reports when it opens (dimensions and rate).
//!
//! The pipeline never mutates a `Frame` in place. There is no `&mut` accessor to the
//! pixels; annotation goes through `Frame::to_image`, which hands out an owned copy.

use anyhow::{anyhow, Result};
use image::RgbImage;
use serde::Serialize;

/// Channels per pixel. Frames are always packed 8-bit RGB.
pub const CHANNELS: usize = 3;

/// One still image, either a standalone upload or one sample of a video sequence.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    index: u64,
}

impl Frame {
    pub fn new(image: RgbImage, index: u64) -> Self {
        Self { image, index }
    }

    /// Build a frame from packed RGB24 bytes. The byte length must match the dimensions.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(CHANNELS))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self { image, index })
    }

    /// Solid-colour frame, mostly useful for tests and synthetic sources.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], index: u64) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, image::Rgb(rgb)),
            index,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// Retag the frame with a different sequence index.
    pub fn with_index(mut self, index: u64) -> Self {
        self.index = index;
        self
    }

    /// Packed RGB24 bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Owned copy of the pixel buffer.
    pub fn to_image(&self) -> RgbImage {
        self.image.clone()
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Save the frame to disk. The format follows the file extension.
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        self.image
            .save(path)
            .map_err(|e| anyhow!("failed to save frame to {}: {}", path.display(), e))
    }
}

/// Properties a source reports before its first frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

impl StreamInfo {
    pub fn new(width: u32, height: u32, frame_rate: f64) -> Self {
        Self {
            width,
            height,
            frame_rate,
        }
    }

    /// True when a frame has the dimensions this stream announced.
    pub fn matches(&self, frame: &Frame) -> bool {
        frame.width() == self.width && frame.height() == self.height
    }
}
