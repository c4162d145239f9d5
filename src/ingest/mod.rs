//! Frame sources and sinks.
//!
//! Sources:
//! - Still image files (`ImageFileSource`)
//! - Local video files (`FileSource`; `stub://` synthetic, real files need feature: ingest-file-ffmpeg)
//! - USB/V4L2 cameras (feature: ingest-v4l2)
//! - In-memory frames (`MemorySource`)
//!
//! Sinks:
//! - Video files (`FileSink`; `.mp4`/`.avi`/`.mov`/`.mkv` need feature: ingest-file-ffmpeg)
//! - PNG frame directories (`FrameDirSink`)
//! - In-memory and discarding sinks
//!
//! A source reports its dimensions and rate from `open`, before the first frame. A
//! sink is opened with those same values. Both are used by exactly one pipeline run
//! at a time, and the run closes them exactly once.

use anyhow::Result;

use crate::frame::{Frame, StreamInfo};

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod frame_dir;
pub mod memory;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod still;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use file::{FileConfig, FileSink, FileSource};
pub use frame_dir::FrameDirSink;
pub use memory::{MemorySink, MemorySource, NullSink};
pub use still::ImageFileSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

/// Where frames come from.
pub trait FrameSource {
    /// Human-readable identity for logs and errors (path, device, URI).
    fn describe(&self) -> String;

    /// Acquire the underlying resource and report the stream properties.
    fn open(&mut self) -> Result<StreamInfo>;

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying resource.
    fn close(&mut self) -> Result<()>;
}

/// Where annotated frames go.
pub trait FrameSink {
    fn describe(&self) -> String;

    fn open(&mut self, info: &StreamInfo) -> Result<()>;

    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and release. Data written before a failed close may be incomplete.
    fn close(&mut self) -> Result<()>;
}

/// Cheap synthetic pattern, shared by the `stub://` sources.
pub(crate) fn synthetic_pixels(width: u32, height: u32, frame_count: u64) -> Vec<u8> {
    let pixel_count = (width as usize) * (height as usize) * 3;
    let scene_state = frame_count / 50;
    let mut pixels = vec![0u8; pixel_count];
    for (i, pixel) in pixels.iter_mut().enumerate() {
        *pixel = ((i as u64 + frame_count + scene_state) % 256) as u8;
    }
    pixels
}
