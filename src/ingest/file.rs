//! Local video file source and sink.
//!
//! `FileSource` reads frames from a local video file. `stub://` paths produce a
//! synthetic clip instead, which keeps demos and tests free of media files.
//! `FileSink` writes annotated frames either to a video container or, for any other
//! path, to a directory of numbered PNGs.
//!
//! Neither side fetches remote URLs.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::{FfmpegFileSink, FfmpegFileSource};
use super::frame_dir::FrameDirSink;
use super::{synthetic_pixels, FrameSink, FrameSource};
use crate::frame::{Frame, StreamInfo};

const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g., "clips/entrance.mp4") or "stub://name".
    pub path: String,
    /// Rate to report when the container does not carry one.
    pub fallback_fps: f64,
    /// Synthetic clip length (stub:// only).
    pub synthetic_frames: u64,
    /// Synthetic frame size (stub:// only).
    pub synthetic_width: u32,
    pub synthetic_height: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            fallback_fps: 30.0,
            synthetic_frames: 100,
            synthetic_width: 640,
            synthetic_height: 480,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        if config.path.starts_with("stub://") {
            Ok(Self {
                backend: FileBackend::Synthetic(SyntheticFileSource::new(config)),
            })
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                Ok(Self {
                    backend: FileBackend::Ffmpeg(FfmpegFileSource::new(config)),
                })
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                Err(anyhow!(
                    "video file ingestion requires the ingest-file-ffmpeg feature"
                ))
            }
        }
    }

    /// Frames read so far.
    pub fn frames_read(&self) -> u64 {
        match &self.backend {
            FileBackend::Synthetic(source) => source.frame_count,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frames_read(),
        }
    }
}

impl FrameSource for FileSource {
    fn describe(&self) -> String {
        match &self.backend {
            FileBackend::Synthetic(source) => source.config.path.clone(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.path().to_string(),
        }
    }

    fn open(&mut self) -> Result<StreamInfo> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.open(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.open(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn close(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.close(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.close(),
        }
    }
}

/// Local file frame sink.
pub struct FileSink {
    backend: SinkBackend,
}

enum SinkBackend {
    Frames(FrameDirSink),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSink),
}

impl FileSink {
    /// Video container for known extensions, PNG frame directory otherwise.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !is_local_file_path(&path.to_string_lossy()) {
            return Err(anyhow!("file output only supports local paths"));
        }
        if is_video_path(&path) {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                Ok(Self {
                    backend: SinkBackend::Ffmpeg(FfmpegFileSink::new(path)),
                })
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                Err(anyhow!(
                    "writing {} requires the ingest-file-ffmpeg feature; use a directory path for PNG frames",
                    path.display()
                ))
            }
        } else {
            Ok(Self {
                backend: SinkBackend::Frames(FrameDirSink::new(path)),
            })
        }
    }
}

impl FrameSink for FileSink {
    fn describe(&self) -> String {
        match &self.backend {
            SinkBackend::Frames(sink) => sink.describe(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            SinkBackend::Ffmpeg(sink) => sink.path().display().to_string(),
        }
    }

    fn open(&mut self, info: &StreamInfo) -> Result<()> {
        match &mut self.backend {
            SinkBackend::Frames(sink) => sink.open(info),
            #[cfg(feature = "ingest-file-ffmpeg")]
            SinkBackend::Ffmpeg(sink) => sink.open(info),
        }
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        match &mut self.backend {
            SinkBackend::Frames(sink) => sink.write(frame),
            #[cfg(feature = "ingest-file-ffmpeg")]
            SinkBackend::Ffmpeg(sink) => sink.write(frame),
        }
    }

    fn close(&mut self) -> Result<()> {
        match &mut self.backend {
            SinkBackend::Frames(sink) => sink.close(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            SinkBackend::Ffmpeg(sink) => sink.close(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and demos
// ----------------------------------------------------------------------------

struct SyntheticFileSource {
    config: FileConfig,
    frame_count: u64,
    open: bool,
}

impl SyntheticFileSource {
    fn new(config: FileConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            open: false,
        }
    }

    fn open(&mut self) -> Result<StreamInfo> {
        if self.config.synthetic_width == 0 || self.config.synthetic_height == 0 {
            return Err(anyhow!("synthetic clip {} has no pixels", self.config.path));
        }
        self.open = true;
        self.frame_count = 0;
        log::info!("FileSource: opened {} (synthetic)", self.config.path);
        Ok(StreamInfo::new(
            self.config.synthetic_width,
            self.config.synthetic_height,
            self.config.fallback_fps,
        ))
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.open {
            return Err(anyhow!("synthetic source {} is not open", self.config.path));
        }
        if self.frame_count >= self.config.synthetic_frames {
            return Ok(None);
        }
        let pixels = synthetic_pixels(
            self.config.synthetic_width,
            self.config.synthetic_height,
            self.frame_count,
        );
        let frame = Frame::from_rgb(
            pixels,
            self.config.synthetic_width,
            self.config.synthetic_height,
            self.frame_count,
        )?;
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        log::info!(
            "FileSource: closed {} after {} frames",
            self.config.path,
            self.frame_count
        );
        Ok(())
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

fn is_video_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
