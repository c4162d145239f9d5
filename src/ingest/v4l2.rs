//! V4L2 camera source.
//!
//! `V4l2Source` reads frames from a local device node (e.g., /dev/video0) until the
//! optional frame limit is reached or the run is cancelled. A live camera never
//! reports end of stream on its own. `stub://` devices produce synthetic frames.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{normalize_to_frame, PixelFormat};
use super::{synthetic_pixels, FrameSource};
use crate::frame::{Frame, StreamInfo};

/// Configuration for a V4L2 source.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    /// Requested frame rate; also the rate reported to sinks.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
            max_frames: None,
        }
    }
}

/// V4L2 frame source.
pub struct V4l2Source {
    config: V4l2Config,
    backend: Option<V4l2Backend>,
    frame_count: u64,
}

enum V4l2Backend {
    Synthetic { width: u32, height: u32 },
    Device(DeviceCapture),
}

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Result<Self> {
        if config.device.trim().is_empty() {
            return Err(anyhow!("v4l2 device path is empty"));
        }
        Ok(Self {
            config,
            backend: None,
            frame_count: 0,
        })
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn limit_reached(&self) -> bool {
        self.config
            .max_frames
            .map(|max| self.frame_count >= max)
            .unwrap_or(false)
    }

    fn frame_rate(&self) -> f64 {
        if self.config.target_fps == 0 {
            30.0
        } else {
            self.config.target_fps as f64
        }
    }
}

impl FrameSource for V4l2Source {
    fn describe(&self) -> String {
        self.config.device.clone()
    }

    fn open(&mut self) -> Result<StreamInfo> {
        self.frame_count = 0;
        let backend = if self.config.device.starts_with("stub://") {
            log::info!(
                "V4l2Source: connected to {} (synthetic)",
                self.config.device
            );
            V4l2Backend::Synthetic {
                width: self.config.width,
                height: self.config.height,
            }
        } else {
            V4l2Backend::Device(DeviceCapture::open(&self.config)?)
        };
        let (width, height) = match &backend {
            V4l2Backend::Synthetic { width, height } => (*width, *height),
            V4l2Backend::Device(capture) => (capture.width, capture.height),
        };
        self.backend = Some(backend);
        Ok(StreamInfo::new(width, height, self.frame_rate()))
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.limit_reached() {
            return Ok(None);
        }
        let index = self.frame_count;
        let frame = match self.backend.as_mut() {
            None => return Err(anyhow!("v4l2 device {} not connected", self.config.device)),
            Some(V4l2Backend::Synthetic { width, height }) => {
                Frame::from_rgb(synthetic_pixels(*width, *height, index), *width, *height, index)?
            }
            Some(V4l2Backend::Device(capture)) => capture.next_frame(index)?,
        };
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) -> Result<()> {
        if self.backend.take().is_some() {
            log::info!(
                "V4l2Source: released {} after {} frames",
                self.config.device,
                self.frame_count
            );
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Device capture using libv4l
// ----------------------------------------------------------------------------

struct DeviceCapture {
    state: DeviceState,
    width: u32,
    height: u32,
    format: PixelFormat,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl DeviceCapture {
    fn open(config: &V4l2Config) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open v4l2 device {}", config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "v4l2 device {} delivers unsupported format {}",
                config.device,
                format.fourcc
            )
        })?;

        if config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    config.device,
                    err
                );
            }
        }

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Source: connected to {} ({}x{}, {:?})",
            config.device,
            format.width,
            format.height,
            pixel_format
        );
        Ok(Self {
            state,
            width: format.width,
            height: format.height,
            format: pixel_format,
        })
    }

    fn next_frame(&mut self, index: u64) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.width, self.height, self.format);
        self.state.with_mut(|fields| {
            let (buf, _meta) = fields
                .stream
                .next()
                .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))?;
            normalize_to_frame(buf, width, height, format, index)
        })
    }
}
