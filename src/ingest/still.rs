//! Still image source: yields exactly one frame, then end of stream.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

use super::FrameSource;
use crate::frame::{Frame, StreamInfo};

/// Decode a still image (JPEG or PNG) into an RGB frame with index 0.
pub fn load_image_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path)
        .map_err(|e| anyhow!("failed to open image {}: {}", path.display(), e))?;
    Ok(Frame::new(image.to_rgb8(), 0))
}

pub struct ImageFileSource {
    path: PathBuf,
    pending: Option<Frame>,
}

impl ImageFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pending: None,
        }
    }
}

impl FrameSource for ImageFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn open(&mut self) -> Result<StreamInfo> {
        let frame = load_image_frame(&self.path)?;
        let info = StreamInfo::new(frame.width(), frame.height(), 1.0);
        self.pending = Some(frame);
        Ok(info)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.pending.take())
    }

    fn close(&mut self) -> Result<()> {
        self.pending = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_one_frame_then_end_of_stream() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("still.png");
        Frame::filled(6, 4, [200, 10, 10], 0).save(&path)?;

        let mut source = ImageFileSource::new(&path);
        let info = source.open()?;
        assert_eq!((info.width, info.height), (6, 4));
        let frame = source.next_frame()?.expect("one frame");
        assert_eq!(frame.pixels()[0], 200);
        assert!(source.next_frame()?.is_none());
        source.close()?;
        Ok(())
    }

    #[test]
    fn missing_file_fails_to_open() {
        let mut source = ImageFileSource::new("/nonexistent/still.jpg");
        assert!(source.open().is_err());
    }
}
