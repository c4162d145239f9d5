use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

use super::FrameSink;
use crate::frame::{Frame, StreamInfo};

/// Writes each frame as `frame_NNNNNN.png` into a directory.
pub struct FrameDirSink {
    dir: PathBuf,
    info: Option<StreamInfo>,
    frames_written: u64,
}

impl FrameDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            info: None,
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl FrameSink for FrameDirSink {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    fn open(&mut self, info: &StreamInfo) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create frame directory {}", self.dir.display()))?;
        self.info = Some(*info);
        self.frames_written = 0;
        log::info!(
            "FrameDirSink: writing {}x{} frames to {}",
            info.width,
            info.height,
            self.dir.display()
        );
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        let info = self
            .info
            .ok_or_else(|| anyhow!("frame sink {} is not open", self.dir.display()))?;
        if !info.matches(frame) {
            return Err(anyhow!(
                "frame size {}x{} does not match sink {}x{}",
                frame.width(),
                frame.height(),
                info.width,
                info.height
            ));
        }
        let path = self
            .dir
            .join(format!("frame_{:06}.png", self.frames_written));
        frame.save(&path)?;
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.info = None;
        log::info!(
            "FrameDirSink: closed {} after {} frames",
            self.dir.display(),
            self.frames_written
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_numbered_pngs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("frames");
        let mut sink = FrameDirSink::new(&out);
        sink.open(&StreamInfo::new(4, 4, 10.0))?;
        sink.write(&Frame::filled(4, 4, [1, 2, 3], 0))?;
        sink.write(&Frame::filled(4, 4, [1, 2, 3], 1))?;
        sink.close()?;

        assert!(out.join("frame_000000.png").exists());
        assert!(out.join("frame_000001.png").exists());
        assert_eq!(sink.frames_written(), 2);
        Ok(())
    }

    #[test]
    fn rejects_mismatched_frames() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut sink = FrameDirSink::new(dir.path());
        sink.open(&StreamInfo::new(4, 4, 10.0))?;
        assert!(sink.write(&Frame::filled(8, 4, [0, 0, 0], 0)).is_err());
        Ok(())
    }
}
