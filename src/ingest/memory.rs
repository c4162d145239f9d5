use anyhow::{anyhow, Result};
use std::collections::VecDeque;

use super::{FrameSink, FrameSource};
use crate::frame::{Frame, StreamInfo};

/// Source over frames already in memory.
pub struct MemorySource {
    name: String,
    info: StreamInfo,
    frames: VecDeque<Frame>,
    open: bool,
    opens: u32,
    closes: u32,
}

impl MemorySource {
    /// `frames` must all share the dimensions of the first one.
    pub fn new(name: impl Into<String>, frames: Vec<Frame>, frame_rate: f64) -> Result<Self> {
        let name = name.into();
        let first = frames
            .first()
            .ok_or_else(|| anyhow!("memory source {} has no frames", name))?;
        let info = StreamInfo::new(first.width(), first.height(), frame_rate);
        if let Some(odd) = frames.iter().find(|f| !info.matches(f)) {
            return Err(anyhow!(
                "frame {} is {}x{}, expected {}x{}",
                odd.index(),
                odd.width(),
                odd.height(),
                info.width,
                info.height
            ));
        }
        Ok(Self {
            name,
            info,
            frames: frames.into(),
            open: false,
            opens: 0,
            closes: 0,
        })
    }

    /// Times `open` / `close` were called.
    pub fn lifecycle(&self) -> (u32, u32) {
        (self.opens, self.closes)
    }
}

impl FrameSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory://{}", self.name)
    }

    fn open(&mut self) -> Result<StreamInfo> {
        self.open = true;
        self.opens += 1;
        Ok(self.info)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.open {
            return Err(anyhow!("memory source {} is not open", self.name));
        }
        Ok(self.frames.pop_front())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        self.closes += 1;
        Ok(())
    }
}

/// Sink that keeps every written frame.
#[derive(Default)]
pub struct MemorySink {
    info: Option<StreamInfo>,
    frames: Vec<Frame>,
    opens: u32,
    closes: u32,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn opened_with(&self) -> Option<StreamInfo> {
        self.info
    }

    /// Times `open` / `close` were called.
    pub fn lifecycle(&self) -> (u32, u32) {
        (self.opens, self.closes)
    }
}

impl FrameSink for MemorySink {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn open(&mut self, info: &StreamInfo) -> Result<()> {
        self.info = Some(*info);
        self.opens += 1;
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.info.is_none() {
            return Err(anyhow!("memory sink is not open"));
        }
        self.frames.push(frame.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closes += 1;
        Ok(())
    }
}

/// Sink that counts and drops frames, for live preview runs.
#[derive(Default)]
pub struct NullSink {
    frames_written: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl FrameSink for NullSink {
    fn describe(&self) -> String {
        "null".to_string()
    }

    fn open(&mut self, _info: &StreamInfo) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, _frame: &Frame) -> Result<()> {
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
