use std::collections::HashMap;

use anyhow::anyhow;

use crate::detect::backend::{BackendError, InferenceBackend};
use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// Scripted response for one frame.
#[derive(Clone, Debug)]
enum Response {
    Detections(Vec<RawDetection>),
    Fail(String),
}

/// Stub backend for tests and demos. Responses are keyed by frame index.
///
/// The script is fixed at construction; `infer` never mutates the backend, so
/// repeated runs over the same frames see identical output.
#[derive(Clone, Debug, Default)]
pub struct StubBackend {
    default: Vec<RawDetection>,
    frames: HashMap<u64, Response>,
    unavailable: Option<String>,
    scene: bool,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detections returned for any frame without a scripted response.
    pub fn with_default(mut self, detections: Vec<RawDetection>) -> Self {
        self.default = detections;
        self
    }

    /// Detections returned for one frame index.
    pub fn with_frame(mut self, index: u64, detections: Vec<RawDetection>) -> Self {
        self.frames.insert(index, Response::Detections(detections));
        self
    }

    /// Fail inference for one frame index.
    pub fn failing_on(mut self, index: u64, message: impl Into<String>) -> Self {
        self.frames.insert(index, Response::Fail(message.into()));
        self
    }

    /// A backend whose model never loaded.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            unavailable: Some(message.into()),
            ..Self::default()
        }
    }

    /// Synthetic street scene: a person walking left to right, a car every third
    /// frame and a low-confidence dog that a 0.5 threshold drops.
    pub fn demo_scene() -> Self {
        Self {
            scene: true,
            ..Self::default()
        }
    }

    fn scene_detections(frame: &Frame) -> Vec<RawDetection> {
        let w = frame.width() as f32;
        let h = frame.height() as f32;
        let step = (frame.index() % 20) as f32 / 20.0;

        let px = step * (w * 0.8);
        let mut detections = vec![RawDetection::new(
            "person",
            0.82 + 0.1 * step,
            [px, h * 0.3, px + w * 0.15, h * 0.9],
        )];
        if frame.index() % 3 == 0 {
            detections.push(RawDetection::new(
                "car",
                0.67,
                [w * 0.5, h * 0.55, w * 0.95, h * 0.85],
            ));
        }
        detections.push(RawDetection::new(
            "dog",
            0.31,
            [w * 0.05, h * 0.7, w * 0.2, h * 0.95],
        ));
        detections
    }
}

impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn infer(
        &mut self,
        frame: &Frame,
        _threshold_hint: f32,
    ) -> Result<Vec<RawDetection>, BackendError> {
        if let Some(message) = &self.unavailable {
            return Err(BackendError::Unavailable(anyhow!("{}", message)));
        }
        match self.frames.get(&frame.index()) {
            Some(Response::Detections(detections)) => Ok(detections.clone()),
            Some(Response::Fail(message)) => Err(BackendError::Inference(anyhow!(
                "{} (frame {})",
                message,
                frame.index()
            ))),
            None if self.scene => Ok(Self::scene_detections(frame)),
            None => Ok(self.default.clone()),
        }
    }

    fn warm_up(&mut self) -> Result<(), BackendError> {
        match &self.unavailable {
            Some(message) => Err(BackendError::Unavailable(anyhow!("{}", message))),
            None => Ok(()),
        }
    }
}
