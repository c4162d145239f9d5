use std::sync::{Arc, Mutex};

use anyhow::anyhow;

use crate::detect::backend::{BackendError, InferenceBackend};
use crate::detect::filter::DetectionThreshold;
use crate::detect::result::Detection;
use crate::frame::Frame;
use crate::pipeline::PipelineError;

/// Backend handle that can be shared across pipeline runs.
pub type SharedBackend = Arc<Mutex<dyn InferenceBackend>>;

/// Wrap a backend so it can be shared.
pub fn share<B: InferenceBackend + 'static>(backend: B) -> SharedBackend {
    Arc::new(Mutex::new(backend))
}

/// Stable contract over an inference backend: frame in, validated detections out.
///
/// The adapter holds nothing but the backend handle. Calls are serialized through
/// the backend mutex, so one handle may serve several pipelines.
#[derive(Clone)]
pub struct DetectionAdapter {
    backend: SharedBackend,
}

impl DetectionAdapter {
    pub fn new(backend: SharedBackend) -> Self {
        Self { backend }
    }

    pub fn from_backend<B: InferenceBackend + 'static>(backend: B) -> Self {
        Self::new(share(backend))
    }

    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    pub fn name(&self) -> Result<&'static str, PipelineError> {
        let guard = self.backend.lock().map_err(|_| poisoned())?;
        Ok(guard.name())
    }

    pub fn warm_up(&self) -> Result<(), PipelineError> {
        let mut guard = self.backend.lock().map_err(|_| poisoned())?;
        guard.warm_up().map_err(|e| match e {
            BackendError::Unavailable(cause) | BackendError::Inference(cause) => {
                PipelineError::BackendUnavailable(cause)
            }
        })
    }

    /// Run inference on one frame.
    ///
    /// The threshold is forwarded as a hint only. Any raw detection that breaks the
    /// box or confidence contract fails the whole frame with `Inference`.
    pub fn infer(
        &self,
        frame: &Frame,
        threshold: DetectionThreshold,
    ) -> Result<Vec<Detection>, PipelineError> {
        let raw = {
            let mut guard = self.backend.lock().map_err(|_| poisoned())?;
            guard.infer(frame, threshold.value())
        };
        let raw = raw.map_err(|e| match e {
            BackendError::Unavailable(cause) => PipelineError::BackendUnavailable(cause),
            BackendError::Inference(cause) => PipelineError::Inference {
                frame_index: frame.index(),
                source: cause,
            },
        })?;

        raw.into_iter()
            .map(|r| {
                Detection::from_raw(r).map_err(|violation| PipelineError::Inference {
                    frame_index: frame.index(),
                    source: anyhow::Error::new(violation).context("backend contract violation"),
                })
            })
            .collect()
    }
}

fn poisoned() -> PipelineError {
    PipelineError::BackendUnavailable(anyhow!("backend lock poisoned"))
}
