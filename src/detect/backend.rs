use thiserror::Error;

use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// Failure reported by an inference backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The model could not be loaded or reached. Retrying will not help.
    #[error("inference backend unavailable")]
    Unavailable(#[source] anyhow::Error),
    /// This particular frame could not be processed.
    #[error("inference failed")]
    Inference(#[source] anyhow::Error),
}

/// Inference backend trait.
///
/// Implementations wrap a loaded model. They must:
/// - Treat the frame as read-only
/// - Keep no per-call state between `infer` calls (no residual detections, no offsets)
/// - Return boxes in the frame's pixel space
///
/// The threshold is a hint: backends may prune with it, but callers do not rely on it.
pub trait InferenceBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn infer(
        &mut self,
        frame: &Frame,
        threshold_hint: f32,
    ) -> Result<Vec<RawDetection>, BackendError>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}
