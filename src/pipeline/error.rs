use thiserror::Error;

use crate::aggregate::PipelineState;

/// Why a pipeline run did not produce a `RunResult`.
///
/// Per-frame inference failures during a stream run never show up here; they are
/// absorbed by the pipeline and counted in the result instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The model could not be initialized or reached. Fatal; not retried.
    #[error("inference backend unavailable")]
    BackendUnavailable(#[source] anyhow::Error),

    /// A single frame could not be processed. Only surfaced in single-image mode.
    #[error("inference failed on frame {frame_index}")]
    Inference {
        frame_index: u64,
        #[source]
        source: anyhow::Error,
    },

    /// The frame source could not be opened. No frame was processed.
    #[error("failed to open frame source {source_name}")]
    SourceOpen {
        source_name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The frame sink could not be opened. No frame was processed.
    #[error("failed to open frame sink {sink_name}")]
    SinkOpen {
        sink_name: String,
        #[source]
        source: anyhow::Error,
    },

    /// A read or write failed mid-stream. Source and sink were released; the
    /// state accumulated up to the failure is kept for inspection.
    #[error("stream processing failed at frame {frame_index}")]
    StreamProcessing {
        frame_index: u64,
        #[source]
        source: anyhow::Error,
        partial: Box<PipelineState>,
    },
}

impl PipelineError {
    /// Partial state for aborted stream runs.
    pub fn partial_state(&self) -> Option<&PipelineState> {
        match self {
            PipelineError::StreamProcessing { partial, .. } => Some(partial),
            _ => None,
        }
    }

    /// Frame the error is attached to, when there is one.
    pub fn frame_index(&self) -> Option<u64> {
        match self {
            PipelineError::Inference { frame_index, .. }
            | PipelineError::StreamProcessing { frame_index, .. } => Some(*frame_index),
            _ => None,
        }
    }
}
