//! SafetyVision detection pipeline
//!
//! This crate runs a pretrained object detector over still images, video files or a
//! live camera, draws the results onto the frames, and summarizes them.
//!
//! # Architecture
//!
//! Frame Source -> Detection Adapter -> Filter -> {Annotator, Aggregator} -> Frame Sink
//! (stream) or `RunResult` (image) -> Alert Evaluator.
//!
//! The pipeline keeps a few guarantees by construction:
//!
//! 1. **No in-place edits**: annotation always returns a new frame.
//! 2. **Derived counts**: counts by class are computed from the detection log.
//! 3. **Strict order**: everything for frame k is emitted before frame k+1 is read.
//! 4. **Exactly-once release**: a stream run closes its source and sink once, on
//!    every exit path.
//!
//! # Module Structure
//!
//! - `frame`: RGB frames and stream properties
//! - `detect`: backend contract, adapter, filter, detection model, backends
//! - `ingest`: frame sources and sinks (still images, files, cameras, memory)
//! - `annotate`: box and label drawing
//! - `aggregate`: per-run detection log and class counts
//! - `alert`: watch-list evaluation
//! - `pipeline`: single-image and stream runs
//! - `config`: file + environment configuration

pub mod aggregate;
pub mod alert;
pub mod annotate;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod pipeline;

pub use aggregate::{count_by_class, Aggregator, ClassCounts, PipelineState, Snapshot};
pub use alert::{AlertEvaluator, AlertPolicy, WatchList};
pub use annotate::Annotator;
pub use config::AppConfig;
pub use detect::{
    filter_detections, share, BackendError, BackendRegistry, BoundingBox, ClassSet,
    Detection, DetectionAdapter, DetectionThreshold, InferenceBackend, RawDetection,
    SharedBackend, StubBackend, COCO_CLASSES,
};
pub use frame::{Frame, StreamInfo};
pub use ingest::{
    FileConfig, FileSink, FileSource, FrameDirSink, FrameSink, FrameSource, ImageFileSource,
    MemorySink, MemorySource, NullSink,
};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::{V4l2Config, V4l2Source};
pub use pipeline::{
    CancelToken, ClassShare, FrameObserver, FramePipeline, NoopObserver, PipelineError,
    RunOutcome, RunResult, StreamState, StreamSummary,
};
