//! Frame pipeline: backend -> filter -> annotate -> aggregate.
//!
//! Single-image runs return the annotated frame in the `RunResult`. Stream runs
//! pull frames from a `FrameSource` in order, write every frame to a `FrameSink`
//! (annotated, or unannotated when inference failed on it), and return the
//! aggregated detections once the source is exhausted or the run is cancelled.
//!
//! Everything for frame k is emitted before frame k+1 is read. The pipeline holds
//! no per-run state, so one instance (and its shared backend) may serve many runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::anyhow;

use crate::aggregate::Aggregator;
use crate::alert::AlertEvaluator;
use crate::annotate::Annotator;
use crate::detect::{filter_detections, ClassSet, Detection, DetectionAdapter, DetectionThreshold};
use crate::frame::{Frame, StreamInfo};
use crate::ingest::{FrameSink, FrameSource};

mod error;
mod result;
mod stream;

pub use error::PipelineError;
pub use result::{ClassShare, RunOutcome, RunResult, StreamSummary};
pub use stream::StreamState;

/// Cooperative cancellation, checked between frames.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Re-arm the token for the next run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Consume a pending cancellation. The run that observes it is the only one
    /// it stops.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Per-frame callbacks for incremental display. Called in frame order, on the
/// pipeline's thread.
pub trait FrameObserver {
    fn on_start(&mut self, _info: &StreamInfo) {}

    fn on_state(&mut self, _state: StreamState) {}

    /// `frame` is what was written to the sink.
    fn on_frame(&mut self, _index: u64, _frame: &Frame, _detections: &[Detection]) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl FrameObserver for NoopObserver {}

pub struct FramePipeline {
    adapter: DetectionAdapter,
    annotator: Annotator,
    alerts: AlertEvaluator,
    cancel: CancelToken,
}

impl FramePipeline {
    pub fn new(adapter: DetectionAdapter) -> Self {
        Self {
            adapter,
            annotator: Annotator::new(),
            alerts: AlertEvaluator::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_alerts(mut self, alerts: AlertEvaluator) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn adapter(&self) -> &DetectionAdapter {
        &self.adapter
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub(crate) fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    pub(crate) fn alerts(&self) -> &AlertEvaluator {
        &self.alerts
    }

    /// Detect, filter, annotate and aggregate a single frame.
    ///
    /// Any inference failure is returned as is. Detections carry no frame index.
    pub fn process_image(
        &self,
        frame: &Frame,
        threshold: DetectionThreshold,
        allow_list: Option<&ClassSet>,
    ) -> Result<RunResult, PipelineError> {
        let detections = self.detect(frame, threshold, allow_list)?;
        let annotated = self.annotator.annotate(frame, &detections);

        let mut aggregator = Aggregator::new();
        aggregator.observe(detections);
        aggregator.advance_frame();

        let result = RunResult::for_image(
            annotated,
            aggregator.into_state().into_detections(),
            &self.alerts,
        );
        log::info!(
            "image: {} detections, alerts: {}",
            result.detections().len(),
            result.alerts().len()
        );
        Ok(result)
    }

    /// Single-image mode over a source, reading only its first frame.
    pub fn process_image_source(
        &self,
        source: &mut dyn FrameSource,
        threshold: DetectionThreshold,
        allow_list: Option<&ClassSet>,
    ) -> Result<RunResult, PipelineError> {
        let source_name = source.describe();
        let open_failed = |err: anyhow::Error| PipelineError::SourceOpen {
            source_name: source_name.clone(),
            source: err,
        };
        source.open().map_err(open_failed)?;
        let first = source.next_frame();
        if let Err(err) = source.close() {
            log::warn!("image: failed to close source {}: {:#}", source_name, err);
        }
        let frame = first
            .map_err(open_failed)?
            .ok_or_else(|| open_failed(anyhow!("source produced no frame")))?;
        self.process_image(&frame, threshold, allow_list)
    }

    /// Run a whole stream from `source` into `sink`.
    ///
    /// Source and sink are opened here and closed exactly once before returning,
    /// on every path.
    pub fn process_stream(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        threshold: DetectionThreshold,
        allow_list: Option<&ClassSet>,
    ) -> Result<RunResult, PipelineError> {
        self.process_stream_observed(source, sink, threshold, allow_list, &mut NoopObserver)
    }

    pub fn process_stream_observed(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        threshold: DetectionThreshold,
        allow_list: Option<&ClassSet>,
        observer: &mut dyn FrameObserver,
    ) -> Result<RunResult, PipelineError> {
        stream::StreamRun::new(self, threshold, allow_list, observer).run(source, sink)
    }

    pub(crate) fn detect(
        &self,
        frame: &Frame,
        threshold: DetectionThreshold,
        allow_list: Option<&ClassSet>,
    ) -> Result<Vec<Detection>, PipelineError> {
        let raw = self.adapter.infer(frame, threshold)?;
        Ok(filter_detections(raw, threshold, allow_list))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{RawDetection, StubBackend};
    use crate::ingest::{MemorySink, MemorySource};

    fn frames(n: u64) -> Vec<Frame> {
        (0..n).map(|i| Frame::filled(16, 16, [10, 10, 10], i)).collect()
    }

    #[derive(Default)]
    struct Recorder {
        states: Vec<StreamState>,
        frames: Vec<(u64, usize)>,
    }

    impl FrameObserver for Recorder {
        fn on_state(&mut self, state: StreamState) {
            self.states.push(state);
        }

        fn on_frame(&mut self, index: u64, _frame: &Frame, detections: &[Detection]) {
            self.frames.push((index, detections.len()));
        }
    }

    #[test]
    fn observer_sees_states_and_frames_in_order() -> anyhow::Result<()> {
        let backend = StubBackend::new()
            .with_default(vec![RawDetection::new("person", 0.9, [1.0, 1.0, 8.0, 8.0])])
            .failing_on(1, "decoder hiccup");
        let pipeline = FramePipeline::new(DetectionAdapter::from_backend(backend));
        let mut source = MemorySource::new("clip", frames(3), 10.0)?;
        let mut sink = MemorySink::new();
        let mut recorder = Recorder::default();

        let result = pipeline.process_stream_observed(
            &mut source,
            &mut sink,
            DetectionThreshold::DEFAULT,
            None,
            &mut recorder,
        )?;

        assert_eq!(
            recorder.states,
            vec![
                StreamState::Opening,
                StreamState::Streaming,
                StreamState::Draining,
                StreamState::Closed
            ]
        );
        assert_eq!(recorder.frames, vec![(0, 1), (1, 0), (2, 1)]);
        assert_eq!(result.stream().map(|s| s.frames_passed_through), Some(1));
        Ok(())
    }

    #[test]
    fn image_mode_leaves_frame_index_unset() -> anyhow::Result<()> {
        let backend = StubBackend::new()
            .with_default(vec![RawDetection::new("cat", 0.7, [0.0, 0.0, 4.0, 4.0])]);
        let pipeline = FramePipeline::new(DetectionAdapter::from_backend(backend));
        let result =
            pipeline.process_image(&Frame::filled(8, 8, [0, 0, 0], 0), DetectionThreshold::DEFAULT, None)?;
        assert_eq!(result.detections()[0].frame_index(), None);
        assert!(result.annotated_frame().is_some());
        Ok(())
    }

    #[test]
    fn image_mode_inference_failure_is_fatal() {
        let backend = StubBackend::new().failing_on(0, "bad frame");
        let pipeline = FramePipeline::new(DetectionAdapter::from_backend(backend));
        let err = pipeline
            .process_image(&Frame::filled(8, 8, [0, 0, 0], 0), DetectionThreshold::DEFAULT, None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Inference { frame_index: 0, .. }));
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let handle = token.clone();
        handle.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn take_consumes_a_pending_cancellation() {
        let token = CancelToken::new();
        assert!(!token.take());
        token.cancel();
        assert!(token.take());
        assert!(!token.is_cancelled());
        assert!(!token.take());
    }
}
