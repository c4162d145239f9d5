use anyhow::{anyhow, Result};

use safety_vision::{
    share, AlertEvaluator, BoundingBox, CancelToken, ClassSet, Detection, DetectionAdapter,
    DetectionThreshold, FileConfig, FileSource, Frame, FrameObserver, FramePipeline, FrameSink,
    FrameSource, MemorySink, MemorySource, PipelineError, RawDetection, RunOutcome, StreamInfo,
    StubBackend,
};

fn street() -> Vec<RawDetection> {
    vec![
        RawDetection::new("person", 0.9, [2.0, 2.0, 10.0, 20.0]),
        RawDetection::new("dog", 0.3, [12.0, 14.0, 20.0, 22.0]),
        RawDetection::new("car", 0.6, [4.0, 4.0, 28.0, 16.0]),
    ]
}

fn clip(n: u64) -> Result<MemorySource> {
    let frames = (0..n).map(|i| Frame::filled(32, 24, [40, 40, 40], i)).collect();
    MemorySource::new("clip", frames, 12.5)
}

fn pipeline_with(backend: StubBackend) -> FramePipeline {
    FramePipeline::new(DetectionAdapter::from_backend(backend))
}

fn labels(detections: &[Detection]) -> Vec<&str> {
    detections.iter().map(Detection::label).collect()
}

struct BrokenSource;

impl FrameSource for BrokenSource {
    fn describe(&self) -> String {
        "broken".to_string()
    }

    fn open(&mut self) -> Result<StreamInfo> {
        Err(anyhow!("no such device"))
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Err(anyhow!("never opened"))
    }

    fn close(&mut self) -> Result<()> {
        Err(anyhow!("never opened"))
    }
}

/// Yields `fail_at` frames, then fails every read.
struct FailingSource {
    fail_at: u64,
    read: u64,
    opens: u32,
    closes: u32,
}

impl FailingSource {
    fn failing_read(fail_at: u64) -> Self {
        Self {
            fail_at,
            read: 0,
            opens: 0,
            closes: 0,
        }
    }
}

impl FrameSource for FailingSource {
    fn describe(&self) -> String {
        "flaky".to_string()
    }

    fn open(&mut self) -> Result<StreamInfo> {
        self.opens += 1;
        Ok(StreamInfo::new(32, 24, 12.5))
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.read >= self.fail_at {
            return Err(anyhow!("device disconnected"));
        }
        let frame = Frame::filled(32, 24, [40, 40, 40], self.read);
        self.read += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) -> Result<()> {
        self.closes += 1;
        Ok(())
    }
}

/// Accepts `fail_at` frames, then fails every write.
struct FailingSink {
    fail_at: usize,
    written: usize,
    opens: u32,
    closes: u32,
    fail_open: bool,
    fail_close: bool,
}

impl FailingSink {
    fn failing_write(fail_at: usize) -> Self {
        Self {
            fail_at,
            written: 0,
            opens: 0,
            closes: 0,
            fail_open: false,
            fail_close: false,
        }
    }

    fn failing_close() -> Self {
        Self {
            fail_close: true,
            ..Self::failing_write(usize::MAX)
        }
    }

    fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::failing_write(usize::MAX)
        }
    }
}

impl FrameSink for FailingSink {
    fn describe(&self) -> String {
        "failing".to_string()
    }

    fn open(&mut self, _info: &StreamInfo) -> Result<()> {
        self.opens += 1;
        if self.fail_open {
            return Err(anyhow!("disk full"));
        }
        Ok(())
    }

    fn write(&mut self, _frame: &Frame) -> Result<()> {
        if self.written >= self.fail_at {
            return Err(anyhow!("disk full"));
        }
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closes += 1;
        if self.fail_close {
            return Err(anyhow!("trailer not written"));
        }
        Ok(())
    }
}

#[test]
fn scenario_a_threshold_keeps_person_and_car() -> Result<()> {
    let pipeline = pipeline_with(StubBackend::new().with_default(street()));
    let frame = Frame::filled(32, 24, [0, 0, 0], 0);

    let result = pipeline.process_image(&frame, DetectionThreshold::new(0.5)?, None)?;

    assert_eq!(labels(result.detections()), vec!["person", "car"]);
    assert_eq!(result.counts().len(), 2);
    assert_eq!(result.counts()["person"], 1);
    assert_eq!(result.counts()["car"], 1);
    assert_eq!(
        result.counts().values().sum::<usize>(),
        result.detections().len()
    );
    Ok(())
}

#[test]
fn scenario_b_filtered_out_class_does_not_alert() -> Result<()> {
    let watch: ClassSet = ["dog"].into_iter().collect();
    let pipeline = pipeline_with(StubBackend::new().with_default(street()))
        .with_alerts(AlertEvaluator::new(watch));
    let frame = Frame::filled(32, 24, [0, 0, 0], 0);

    let result = pipeline.process_image(&frame, DetectionThreshold::new(0.5)?, None)?;

    assert!(result.alerts().is_empty());
    Ok(())
}

#[test]
fn watched_class_that_survives_the_filter_alerts() -> Result<()> {
    let watch: ClassSet = ["car", "truck"].into_iter().collect();
    let pipeline = pipeline_with(StubBackend::new().with_default(street()))
        .with_alerts(AlertEvaluator::new(watch));
    let frame = Frame::filled(32, 24, [0, 0, 0], 0);

    let result = pipeline.process_image(&frame, DetectionThreshold::DEFAULT, None)?;

    let alerts: Vec<&str> = result.alerts().iter().map(String::as_str).collect();
    assert_eq!(alerts, vec!["car"]);
    Ok(())
}

#[test]
fn scenario_c_failed_frame_is_passed_through_unannotated() -> Result<()> {
    let person = vec![RawDetection::new("person", 0.9, [2.0, 2.0, 10.0, 20.0])];
    let backend = StubBackend::new()
        .with_default(person)
        .failing_on(3, "corrupt frame");
    let pipeline = pipeline_with(backend);
    let mut source = clip(5)?;
    let mut sink = MemorySink::new();

    let result =
        pipeline.process_stream(&mut source, &mut sink, DetectionThreshold::DEFAULT, None)?;

    assert_eq!(result.outcome(), RunOutcome::Completed);
    assert_eq!(sink.frames().len(), 5);
    assert_eq!(result.detections().len(), 4);
    let indices: Vec<Option<u64>> = result
        .detections()
        .iter()
        .map(Detection::frame_index)
        .collect();
    assert_eq!(indices, vec![Some(0), Some(1), Some(2), Some(4)]);

    // The failed frame reaches the sink exactly as read.
    assert_eq!(sink.frames()[3].pixels(), Frame::filled(32, 24, [40, 40, 40], 3).pixels());
    assert_ne!(sink.frames()[2].pixels(), sink.frames()[3].pixels());

    let summary = result.stream().expect("stream summary");
    assert_eq!(summary.frames_written, 5);
    assert_eq!(summary.frames_passed_through, 1);
    Ok(())
}

#[test]
fn scenario_d_source_open_failure_never_opens_sink() {
    let pipeline = pipeline_with(StubBackend::new());
    let mut source = BrokenSource;
    let mut sink = MemorySink::new();

    let err = pipeline
        .process_stream(&mut source, &mut sink, DetectionThreshold::DEFAULT, None)
        .unwrap_err();

    assert!(matches!(err, PipelineError::SourceOpen { .. }));
    assert!(err.partial_state().is_none());
    assert_eq!(sink.lifecycle(), (0, 0));
}

#[test]
fn stream_of_n_frames_writes_n_frames_in_order() -> Result<()> {
    let backend = StubBackend::new().with_default(street());
    let pipeline = pipeline_with(backend);
    let mut source = clip(7)?;
    let mut sink = MemorySink::new();

    let result =
        pipeline.process_stream(&mut source, &mut sink, DetectionThreshold::DEFAULT, None)?;

    let written: Vec<u64> = sink.frames().iter().map(Frame::index).collect();
    assert_eq!(written, (0..7).collect::<Vec<u64>>());
    assert_eq!(result.detections().len(), 14);
    assert_eq!(result.detections().last().and_then(Detection::frame_index), Some(6));
    assert_eq!(sink.opened_with(), Some(StreamInfo::new(32, 24, 12.5)));
    assert_eq!(source.lifecycle(), (1, 1));
    assert_eq!(sink.lifecycle(), (1, 1));
    Ok(())
}

#[test]
fn allow_list_applies_to_every_frame() -> Result<()> {
    let pipeline = pipeline_with(StubBackend::new().with_default(street()));
    let allow: ClassSet = ["car"].into_iter().collect();
    let mut source = clip(3)?;
    let mut sink = MemorySink::new();

    let result = pipeline.process_stream(
        &mut source,
        &mut sink,
        DetectionThreshold::DEFAULT,
        Some(&allow),
    )?;

    assert_eq!(labels(result.detections()), vec!["car", "car", "car"]);
    assert_eq!(result.counts()["car"], 3);
    Ok(())
}

#[test]
fn empty_stream_completes_with_empty_result() -> Result<()> {
    let pipeline = pipeline_with(StubBackend::new().with_default(street()));
    let mut source = FileSource::new(FileConfig {
        path: "stub://empty".to_string(),
        synthetic_frames: 0,
        synthetic_width: 8,
        synthetic_height: 8,
        ..FileConfig::default()
    })?;
    let mut sink = MemorySink::new();

    let result =
        pipeline.process_stream(&mut source, &mut sink, DetectionThreshold::DEFAULT, None)?;

    assert!(result.is_empty());
    assert!(result.counts().is_empty());
    assert_eq!(result.stream().map(|s| s.frames_written), Some(0));
    assert_eq!(sink.lifecycle(), (1, 1));
    Ok(())
}

#[test]
fn sink_write_failure_aborts_with_partial_state() -> Result<()> {
    let person = vec![RawDetection::new("person", 0.9, [2.0, 2.0, 10.0, 20.0])];
    let pipeline = pipeline_with(StubBackend::new().with_default(person));
    let mut source = clip(6)?;
    let mut sink = FailingSink::failing_write(2);

    let err = pipeline
        .process_stream(&mut source, &mut sink, DetectionThreshold::DEFAULT, None)
        .unwrap_err();

    match &err {
        PipelineError::StreamProcessing {
            frame_index,
            partial,
            ..
        } => {
            assert_eq!(*frame_index, 2);
            assert_eq!(partial.current_frame_index(), 2);
            // Frame 2 was analyzed before its write failed.
            assert_eq!(partial.detections().len(), 3);
            assert_eq!(partial.counts()["person"], 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(source.lifecycle(), (1, 1));
    assert_eq!((sink.opens, sink.closes), (1, 1));
    Ok(())
}

#[test]
fn source_read_failure_aborts_with_partial_state() -> Result<()> {
    let person = vec![RawDetection::new("person", 0.9, [2.0, 2.0, 10.0, 20.0])];
    let pipeline = pipeline_with(StubBackend::new().with_default(person));
    let mut source = FailingSource::failing_read(3);
    let mut sink = MemorySink::new();

    let err = pipeline
        .process_stream(&mut source, &mut sink, DetectionThreshold::DEFAULT, None)
        .unwrap_err();

    match &err {
        PipelineError::StreamProcessing {
            frame_index,
            partial,
            ..
        } => {
            assert_eq!(*frame_index, 3);
            assert_eq!(partial.current_frame_index(), 3);
            assert_eq!(partial.detections().len(), 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.frame_index(), Some(3));
    assert_eq!(sink.frames().len(), 3);
    assert_eq!((source.opens, source.closes), (1, 1));
    assert_eq!(sink.lifecycle(), (1, 1));
    Ok(())
}

#[test]
fn sink_close_failure_fails_a_drained_run() -> Result<()> {
    let person = vec![RawDetection::new("person", 0.9, [2.0, 2.0, 10.0, 20.0])];
    let pipeline = pipeline_with(StubBackend::new().with_default(person));
    let mut source = clip(3)?;
    let mut sink = FailingSink::failing_close();

    let err = pipeline
        .process_stream(&mut source, &mut sink, DetectionThreshold::DEFAULT, None)
        .unwrap_err();

    match &err {
        PipelineError::StreamProcessing {
            frame_index,
            partial,
            ..
        } => {
            assert_eq!(*frame_index, 3);
            assert_eq!(partial.detections().len(), 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(sink.written, 3);
    assert_eq!((sink.opens, sink.closes), (1, 1));
    assert_eq!(source.lifecycle(), (1, 1));
    Ok(())
}

#[test]
fn sink_open_failure_releases_source() -> Result<()> {
    let pipeline = pipeline_with(StubBackend::new());
    let mut source = clip(2)?;
    let mut sink = FailingSink::failing_open();

    let err = pipeline
        .process_stream(&mut source, &mut sink, DetectionThreshold::DEFAULT, None)
        .unwrap_err();

    assert!(matches!(err, PipelineError::SinkOpen { .. }));
    assert_eq!(source.lifecycle(), (1, 1));
    assert_eq!(sink.closes, 0);
    assert_eq!(sink.written, 0);
    Ok(())
}

#[test]
fn unavailable_backend_aborts_stream_and_releases_resources() -> Result<()> {
    let pipeline = pipeline_with(StubBackend::unavailable("model file missing"));
    let mut source = clip(3)?;
    let mut sink = MemorySink::new();

    let err = pipeline
        .process_stream(&mut source, &mut sink, DetectionThreshold::DEFAULT, None)
        .unwrap_err();

    assert!(matches!(err, PipelineError::BackendUnavailable(_)));
    assert!(sink.frames().is_empty());
    assert_eq!(source.lifecycle(), (1, 1));
    assert_eq!(sink.lifecycle(), (1, 1));
    Ok(())
}

struct CancelAfter {
    token: CancelToken,
    after_index: u64,
}

impl FrameObserver for CancelAfter {
    fn on_frame(&mut self, index: u64, _frame: &Frame, _detections: &[Detection]) {
        if index == self.after_index {
            self.token.cancel();
        }
    }
}

#[test]
fn cancellation_returns_partial_result_marked_cancelled() -> Result<()> {
    let token = CancelToken::new();
    let person = vec![RawDetection::new("person", 0.9, [2.0, 2.0, 10.0, 20.0])];
    let pipeline = pipeline_with(StubBackend::new().with_default(person))
        .with_cancel_token(token.clone());
    let mut source = clip(10)?;
    let mut sink = MemorySink::new();
    let mut observer = CancelAfter {
        token,
        after_index: 1,
    };

    let result = pipeline.process_stream_observed(
        &mut source,
        &mut sink,
        DetectionThreshold::DEFAULT,
        None,
        &mut observer,
    )?;

    assert_eq!(result.outcome(), RunOutcome::Cancelled { at_frame: 2 });
    assert!(result.is_cancelled());
    assert_eq!(sink.frames().len(), 2);
    assert_eq!(result.detections().len(), 2);
    assert_eq!(source.lifecycle(), (1, 1));
    assert_eq!(sink.lifecycle(), (1, 1));
    Ok(())
}

#[test]
fn cancellation_stops_only_the_run_that_observes_it() -> Result<()> {
    let token = CancelToken::new();
    let pipeline = pipeline_with(StubBackend::new()).with_cancel_token(token.clone());
    token.cancel();

    let mut source = clip(3)?;
    let mut sink = MemorySink::new();
    let first =
        pipeline.process_stream(&mut source, &mut sink, DetectionThreshold::DEFAULT, None)?;
    assert_eq!(first.outcome(), RunOutcome::Cancelled { at_frame: 0 });
    assert!(sink.frames().is_empty());

    let mut source = clip(3)?;
    let mut sink = MemorySink::new();
    let second =
        pipeline.process_stream(&mut source, &mut sink, DetectionThreshold::DEFAULT, None)?;
    assert_eq!(second.outcome(), RunOutcome::Completed);
    assert_eq!(sink.frames().len(), 3);
    assert!(!token.is_cancelled());
    Ok(())
}

#[test]
fn shared_backend_serves_consecutive_runs_identically() -> Result<()> {
    let handle = share(StubBackend::new().with_default(street()));
    let first = FramePipeline::new(DetectionAdapter::new(handle.clone()));
    let second = FramePipeline::new(DetectionAdapter::new(handle));

    let mut runs = Vec::new();
    for pipeline in [&first, &second, &first] {
        let mut source = clip(3)?;
        let mut sink = MemorySink::new();
        let result =
            pipeline.process_stream(&mut source, &mut sink, DetectionThreshold::DEFAULT, None)?;
        runs.push(result.to_json()?);
    }

    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[1], runs[2]);
    Ok(())
}

#[test]
fn contract_violation_is_recovered_per_frame_in_streams() -> Result<()> {
    let backend = StubBackend::new()
        .with_default(vec![RawDetection::new("person", 0.9, [2.0, 2.0, 10.0, 20.0])])
        .with_frame(1, vec![RawDetection::new("person", 1.4, [2.0, 2.0, 10.0, 20.0])]);
    let pipeline = pipeline_with(backend);
    let mut source = clip(3)?;
    let mut sink = MemorySink::new();

    let result =
        pipeline.process_stream(&mut source, &mut sink, DetectionThreshold::DEFAULT, None)?;

    assert_eq!(sink.frames().len(), 3);
    assert_eq!(result.detections().len(), 2);
    assert_eq!(result.stream().map(|s| s.frames_passed_through), Some(1));
    Ok(())
}

#[test]
fn annotated_frames_differ_from_input_only_where_detected() -> Result<()> {
    let backend = StubBackend::new()
        .with_default(vec![RawDetection::new("person", 0.9, [2.0, 30.0, 10.0, 44.0])]);
    let pipeline = pipeline_with(backend);
    let input = Frame::filled(64, 48, [40, 40, 40], 0);

    let result = pipeline.process_image(&input, DetectionThreshold::DEFAULT, None)?;
    let annotated = result.annotated_frame().expect("annotated frame");

    assert_eq!(input.pixels(), Frame::filled(64, 48, [40, 40, 40], 0).pixels());
    assert_ne!(annotated.pixels(), input.pixels());
    assert_eq!(annotated.image().get_pixel(60, 47), input.image().get_pixel(60, 47));
    let bbox = result.detections()[0].bbox();
    assert_eq!(*bbox, BoundingBox::new(2.0, 30.0, 10.0, 44.0)?);
    Ok(())
}
