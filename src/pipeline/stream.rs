//! Stream run state machine.
//!
//! `Idle -> Opening -> Streaming -> (Draining | Aborted) -> Closed`
//!
//! A `StreamRun` is built for one call and consumed by it. The source and sink are
//! held by guards that close them exactly once, whether the run drains, aborts,
//! is cancelled, or unwinds.

use anyhow::{anyhow, Context};
use serde::Serialize;

use super::result::{RunOutcome, RunResult, StreamSummary};
use super::{FrameObserver, FramePipeline, PipelineError};
use crate::aggregate::Aggregator;
use crate::detect::{ClassSet, DetectionThreshold};
use crate::frame::StreamInfo;
use crate::ingest::{FrameSink, FrameSource};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Idle,
    Opening,
    Streaming,
    Draining,
    Aborted,
    Closed,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Aborted | StreamState::Closed)
    }
}

pub(crate) struct StreamRun<'a> {
    pipeline: &'a FramePipeline,
    threshold: DetectionThreshold,
    allow_list: Option<&'a ClassSet>,
    observer: &'a mut dyn FrameObserver,
    state: StreamState,
    aggregator: Aggregator,
    frames_written: u64,
    frames_passed_through: u64,
}

impl<'a> StreamRun<'a> {
    pub(crate) fn new(
        pipeline: &'a FramePipeline,
        threshold: DetectionThreshold,
        allow_list: Option<&'a ClassSet>,
        observer: &'a mut dyn FrameObserver,
    ) -> Self {
        Self {
            pipeline,
            threshold,
            allow_list,
            observer,
            state: StreamState::Idle,
            aggregator: Aggregator::new(),
            frames_written: 0,
            frames_passed_through: 0,
        }
    }

    pub(crate) fn run(
        mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> Result<RunResult, PipelineError> {
        self.transition(StreamState::Opening);

        let source_name = source.describe();
        let info = match source.open() {
            Ok(info) => info,
            Err(err) => {
                self.transition(StreamState::Closed);
                return Err(PipelineError::SourceOpen {
                    source_name,
                    source: err,
                });
            }
        };
        let mut source = SourceGuard::new(source);

        let sink_name = sink.describe();
        if let Err(err) = sink.open(&info) {
            source.release();
            self.transition(StreamState::Closed);
            return Err(PipelineError::SinkOpen {
                sink_name,
                source: err,
            });
        }
        let mut sink = SinkGuard::new(sink);

        log::info!(
            "stream: {} -> {} ({}x{} @ {:.2} fps)",
            source_name,
            sink_name,
            info.width,
            info.height,
            info.frame_rate
        );
        self.observer.on_start(&info);
        self.transition(StreamState::Streaming);

        let outcome = loop {
            let index = self.aggregator.current_frame_index();
            if self.pipeline.cancel_token().take() {
                log::info!("stream: cancelled before frame {}", index);
                break RunOutcome::Cancelled { at_frame: index };
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame.with_index(index),
                Ok(None) => break RunOutcome::Completed,
                Err(err) => {
                    return Err(self.abort(
                        source,
                        sink,
                        index,
                        err.context(format!("read frame {} from {}", index, source_name)),
                    ))
                }
            };

            let logged_before = self.aggregator.state().detections().len();
            let output = match self.pipeline.detect(&frame, self.threshold, self.allow_list) {
                Ok(detections) => {
                    let detections: Vec<_> =
                        detections.into_iter().map(|d| d.at_frame(index)).collect();
                    let annotated = self.pipeline.annotator().annotate(&frame, &detections);
                    self.aggregator.observe(detections);
                    annotated
                }
                Err(PipelineError::Inference { source: cause, .. }) => {
                    log::warn!(
                        "stream: inference failed on frame {}, writing it unannotated: {:#}",
                        index,
                        cause
                    );
                    self.frames_passed_through += 1;
                    frame
                }
                Err(err) => {
                    self.transition(StreamState::Aborted);
                    source.release();
                    sink.release_quietly();
                    self.transition(StreamState::Closed);
                    return Err(err);
                }
            };

            if let Err(err) = sink.write(&output) {
                return Err(self.abort(
                    source,
                    sink,
                    index,
                    err.context(format!("write frame {} to {}", index, sink_name)),
                ));
            }
            self.frames_written += 1;

            let frame_detections = &self.aggregator.state().detections()[logged_before..];
            self.observer.on_frame(index, &output, frame_detections);
            self.aggregator.advance_frame();
        };

        self.drain(source, sink, outcome, info, sink_name)
    }

    fn drain(
        mut self,
        mut source: SourceGuard<'_>,
        mut sink: SinkGuard<'_>,
        outcome: RunOutcome,
        info: StreamInfo,
        sink_name: String,
    ) -> Result<RunResult, PipelineError> {
        self.transition(StreamState::Draining);
        let index = self.aggregator.current_frame_index();
        let sink_closed = sink.release();
        source.release();
        if let Err(err) = sink_closed {
            let err = err.context(format!("finalize {}", sink_name));
            return Err(self.fail(index, err));
        }
        self.transition(StreamState::Closed);

        let state = self.aggregator.into_state();
        let summary = StreamSummary {
            sink: sink_name,
            info,
            frames_written: self.frames_written,
            frames_passed_through: self.frames_passed_through,
        };
        let result = RunResult::for_stream(
            outcome,
            state.into_detections(),
            self.pipeline.alerts(),
            summary,
        );
        log::info!(
            "stream: {} frames, {} detections, {} passed through, alerts: {}",
            self.frames_written,
            result.detections().len(),
            self.frames_passed_through,
            format_alerts(result.alerts().iter())
        );
        Ok(result)
    }

    fn abort(
        mut self,
        mut source: SourceGuard<'_>,
        mut sink: SinkGuard<'_>,
        index: u64,
        cause: anyhow::Error,
    ) -> PipelineError {
        self.transition(StreamState::Aborted);
        source.release();
        sink.release_quietly();
        self.fail(index, cause)
    }

    fn fail(mut self, index: u64, cause: anyhow::Error) -> PipelineError {
        if self.state != StreamState::Aborted {
            self.transition(StreamState::Aborted);
        }
        log::warn!("stream: aborted at frame {}: {:#}", index, cause);
        self.transition(StreamState::Closed);
        PipelineError::StreamProcessing {
            frame_index: index,
            source: cause,
            partial: Box::new(self.aggregator.into_state()),
        }
    }

    fn transition(&mut self, next: StreamState) {
        log::debug!("stream: {:?} -> {:?}", self.state, next);
        self.state = next;
        self.observer.on_state(next);
    }
}

fn format_alerts<'s>(alerts: impl Iterator<Item = &'s String>) -> String {
    let list: Vec<&str> = alerts.map(String::as_str).collect();
    if list.is_empty() {
        "none".to_string()
    } else {
        list.join(", ")
    }
}

struct SourceGuard<'a> {
    source: &'a mut dyn FrameSource,
    released: bool,
}

impl<'a> SourceGuard<'a> {
    fn new(source: &'a mut dyn FrameSource) -> Self {
        Self {
            source,
            released: false,
        }
    }

    fn next_frame(&mut self) -> anyhow::Result<Option<crate::frame::Frame>> {
        if self.released {
            return Err(anyhow!("frame source already released"));
        }
        self.source.next_frame()
    }

    /// Source close failures cannot affect output, so they are only logged.
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.source.close() {
            log::warn!(
                "stream: failed to close source {}: {:#}",
                self.source.describe(),
                err
            );
        }
    }
}

impl Drop for SourceGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

struct SinkGuard<'a> {
    sink: &'a mut dyn FrameSink,
    released: bool,
}

impl<'a> SinkGuard<'a> {
    fn new(sink: &'a mut dyn FrameSink) -> Self {
        Self {
            sink,
            released: false,
        }
    }

    fn write(&mut self, frame: &crate::frame::Frame) -> anyhow::Result<()> {
        if self.released {
            return Err(anyhow!("frame sink already released"));
        }
        self.sink.write(frame)
    }

    fn release(&mut self) -> anyhow::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.sink.close().context("close frame sink")
    }

    fn release_quietly(&mut self) {
        if let Err(err) = self.release() {
            log::warn!(
                "stream: failed to close sink {}: {:#}",
                self.sink.describe(),
                err
            );
        }
    }
}

impl Drop for SinkGuard<'_> {
    fn drop(&mut self) {
        self.release_quietly();
    }
}
