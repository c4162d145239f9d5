//! Per-run detection statistics.
//!
//! `PipelineState` owns the detection log for one run. Counts by class are always
//! derived from that log, so they cannot drift from it.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::detect::Detection;

/// Label -> number of detections with that label.
pub type ClassCounts = BTreeMap<String, usize>;

/// Count detections by exact label. Empty or unknown labels are counted as-is.
pub fn count_by_class(detections: &[Detection]) -> ClassCounts {
    let mut counts = ClassCounts::new();
    for detection in detections {
        *counts.entry(detection.label().to_string()).or_insert(0) += 1;
    }
    counts
}

/// Running state of one stream run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PipelineState {
    current_frame_index: u64,
    detections: Vec<Detection>,
}

impl PipelineState {
    /// Number of frames fully handled so far (annotated or passed through).
    pub fn current_frame_index(&self) -> u64 {
        self.current_frame_index
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn counts(&self) -> ClassCounts {
        count_by_class(&self.detections)
    }

    pub fn into_detections(self) -> Vec<Detection> {
        self.detections
    }
}

/// Immutable view of the aggregator at one point in time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub counts: ClassCounts,
    pub detections: Vec<Detection>,
}

/// Accumulates detections for exactly one run. Calls must arrive in frame order.
#[derive(Debug, Default)]
pub struct Aggregator {
    state: PipelineState,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one frame's surviving detections to the log.
    pub fn observe(&mut self, detections: Vec<Detection>) {
        self.state.detections.extend(detections);
    }

    /// Mark the current frame as handled.
    pub fn advance_frame(&mut self) {
        self.state.current_frame_index += 1;
    }

    pub fn current_frame_index(&self) -> u64 {
        self.state.current_frame_index
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            counts: self.state.counts(),
            detections: self.state.detections.clone(),
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn into_state(self) -> PipelineState {
        self.state
    }
}
