use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::aggregate::{count_by_class, ClassCounts};
use crate::alert::AlertEvaluator;
use crate::detect::Detection;
use crate::frame::{Frame, StreamInfo};

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    /// Stopped by the caller between frames. Not a failure.
    Cancelled { at_frame: u64 },
}

/// What happened on the sink side of a stream run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StreamSummary {
    pub sink: String,
    pub info: StreamInfo,
    pub frames_written: u64,
    /// Frames written without annotation because inference failed on them.
    pub frames_passed_through: u64,
}

/// One row of the class distribution.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassShare {
    pub label: String,
    pub count: usize,
    pub share: f64,
}

/// Result of one pipeline invocation. Immutable once built.
#[derive(Clone, Debug, Serialize)]
pub struct RunResult {
    outcome: RunOutcome,
    detections: Vec<Detection>,
    counts: ClassCounts,
    alerts: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<StreamSummary>,
    #[serde(skip)]
    annotated: Option<Frame>,
}

impl RunResult {
    pub(crate) fn for_image(
        annotated: Frame,
        detections: Vec<Detection>,
        alerts: &AlertEvaluator,
    ) -> Self {
        Self::build(RunOutcome::Completed, detections, alerts, None, Some(annotated))
    }

    pub(crate) fn for_stream(
        outcome: RunOutcome,
        detections: Vec<Detection>,
        alerts: &AlertEvaluator,
        summary: StreamSummary,
    ) -> Self {
        Self::build(outcome, detections, alerts, Some(summary), None)
    }

    fn build(
        outcome: RunOutcome,
        detections: Vec<Detection>,
        alerts: &AlertEvaluator,
        stream: Option<StreamSummary>,
        annotated: Option<Frame>,
    ) -> Self {
        let counts = count_by_class(&detections);
        let alerts = alerts.evaluate(&counts);
        Self {
            outcome,
            detections,
            counts,
            alerts,
            stream,
            annotated,
        }
    }

    pub fn outcome(&self) -> RunOutcome {
        self.outcome
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, RunOutcome::Cancelled { .. })
    }

    /// Surviving detections in emission order (frame order, then backend order).
    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn counts(&self) -> &ClassCounts {
        &self.counts
    }

    pub fn alerts(&self) -> &BTreeSet<String> {
        &self.alerts
    }

    /// "No detections" is a normal, successful result.
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Annotated frame, for single-image runs.
    pub fn annotated_frame(&self) -> Option<&Frame> {
        self.annotated.as_ref()
    }

    pub fn into_annotated_frame(self) -> Option<Frame> {
        self.annotated
    }

    /// Sink summary, for stream runs.
    pub fn stream(&self) -> Option<&StreamSummary> {
        self.stream.as_ref()
    }

    /// Class distribution, most frequent first, ties by label.
    pub fn distribution(&self) -> Vec<ClassShare> {
        let total = self.detections.len();
        let mut rows: Vec<ClassShare> = self
            .counts
            .iter()
            .map(|(label, count)| ClassShare {
                label: label.clone(),
                count: *count,
                share: if total == 0 {
                    0.0
                } else {
                    *count as f64 / total as f64
                },
            })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
        rows
    }

    /// Structured record for export and charting.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize run result")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::WatchList;
    use crate::detect::BoundingBox;

    fn det(label: &str) -> Detection {
        Detection::new(label, 0.9, BoundingBox::new(0.0, 0.0, 2.0, 2.0).unwrap()).unwrap()
    }

    #[test]
    fn counts_and_alerts_derive_from_detections() {
        let watch: WatchList = ["car"].into_iter().collect();
        let evaluator = AlertEvaluator::new(watch);
        let result = RunResult::for_image(
            Frame::filled(2, 2, [0, 0, 0], 0),
            vec![det("car"), det("person"), det("car")],
            &evaluator,
        );
        assert_eq!(result.counts().values().sum::<usize>(), result.detections().len());
        assert_eq!(result.counts()["car"], 2);
        assert!(result.alerts().contains("car"));
        assert!(result.annotated_frame().is_some());
    }

    #[test]
    fn distribution_orders_by_count_then_label() {
        let result = RunResult::for_image(
            Frame::filled(2, 2, [0, 0, 0], 0),
            vec![det("dog"), det("car"), det("person"), det("car")],
            &AlertEvaluator::default(),
        );
        let rows = result.distribution();
        let labels: Vec<&str> = rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["car", "dog", "person"]);
        assert!((rows[0].share - 0.5).abs() < 1e-9);
    }

    #[test]
    fn json_export_carries_detections_counts_and_outcome() -> Result<()> {
        let result = RunResult::for_image(
            Frame::filled(2, 2, [0, 0, 0], 0),
            vec![det("person")],
            &AlertEvaluator::default(),
        );
        let value: serde_json::Value = serde_json::from_str(&result.to_json()?)?;
        assert_eq!(value["outcome"]["status"], "completed");
        assert_eq!(value["detections"][0]["class"], "person");
        assert_eq!(value["counts"]["person"], 1);
        assert!(value.get("annotated").is_none());
        assert!(value.get("stream").is_none());
        Ok(())
    }
}
