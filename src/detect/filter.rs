use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::detect::classes::ClassSet;
use crate::detect::result::Detection;

/// Confidence cutoff in [0, 1]. Detections strictly below it are dropped.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize)]
pub struct DetectionThreshold(f32);

impl DetectionThreshold {
    pub const DEFAULT: DetectionThreshold = DetectionThreshold(0.5);

    pub fn new(value: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&value) {
            return Err(anyhow!(
                "confidence threshold must be within [0, 1], got {}",
                value
            ));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    pub fn admits(&self, confidence: f32) -> bool {
        confidence >= self.0
    }
}

impl Default for DetectionThreshold {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Keep detections at or above `threshold` and, when given, inside `allow_list`.
///
/// Order of the surviving detections is the input order.
pub fn filter_detections(
    detections: Vec<Detection>,
    threshold: DetectionThreshold,
    allow_list: Option<&ClassSet>,
) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| threshold.admits(d.confidence()))
        .filter(|d| allow_list.map_or(true, |allow| allow.contains(d.label())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(label: &str, confidence: f32) -> Detection {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0).unwrap();
        Detection::new(label, confidence, bbox).unwrap()
    }

    fn labels(dets: &[Detection]) -> Vec<&str> {
        dets.iter().map(|d| d.label()).collect()
    }

    #[test]
    fn drops_below_threshold_and_keeps_order() -> Result<()> {
        let raw = vec![det("person", 0.9), det("dog", 0.3), det("car", 0.6)];
        let kept = filter_detections(raw, DetectionThreshold::new(0.5)?, None);
        assert_eq!(labels(&kept), vec!["person", "car"]);
        Ok(())
    }

    #[test]
    fn threshold_is_inclusive() -> Result<()> {
        let kept = filter_detections(vec![det("cat", 0.5)], DetectionThreshold::new(0.5)?, None);
        assert_eq!(kept.len(), 1);
        Ok(())
    }

    #[test]
    fn filtering_is_idempotent() -> Result<()> {
        let t = DetectionThreshold::new(0.4)?;
        let raw = vec![
            det("a", 0.1),
            det("b", 0.4),
            det("c", 0.99),
            det("a", 0.41),
            det("d", 0.0),
        ];
        let once = filter_detections(raw, t, None);
        let twice = filter_detections(once.clone(), t, None);
        assert_eq!(once, twice);
        Ok(())
    }

    #[test]
    fn allow_list_restricts_classes() -> Result<()> {
        let allow: ClassSet = ["car", "truck"].into_iter().collect();
        let raw = vec![det("person", 0.9), det("truck", 0.7), det("car", 0.2)];
        let kept = filter_detections(raw, DetectionThreshold::new(0.5)?, Some(&allow));
        assert_eq!(labels(&kept), vec!["truck"]);
        Ok(())
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(filter_detections(vec![], DetectionThreshold::DEFAULT, None).is_empty());
    }

    #[test]
    fn threshold_rejects_out_of_range_values() {
        assert!(DetectionThreshold::new(-0.1).is_err());
        assert!(DetectionThreshold::new(1.5).is_err());
        assert!(DetectionThreshold::new(f32::NAN).is_err());
        assert!(DetectionThreshold::new(0.0).is_ok());
        assert!(DetectionThreshold::new(1.0).is_ok());
    }
}
