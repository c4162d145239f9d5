use serde::Serialize;
use thiserror::Error;

/// Axis-aligned box in frame pixel space, top-left (x1, y1) to bottom-right (x2, y2).
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// Build a box, rejecting inverted or non-finite coordinates.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Self, ContractViolation> {
        let bbox = Self { x1, y1, x2, y2 };
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return Err(ContractViolation::NonFiniteBox(bbox));
        }
        if x1 > x2 || y1 > y2 {
            return Err(ContractViolation::InvertedBox(bbox));
        }
        Ok(bbox)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// What a backend hands back before validation.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f32,
    /// x1, y1, x2, y2
    pub bbox: [f32; 4],
}

impl RawDetection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: [f32; 4]) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// A raw detection that breaks the backend contract.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ContractViolation {
    #[error("bounding box {0:?} is inverted (expected x1 <= x2 and y1 <= y2)")]
    InvertedBox(BoundingBox),
    #[error("bounding box {0:?} has non-finite coordinates")]
    NonFiniteBox(BoundingBox),
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f32),
}

/// One model-reported object instance. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    #[serde(rename = "class")]
    label: String,
    confidence: f32,
    bbox: BoundingBox,
    #[serde(rename = "frame", skip_serializing_if = "Option::is_none")]
    frame_index: Option<u64>,
}

impl Detection {
    pub fn new(
        label: impl Into<String>,
        confidence: f32,
        bbox: BoundingBox,
    ) -> Result<Self, ContractViolation> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ContractViolation::ConfidenceOutOfRange(confidence));
        }
        Ok(Self {
            label: label.into(),
            confidence,
            bbox,
            frame_index: None,
        })
    }

    /// Validate a backend detection.
    pub fn from_raw(raw: RawDetection) -> Result<Self, ContractViolation> {
        let [x1, y1, x2, y2] = raw.bbox;
        let bbox = BoundingBox::new(x1, y1, x2, y2)?;
        Self::new(raw.label, raw.confidence, bbox)
    }

    /// Tag the detection with the index of the video frame it came from.
    pub fn at_frame(mut self, index: u64) -> Self {
        self.frame_index = Some(index);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn frame_index(&self) -> Option<u64> {
        self.frame_index
    }
}
