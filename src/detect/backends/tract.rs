#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::{BackendError, InferenceBackend};
use crate::detect::classes::COCO_CLASSES;
use crate::detect::result::{BoundingBox, RawDetection};
use crate::frame::Frame;

const BOX_ATTRS: usize = 4;
const PAD_VALUE: u8 = 114;

/// Tract-based YOLOv8 detector.
///
/// Loads a local ONNX export (`yolov8n.onnx` and friends) with a square
/// `[1, 3, S, S]` input and a `[1, 4 + classes, anchors]` output. Frames are
/// letterboxed into the input, decoded, NMS'd per class and mapped back to
/// frame pixels. No network I/O; nothing is written to disk.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    iou_threshold: f32,
    labels: Vec<String>,
}

struct Letterbox {
    scale: f32,
    frame_width: f32,
    frame_height: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if input_size == 0 {
            return Err(anyhow!("model input size must be greater than zero"));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} ({}x{} input)",
            model_path.display(),
            input_size,
            input_size
        );

        Ok(Self {
            model,
            input_size,
            iou_threshold: 0.45,
            labels: COCO_CLASSES.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Override the NMS IoU threshold.
    pub fn with_iou_threshold(mut self, iou: f32) -> Self {
        self.iou_threshold = iou;
        self
    }

    /// Replace the class names (for models not trained on COCO).
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    fn label_for(&self, class_id: usize) -> String {
        self.labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }

    fn build_input(&self, frame: &Frame) -> Result<(Tensor, Letterbox)> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(anyhow!("empty frame {}x{}", frame.width(), frame.height()));
        }
        let side = self.input_size;
        let scale = (side as f32 / frame.width() as f32).min(side as f32 / frame.height() as f32);
        let new_w = ((frame.width() as f32 * scale).round() as u32).clamp(1, side);
        let new_h = ((frame.height() as f32 * scale).round() as u32).clamp(1, side);

        let resized = image::imageops::resize(frame.image(), new_w, new_h, FilterType::Triangle);
        let mut canvas = RgbImage::from_pixel(side, side, Rgb([PAD_VALUE; 3]));
        image::imageops::replace(&mut canvas, &resized, 0, 0);

        let side = side as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            canvas.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });

        Ok((
            input.into_tensor(),
            Letterbox {
                scale,
                frame_width: frame.width() as f32,
                frame_height: frame.height() as f32,
            },
        ))
    }

    fn decode(
        &self,
        output: &Tensor,
        letterbox: &Letterbox,
        threshold_hint: f32,
    ) -> Result<Vec<RawDetection>> {
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let view = view
            .into_dimensionality::<tract_ndarray::Ix3>()
            .map_err(|_| anyhow!("unexpected YOLOv8 output shape {:?}", output.shape()))?;
        let candidates = decode_anchors(view, letterbox, threshold_hint)?;

        let kept = non_max_suppression(candidates, self.iou_threshold);
        Ok(kept
            .into_iter()
            .map(|(class_id, confidence, b)| {
                RawDetection::new(self.label_for(class_id), confidence, [b.x1, b.y1, b.x2, b.y2])
            })
            .collect())
    }
}

/// Best class per anchor above `threshold_hint`, boxes mapped back to frame pixels.
/// Anchors with non-finite geometry are dropped.
fn decode_anchors(
    view: tract_ndarray::ArrayView3<'_, f32>,
    letterbox: &Letterbox,
    threshold_hint: f32,
) -> Result<Vec<(usize, f32, BoundingBox)>> {
    let shape = view.shape();
    if shape[0] != 1 || shape[1] <= BOX_ATTRS {
        return Err(anyhow!("unexpected YOLOv8 output shape {:?}", shape));
    }
    let num_classes = shape[1] - BOX_ATTRS;
    let anchors = shape[2];

    let mut candidates = Vec::new();
    for i in 0..anchors {
        let (class_id, confidence) = (0..num_classes)
            .map(|c| (c, view[[0, BOX_ATTRS + c, i]]))
            .fold((0, f32::NEG_INFINITY), |best, x| if x.1 > best.1 { x } else { best });
        if !confidence.is_finite() || confidence < threshold_hint {
            continue;
        }

        let cx = view[[0, 0, i]] / letterbox.scale;
        let cy = view[[0, 1, i]] / letterbox.scale;
        let w = view[[0, 2, i]] / letterbox.scale;
        let h = view[[0, 3, i]] / letterbox.scale;
        if ![cx, cy, w, h].iter().all(|v| v.is_finite()) {
            log::debug!("TractBackend: anchor {} has non-finite geometry, skipped", i);
            continue;
        }
        let x1 = (cx - w / 2.0).clamp(0.0, letterbox.frame_width);
        let y1 = (cy - h / 2.0).clamp(0.0, letterbox.frame_height);
        let x2 = (cx + w / 2.0).clamp(x1, letterbox.frame_width);
        let y2 = (cy + h / 2.0).clamp(y1, letterbox.frame_height);
        let bbox = BoundingBox::new(x1, y1, x2, y2)
            .map_err(|e| anyhow!("decoded anchor {}: {}", i, e))?;
        candidates.push((class_id, confidence.min(1.0), bbox));
    }
    Ok(candidates)
}

/// Per-class greedy NMS. Output is ordered by descending confidence.
fn non_max_suppression(
    mut candidates: Vec<(usize, f32, BoundingBox)>,
    iou_threshold: f32,
) -> Vec<(usize, f32, BoundingBox)> {
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
    let mut kept: Vec<(usize, f32, BoundingBox)> = Vec::new();
    for candidate in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.0 == candidate.0 && k.2.iou(&candidate.2) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(
        &mut self,
        frame: &Frame,
        threshold_hint: f32,
    ) -> Result<Vec<RawDetection>, BackendError> {
        let (input, letterbox) = self.build_input(frame).map_err(BackendError::Inference)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")
            .map_err(BackendError::Inference)?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))
            .map_err(BackendError::Inference)?;
        self.decode(output, &letterbox, threshold_hint)
            .map_err(BackendError::Inference)
    }

    fn warm_up(&mut self) -> Result<(), BackendError> {
        let frame = Frame::filled(self.input_size, self.input_size, [PAD_VALUE; 3], 0);
        self.infer(&frame, 1.0)
            .map(|_| ())
            .map_err(|e| match e {
                BackendError::Inference(cause) => {
                    BackendError::Unavailable(cause.context("warm-up inference failed"))
                }
                other => other,
            })
    }
}
