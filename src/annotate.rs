//! Draws detection boxes and labels onto a copy of a frame.
//!
//! Boxes are drawn in detection order, so where boxes overlap the one that comes
//! later in the list is painted on top.

use std::collections::HashMap;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::detect::{BoundingBox, Detection};
use crate::frame::Frame;

static FONT_BYTES: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

const PALETTE: [[u8; 3]; 12] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [26, 147, 52],
    [0, 212, 187],
    [44, 153, 168],
    [0, 194, 255],
    [52, 69, 147],
    [100, 115, 255],
];

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Text drawn above a box: class name and confidence rounded to two decimals.
pub fn label_text(detection: &Detection) -> String {
    format!("{} {:.2}", detection.label(), detection.confidence())
}

/// Stable palette colour for a label.
pub fn class_color(label: &str) -> Rgb<u8> {
    // FNV-1a
    let mut hash: u32 = 0x811c_9dc5;
    for byte in label.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    Rgb(PALETTE[hash as usize % PALETTE.len()])
}

/// The font compiled into the crate, used for labels unless another is set.
pub fn bundled_font() -> Option<FontArc> {
    match FontArc::try_from_slice(FONT_BYTES) {
        Ok(font) => Some(font),
        Err(err) => {
            log::warn!("annotate: bundled font unusable, labels disabled: {}", err);
            None
        }
    }
}

/// Load a TrueType/OpenType font for label text.
pub fn load_font(path: &Path) -> Result<FontArc> {
    let bytes = std::fs::read(path)
        .map_err(|e| anyhow!("failed to read font {}: {}", path.display(), e))?;
    FontArc::try_from_vec(bytes).map_err(|_| anyhow!("invalid font file {}", path.display()))
}

#[derive(Clone)]
pub struct Annotator {
    font: Option<FontArc>,
    font_scale: f32,
    thickness: u32,
    colors: HashMap<String, Rgb<u8>>,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

impl Annotator {
    /// Boxes and labels, with labels set in the bundled font.
    pub fn new() -> Self {
        Self {
            font: bundled_font(),
            font_scale: 18.0,
            thickness: 2,
            colors: HashMap::new(),
        }
    }

    /// Replace the label font.
    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    pub fn with_thickness(mut self, thickness: u32) -> Self {
        self.thickness = thickness.max(1);
        self
    }

    /// Pin a colour for one class instead of the palette colour.
    pub fn with_class_color(mut self, label: impl Into<String>, color: Rgb<u8>) -> Self {
        self.colors.insert(label.into(), color);
        self
    }

    pub fn color_for(&self, label: &str) -> Rgb<u8> {
        self.colors
            .get(label)
            .copied()
            .unwrap_or_else(|| class_color(label))
    }

    /// Copy `frame` and draw every detection on the copy. `frame` is left untouched.
    pub fn annotate(&self, frame: &Frame, detections: &[Detection]) -> Frame {
        let mut canvas = frame.to_image();
        for detection in detections {
            self.draw_detection(&mut canvas, detection);
        }
        Frame::new(canvas, frame.index())
    }

    fn draw_detection(&self, canvas: &mut RgbImage, detection: &Detection) {
        let Some((x, y, w, h)) = visible_rect(detection.bbox(), canvas.width(), canvas.height())
        else {
            return;
        };
        let color = self.color_for(detection.label());

        for t in 0..self.thickness {
            let inset = t as i32;
            let rect = Rect::at(x + inset, y + inset).of_size(
                w.saturating_sub(2 * t).max(1),
                h.saturating_sub(2 * t).max(1),
            );
            draw_hollow_rect_mut(canvas, rect, color);
        }

        if let Some(font) = &self.font {
            let text = label_text(detection);
            let scale = PxScale::from(self.font_scale);
            let (text_w, text_h) = text_size(scale, font, &text);
            let plate_h = text_h + 4;
            // Above the box when there is room, inside it otherwise.
            let plate_y = if y >= plate_h as i32 { y - plate_h as i32 } else { y };
            draw_filled_rect_mut(
                canvas,
                Rect::at(x, plate_y).of_size(text_w + 4, plate_h),
                color,
            );
            draw_text_mut(canvas, TEXT_COLOR, x + 2, plate_y + 2, scale, font, &text);
        }
    }
}

/// `bbox` in whole pixels, intersected with a `width` x `height` canvas. `None`
/// when no part of the box is on the canvas.
fn visible_rect(bbox: &BoundingBox, width: u32, height: u32) -> Option<(i32, i32, u32, u32)> {
    let (fw, fh) = (width as f32, height as f32);
    if bbox.x1 >= fw || bbox.y1 >= fh || bbox.x2 < 0.0 || bbox.y2 < 0.0 {
        return None;
    }
    let x1 = bbox.x1.max(0.0).round() as u32;
    let y1 = bbox.y1.max(0.0).round() as u32;
    let x2 = bbox.x2.min(fw).round() as u32;
    let y2 = bbox.y2.min(fh).round() as u32;
    if x1 >= width || y1 >= height {
        return None;
    }
    Some((
        x1 as i32,
        y1 as i32,
        x2.saturating_sub(x1).max(1),
        y2.saturating_sub(y1).max(1),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new(label, confidence, BoundingBox::new(x1, y1, x2, y2).unwrap()).unwrap()
    }

    #[test]
    fn no_detections_yields_identical_copy() {
        let frame = Frame::filled(32, 24, [10, 20, 30], 5);
        let out = Annotator::new().annotate(&frame, &[]);
        assert_eq!(out.pixels(), frame.pixels());
        assert_ne!(out.pixels().as_ptr(), frame.pixels().as_ptr());
        assert_eq!(out.index(), 5);
    }

    #[test]
    fn input_frame_is_not_mutated() {
        let frame = Frame::filled(32, 32, [0, 0, 0], 0);
        let before = frame.pixels().to_vec();
        let out = Annotator::new().annotate(&frame, &[det("person", 0.9, 4.0, 4.0, 20.0, 20.0)]);
        assert_eq!(frame.pixels(), before.as_slice());
        assert_ne!(out.pixels(), frame.pixels());
    }

    #[test]
    fn box_outline_uses_class_color() {
        let red = Rgb([255, 0, 0]);
        let annotator = Annotator::new().with_class_color("car", red);
        let frame = Frame::filled(64, 64, [0, 0, 0], 0);
        let out = annotator.annotate(&frame, &[det("car", 0.7, 4.0, 30.0, 40.0, 60.0)]);
        assert_eq!(*out.image().get_pixel(4, 30), red);
        assert_eq!(*out.image().get_pixel(20, 59), red);
        // Interior is untouched; the label sits above the box.
        assert_eq!(*out.image().get_pixel(20, 45), Rgb([0, 0, 0]));
    }

    #[test]
    fn last_drawn_box_wins_on_overlap() {
        let red = Rgb([255, 0, 0]);
        let blue = Rgb([0, 0, 255]);
        let annotator = Annotator::new()
            .with_class_color("car", red)
            .with_class_color("truck", blue);
        let frame = Frame::filled(32, 32, [0, 0, 0], 0);
        let car = det("car", 0.9, 4.0, 4.0, 20.0, 20.0);
        let truck = det("truck", 0.8, 4.0, 4.0, 20.0, 20.0);

        let out = annotator.annotate(&frame, &[car.clone(), truck.clone()]);
        assert_eq!(*out.image().get_pixel(4, 4), blue);

        let out = annotator.annotate(&frame, &[truck, car]);
        assert_eq!(*out.image().get_pixel(4, 4), red);
    }

    #[test]
    fn boxes_outside_the_frame_are_clipped() {
        let frame = Frame::filled(16, 16, [0, 0, 0], 0);
        let out = Annotator::new().annotate(&frame, &[det("kite", 0.6, 10.0, 10.0, 40.0, 40.0)]);
        assert_eq!(out.width(), 16);
        assert_eq!(out.height(), 16);
    }

    #[test]
    fn default_annotator_draws_label_above_box() {
        let frame = Frame::filled(64, 64, [0, 0, 0], 0);
        let out = Annotator::new().annotate(&frame, &[det("person", 0.9, 10.0, 30.0, 50.0, 60.0)]);
        let label_pixels = (0..30)
            .flat_map(|y| (0..64).map(move |x| (x, y)))
            .filter(|&(x, y)| *out.image().get_pixel(x, y) != Rgb([0, 0, 0]))
            .count();
        assert!(label_pixels > 0);
    }

    #[test]
    fn far_off_frame_box_is_skipped() {
        let frame = Frame::filled(16, 16, [0, 0, 0], 0);
        let out = Annotator::new().annotate(
            &frame,
            &[det("person", 0.9, 3.0e9, 3.0e9, 3.1e9, 3.1e9)],
        );
        assert_eq!(out.pixels(), frame.pixels());
    }

    #[test]
    fn huge_box_is_clipped_to_the_frame() {
        let red = Rgb([255, 0, 0]);
        let annotator = Annotator::new().with_class_color("bus", red);
        let frame = Frame::filled(64, 64, [0, 0, 0], 0);
        let out = annotator.annotate(&frame, &[det("bus", 0.9, -3.0e9, 40.0, 3.0e9, 3.0e9)]);
        assert_eq!(*out.image().get_pixel(0, 50), red);
        assert_eq!(*out.image().get_pixel(63, 63), red);
        assert_eq!(*out.image().get_pixel(32, 50), Rgb([0, 0, 0]));
    }

    #[test]
    fn label_text_rounds_for_display_only() {
        let d = det("person", 0.876_543, 0.0, 0.0, 1.0, 1.0);
        assert_eq!(label_text(&d), "person 0.88");
        assert_eq!(d.confidence(), 0.876_543);
    }

    #[test]
    fn palette_color_is_stable() {
        assert_eq!(class_color("person"), class_color("person"));
    }
}
