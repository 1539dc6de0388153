//! Draw detections onto the input image.

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;
use tracing::debug;

use crate::analysis::class_info;
use crate::types::{ClassNames, Detection, Mask};

const MASK_ALPHA: f32 = 0.4;
const LABEL_SCALE: f32 = 18.0;

/// Annotates images with class-colored boxes, masks and optional labels
pub struct Renderer {
    font: Option<FontVec>,
    box_thickness: u32,
}

impl Default for Renderer {
    fn default() -> Self {
        Self {
            font: None,
            box_thickness: 3,
        }
    }
}

impl Renderer {
    /// Create a renderer; labels are only drawn when a TTF/OTF font is given
    pub fn new(font_path: Option<&Path>, box_thickness: u32) -> Result<Self> {
        let font = match font_path {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read font: {}", path.display()))?;
                let font = FontVec::try_from_vec(bytes)
                    .map_err(|e| anyhow::anyhow!("Invalid font {}: {}", path.display(), e))?;
                debug!("Loaded label font from {}", path.display());
                Some(font)
            }
            None => None,
        };
        Ok(Self {
            font,
            box_thickness: box_thickness.max(1),
        })
    }

    pub fn draws_labels(&self) -> bool {
        self.font.is_some()
    }

    /// Return a copy of `image` with every detection drawn on it
    pub fn render(
        &self,
        image: &DynamicImage,
        detections: &[Detection],
        class_names: &ClassNames,
    ) -> DynamicImage {
        let mut canvas = image.to_rgb8();

        for detection in detections {
            let name = class_names.name(detection.class_id);
            let color = Rgb(class_info::lookup(&name).rgb());

            if let Some(mask) = &detection.mask {
                blend_mask(&mut canvas, mask, detection, color);
            }
            self.draw_box(&mut canvas, detection, color);
            if let Some(font) = &self.font {
                let label = format!("{} {:.2}", name, detection.confidence);
                draw_label(&mut canvas, font, detection, &label, color);
            }
        }

        DynamicImage::ImageRgb8(canvas)
    }

    fn draw_box(&self, canvas: &mut RgbImage, detection: &Detection, color: Rgb<u8>) {
        let bbox = detection.bbox.clamp(canvas.width(), canvas.height());
        let (x1, y1) = (bbox.x1 as i32, bbox.y1 as i32);
        let (w, h) = (bbox.width() as u32, bbox.height() as u32);
        if w == 0 || h == 0 {
            return;
        }

        for offset in 0..self.box_thickness as i32 {
            let rect = Rect::at(x1 + offset, y1 + offset).of_size(
                w.saturating_sub(2 * offset as u32).max(1),
                h.saturating_sub(2 * offset as u32).max(1),
            );
            draw_hollow_rect_mut(canvas, rect, color);
        }
    }
}

fn blend_mask(canvas: &mut RgbImage, mask: &Mask, detection: &Detection, color: Rgb<u8>) {
    let x0 = detection.bbox.x1.floor().max(0.0) as u32;
    let y0 = detection.bbox.y1.floor().max(0.0) as u32;

    for y in 0..mask.height {
        for x in 0..mask.width {
            if !mask.get(x, y) {
                continue;
            }
            let (px, py) = (x0 + x, y0 + y);
            if px >= canvas.width() || py >= canvas.height() {
                continue;
            }
            let pixel = canvas.get_pixel_mut(px, py);
            for c in 0..3 {
                let blended =
                    pixel[c] as f32 * (1.0 - MASK_ALPHA) + color[c] as f32 * MASK_ALPHA;
                pixel[c] = blended.round() as u8;
            }
        }
    }
}

fn draw_label(
    canvas: &mut RgbImage,
    font: &FontVec,
    detection: &Detection,
    label: &str,
    color: Rgb<u8>,
) {
    let scale = PxScale::from(LABEL_SCALE);
    let (text_width, text_height) = text_size(scale, font, label);
    let x = detection.bbox.x1.max(0.0) as i32;
    // Above the box when there is room, otherwise just inside it
    let y = (detection.bbox.y1 as i32 - text_height as i32 - 4).max(0);

    draw_filled_rect_mut(
        canvas,
        Rect::at(x, y).of_size(text_width + 4, text_height + 4),
        color,
    );
    draw_text_mut(canvas, Rgb([255, 255, 255]), x + 2, y + 2, scale, font, label);
}
