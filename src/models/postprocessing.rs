//! Decoding of YOLOv8 detection and segmentation heads.

use anyhow::{bail, Result};
use ndarray::{ArrayView2, ArrayViewD, Axis, Ix2};
use std::cmp::Ordering;
use std::collections::HashMap;

use super::preprocessing::Letterbox;
use crate::types::{BBox, Detection, Mask};

/// Ultralytics default cap on detections per image
pub const MAX_DETECTIONS: usize = 300;

/// A decoded box before NMS, with its mask coefficients if the head has any
#[derive(Debug, Clone)]
pub struct Candidate {
    pub detection: Detection,
    pub mask_coefficients: Vec<f32>,
}

/// Decode a `[1, 4 + nc + nm, N]` head into candidates above `confidence`
///
/// `mask_dim` is `nm`, the number of prototype coefficients (0 for a plain
/// detection head). Boxes are mapped back into original image coordinates
/// and clamped to its bounds.
pub fn decode_head(
    output: ArrayViewD<'_, f32>,
    letterbox: &Letterbox,
    image_size: (u32, u32),
    confidence: f32,
    mask_dim: usize,
) -> Result<Vec<Candidate>> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] != 1 {
        bail!("Expected output of shape [1, C, N], got {:?}", shape);
    }
    let channels = shape[1];
    if channels <= 4 + mask_dim {
        bail!(
            "Output has {} channels, too few for 4 box values and {} mask coefficients",
            channels,
            mask_dim
        );
    }
    let num_classes = channels - 4 - mask_dim;
    let rows = output
        .index_axis(Axis(0), 0)
        .into_dimensionality::<Ix2>()
        .map_err(|e| anyhow::anyhow!("Failed to view output as 2D: {}", e))?;

    let mut candidates = Vec::new();
    for i in 0..shape[2] {
        let column = rows.column(i);

        let (best_class, best_score) = (0..num_classes)
            .map(|c| (c, column[4 + c]))
            .fold((0, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });

        if best_score <= confidence {
            continue;
        }

        let (cx, cy, w, h) = (column[0], column[1], column[2], column[3]);
        let (x1, y1) = letterbox.to_original(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_original(cx + w / 2.0, cy + h / 2.0);
        let bbox = BBox { x1, y1, x2, y2 }.clamp(image_size.0, image_size.1);

        let mask_coefficients = (0..mask_dim)
            .map(|k| column[4 + num_classes + k])
            .collect();

        candidates.push(Candidate {
            detection: Detection::new(best_class as u32, best_score, bbox),
            mask_coefficients,
        });
    }

    Ok(candidates)
}

/// Per-class non-maximum suppression; result is sorted by confidence, highest first
pub fn nms(candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    let mut by_class: HashMap<u32, Vec<Candidate>> = HashMap::new();
    for candidate in candidates {
        by_class
            .entry(candidate.detection.class_id)
            .or_default()
            .push(candidate);
    }

    let mut kept = Vec::new();
    for (_, mut group) in by_class {
        group.sort_by(|a, b| by_confidence_desc(&a.detection, &b.detection));

        let mut suppressed = vec![false; group.len()];
        for i in 0..group.len() {
            if suppressed[i] {
                continue;
            }
            for j in (i + 1)..group.len() {
                if !suppressed[j]
                    && group[i].detection.bbox.iou(&group[j].detection.bbox) > iou_threshold
                {
                    suppressed[j] = true;
                }
            }
        }

        kept.extend(
            group
                .into_iter()
                .zip(suppressed)
                .filter(|(_, s)| !s)
                .map(|(c, _)| c),
        );
    }

    kept.sort_by(|a, b| by_confidence_desc(&a.detection, &b.detection));
    kept.truncate(MAX_DETECTIONS);
    kept
}

fn by_confidence_desc(a: &Detection, b: &Detection) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
}

/// Build a bbox-local binary mask from prototype masks `[nm, mh, mw]`
///
/// The returned mask covers the detection's box, starting at
/// `(floor(x1), floor(y1))`.
pub fn decode_mask(
    coefficients: &[f32],
    protos: ArrayViewD<'_, f32>,
    letterbox: &Letterbox,
    bbox: &BBox,
) -> Result<Mask> {
    let shape = protos.shape().to_vec();
    if shape.len() != 3 || shape[0] != coefficients.len() {
        bail!(
            "Prototype shape {:?} does not match {} coefficients",
            shape,
            coefficients.len()
        );
    }
    let (mh, mw) = (shape[1], shape[2]);
    if mh == 0 || mw == 0 {
        bail!("Empty prototype masks {:?}", shape);
    }

    let flat = protos
        .to_shape((shape[0], mh * mw))
        .map_err(|e| anyhow::anyhow!("Failed to reshape prototypes: {}", e))?;
    let logits = mask_logits(coefficients, flat.view());

    let x0 = bbox.x1.floor().max(0.0) as u32;
    let y0 = bbox.y1.floor().max(0.0) as u32;
    let width = (bbox.x2.ceil() as u32).saturating_sub(x0);
    let height = (bbox.y2.ceil() as u32).saturating_sub(y0);

    let to_proto_x = mw as f32 / letterbox.size as f32;
    let to_proto_y = mh as f32 / letterbox.size as f32;

    let mut data = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let (ox, oy) = ((x0 + x) as f32 + 0.5, (y0 + y) as f32 + 0.5);
            let inside = ox >= bbox.x1 && ox <= bbox.x2 && oy >= bbox.y1 && oy <= bbox.y2;
            let (mx, my) = letterbox.to_model(ox, oy);
            let px = ((mx * to_proto_x) as usize).min(mw - 1);
            let py = ((my * to_proto_y) as usize).min(mh - 1);
            // sigmoid(logit) > 0.5
            data.push(inside && logits[py * mw + px] > 0.0);
        }
    }

    Ok(Mask::new(width, height, data))
}

fn mask_logits(coefficients: &[f32], protos: ArrayView2<'_, f32>) -> Vec<f32> {
    let mut logits = vec![0.0f32; protos.ncols()];
    for (k, row) in protos.outer_iter().enumerate() {
        let c = coefficients[k];
        for (acc, p) in logits.iter_mut().zip(row.iter()) {
            *acc += c * p;
        }
    }
    logits
}
