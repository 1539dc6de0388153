//! YOLOv8 detection/segmentation inference via ONNX Runtime.

use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::{Value, ValueType};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::postprocessing::{decode_head, decode_mask, nms};
use super::preprocessing::letterbox;
use crate::types::{ClassNames, Detection, ModelKind};

/// Input size of the stock Ultralytics export, used when the model has a dynamic input
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Session settings shared by every model the process loads
#[derive(Debug, Clone)]
pub struct ModelOptions {
    pub intra_threads: usize,
    pub iou_threshold: f32,
    /// Overrides the `names` metadata embedded in the ONNX file
    pub class_names: Option<ClassNames>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            intra_threads: 4,
            iou_threshold: 0.45,
            class_names: None,
        }
    }
}

/// An exported Ultralytics YOLOv8 model (`yolo export format=onnx`)
pub struct YoloModel {
    session: Session,
    kind: ModelKind,
    path: PathBuf,
    input_name: String,
    output_names: Vec<String>,
    input_size: u32,
    class_names: ClassNames,
    iou_threshold: f32,
}

impl YoloModel {
    /// Load a model from an ONNX file
    ///
    /// # Example
    ///
    /// ```ignore
    /// let model = YoloModel::new("models/yolov8.onnx", ModelKind::Detection, &ModelOptions::default())?;
    /// ```
    pub fn new(model_path: impl AsRef<Path>, kind: ModelKind, options: &ModelOptions) -> Result<Self> {
        let path = model_path.as_ref().to_path_buf();
        debug!("Loading {} model from: {}", kind, path.display());

        if !path.exists() {
            anyhow::bail!("Model file not found: {}", path.display());
        }

        let session = Session::builder()
            .map_err(|e| anyhow::anyhow!("Failed to create ONNX Runtime session builder: {}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow::anyhow!("Failed to set optimization level: {}", e))?
            .with_intra_threads(options.intra_threads)
            .map_err(|e| anyhow::anyhow!("Failed to set intra threads: {}", e))?
            .commit_from_file(&path)
            .map_err(|e| anyhow::anyhow!("Failed to load ONNX model {}: {}", path.display(), e))?;

        let input = session
            .inputs
            .first()
            .context("Model has no inputs")?;
        let input_name = input.name.clone();
        let input_size = match &input.input_type {
            ValueType::Tensor { shape, .. } => shape
                .to_vec()
                .get(3)
                .copied()
                .filter(|d| *d > 0)
                .map(|d| d as u32)
                .unwrap_or(DEFAULT_INPUT_SIZE),
            other => {
                debug!("Unexpected input type {:?}, assuming {}", other, DEFAULT_INPUT_SIZE);
                DEFAULT_INPUT_SIZE
            }
        };
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        check_outputs(&output_names)?;

        if kind == ModelKind::Segmentation && output_names.len() < 2 {
            warn!(
                "{} has no prototype output; masks will not be drawn",
                path.display()
            );
        }

        let class_names = match &options.class_names {
            Some(names) => names.clone(),
            None => embedded_class_names(&session).unwrap_or_else(|| {
                warn!(
                    "No class names in {} metadata; classes will be reported by id",
                    path.display()
                );
                ClassNames::default()
            }),
        };

        debug!(
            "{} model loaded: input {} ({}x{}), outputs {:?}, classes {:?}",
            kind,
            input_name,
            input_size,
            input_size,
            output_names,
            class_names.iter().collect::<Vec<_>>()
        );

        Ok(Self {
            session,
            kind,
            path,
            input_name,
            output_names,
            input_size,
            class_names,
            iou_threshold: options.iou_threshold,
        })
    }

    /// Run the model on an image and return detections above `confidence`
    pub fn detect(&mut self, image: &DynamicImage, confidence: f32) -> Result<Vec<Detection>> {
        let lb = letterbox(image, self.input_size)?;
        let image_size = (image.width(), image.height());

        let input_value = Value::from_array(lb.tensor.clone())
            .map_err(|e| anyhow::anyhow!("Failed to create input value: {}", e))?;

        let (head, protos) = {
            let outputs = self
                .session
                .run(ort::inputs![self.input_name.as_str() => &input_value])
                .map_err(|e| anyhow::anyhow!("Failed to run inference: {}", e))?;

            let head_name = self.output_names.first().context("Model has no outputs")?;
            let head = outputs[head_name.as_str()]
                .try_extract_array::<f32>()
                .map_err(|e| anyhow::anyhow!("Failed to extract detection head: {}", e))?
                .to_owned();

            let protos = match (self.kind, self.output_names.get(1)) {
                (ModelKind::Segmentation, Some(name)) => Some(
                    outputs[name.as_str()]
                        .try_extract_array::<f32>()
                        .map_err(|e| anyhow::anyhow!("Failed to extract mask prototypes: {}", e))?
                        .to_owned(),
                ),
                _ => None,
            };
            (head, protos)
        };

        // [1, nm, mh, mw] -> nm coefficients per box
        let mask_dim = protos
            .as_ref()
            .and_then(|p| p.shape().get(1).copied())
            .unwrap_or(0);

        let candidates = decode_head(head.view(), &lb, image_size, confidence, mask_dim)?;
        let kept = nms(candidates, self.iou_threshold);

        let mut detections = Vec::with_capacity(kept.len());
        for candidate in kept {
            let detection = match &protos {
                Some(protos) => {
                    let mask = decode_mask(
                        &candidate.mask_coefficients,
                        protos.index_axis(ndarray::Axis(0), 0),
                        &lb,
                        &candidate.detection.bbox,
                    )?;
                    candidate.detection.with_mask(mask)
                }
                None => candidate.detection,
            };
            detections.push(detection);
        }

        debug!("{} model produced {} detection(s)", self.kind, detections.len());
        Ok(detections)
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn class_names(&self) -> &ClassNames {
        &self.class_names
    }
}

fn check_outputs(output_names: &[String]) -> Result<()> {
    output_names.first().context("Model has no outputs")?;
    Ok(())
}

fn embedded_class_names(session: &Session) -> Option<ClassNames> {
    let metadata = session.metadata().ok()?;
    let raw = metadata.custom("names").ok()??;
    parse_names_metadata(&raw)
}

/// Parse the Ultralytics `names` metadata, a Python dict literal such as
/// `{0: 'disease', 1: 'healthy', 2: 'insect'}`
pub fn parse_names_metadata(raw: &str) -> Option<ClassNames> {
    let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
    let mut entries = BTreeMap::new();
    let mut rest = body.trim();

    while !rest.is_empty() {
        let (id, after) = rest.split_once(':')?;
        let id: u32 = id.trim().parse().ok()?;
        let after = after.trim_start();
        let quote = after.chars().next().filter(|c| *c == '\'' || *c == '"')?;
        let inner = &after[1..];
        let end = inner.find(quote)?;
        entries.insert(id, inner[..end].to_string());
        rest = inner[end + 1..]
            .trim_start()
            .trim_start_matches(',')
            .trim_start();
    }

    // ids must be exactly 0..n
    if !entries.keys().copied().eq(0..entries.len() as u32) {
        return None;
    }
    Some(entries.into_values().collect())
}
