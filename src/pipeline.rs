//! Detection pipeline: model selection, inference, rendering and analysis.

use anyhow::{bail, Context, Result};
use image::DynamicImage;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::analysis::analyze;
use crate::config::AppConfig;
use crate::models::{ModelOptions, Renderer, YoloModel};
use crate::response::{encode, AnalyzeResponse};
use crate::types::{ClassNames, Detection, ModelKind};

/// Everything one model call produces
#[derive(Debug, Clone)]
pub struct InferenceOutput {
    pub rendered: DynamicImage,
    pub detections: Vec<Detection>,
    pub class_names: ClassNames,
    /// The model that actually ran, after any fallback
    pub model_type: ModelKind,
}

/// The vision model as seen by the rest of the application
pub trait InferenceBackend: Send + Sync {
    /// Loaded model kinds, detection first
    fn models_available(&self) -> Vec<ModelKind>;

    /// Path of the loaded model of this kind
    fn model_path(&self, kind: ModelKind) -> Option<PathBuf>;

    /// Run `requested` (or its fallback) on `image`; blocking
    fn run_inference(
        &self,
        image: &DynamicImage,
        requested: ModelKind,
        confidence: f32,
    ) -> Result<InferenceOutput>;
}

/// Run inference and package the annotated image with its analysis
pub fn process_image(
    backend: &dyn InferenceBackend,
    image: &DynamicImage,
    requested: ModelKind,
    confidence: f32,
) -> Result<AnalyzeResponse> {
    let output = backend.run_inference(image, requested, confidence)?;
    let analysis = analyze(&output.detections, &output.class_names, output.model_type);
    debug!(
        "Analysis: {} detection(s), status {:?}",
        analysis.total_detections, analysis.status
    );
    encode(&output.rendered, analysis)
}

/// Choose which loaded model serves a request
///
/// Segmentation falls back to detection when it is not loaded. Detection
/// never falls back to segmentation.
pub fn select_model(
    requested: ModelKind,
    detection_loaded: bool,
    segmentation_loaded: bool,
) -> Result<ModelKind> {
    let selected = match requested {
        ModelKind::Segmentation if segmentation_loaded => Some(ModelKind::Segmentation),
        ModelKind::Segmentation if detection_loaded => {
            warn!("Segmentation model not available, using detection model");
            Some(ModelKind::Detection)
        }
        ModelKind::Detection if detection_loaded => Some(ModelKind::Detection),
        _ => None,
    };
    selected.context("No models available. Please check model files.")
}

/// A model together with the path it was loaded from
///
/// The path lives outside the lock so it can be read while inference runs.
struct LoadedModel<M = YoloModel> {
    path: PathBuf,
    model: Mutex<M>,
}

impl<M> LoadedModel<M> {
    fn new(path: &Path, model: M) -> Self {
        Self {
            path: path.to_path_buf(),
            model: Mutex::new(model),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Loaded YOLOv8 models plus the renderer
pub struct DetectionPipeline {
    detection: Option<LoadedModel>,
    segmentation: Option<LoadedModel>,
    renderer: Renderer,
}

impl DetectionPipeline {
    /// Load whichever models are available
    ///
    /// A model that fails to load is logged and skipped; it is an error only
    /// when no model loads at all.
    pub fn new(
        detection_path: Option<&Path>,
        segmentation_path: Option<&Path>,
        options: &ModelOptions,
        renderer: Renderer,
    ) -> Result<Self> {
        info!("Loading models...");

        let load = |path: Option<&Path>, kind: ModelKind| -> Option<LoadedModel> {
            let path = path?;
            match YoloModel::new(path, kind, options) {
                Ok(model) => {
                    info!("{} model loaded from {}", kind, path.display());
                    Some(LoadedModel::new(path, model))
                }
                Err(e) => {
                    warn!("Failed to load {} model: {:#}", kind, e);
                    None
                }
            }
        };

        let detection = load(detection_path, ModelKind::Detection);
        let segmentation = load(segmentation_path, ModelKind::Segmentation);

        if detection.is_none() && segmentation.is_none() {
            bail!("No models could be loaded; check that the exported .onnx files exist");
        }
        if segmentation.is_none() {
            info!("Running in detection-only mode");
        }

        Ok(Self {
            detection,
            segmentation,
            renderer,
        })
    }

    /// Build a pipeline from application configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let renderer = Renderer::new(
            config.render.font_path.as_deref(),
            config.render.box_thickness,
        )
        .context("Failed to initialize renderer")?;

        Self::new(
            Some(config.models.detection_path.as_path()),
            config.models.segmentation_path.as_deref(),
            &config.model_options(),
            renderer,
        )
    }

    fn slot(&self, kind: ModelKind) -> Option<&LoadedModel> {
        match kind {
            ModelKind::Detection => self.detection.as_ref(),
            ModelKind::Segmentation => self.segmentation.as_ref(),
        }
    }
}

impl InferenceBackend for DetectionPipeline {
    fn models_available(&self) -> Vec<ModelKind> {
        [ModelKind::Detection, ModelKind::Segmentation]
            .into_iter()
            .filter(|kind| self.slot(*kind).is_some())
            .collect()
    }

    fn model_path(&self, kind: ModelKind) -> Option<PathBuf> {
        self.slot(kind).map(|loaded| loaded.path().to_path_buf())
    }

    fn run_inference(
        &self,
        image: &DynamicImage,
        requested: ModelKind,
        confidence: f32,
    ) -> Result<InferenceOutput> {
        let kind = select_model(
            requested,
            self.detection.is_some(),
            self.segmentation.is_some(),
        )?;
        let loaded = self
            .slot(kind)
            .context("No models available. Please check model files.")?;

        let mut model = loaded.model.lock();
        let detections = model.detect(image, confidence)?;
        let class_names = model.class_names().clone();
        let model_type = model.kind();
        drop(model);

        let rendered = self.renderer.render(image, &detections, &class_names);
        Ok(InferenceOutput {
            rendered,
            detections,
            class_names,
            model_type,
        })
    }
}
