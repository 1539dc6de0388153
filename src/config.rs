//! Application configuration.
//!
//! Layers, lowest precedence first: built-in defaults, a TOML file
//! (`--config`, or `cane-detect.toml` in the working directory when present),
//! then `CANE_DETECT__<SECTION>__<KEY>` environment variables. CLI flags are
//! applied on top by the individual commands.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::ModelOptions;
use crate::types::ClassNames;

pub const ENV_PREFIX: &str = "CANE_DETECT";
pub const DEFAULT_CONFIG_FILE: &str = "cane-detect.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub inference: InferenceConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Request body limit for uploads
    pub max_upload_bytes: usize,
    /// Directory holding the browser UI (`index.html`, `script.js`, ...)
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_upload_bytes: 16 * 1024 * 1024,
            static_dir: PathBuf::from("static"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub detection_path: PathBuf,
    pub segmentation_path: Option<PathBuf>,
    /// Overrides the class names embedded in the exported models
    pub class_names: Option<Vec<String>>,
    pub intra_threads: usize,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            detection_path: PathBuf::from("models/yolov8.onnx"),
            segmentation_path: Some(PathBuf::from("models/yolov8_seg.onnx")),
            class_names: None,
            intra_threads: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub default_confidence: f32,
    pub iou_threshold: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            default_confidence: 0.25,
            iou_threshold: 0.45,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// TTF/OTF font for box labels; labels are skipped without one
    pub font_path: Option<PathBuf>,
    pub box_thickness: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            box_thickness: 3,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path` (must exist) or the default file (optional)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::from(Path::new(DEFAULT_CONFIG_FILE)).required(false),
        };

        let config: AppConfig = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        check_unit_interval("inference.default_confidence", self.inference.default_confidence)?;
        check_unit_interval("inference.iou_threshold", self.inference.iou_threshold)?;
        if self.server.port == 0 {
            bail!("server.port must be non-zero");
        }
        if self.server.max_upload_bytes == 0 {
            bail!("server.max_upload_bytes must be non-zero");
        }
        if self.models.intra_threads == 0 {
            bail!("models.intra_threads must be at least 1");
        }
        if self.render.box_thickness == 0 {
            bail!("render.box_thickness must be at least 1");
        }
        Ok(())
    }

    /// Session settings derived from the `models` and `inference` sections
    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            intra_threads: self.models.intra_threads,
            iou_threshold: self.inference.iou_threshold,
            class_names: self
                .models
                .class_names
                .as_ref()
                .map(|names| names.iter().cloned().collect::<ClassNames>()),
        }
    }
}

pub fn check_unit_interval(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        bail!("{} must be within [0, 1], got {}", name, value);
    }
    Ok(())
}
