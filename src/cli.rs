//! Command-line interface for cane-detect.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::AppConfig;
use crate::types::ModelKind;

/// cane-detect - sugarcane disease and insect detection with YOLOv8
#[derive(Parser, Debug)]
#[command(
    name = "cane-detect",
    about = "Sugarcane disease and insect detection with YOLOv8 + ONNX Runtime",
    version,
    author
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbose logging (can be repeated: -v, -vv)
    #[arg(short, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP analysis server
    Serve(ServeArgs),
    /// Analyze a single image and save the annotated result
    Predict(PredictArgs),
    /// Create the training dataset directory layout
    SetupDataset(SetupDatasetArgs),
    /// Train a model with the Ultralytics CLI
    Train(TrainArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Detection model (.onnx)
    #[arg(long, value_name = "PATH")]
    pub detection_model: Option<PathBuf>,

    /// Segmentation model (.onnx)
    #[arg(long, value_name = "PATH")]
    pub segmentation_model: Option<PathBuf>,

    /// Run in detection-only mode
    #[arg(long)]
    pub no_segmentation: bool,

    /// Directory with the browser UI
    #[arg(long, value_name = "DIR")]
    pub static_dir: Option<PathBuf>,
}

impl ServeArgs {
    /// Apply flag overrides on top of the loaded configuration
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(path) = &self.detection_model {
            config.models.detection_path = path.clone();
        }
        if let Some(path) = &self.segmentation_model {
            config.models.segmentation_path = Some(path.clone());
        }
        if self.no_segmentation {
            config.models.segmentation_path = None;
        }
        if let Some(dir) = &self.static_dir {
            config.server.static_dir = dir.clone();
        }
    }
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Image to analyze
    #[arg(value_name = "IMAGE_PATH")]
    pub image: PathBuf,

    /// Model path; defaults to the configured model for --model-type
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// detection or segmentation
    #[arg(long, default_value = "detection", value_name = "TYPE")]
    pub model_type: ModelKind,

    /// Confidence threshold in [0, 1]
    #[arg(long, value_name = "CONF")]
    pub conf: Option<f32>,

    /// Output project directory
    #[arg(long, default_value = "output", value_name = "DIR")]
    pub project: PathBuf,

    /// Run name; the annotated image is saved to <project>/<name>/
    #[arg(long, default_value = "results", value_name = "NAME")]
    pub name: String,

    /// Output format
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,
}

impl PredictArgs {
    /// Model file for this run
    pub fn model_path(&self, config: &AppConfig) -> Option<PathBuf> {
        if let Some(path) = &self.model {
            return Some(path.clone());
        }
        match self.model_type {
            ModelKind::Detection => Some(config.models.detection_path.clone()),
            ModelKind::Segmentation => config.models.segmentation_path.clone(),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.project.join(&self.name)
    }
}

#[derive(Args, Debug)]
pub struct SetupDatasetArgs {
    /// Dataset root directory
    #[arg(long, default_value = crate::dataset::DEFAULT_BASE_DIR, value_name = "DIR")]
    pub base_dir: PathBuf,

    /// Class names in index order (repeatable)
    #[arg(
        long = "class",
        value_name = "NAME",
        default_values = crate::dataset::DEFAULT_CLASSES
    )]
    pub classes: Vec<String>,
}

#[derive(Args, Debug, Default)]
pub struct TrainArgs {
    /// YAML file with training hyperparameters
    #[arg(long = "hyp", value_name = "FILE")]
    pub hyperparameters: Option<PathBuf>,

    /// Pretrained checkpoint, e.g. yolov8s-seg.pt
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Dataset description (dataset.yaml)
    #[arg(long, value_name = "FILE")]
    pub data: Option<PathBuf>,

    #[arg(long, value_name = "N")]
    pub epochs: Option<u32>,

    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    pub batch: Option<i32>,

    #[arg(long, value_name = "PX")]
    pub imgsz: Option<u32>,

    /// `0`, `0,1` or `cpu`
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Ultralytics executable
    #[arg(long, default_value = "yolo", value_name = "BIN")]
    pub yolo_bin: String,

    /// Print the commands without running them
    #[arg(long)]
    pub dry_run: bool,

    /// Skip validation after training
    #[arg(long)]
    pub skip_val: bool,
}

impl TrainArgs {
    pub fn apply(&self, config: &mut crate::training::TrainConfig) {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(data) = &self.data {
            config.data = data.clone();
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(batch) = self.batch {
            config.batch = batch;
        }
        if let Some(imgsz) = self.imgsz {
            config.imgsz = imgsz;
        }
        if let Some(device) = &self.device {
            config.device = device.clone();
        }
    }
}

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Text,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "text" => Ok(OutputFormat::Text),
            _ => Err(format!("Unknown format: {}. Use 'json' or 'text'", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Text => write!(f, "text"),
        }
    }
}

/// Get tracing level from verbosity
pub fn get_log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}
