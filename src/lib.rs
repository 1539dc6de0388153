#![doc = include_str!("../README.md")]

pub mod analysis;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dataset;
pub mod models;
pub mod pipeline;
pub mod response;
pub mod server;
pub mod training;
pub mod types;

pub use analysis::{analyze, AnalysisResult, Status};
pub use config::AppConfig;
pub use pipeline::{process_image, DetectionPipeline, InferenceBackend, InferenceOutput};
pub use response::{AnalyzeResponse, ErrorResponse};
pub use types::{BBox, ClassNames, Detection, Mask, ModelKind};
