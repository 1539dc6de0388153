//! YOLOv8 inference over ONNX Runtime and annotation rendering.

pub mod postprocessing;
pub mod preprocessing;
pub mod render;
pub mod yolo;

pub use preprocessing::letterbox;
pub use render::Renderer;
pub use yolo::{ModelOptions, YoloModel};
