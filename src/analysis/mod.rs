//! Turn one image's detections into a crop-health verdict.
//!
//! [`analyze`] is pure: aggregation, severity resolution and recommendation
//! composition all run over request-local data plus the read-only class
//! table.

pub mod aggregate;
pub mod class_info;
pub mod recommendations;
pub mod severity;

use serde::Serialize;

pub use aggregate::{aggregate, DetectionSummary};
pub use class_info::{lookup, ClassInfo, ResponsePlan, SeverityTier};
pub use severity::Status;

use crate::types::{ClassNames, Detection, ModelKind};

pub const HEALTHY_MESSAGE: &str = "No issues detected! Your sugarcane appears healthy.";

/// Structured analysis for one inference call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub total_detections: usize,
    pub status: Status,
    pub model_type: ModelKind,
    pub message: String,
    pub detections: Vec<DetectionSummary>,
    pub recommendations: Vec<String>,
}

/// Analyze a set of detections produced by `model_type`
pub fn analyze(
    detections: &[Detection],
    class_names: &ClassNames,
    model_type: ModelKind,
) -> AnalysisResult {
    if detections.is_empty() {
        return AnalysisResult {
            total_detections: 0,
            status: Status::Healthy,
            model_type,
            message: HEALTHY_MESSAGE.to_string(),
            detections: Vec::new(),
            recommendations: recommendations::compose(&[]),
        };
    }

    let groups = aggregate(detections, class_names);
    let status = severity::resolve(&groups);
    let recommendations = recommendations::compose(&groups);

    AnalysisResult {
        total_detections: detections.len(),
        status,
        model_type,
        message: format!("Detected {} issue(s) in the image", detections.len()),
        detections: groups,
        recommendations,
    }
}
