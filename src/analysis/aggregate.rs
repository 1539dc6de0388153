//! Group raw detections into per-class summaries.

use indexmap::IndexMap;
use serde::Serialize;

use super::class_info::{self, ResponsePlan, SeverityTier};
use crate::types::{ClassNames, Detection};

/// Per-class aggregate for one inference call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionSummary {
    #[serde(rename = "class")]
    pub class_name: String,
    pub count: usize,
    /// Mean confidence as a percentage rounded to one decimal
    pub confidence: f64,
    pub mean_confidence: f64,
    pub color: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
    pub severity: SeverityTier,
    pub recommendation: &'static str,
    #[serde(skip)]
    pub response: Option<ResponsePlan>,
}

impl DetectionSummary {
    fn new(class_name: String, count: usize, mean_confidence: f64) -> Self {
        let info = class_info::lookup(&class_name);
        Self {
            class_name,
            count,
            confidence: (mean_confidence * 1000.0).round() / 10.0,
            mean_confidence,
            color: info.color,
            icon: info.icon,
            description: info.description,
            severity: info.severity,
            recommendation: info.recommendation,
            response: info.response,
        }
    }
}

#[derive(Default)]
struct Accumulator {
    count: usize,
    confidence_sum: f64,
}

/// Group detections by class name, preserving first-seen order
pub fn aggregate(detections: &[Detection], class_names: &ClassNames) -> Vec<DetectionSummary> {
    let mut groups: IndexMap<String, Accumulator> = IndexMap::new();

    for detection in detections {
        let acc = groups
            .entry(class_names.name(detection.class_id))
            .or_default();
        acc.count += 1;
        acc.confidence_sum += f64::from(detection.confidence);
    }

    groups
        .into_iter()
        .map(|(name, acc)| {
            let mean = acc.confidence_sum / acc.count as f64;
            DetectionSummary::new(name, acc.count, mean)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BBox;

    fn names() -> ClassNames {
        ["disease", "healthy", "insect"].into_iter().collect()
    }

    fn det(class_id: u32, confidence: f32) -> Detection {
        Detection::new(
            class_id,
            confidence,
            BBox {
                x1: 0.0,
                y1: 0.0,
                x2: 1.0,
                y2: 1.0,
            },
        )
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate(&[], &names()).is_empty());
    }

    #[test]
    fn test_groups_in_first_seen_order() {
        let detections = vec![det(2, 0.5), det(0, 0.9), det(2, 0.7), det(1, 0.6)];
        let groups = aggregate(&detections, &names());
        let order: Vec<_> = groups.iter().map(|g| g.class_name.as_str()).collect();
        assert_eq!(order, vec!["insect", "disease", "healthy"]);
        assert_eq!(groups[0].count, 2);
    }

    #[test]
    fn test_mean_confidence() {
        let detections = vec![det(0, 0.9), det(0, 0.7)];
        let groups = aggregate(&detections, &names());
        assert_eq!(groups.len(), 1);
        assert!((groups[0].mean_confidence - 0.8).abs() < 1e-6);
        assert_eq!(groups[0].confidence, 80.0);
    }

    #[test]
    fn test_confidence_percent_rounding() {
        let groups = aggregate(&[det(1, 0.8765)], &names());
        assert_eq!(groups[0].confidence, 87.7);
    }

    #[test]
    fn test_metadata_copied_from_table() {
        let groups = aggregate(&[det(0, 0.5)], &names());
        assert_eq!(groups[0].color, "#ef4444");
        assert_eq!(groups[0].severity, SeverityTier::High);
        assert_eq!(groups[0].response, Some(ResponsePlan::Disease));
    }

    #[test]
    fn test_out_of_range_class_id_uses_fallback() {
        let groups = aggregate(&[det(9, 0.4)], &names());
        assert_eq!(groups[0].class_name, "class_9");
        assert_eq!(groups[0].color, "#6b7280");
        assert_eq!(groups[0].icon, "•");
    }

    #[test]
    fn test_serialized_shape() {
        let groups = aggregate(&[det(2, 0.5)], &names());
        let json = serde_json::to_value(&groups[0]).unwrap();
        assert_eq!(json["class"], "insect");
        assert_eq!(json["count"], 1);
        assert_eq!(json["confidence"], 50.0);
        assert_eq!(json["severity"], "medium");
        assert!(json.get("response").is_none());
    }
}
