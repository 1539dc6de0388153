//! Overall verdict for an image.

use serde::{Deserialize, Serialize};

use super::aggregate::DetectionSummary;
use super::class_info::SeverityTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Healthy,
    Warning,
    Critical,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Healthy => "healthy",
            Status::Warning => "warning",
            Status::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<SeverityTier> for Status {
    fn from(tier: SeverityTier) -> Self {
        match tier {
            SeverityTier::High => Status::Critical,
            SeverityTier::Medium => Status::Warning,
            SeverityTier::Low => Status::Healthy,
        }
    }
}

/// Highest tier over every group; an empty set resolves to healthy.
pub fn resolve(groups: &[DetectionSummary]) -> Status {
    groups
        .iter()
        .map(|g| g.severity)
        .max()
        .unwrap_or(SeverityTier::Low)
        .into()
}
