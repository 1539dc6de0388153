//! Advisory text keyed off which classes were detected.

use super::aggregate::DetectionSummary;
use super::class_info::ResponsePlan;

pub const MAINTENANCE: [&str; 3] = [
    "Continue regular monitoring",
    "Maintain current care practices",
    "Check again in 1-2 weeks",
];

pub const DISEASE_RESPONSE: [&str; 4] = [
    "Immediate treatment required for detected diseases",
    "Apply appropriate fungicide or bactericide",
    "Isolate severely affected plants",
    "Monitor daily for spread",
];

pub const PEST_RESPONSE: [&str; 3] = [
    "Apply targeted pest control measures",
    "Consider integrated pest management (IPM)",
    "Check surrounding plants for infestation",
];

pub const GENERIC_MONITORING: [&str; 2] = [
    "Continue current practices",
    "Regular monitoring recommended",
];

/// Disease list, then pest list, else the generic list. Empty input gets the
/// maintenance checklist.
pub fn compose(groups: &[DetectionSummary]) -> Vec<String> {
    if groups.is_empty() {
        return to_owned(&MAINTENANCE);
    }

    let has = |plan| groups.iter().any(|g| g.response == Some(plan));

    let mut recommendations = Vec::new();
    if has(ResponsePlan::Disease) {
        recommendations.extend(to_owned(&DISEASE_RESPONSE));
    }
    if has(ResponsePlan::Pest) {
        recommendations.extend(to_owned(&PEST_RESPONSE));
    }
    if recommendations.is_empty() {
        recommendations = to_owned(&GENERIC_MONITORING);
    }
    recommendations
}

fn to_owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
