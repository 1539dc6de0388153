//! Display and advisory metadata for each class the model can report.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Qualitative rank attached to a class; declaration order is the escalation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityTier {
    Low,
    Medium,
    High,
}

/// Which fixed advisory list a class triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponsePlan {
    Disease,
    Pest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassInfo {
    pub color: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
    pub severity: SeverityTier,
    pub recommendation: &'static str,
    pub response: Option<ResponsePlan>,
}

impl ClassInfo {
    /// Parse `color` (`#rrggbb`) into RGB components
    pub fn rgb(&self) -> [u8; 3] {
        parse_hex_color(self.color).unwrap_or([0x6b, 0x72, 0x80])
    }
}

/// Returned for any class name the table does not know
pub static FALLBACK: ClassInfo = ClassInfo {
    color: "#6b7280",
    icon: "•",
    description: "Unknown",
    severity: SeverityTier::Low,
    recommendation: "Monitor closely",
    response: None,
};

static CLASS_INFO: Lazy<HashMap<&'static str, ClassInfo>> = Lazy::new(|| {
    HashMap::from([
        (
            "healthy",
            ClassInfo {
                color: "#10b981",
                icon: "✓",
                description: "Healthy sugarcane tissue",
                severity: SeverityTier::Low,
                recommendation: "No action needed. Continue regular monitoring and maintenance.",
                response: None,
            },
        ),
        (
            "disease",
            ClassInfo {
                color: "#ef4444",
                icon: "⚠",
                description: "Disease detected",
                severity: SeverityTier::High,
                recommendation: "Apply appropriate fungicide immediately. Isolate affected plants if severe. Consult agronomist for treatment plan.",
                response: Some(ResponsePlan::Disease),
            },
        ),
        (
            "insect",
            ClassInfo {
                color: "#f59e0b",
                icon: "⚡",
                description: "Insect pest detected",
                severity: SeverityTier::Medium,
                recommendation: "Apply targeted insecticide. Monitor surrounding plants. Consider biological pest control methods.",
                response: Some(ResponsePlan::Pest),
            },
        ),
    ])
});

/// Look up display metadata for a class, falling back to [`FALLBACK`]
pub fn lookup(class_name: &str) -> &'static ClassInfo {
    CLASS_INFO.get(class_name).unwrap_or(&FALLBACK)
}

/// Class names with a table entry, sorted
pub fn known_classes() -> Vec<&'static str> {
    let mut names: Vec<_> = CLASS_INFO.keys().copied().collect();
    names.sort_unstable();
    names
}

fn parse_hex_color(color: &str) -> Option<[u8; 3]> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_classes() {
        assert_eq!(known_classes(), vec!["disease", "healthy", "insect"]);
    }

    #[test]
    fn test_lookup_disease() {
        let info = lookup("disease");
        assert_eq!(info.color, "#ef4444");
        assert_eq!(info.severity, SeverityTier::High);
        assert_eq!(info.response, Some(ResponsePlan::Disease));
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert_eq!(lookup("Disease"), &FALLBACK);
    }

    #[test]
    fn test_lookup_unknown_falls_back() {
        let info = lookup("unknown_class");
        assert_eq!(info.color, "#6b7280");
        assert_eq!(info.icon, "•");
        assert_eq!(info.description, "Unknown");
        assert_eq!(info.severity, SeverityTier::Low);
        assert_eq!(info.recommendation, "Monitor closely");
        assert!(info.response.is_none());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(SeverityTier::Low < SeverityTier::Medium);
        assert!(SeverityTier::Medium < SeverityTier::High);
    }

    #[test]
    fn test_rgb() {
        assert_eq!(lookup("insect").rgb(), [0xf5, 0x9e, 0x0b]);
        assert_eq!(FALLBACK.rgb(), [0x6b, 0x72, 0x80]);
    }

    #[test]
    fn test_parse_hex_color_rejects_garbage() {
        assert_eq!(parse_hex_color("ef4444"), None);
        assert_eq!(parse_hex_color("#ef44"), None);
        assert_eq!(parse_hex_color("#zz4444"), None);
    }
}
