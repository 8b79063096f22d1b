use serde::{Deserialize, Serialize};

/// Canonical analysis shape served to downstream callers.
///
/// The upstream model is asked for this shape but does not reliably produce
/// it; `tguard-normalize` is the only producer of these values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub summary: String,
    /// Present only for document-image analyses, and only when the model
    /// returned key details. Never fabricated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_details: Option<Vec<String>>,
    #[serde(default)]
    pub risks: Vec<Risk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub severity: Severity,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// Case-insensitive parse; the upstream model mixes 'High' and 'high'.
    pub fn parse_loose(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("low") {
            Some(Severity::Low)
        } else if value.eq_ignore_ascii_case("medium") {
            Some(Severity::Medium)
        } else if value.eq_ignore_ascii_case("high") {
            Some(Severity::High)
        } else {
            None
        }
    }
}

/// JSON error body returned on every failure path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
