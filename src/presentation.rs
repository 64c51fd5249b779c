//! Maps a prediction to the message shown to the user.
//!
//! Pure function of `(label, probability)`; no rendering happens here.

use serde::{Deserialize, Serialize};

use crate::model::PredictionResult;
use crate::patient::RiskLabel;

pub const HIGH_RISK_HEADLINE: &str = "High Risk of Heart Disease";
pub const LOW_RISK_HEADLINE: &str = "No Heart Disease Detected";

pub const HIGH_RISK_ADVISORY: &str =
    "Please consult a cardiologist or heart specialist for a thorough evaluation.";
pub const LOW_RISK_ADVISORY: &str =
    "Keep it up: maintain a balanced diet, regular exercise and routine check-ups.";

/// Visual severity of a result panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Rendered as an error panel.
    High,
    /// Rendered as a success panel.
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Low => "low",
        }
    }

    /// CSS class for the result panel.
    pub fn panel_class(&self) -> &'static str {
        match self {
            Self::High => "error",
            Self::Low => "success",
        }
    }
}

/// Human-readable risk summary for one prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub label: RiskLabel,
    pub probability: f64,
    pub headline: String,
    pub severity: Severity,
    /// Probability as a percentage with two decimals, e.g. `87.34%`.
    pub confidence_text: String,
    pub advisory: String,
}

/// Build the assessment shown for `result`.
pub fn present(result: &PredictionResult) -> RiskAssessment {
    let (headline, severity, advisory) = if result.label.is_high_risk() {
        (HIGH_RISK_HEADLINE, Severity::High, HIGH_RISK_ADVISORY)
    } else {
        (LOW_RISK_HEADLINE, Severity::Low, LOW_RISK_ADVISORY)
    };

    RiskAssessment {
        label: result.label,
        probability: result.probability,
        headline: headline.to_string(),
        severity,
        confidence_text: format_confidence(result.probability),
        advisory: advisory.to_string(),
    }
}

/// `0.8734` → `"87.34%"`
pub fn format_confidence(probability: f64) -> String {
    format!("{:.2}%", probability * 100.0)
}
