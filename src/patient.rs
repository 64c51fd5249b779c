//! Patient data structures shared by the loader, trainer and form adapters.
//!
//! A [`PatientRecord`] is the ordered 13-feature encoding of one patient.
//! Categorical vitals are pre-encoded as small integers (binary flags as
//! `{0, 1}`, ordinal categories as small ranges) and stored as `f64` so a
//! record maps directly onto one row of the training matrix.

use serde::{Deserialize, Serialize};

/// Number of input features per patient.
pub const NUM_FEATURES: usize = 13;

/// Feature column names in canonical order. The training CSV must carry
/// exactly these columns plus [`TARGET_COLUMN`].
pub const FEATURE_COLUMNS: [&str; NUM_FEATURES] = [
    "age", "sex", "cp", "trestbps", "chol", "fbs", "restecg", "thalach", "exang", "oldpeak",
    "slope", "ca", "thal",
];

/// Label column name (1 = disease present).
pub const TARGET_COLUMN: &str = "target";

// ---------------------------------------------------------------------------
// Patient record
// ---------------------------------------------------------------------------

/// One patient's vitals, in canonical feature order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Age in years
    pub age: f64,
    /// 1 = male, 0 = female
    pub sex: f64,
    /// Chest pain type (0-3)
    pub cp: f64,
    /// Resting blood pressure (mm Hg)
    pub trestbps: f64,
    /// Serum cholesterol (mg/dl)
    pub chol: f64,
    /// Fasting blood sugar > 120 mg/dl
    pub fbs: f64,
    /// Resting ECG category (0-2)
    pub restecg: f64,
    /// Maximum heart rate achieved
    pub thalach: f64,
    /// Exercise-induced angina
    pub exang: f64,
    /// ST depression induced by exercise relative to rest
    pub oldpeak: f64,
    /// Slope of the peak exercise ST segment (0-2)
    pub slope: f64,
    /// Number of major vessels colored by fluoroscopy (0-4)
    pub ca: f64,
    /// Thalassemia category (0-2)
    pub thal: f64,
}

impl PatientRecord {
    /// Build a record from values in [`FEATURE_COLUMNS`] order.
    pub fn from_features(v: [f64; NUM_FEATURES]) -> Self {
        Self {
            age: v[0],
            sex: v[1],
            cp: v[2],
            trestbps: v[3],
            chol: v[4],
            fbs: v[5],
            restecg: v[6],
            thalach: v[7],
            exang: v[8],
            oldpeak: v[9],
            slope: v[10],
            ca: v[11],
            thal: v[12],
        }
    }

    /// The feature vector in [`FEATURE_COLUMNS`] order.
    pub fn to_features(&self) -> [f64; NUM_FEATURES] {
        [
            self.age,
            self.sex,
            self.cp,
            self.trestbps,
            self.chol,
            self.fbs,
            self.restecg,
            self.thalach,
            self.exang,
            self.oldpeak,
            self.slope,
            self.ca,
            self.thal,
        ]
    }
}

// ---------------------------------------------------------------------------
// Risk label
// ---------------------------------------------------------------------------

/// Binary prediction outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLabel {
    /// `target = 0`
    NoDisease,
    /// `target = 1`
    Disease,
}

impl RiskLabel {
    pub fn index(&self) -> u8 {
        match self {
            Self::NoDisease => 0,
            Self::Disease => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoDisease => "NO_DISEASE",
            Self::Disease => "DISEASE",
        }
    }

    pub fn is_high_risk(&self) -> bool {
        matches!(self, Self::Disease)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_roundtrip_keeps_column_order() {
        let values = [
            63.0, 1.0, 3.0, 145.0, 233.0, 1.0, 0.0, 150.0, 0.0, 2.3, 0.0, 0.0, 1.0,
        ];
        let record = PatientRecord::from_features(values);
        assert_eq!(record.age, 63.0);
        assert_eq!(record.oldpeak, 2.3);
        assert_eq!(record.thal, 1.0);
        assert_eq!(record.to_features(), values);
    }

    #[test]
    fn test_risk_label_index() {
        assert_eq!(RiskLabel::NoDisease.index(), 0);
        assert_eq!(RiskLabel::Disease.index(), 1);
        assert!(RiskLabel::Disease.is_high_risk());
        assert!(!RiskLabel::NoDisease.is_high_risk());
    }
}
