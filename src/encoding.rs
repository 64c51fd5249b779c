//! Form field table and input-encoding adapters.
//!
//! Every widget on the form is described once in [`FIELDS`]: its bounds and
//! default. The only thing that differs between the two form variants is how
//! the three binary fields (`sex`, `fbs`, `exang`) are offered and submitted:
//!
//! - [`NumericEncoding`]: raw `1` / `0` selectors.
//! - [`LabeledEncoding`]: `Male`/`Female` and `Yes`/`No`, translated to 1/0.
//!
//! Both decode to the same [`PatientRecord`], so one pipeline serves either.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::patient::{PatientRecord, FEATURE_COLUMNS, NUM_FEATURES};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("field '{field}': '{value}' is not a valid {expected}")]
    Invalid {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("field '{field}': {value} is outside the allowed range {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("unknown field '{0}'")]
    UnknownField(String),
}

// ---------------------------------------------------------------------------
// Field table
// ---------------------------------------------------------------------------

/// Widget kind and bounds for one field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// Integer slider.
    Integer { min: i64, max: i64, default: i64 },
    /// Float slider.
    Float {
        min: f64,
        max: f64,
        step: f64,
        default: f64,
    },
    /// Binary selector. `on` / `off` are the human labels for 1 / 0.
    Flag {
        on: &'static str,
        off: &'static str,
        default: u8,
    },
}

/// One form field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn default_value(&self) -> f64 {
        match self.kind {
            FieldKind::Integer { default, .. } => default as f64,
            FieldKind::Float { default, .. } => default,
            FieldKind::Flag { default, .. } => default as f64,
        }
    }

    /// Inclusive `(min, max)` bounds.
    pub fn bounds(&self) -> (f64, f64) {
        match self.kind {
            FieldKind::Integer { min, max, .. } => (min as f64, max as f64),
            FieldKind::Float { min, max, .. } => (min, max),
            FieldKind::Flag { .. } => (0.0, 1.0),
        }
    }

    fn check_range(&self, value: f64) -> Result<f64, InputError> {
        let (min, max) = self.bounds();
        if value < min || value > max {
            return Err(InputError::OutOfRange {
                field: self.name,
                value,
                min,
                max,
            });
        }
        Ok(value)
    }

    /// Check an already-numeric value against this field's widget.
    pub fn validate(&self, value: f64) -> Result<f64, InputError> {
        let expected = match self.kind {
            FieldKind::Integer { .. } => "integer",
            FieldKind::Float { .. } => "number",
            FieldKind::Flag { .. } => "0/1 flag",
        };
        let well_formed = value.is_finite()
            && match self.kind {
                FieldKind::Integer { .. } => value.fract() == 0.0,
                FieldKind::Float { .. } => true,
                FieldKind::Flag { .. } => value == 0.0 || value == 1.0,
            };
        if !well_formed {
            return Err(InputError::Invalid {
                field: self.name,
                value: value.to_string(),
                expected,
            });
        }
        self.check_range(value)
    }
}

/// Form fields in canonical feature order.
pub const FIELDS: [FieldSpec; NUM_FEATURES] = [
    FieldSpec {
        name: "age",
        label: "Age",
        kind: FieldKind::Integer { min: 20, max: 80, default: 45 },
    },
    FieldSpec {
        name: "sex",
        label: "Sex",
        kind: FieldKind::Flag { on: "Male", off: "Female", default: 1 },
    },
    FieldSpec {
        name: "cp",
        label: "Chest Pain Type",
        kind: FieldKind::Integer { min: 0, max: 3, default: 1 },
    },
    FieldSpec {
        name: "trestbps",
        label: "Resting BP",
        kind: FieldKind::Integer { min: 90, max: 200, default: 120 },
    },
    FieldSpec {
        name: "chol",
        label: "Cholesterol",
        kind: FieldKind::Integer { min: 100, max: 400, default: 200 },
    },
    FieldSpec {
        name: "fbs",
        label: "Fasting Blood Sugar > 120",
        kind: FieldKind::Flag { on: "Yes", off: "No", default: 1 },
    },
    FieldSpec {
        name: "restecg",
        label: "Rest ECG",
        kind: FieldKind::Integer { min: 0, max: 2, default: 1 },
    },
    FieldSpec {
        name: "thalach",
        label: "Max Heart Rate",
        kind: FieldKind::Integer { min: 70, max: 210, default: 150 },
    },
    FieldSpec {
        name: "exang",
        label: "Exercise Angina",
        kind: FieldKind::Flag { on: "Yes", off: "No", default: 1 },
    },
    FieldSpec {
        name: "oldpeak",
        label: "Oldpeak",
        kind: FieldKind::Float { min: 0.0, max: 6.0, step: 0.1, default: 1.0 },
    },
    FieldSpec {
        name: "slope",
        label: "Slope",
        kind: FieldKind::Integer { min: 0, max: 2, default: 1 },
    },
    FieldSpec {
        name: "ca",
        label: "Major Vessels (ca)",
        kind: FieldKind::Integer { min: 0, max: 4, default: 0 },
    },
    FieldSpec {
        name: "thal",
        label: "Thal",
        kind: FieldKind::Integer { min: 0, max: 2, default: 1 },
    },
];

/// The record a fresh form submits when no widget has been touched.
pub fn default_record() -> PatientRecord {
    let mut values = [0.0; NUM_FEATURES];
    for (slot, field) in values.iter_mut().zip(FIELDS.iter()) {
        *slot = field.default_value();
    }
    PatientRecord::from_features(values)
}

/// Check every field of a record against the widget bounds.
pub fn validate_record(record: &PatientRecord) -> Result<(), InputError> {
    for (field, value) in FIELDS.iter().zip(record.to_features()) {
        field.validate(value)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Encoding adapters
// ---------------------------------------------------------------------------

/// Translates between submitted form strings and a [`PatientRecord`].
///
/// Implementors only decide how binary fields are spelled; numeric fields
/// are handled by the provided methods.
pub trait InputEncoding: Send + Sync {
    /// Short identifier, e.g. `"labeled"`.
    fn name(&self) -> &'static str;

    /// `(submitted value, display text)` pairs for a flag, in menu order.
    fn flag_options(&self, on: &'static str, off: &'static str) -> [(String, String); 2];

    /// Decode a submitted flag value to 0/1.
    fn decode_flag(&self, on: &'static str, off: &'static str, raw: &str) -> Option<u8>;

    /// Submitted value that selects `flag`.
    fn encode_flag(&self, on: &'static str, off: &'static str, flag: u8) -> String {
        let [(one, _), (zero, _)] = self.flag_options(on, off);
        if flag == 1 {
            one
        } else {
            zero
        }
    }

    /// Decode a whole form. Absent or blank fields keep their widget default.
    fn decode(&self, fields: &HashMap<String, String>) -> Result<PatientRecord, InputError> {
        let mut values = [0.0; NUM_FEATURES];
        for (slot, field) in values.iter_mut().zip(FIELDS.iter()) {
            let raw = fields.get(field.name).map(|s| s.trim()).unwrap_or("");
            *slot = if raw.is_empty() {
                field.default_value()
            } else {
                self.decode_field(field, raw)?
            };
        }
        Ok(PatientRecord::from_features(values))
    }

    /// Decode one non-empty field value.
    fn decode_field(&self, field: &FieldSpec, raw: &str) -> Result<f64, InputError> {
        let invalid = |expected| InputError::Invalid {
            field: field.name,
            value: raw.to_string(),
            expected,
        };
        match field.kind {
            FieldKind::Integer { .. } => {
                let v = raw.parse::<i64>().map_err(|_| invalid("integer"))?;
                field.check_range(v as f64)
            }
            FieldKind::Float { .. } => {
                let v = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| invalid("number"))?;
                field.check_range(v)
            }
            FieldKind::Flag { on, off, .. } => self
                .decode_flag(on, off, raw)
                .map(f64::from)
                .ok_or_else(|| invalid("choice")),
        }
    }

    /// Replace individual fields of `base` with submitted values.
    fn overlay(
        &self,
        base: &PatientRecord,
        overrides: &[(String, String)],
    ) -> Result<PatientRecord, InputError> {
        let mut fields: HashMap<String, String> = self
            .form_values(base)
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        for (name, value) in overrides {
            let Some(slot) = fields.get_mut(name.as_str()) else {
                return Err(InputError::UnknownField(name.clone()));
            };
            *slot = value.clone();
        }
        self.decode(&fields)
    }

    /// Submitted values that reproduce `record`, keyed by field name.
    fn form_values(&self, record: &PatientRecord) -> Vec<(&'static str, String)> {
        FIELDS
            .iter()
            .zip(record.to_features())
            .map(|(field, value)| {
                let text = match field.kind {
                    FieldKind::Integer { .. } => format!("{}", value as i64),
                    FieldKind::Float { .. } => format!("{value:.1}"),
                    FieldKind::Flag { on, off, .. } => {
                        self.encode_flag(on, off, if value == 1.0 { 1 } else { 0 })
                    }
                };
                (field.name, text)
            })
            .collect()
    }
}

/// Binary fields submitted as `1` / `0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericEncoding;

impl InputEncoding for NumericEncoding {
    fn name(&self) -> &'static str {
        "numeric"
    }

    fn flag_options(&self, _on: &'static str, _off: &'static str) -> [(String, String); 2] {
        [
            ("1".to_string(), "1".to_string()),
            ("0".to_string(), "0".to_string()),
        ]
    }

    fn decode_flag(&self, _on: &'static str, _off: &'static str, raw: &str) -> Option<u8> {
        match raw {
            "1" => Some(1),
            "0" => Some(0),
            _ => None,
        }
    }
}

/// Binary fields submitted as human labels (`Male`/`Female`, `Yes`/`No`).
#[derive(Debug, Clone, Copy, Default)]
pub struct LabeledEncoding;

impl InputEncoding for LabeledEncoding {
    fn name(&self) -> &'static str {
        "labeled"
    }

    fn flag_options(&self, on: &'static str, off: &'static str) -> [(String, String); 2] {
        [
            (on.to_string(), on.to_string()),
            (off.to_string(), off.to_string()),
        ]
    }

    fn decode_flag(&self, on: &'static str, off: &'static str, raw: &str) -> Option<u8> {
        if raw.eq_ignore_ascii_case(on) {
            Some(1)
        } else if raw.eq_ignore_ascii_case(off) {
            Some(0)
        } else {
            None
        }
    }
}

/// Encoding selector for configuration and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EncodingKind {
    #[default]
    Labeled,
    Numeric,
}

impl EncodingKind {
    pub fn adapter(&self) -> &'static dyn InputEncoding {
        static LABELED: LabeledEncoding = LabeledEncoding;
        static NUMERIC: NumericEncoding = NumericEncoding;
        match self {
            Self::Labeled => &LABELED,
            Self::Numeric => &NUMERIC,
        }
    }
}

/// Column names are shared with the field table; keep them in lockstep.
const _: () = {
    let mut i = 0;
    while i < NUM_FEATURES {
        let a = FIELDS[i].name.as_bytes();
        let b = FEATURE_COLUMNS[i].as_bytes();
        assert!(a.len() == b.len());
        let mut j = 0;
        while j < a.len() {
            assert!(a[j] == b[j]);
            j += 1;
        }
        i += 1;
    }
};
