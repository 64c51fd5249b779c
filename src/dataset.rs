//! Training dataset loader.
//!
//! Reads the heart-disease CSV into memory and enforces its schema: the
//! header must name exactly the 13 feature columns plus `target`, in any
//! order. Loaded rows are always stored in canonical feature order.
//! Schema violations are fatal configuration errors; nothing here retries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use ndarray::{Array1, Array2};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::patient::{PatientRecord, FEATURE_COLUMNS, NUM_FEATURES, TARGET_COLUMN};

/// Default dataset location, relative to the working directory.
pub const DEFAULT_DATASET_PATH: &str = "heart_disease_data.csv";

/// Version prefix for dataset fingerprints.
const FINGERPRINT_VERSION: &str = "v1";

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to read dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("dataset {path} is missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: String },

    #[error("dataset {path} has unexpected column '{column}'")]
    UnexpectedColumn { path: PathBuf, column: String },

    #[error("dataset {path} has duplicate column '{column}'")]
    DuplicateColumn { path: PathBuf, column: String },

    #[error("dataset {path} row {row}, column '{column}': '{value}' is not a finite number")]
    InvalidValue {
        path: PathBuf,
        row: usize,
        column: String,
        value: String,
    },

    #[error("dataset {path} row {row}: target must be 0 or 1, got '{value}'")]
    InvalidTarget {
        path: PathBuf,
        row: usize,
        value: String,
    },

    #[error("dataset {path} contains no data rows")]
    Empty { path: PathBuf },
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// The full training table: one [`PatientRecord`] and one binary label per row.
///
/// Immutable once loaded; shared between requests behind an `Arc`.
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    source: PathBuf,
    fingerprint: String,
    modified: Option<SystemTime>,
    records: Vec<PatientRecord>,
    targets: Vec<u8>,
}

impl TrainingDataset {
    /// Read and validate the CSV at `path`.
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let bytes = std::fs::read(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();

        let mut dataset = Self::from_csv_bytes(path, &bytes)?;
        dataset.modified = modified;

        info!(
            path = %path.display(),
            rows = dataset.len(),
            fingerprint = %dataset.fingerprint,
            "dataset loaded"
        );
        Ok(dataset)
    }

    /// Parse CSV content. `source` is only used for error messages and provenance.
    pub fn from_csv_bytes(source: &Path, bytes: &[u8]) -> Result<Self, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let headers = reader
            .headers()
            .map_err(|e| csv_error(source, e))?
            .clone();
        let layout = ColumnLayout::resolve(source, &headers)?;

        let mut records = Vec::new();
        let mut targets = Vec::new();
        for (i, row) in reader.records().enumerate() {
            let row = row.map_err(|e| csv_error(source, e))?;
            let row_no = i + 1;

            let mut values = [0.0; NUM_FEATURES];
            for (slot, (&col_idx, name)) in values
                .iter_mut()
                .zip(layout.features.iter().zip(FEATURE_COLUMNS))
            {
                let raw = row.get(col_idx).unwrap_or("");
                *slot = parse_number(raw).ok_or_else(|| DatasetError::InvalidValue {
                    path: source.to_path_buf(),
                    row: row_no,
                    column: name.to_string(),
                    value: raw.to_string(),
                })?;
            }

            let raw_target = row.get(layout.target).unwrap_or("");
            let target = match parse_number(raw_target) {
                Some(t) if t == 0.0 => 0,
                Some(t) if t == 1.0 => 1,
                _ => {
                    return Err(DatasetError::InvalidTarget {
                        path: source.to_path_buf(),
                        row: row_no,
                        value: raw_target.to_string(),
                    })
                }
            };

            records.push(PatientRecord::from_features(values));
            targets.push(target);
        }

        if records.is_empty() {
            return Err(DatasetError::Empty {
                path: source.to_path_buf(),
            });
        }

        debug!(rows = records.len(), "parsed dataset rows");

        Ok(Self {
            source: source.to_path_buf(),
            fingerprint: fingerprint(bytes),
            modified: None,
            records,
            targets,
        })
    }

    /// Build a dataset directly from rows (used by tests and tooling).
    pub fn from_rows(rows: Vec<(PatientRecord, u8)>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_VERSION.as_bytes());
        for (record, target) in &rows {
            for v in record.to_features() {
                hasher.update(v.to_le_bytes());
            }
            hasher.update([*target]);
        }
        let (records, targets) = rows.into_iter().unzip();
        Self {
            source: PathBuf::from("<memory>"),
            fingerprint: format!("sha256:{}", hex::encode(hasher.finalize())),
            modified: None,
            records,
            targets,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// `sha256:<hex>` digest of the source bytes.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Modification time of the source file at load time, if known.
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Feature columns followed by the target column.
    pub fn column_names(&self) -> Vec<&'static str> {
        let mut cols = FEATURE_COLUMNS.to_vec();
        cols.push(TARGET_COLUMN);
        cols
    }

    pub fn n_columns(&self) -> usize {
        NUM_FEATURES + 1
    }

    pub fn records(&self) -> &[PatientRecord] {
        &self.records
    }

    pub fn targets(&self) -> &[u8] {
        &self.targets
    }

    /// Iterate rows as `(record, target)`.
    pub fn rows(&self) -> impl Iterator<Item = (&PatientRecord, u8)> {
        self.records.iter().zip(self.targets.iter().copied())
    }

    /// `(negatives, positives)`
    pub fn class_counts(&self) -> (usize, usize) {
        let positives = self.targets.iter().filter(|&&t| t == 1).count();
        (self.targets.len() - positives, positives)
    }

    /// Feature matrix X (N×13).
    pub fn feature_matrix(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.records.len(), NUM_FEATURES), |(i, j)| {
            self.records[i].to_features()[j]
        })
    }

    /// Label vector y (N).
    pub fn target_vector(&self) -> Array1<usize> {
        self.targets.iter().map(|&t| t as usize).collect()
    }
}

// ---------------------------------------------------------------------------
// Header resolution
// ---------------------------------------------------------------------------

/// Positions of the required columns within the file.
struct ColumnLayout {
    features: [usize; NUM_FEATURES],
    target: usize,
}

impl ColumnLayout {
    fn resolve(source: &Path, headers: &csv::StringRecord) -> Result<Self, DatasetError> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, name) in headers.iter().enumerate() {
            if !FEATURE_COLUMNS.contains(&name) && name != TARGET_COLUMN {
                return Err(DatasetError::UnexpectedColumn {
                    path: source.to_path_buf(),
                    column: name.to_string(),
                });
            }
            if index.insert(name, i).is_some() {
                return Err(DatasetError::DuplicateColumn {
                    path: source.to_path_buf(),
                    column: name.to_string(),
                });
            }
        }

        let lookup = |column: &str| {
            index
                .get(column)
                .copied()
                .ok_or_else(|| DatasetError::MissingColumn {
                    path: source.to_path_buf(),
                    column: column.to_string(),
                })
        };

        let mut features = [0usize; NUM_FEATURES];
        for (slot, column) in features.iter_mut().zip(FEATURE_COLUMNS) {
            *slot = lookup(column)?;
        }
        let target = lookup(TARGET_COLUMN)?;

        Ok(Self { features, target })
    }
}

fn csv_error(source: &Path, e: csv::Error) -> DatasetError {
    DatasetError::Csv {
        path: source.to_path_buf(),
        source: e,
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_VERSION.as_bytes());
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "age,sex,cp,trestbps,chol,fbs,restecg,thalach,exang,oldpeak,slope,ca,thal,target";

    fn parse(content: &str) -> Result<TrainingDataset, DatasetError> {
        TrainingDataset::from_csv_bytes(Path::new("test.csv"), content.as_bytes())
    }

    #[test]
    fn test_loads_rows_and_fourteen_columns() {
        let csv = format!(
            "{HEADER}\n63,1,3,145,233,1,0,150,0,2.3,0,0,1,1\n41,0,1,130,204,0,0,172,0,1.4,2,0,2,0\n"
        );
        let ds = parse(&csv).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.n_columns(), 14);
        assert_eq!(ds.column_names().len(), 14);
        assert_eq!(ds.targets(), &[1, 0]);
        assert_eq!(ds.records()[0].oldpeak, 2.3);
        assert_eq!(ds.class_counts(), (1, 1));
        assert_eq!(ds.feature_matrix().dim(), (2, 13));
        assert!(ds.fingerprint().starts_with("sha256:"));
    }

    #[test]
    fn test_reordered_columns_map_by_name() {
        let csv = "target,thal,ca,slope,oldpeak,exang,thalach,restecg,fbs,chol,trestbps,cp,sex,age\n\
                   1,2,0,1,1.5,1,140,1,0,250,130,2,1,57\n";
        let ds = parse(csv).unwrap();
        let r = ds.records()[0];
        assert_eq!(r.age, 57.0);
        assert_eq!(r.chol, 250.0);
        assert_eq!(r.thal, 2.0);
        assert_eq!(ds.targets(), &[1]);
    }

    #[test]
    fn test_missing_target_column_is_fatal() {
        let csv = "age,sex,cp,trestbps,chol,fbs,restecg,thalach,exang,oldpeak,slope,ca,thal\n\
                   63,1,3,145,233,1,0,150,0,2.3,0,0,1\n";
        match parse(csv) {
            Err(DatasetError::MissingColumn { column, .. }) => assert_eq!(column, "target"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_misnamed_column_is_fatal() {
        let csv = "age,gender,cp,trestbps,chol,fbs,restecg,thalach,exang,oldpeak,slope,ca,thal,target\n\
                   63,1,3,145,233,1,0,150,0,2.3,0,0,1,1\n";
        match parse(csv) {
            Err(DatasetError::UnexpectedColumn { column, .. }) => assert_eq!(column, "gender"),
            other => panic!("expected UnexpectedColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_column_is_fatal() {
        let csv = format!("{HEADER},age\n");
        assert!(matches!(
            parse(&csv),
            Err(DatasetError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn test_non_numeric_value_reports_row_and_column() {
        let csv = format!("{HEADER}\n63,1,3,145,high,1,0,150,0,2.3,0,0,1,1\n");
        match parse(&csv) {
            Err(DatasetError::InvalidValue { row, column, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(column, "chol");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_non_binary_target_rejected() {
        let csv = format!("{HEADER}\n63,1,3,145,233,1,0,150,0,2.3,0,0,1,2\n");
        assert!(matches!(
            parse(&csv),
            Err(DatasetError::InvalidTarget { row: 1, .. })
        ));
    }

    #[test]
    fn test_header_only_is_empty_error() {
        let csv = format!("{HEADER}\n");
        assert!(matches!(parse(&csv), Err(DatasetError::Empty { .. })));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = TrainingDataset::load(Path::new("/nonexistent/heart.csv")).unwrap_err();
        assert!(matches!(err, DatasetError::Io { .. }));
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let a = parse(&format!("{HEADER}\n63,1,3,145,233,1,0,150,0,2.3,0,0,1,1\n")).unwrap();
        let b = parse(&format!("{HEADER}\n63,1,3,145,233,1,0,150,0,2.3,0,0,1,0\n")).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
