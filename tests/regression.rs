//! Regression tests for the prediction pipeline.
//!
//! These exercise the library end to end (CSV on disk → cache → fit →
//! inference → presentation) against small synthetic cohorts, so they run
//! without the production dataset.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use heartguard::cache::DatasetCache;
use heartguard::dataset::{DatasetError, TrainingDataset};
use heartguard::encoding::{default_record, EncodingKind, InputEncoding};
use heartguard::model::{train, TrainerConfig, DECISION_THRESHOLD};
use heartguard::patient::{PatientRecord, RiskLabel};
use heartguard::pipeline::PredictionPipeline;
use heartguard::presentation::{present, Severity};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const HEADER: &str =
    "age,sex,cp,trestbps,chol,fbs,restecg,thalach,exang,oldpeak,slope,ca,thal,target";
const LOW: &str = "35,0,0,110,160,0,0,185,0,0.0,2,0,1";
const HIGH: &str = "70,1,3,180,350,1,2,95,1,4.5,0,3,2";

fn record(csv_row: &str) -> PatientRecord {
    let v: Vec<f64> = csv_row.split(',').map(|s| s.parse().unwrap()).collect();
    PatientRecord::from_features(v.try_into().unwrap())
}

fn write_csv(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(f, "{line}").unwrap();
    }
    path
}

/// LOW ×10 labelled 0 and HIGH ×10 labelled 1.
fn two_profile_csv(dir: &Path) -> PathBuf {
    let mut lines = vec![HEADER.to_string()];
    for _ in 0..10 {
        lines.push(format!("{LOW},0"));
        lines.push(format!("{HIGH},1"));
    }
    write_csv(dir, "heart.csv", &lines)
}

/// `low` LOW rows labelled 0 and `high` HIGH rows labelled 1, in that order
/// unless `high_first` moves one HIGH row to the top.
fn skewed_csv(dir: &Path, low: usize, high: usize, high_first: bool) -> PathBuf {
    let mut lines = vec![HEADER.to_string()];
    let mut high_left = high;
    if high_first {
        lines.push(format!("{HIGH},1"));
        high_left -= 1;
    }
    lines.extend(std::iter::repeat(format!("{LOW},0")).take(low));
    lines.extend(std::iter::repeat(format!("{HIGH},1")).take(high_left));
    write_csv(dir, "skewed.csv", &lines)
}

/// A noisier cohort: risk rises with age and cholesterol, with overlap.
fn mixed_cohort_csv(dir: &Path) -> PathBuf {
    let mut lines = vec![HEADER.to_string()];
    for i in 0..60u32 {
        let age = 30 + (i * 7) % 50;
        let chol = 150 + (i * 13) % 250;
        let target = u32::from(age + chol / 5 > 100 || i % 11 == 0);
        lines.push(format!(
            "{age},{},{},{},{chol},{},{},{},{},{:.1},{},{},{},{target}",
            i % 2,
            i % 4,
            100 + (i * 3) % 90,
            i % 2,
            i % 3,
            90 + (i * 5) % 110,
            (i + 1) % 2,
            f64::from(i % 40) / 10.0,
            i % 3,
            i % 5,
            i % 3,
        ));
    }
    write_csv(dir, "cohort.csv", &lines)
}

fn pipeline(path: PathBuf) -> PredictionPipeline {
    PredictionPipeline::new(Arc::new(DatasetCache::default()), path, TrainerConfig::default())
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

#[test]
fn test_loader_returns_fourteen_columns_and_every_row() {
    let dir = tempfile::tempdir().unwrap();
    let ds = TrainingDataset::load(&two_profile_csv(dir.path())).unwrap();
    assert_eq!(ds.n_columns(), 14);
    assert_eq!(ds.len(), 20);
    assert_eq!(ds.class_counts(), (10, 10));
}

#[test]
fn test_loader_names_the_missing_column() {
    let dir = tempfile::tempdir().unwrap();
    let header = HEADER.replace("chol,", "");
    let row = "35,0,0,110,0,0,185,0,0.0,2,0,1,0";
    let path = write_csv(dir.path(), "bad.csv", &[header, row.to_string()]);

    let err = TrainingDataset::load(&path).unwrap_err();
    assert!(matches!(err, DatasetError::MissingColumn { .. }));
    assert!(err.to_string().contains("chol"));
}

#[test]
fn test_cache_picks_up_rewritten_file_when_reload_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let path = two_profile_csv(dir.path());
    let cache = DatasetCache::new(true);

    let first = cache.get_or_load(&path).unwrap();
    assert!(Arc::ptr_eq(&first, &cache.get_or_load(&path).unwrap()));

    let mut lines = vec![HEADER.to_string()];
    for _ in 0..3 {
        lines.push(format!("{LOW},0"));
        lines.push(format!("{HIGH},1"));
    }
    write_csv(dir.path(), "heart.csv", &lines);
    let later = std::time::SystemTime::now() + std::time::Duration::from_secs(10);
    std::fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(later)
        .unwrap();

    let second = cache.get_or_load(&path).unwrap();
    assert_eq!(second.len(), 6);
    assert_ne!(first.fingerprint(), second.fingerprint());
}

// ---------------------------------------------------------------------------
// Trainer and inference
// ---------------------------------------------------------------------------

#[test]
fn test_fit_never_errors_at_the_iteration_cap() {
    let dir = tempfile::tempdir().unwrap();
    let ds = TrainingDataset::load(&mixed_cohort_csv(dir.path())).unwrap();

    for cap in [1, 5, 1000] {
        let config = TrainerConfig {
            max_iterations: cap,
            ..Default::default()
        };
        let model = train(&ds, &config).unwrap();
        let p = model.predict_proba(&default_record());
        assert!((0.0..=1.0).contains(&p));
    }
}

#[test]
fn test_label_agrees_with_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let ds = TrainingDataset::load(&mixed_cohort_csv(dir.path())).unwrap();
    let model = train(&ds, &TrainerConfig::default()).unwrap();

    for r in ds.records() {
        let result = model.predict(r);
        assert!((0.0..=1.0).contains(&result.probability));
        assert_eq!(
            result.label == RiskLabel::Disease,
            result.probability >= DECISION_THRESHOLD
        );
    }
}

#[test]
fn test_two_profiles_are_separated() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(two_profile_csv(dir.path()));

    let low = p.run(&record(LOW)).unwrap();
    assert_eq!(low.result.label, RiskLabel::NoDisease);
    assert!(low.result.probability < 0.5);

    let high = p.run(&record(HIGH)).unwrap();
    assert_eq!(high.result.label, RiskLabel::Disease);
    assert!(high.result.probability > 0.5);
}

#[test]
fn test_probabilities_point_at_disease_whatever_the_class_balance() {
    for (low, high, high_first) in [(30, 8, false), (8, 30, false), (12, 12, true), (12, 12, false)] {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(skewed_csv(dir.path(), low, high, high_first));

        let healthy = p.run(&record(LOW)).unwrap();
        assert!(
            healthy.result.probability < 0.5,
            "low-risk p={} for {low}/{high} high_first={high_first}",
            healthy.result.probability
        );
        assert_eq!(healthy.result.label, RiskLabel::NoDisease);

        let sick = p.run(&record(HIGH)).unwrap();
        assert!(
            sick.result.probability > 0.5,
            "high-risk p={} for {low}/{high} high_first={high_first}",
            sick.result.probability
        );
        assert_eq!(sick.result.label, RiskLabel::Disease);
    }
}

#[test]
fn test_repeated_runs_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(mixed_cohort_csv(dir.path()));

    let first = p.run(&default_record()).unwrap();
    for _ in 0..5 {
        let again = p.run(&default_record()).unwrap();
        assert_eq!(again.result, first.result);
        assert_eq!(again.assessment, first.assessment);
    }
    assert_eq!(p.cache().loads(), 1);
}

#[test]
fn test_library_predict_matches_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = two_profile_csv(dir.path());

    let one_shot = heartguard::predict(&path, &record(HIGH)).unwrap();
    let piped = pipeline(path).run(&record(HIGH)).unwrap();
    assert_eq!(one_shot.result, piped.result);
}

// ---------------------------------------------------------------------------
// Presentation and encodings
// ---------------------------------------------------------------------------

#[test]
fn test_presentation_reference_values() {
    let high = present(&heartguard::model::PredictionResult {
        label: RiskLabel::Disease,
        probability: 0.8734,
    });
    assert_eq!(high.headline, "High Risk of Heart Disease");
    assert_eq!(high.confidence_text, "87.34%");
    assert_eq!(high.severity, Severity::High);

    let low = present(&heartguard::model::PredictionResult {
        label: RiskLabel::NoDisease,
        probability: 0.12,
    });
    assert_eq!(low.headline, "No Heart Disease Detected");
    assert_eq!(low.confidence_text, "12.00%");
    assert_eq!(low.severity, Severity::Low);
}

#[test]
fn test_both_encodings_reach_the_same_prediction() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(two_profile_csv(dir.path()));
    let patient = record(HIGH);

    let mut outcomes = Vec::new();
    for kind in [EncodingKind::Labeled, EncodingKind::Numeric] {
        let adapter = kind.adapter();
        let fields: HashMap<String, String> = adapter
            .form_values(&patient)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        outcomes.push(p.run_form(adapter, &fields).unwrap());
    }
    assert_eq!(outcomes[0].record, patient);
    assert_eq!(outcomes[0].record, outcomes[1].record);
    assert_eq!(outcomes[0].result, outcomes[1].result);
}
