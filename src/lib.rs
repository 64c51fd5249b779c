//! HeartGuard: heart disease risk prediction from patient vitals.
//!
//! Every prediction runs the same linear pipeline:
//!
//! 1. **Load** the training CSV through an explicit [`cache::DatasetCache`].
//! 2. **Train** a fresh L2-regularized logistic regression on the whole table.
//! 3. **Infer** the positive-class probability for one patient; label 1 iff p ≥ 0.5.
//! 4. **Present** the result as a headline, severity, confidence and advisory.
//!
//! The model is never persisted: it is refitted on every request. The pipeline
//! is exposed as a library ([`pipeline::PredictionPipeline`]), an HTTP
//! service with a server-rendered form ([`server`]), and a CLI.
//!
//! Uses structured logging via [`tracing`]. Set the `RUST_LOG` environment
//! variable to control log verbosity (e.g., `RUST_LOG=heartguard=debug`).

pub mod cache;
pub mod dataset;
pub mod encoding;
pub mod model;
pub mod patient;
pub mod pipeline;
pub mod presentation;
pub mod server;
pub mod ui;

use std::path::Path;

use crate::cache::DatasetCache;
use crate::model::TrainerConfig;
use crate::patient::PatientRecord;
use crate::pipeline::{Outcome, PipelineError, PredictionPipeline};

/// One-shot prediction with a throwaway cache and default trainer settings.
pub fn predict(dataset_path: &Path, record: &PatientRecord) -> Result<Outcome, PipelineError> {
    let pipeline = PredictionPipeline::new(
        std::sync::Arc::new(DatasetCache::default()),
        dataset_path,
        TrainerConfig::default(),
    );
    pipeline.run(record)
}
