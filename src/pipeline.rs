//! The prediction pipeline: load (cached) → train → infer → present.
//!
//! Every call runs all four steps in order on the calling thread. Only the
//! dataset is reused between calls; the model is refitted each time so a
//! result always reflects the dataset currently held by the cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::cache::DatasetCache;
use crate::dataset::{DatasetError, TrainingDataset};
use crate::encoding::{InputEncoding, InputError};
use crate::model::{train, PredictionResult, TrainError, TrainedModel, TrainerConfig};
use crate::patient::PatientRecord;
use crate::presentation::{present, RiskAssessment};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Train(#[from] TrainError),

    #[error(transparent)]
    Input(#[from] InputError),
}

impl PipelineError {
    /// Input errors are the caller's fault; everything else is ours.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Input(_))
    }
}

/// Everything produced by one pipeline run.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub record: PatientRecord,
    pub result: PredictionResult,
    pub assessment: RiskAssessment,
    pub model: TrainedModel,
    /// Fingerprint of the dataset the model was fitted on.
    pub dataset_fingerprint: String,
    pub elapsed_ms: u64,
}

/// One pipeline, shared by every form variant and the JSON API.
#[derive(Clone)]
pub struct PredictionPipeline {
    cache: Arc<DatasetCache>,
    dataset_path: PathBuf,
    trainer: TrainerConfig,
}

impl PredictionPipeline {
    pub fn new(cache: Arc<DatasetCache>, dataset_path: impl Into<PathBuf>, trainer: TrainerConfig) -> Self {
        Self {
            cache,
            dataset_path: dataset_path.into(),
            trainer,
        }
    }

    pub fn dataset_path(&self) -> &Path {
        &self.dataset_path
    }

    pub fn trainer(&self) -> &TrainerConfig {
        &self.trainer
    }

    pub fn cache(&self) -> &Arc<DatasetCache> {
        &self.cache
    }

    /// The training dataset, loaded through the cache.
    pub fn dataset(&self) -> Result<Arc<TrainingDataset>, DatasetError> {
        self.cache.get_or_load(&self.dataset_path)
    }

    /// Run the full pipeline for one patient.
    pub fn run(&self, record: &PatientRecord) -> Result<Outcome, PipelineError> {
        let start = Instant::now();

        let dataset = self.dataset()?;
        let model = train(&dataset, &self.trainer)?;
        let result = model.predict(record);
        let assessment = present(&result);

        let elapsed_ms = start.elapsed().as_millis() as u64;
        debug!(
            label = result.label.as_str(),
            probability = result.probability,
            converged = model.converged(),
            elapsed_ms,
            "pipeline run complete"
        );

        Ok(Outcome {
            record: *record,
            result,
            assessment,
            model,
            dataset_fingerprint: dataset.fingerprint().to_string(),
            elapsed_ms,
        })
    }

    /// Decode a submitted form with `encoding`, then run the pipeline.
    pub fn run_form(
        &self,
        encoding: &dyn InputEncoding,
        fields: &HashMap<String, String>,
    ) -> Result<Outcome, PipelineError> {
        let record = encoding.decode(fields)?;
        info!(encoding = encoding.name(), "form decoded");
        self.run(&record)
    }
}
