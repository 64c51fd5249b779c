//! Heart-disease classifier: binary logistic regression over 13 features.
//!
//! P(target = 1 | x) = σ(w·x + b), fitted by L-BFGS (via `linfa-logistic`)
//! on the penalized negative log-likelihood
//!
//! ```text
//! Σᵢ logloss(yᵢ, σ(w·xᵢ + b)) + ½·α·‖w‖²
//! ```
//!
//! with the intercept unpenalized. `α = 1.0` matches scikit-learn's default
//! `C = 1.0`. Features are used unscaled, exactly as they appear in the CSV.
//!
//! The solver starts from zero parameters and has no stochastic step, so a
//! fixed dataset always yields the same model. Hitting the iteration cap is
//! not an error: the best parameters found so far are returned and the model
//! is flagged as not converged.

use linfa::prelude::*;
use linfa_logistic::LogisticRegression;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dataset::TrainingDataset;
use crate::patient::{PatientRecord, RiskLabel, NUM_FEATURES};

/// Probability at or above which the positive class is predicted.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Default iteration cap for the optimizer.
pub const DEFAULT_MAX_ITERATIONS: u64 = 1000;

/// Default L2 penalty strength (inverse of scikit-learn's `C`).
pub const DEFAULT_ALPHA: f64 = 1.0;

/// Solver stopping tolerance on the gradient norm.
pub const DEFAULT_GRADIENT_TOLERANCE: f64 = 1e-4;

/// Largest per-sample gradient component still considered converged.
const CONVERGENCE_TOLERANCE: f64 = 1e-3;

#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("cannot fit on an empty dataset")]
    EmptyDataset,

    #[error("dataset needs both labels to fit; found only target={0}")]
    SingleClass(u8),

    #[error("optimizer failed: {0}")]
    Solver(String),
}

// ---------------------------------------------------------------------------
// Trainer configuration
// ---------------------------------------------------------------------------

/// Hyperparameters for [`train`]. Fixed per deployment; never searched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub max_iterations: u64,
    pub alpha: f64,
    pub gradient_tolerance: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            alpha: DEFAULT_ALPHA,
            gradient_tolerance: DEFAULT_GRADIENT_TOLERANCE,
        }
    }
}

// ---------------------------------------------------------------------------
// Trained model
// ---------------------------------------------------------------------------

/// Label and positive-class probability for one patient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: RiskLabel,
    pub probability: f64,
}

impl PredictionResult {
    /// Apply the decision threshold to a positive-class probability.
    pub fn from_probability(probability: f64) -> Self {
        let label = if probability >= DECISION_THRESHOLD {
            RiskLabel::Disease
        } else {
            RiskLabel::NoDisease
        };
        Self { label, probability }
    }
}

/// Fitted weights for one request. Built fresh, used once, dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    weights: Array1<f64>,
    intercept: f64,
    converged: bool,
    config: TrainerConfig,
}

impl TrainedModel {
    #[cfg(test)]
    pub(crate) fn from_parameters(weights: [f64; NUM_FEATURES], intercept: f64) -> Self {
        Self {
            weights: Array1::from(weights.to_vec()),
            intercept,
            converged: true,
            config: TrainerConfig::default(),
        }
    }

    pub fn weights(&self) -> ArrayView1<'_, f64> {
        self.weights.view()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// False when the optimizer stopped at the iteration cap short of the tolerance.
    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// w·x + b
    pub fn decision_function(&self, record: &PatientRecord) -> f64 {
        let x = record.to_features();
        self.weights
            .iter()
            .zip(x.iter())
            .map(|(w, v)| w * v)
            .sum::<f64>()
            + self.intercept
    }

    /// σ(w·x + b), the probability that `target = 1`.
    pub fn predict_proba(&self, record: &PatientRecord) -> f64 {
        sigmoid(self.decision_function(record))
    }

    pub fn predict(&self, record: &PatientRecord) -> PredictionResult {
        PredictionResult::from_probability(self.predict_proba(record))
    }
}

// ---------------------------------------------------------------------------
// Training
// ---------------------------------------------------------------------------

/// Fit a logistic regression on the whole dataset (no held-out split).
pub fn train(dataset: &TrainingDataset, config: &TrainerConfig) -> Result<TrainedModel, TrainError> {
    if dataset.is_empty() {
        return Err(TrainError::EmptyDataset);
    }
    match dataset.class_counts() {
        (0, _) => return Err(TrainError::SingleClass(1)),
        (_, 0) => return Err(TrainError::SingleClass(0)),
        _ => {}
    }

    let x = dataset.feature_matrix();
    let y = dataset.target_vector();
    let linfa_dataset = Dataset::new(x.clone(), y.clone());

    let fitted = LogisticRegression::default()
        .alpha(config.alpha)
        .max_iterations(config.max_iterations)
        .gradient_tolerance(config.gradient_tolerance)
        .with_intercept(true)
        .fit(&linfa_dataset)
        .map_err(|e| TrainError::Solver(e.to_string()))?;

    // The fitted parameters describe P(solver positive class). Negate them
    // when that class is 0 so they always describe P(target = 1).
    let (weights, intercept) = if solver_positive_class(dataset) == 1 {
        (fitted.params().to_owned(), fitted.intercept())
    } else {
        (fitted.params().mapv(|w| -w), -fitted.intercept())
    };

    let gradient = penalized_gradient(&x, &y, &weights, intercept, config.alpha);
    let worst = gradient.iter().fold(0.0f64, |acc, g| acc.max(g.abs()));
    let converged = worst / dataset.len() as f64 <= CONVERGENCE_TOLERANCE;

    if converged {
        debug!(
            rows = dataset.len(),
            intercept,
            max_gradient = worst,
            "logistic regression fitted"
        );
    } else {
        warn!(
            rows = dataset.len(),
            max_iterations = config.max_iterations,
            max_gradient = worst,
            "logistic regression did not converge; using best-effort parameters"
        );
    }

    Ok(TrainedModel {
        weights,
        intercept,
        converged,
        config: *config,
    })
}

/// The label linfa-logistic treats as positive: the majority class, or the
/// first row's label when both classes are equally frequent.
fn solver_positive_class(dataset: &TrainingDataset) -> u8 {
    let (negatives, positives) = dataset.class_counts();
    match positives.cmp(&negatives) {
        std::cmp::Ordering::Greater => 1,
        std::cmp::Ordering::Less => 0,
        std::cmp::Ordering::Equal => dataset.targets()[0],
    }
}

/// Gradient of the penalized objective at `(w, b)`, intercept component last.
fn penalized_gradient(
    x: &Array2<f64>,
    y: &Array1<usize>,
    weights: &Array1<f64>,
    intercept: f64,
    alpha: f64,
) -> Array1<f64> {
    let residual: Array1<f64> = x
        .dot(weights)
        .iter()
        .zip(y.iter())
        .map(|(z, &t)| sigmoid(z + intercept) - t as f64)
        .collect();

    let grad_w = x.t().dot(&residual) + weights * alpha;
    let grad_b = residual.sum();

    let mut out = grad_w.to_vec();
    out.push(grad_b);
    Array1::from(out)
}

/// Logistic sigmoid, evaluated without overflow for large |z|.
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
