//! Request/response types and configuration for the HeartGuard server.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::dataset::DEFAULT_DATASET_PATH;
use crate::encoding::EncodingKind;
use crate::model::TrainerConfig;
use crate::patient::PatientRecord;
use crate::pipeline::Outcome;
use crate::presentation::Severity;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (defaults to 127.0.0.1:8080; use 0.0.0.0 to expose externally)
    pub bind_addr: SocketAddr,
    /// Training CSV location
    pub dataset_path: PathBuf,
    /// How the form offers binary fields
    pub encoding: EncodingKind,
    /// Reload the dataset when its mtime changes
    pub reload_on_change: bool,
    /// Rate limit in requests per minute per IP (0 = no limit)
    pub rate_limit_rpm: u32,
    /// Path for JSONL access log
    pub access_log_path: String,
    /// Maximum access log file size in bytes before rotation (0 = no limit)
    pub max_access_log_bytes: u64,
    /// Optimizer settings used for every per-request fit
    pub trainer: TrainerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080"
                .parse()
                .expect("valid default bind address"),
            dataset_path: PathBuf::from(DEFAULT_DATASET_PATH),
            encoding: EncodingKind::default(),
            reload_on_change: false,
            rate_limit_rpm: 60,
            access_log_path: "heartguard-access.jsonl".to_string(),
            max_access_log_bytes: 50 * 1024 * 1024, // 50 MB
            trainer: TrainerConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

/// JSON prediction request
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub patient: PatientRecord,
}

/// Prediction details returned by the JSON API.
#[derive(Debug, Serialize, Deserialize)]
pub struct AssessmentResult {
    /// 0 or 1
    pub label: u8,
    pub probability: f64,
    pub headline: String,
    pub severity: Severity,
    pub confidence_text: String,
    pub advisory: String,
    /// Whether the optimizer reached its tolerance before the iteration cap.
    pub converged: bool,
    pub dataset_fingerprint: String,
}

impl From<&Outcome> for AssessmentResult {
    fn from(outcome: &Outcome) -> Self {
        let a = &outcome.assessment;
        Self {
            label: a.label.index(),
            probability: a.probability,
            headline: a.headline.clone(),
            severity: a.severity,
            confidence_text: a.confidence_text.clone(),
            advisory: a.advisory.clone(),
            converged: outcome.model.converged(),
            dataset_fingerprint: outcome.dataset_fingerprint.clone(),
        }
    }
}

/// Unified response for the prediction endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<AssessmentResult>,
    pub processing_time_ms: u64,
}

impl PredictResponse {
    pub fn failure(error: String, processing_time_ms: u64) -> Self {
        Self {
            success: false,
            error: Some(error),
            assessment: None,
            processing_time_ms,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub dataset_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_fingerprint: Option<String>,
    pub dataset_rows: usize,
    pub encoding: EncodingKind,
    pub uptime_seconds: u64,
}

/// Dataset summary response
#[derive(Debug, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub path: String,
    pub fingerprint: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub class_counts: ClassCounts,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClassCounts {
    pub no_disease: usize,
    pub disease: usize,
}

/// Stats response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub uptime_seconds: u64,
    pub requests: RequestStats,
    pub predictions: PredictionStats,
    pub endpoints: EndpointStats,
    pub dataset_cache: CacheStats,
}

#[derive(Debug, Serialize)]
pub struct RequestStats {
    pub total: u64,
    pub errors: u64,
}

#[derive(Debug, Serialize)]
pub struct PredictionStats {
    pub high_risk: u64,
    pub low_risk: u64,
    pub not_converged: u64,
}

#[derive(Debug, Serialize)]
pub struct EndpointStats {
    pub form: u64,
    pub predict: u64,
    pub dataset: u64,
    pub stats: u64,
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub loads: u64,
    pub hits: u64,
}
