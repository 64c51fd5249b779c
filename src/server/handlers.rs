//! HTTP endpoint handler functions.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use tracing::{error, info};

use crate::encoding::{default_record, validate_record};
use crate::patient::PatientRecord;
use crate::pipeline::Outcome;
use crate::ui::{render_page, PageView, ResultView};

use super::logging::RecordEvent;
use super::types::*;
use super::ServerState;

/// Maximum request body size in bytes (64 KB). A patient form is a few hundred bytes.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Shared prediction logic
// ---------------------------------------------------------------------------

/// Run the pipeline off the async runtime and record usage.
async fn predict_and_record(
    state: &Arc<ServerState>,
    record: PatientRecord,
    endpoint: &str,
    start: Instant,
) -> Result<Outcome, String> {
    let pipeline = state.pipeline.clone();
    let joined = tokio::task::spawn_blocking(move || pipeline.run(&record)).await;

    let outcome = match joined {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            state.usage.record_error();
            error!(endpoint, error = %e, "prediction failed");
            return Err(format!("Prediction failed: {e}"));
        }
        Err(e) => {
            state.usage.record_error();
            error!(endpoint, error = %e, "prediction task panicked");
            return Err(format!("Prediction task panicked: {e}"));
        }
    };

    state.usage.record(&RecordEvent {
        endpoint,
        label: outcome.result.label,
        probability: outcome.result.probability,
        converged: outcome.model.converged(),
        processing_time_ms: start.elapsed().as_millis() as u64,
    });
    Ok(outcome)
}

/// Render the form page around a pipeline result.
fn form_response(
    state: &ServerState,
    record: PatientRecord,
    result: Result<Outcome, String>,
    input_error: Option<String>,
) -> (StatusCode, Html<String>) {
    let status = match (&input_error, &result) {
        (Some(_), _) => StatusCode::UNPROCESSABLE_ENTITY,
        (None, Err(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        (None, Ok(_)) => StatusCode::OK,
    };

    let result_view = match (input_error, result) {
        (Some(msg), _) => ResultView::Error(msg),
        (None, Ok(outcome)) => ResultView::Assessment(outcome.assessment),
        (None, Err(msg)) => ResultView::Error(msg),
    };

    form_page(state, record, result_view, status)
}

/// The form page pre-set to `record`, with `result` below it.
pub(super) fn form_page(
    state: &ServerState,
    record: PatientRecord,
    result: ResultView,
    status: StatusCode,
) -> (StatusCode, Html<String>) {
    let dataset = state.pipeline.dataset().ok();
    let page = PageView {
        encoding: state.config.encoding.adapter(),
        record,
        result,
        dataset: dataset.as_deref(),
    };
    (status, Html(render_page(&page)))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /: the form with default inputs. Loading the page runs the pipeline.
pub async fn form_page_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let start = Instant::now();
    state.usage.ep_form.fetch_add(1, Ordering::Relaxed);

    let record = default_record();
    let result = predict_and_record(&state, record, "form", start).await;
    form_response(&state, record, result, None)
}

/// POST /: form submission.
pub async fn form_submit_handler(
    State(state): State<Arc<ServerState>>,
    axum::Form(fields): axum::Form<HashMap<String, String>>,
) -> impl IntoResponse {
    let start = Instant::now();
    state.usage.ep_form.fetch_add(1, Ordering::Relaxed);

    let encoding = state.config.encoding.adapter();
    match encoding.decode(&fields) {
        Ok(record) => {
            info!(encoding = encoding.name(), "form submitted");
            let result = predict_and_record(&state, record, "form", start).await;
            form_response(&state, record, result, None)
        }
        Err(e) => {
            state.usage.record_error();
            // Re-render with defaults so the page stays usable.
            let record = default_record();
            form_response(&state, record, Err(e.to_string()), Some(e.to_string()))
        }
    }
}

/// POST /api/v1/predict: JSON prediction.
pub async fn predict_handler(
    State(state): State<Arc<ServerState>>,
    axum::Json(request): axum::Json<PredictRequest>,
) -> impl IntoResponse {
    let start = Instant::now();
    state.usage.ep_predict.fetch_add(1, Ordering::Relaxed);

    if let Err(e) = validate_record(&request.patient) {
        state.usage.record_error();
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(PredictResponse::failure(
                e.to_string(),
                start.elapsed().as_millis() as u64,
            )),
        );
    }

    match predict_and_record(&state, request.patient, "predict", start).await {
        Ok(outcome) => (
            StatusCode::OK,
            axum::Json(PredictResponse {
                success: true,
                error: None,
                assessment: Some(AssessmentResult::from(&outcome)),
                processing_time_ms: start.elapsed().as_millis() as u64,
            }),
        ),
        Err(msg) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(PredictResponse::failure(
                msg,
                start.elapsed().as_millis() as u64,
            )),
        ),
    }
}

/// GET /api/v1/dataset: summary of the training table.
pub async fn dataset_handler(State(state): State<Arc<ServerState>>) -> axum::response::Response {
    state.usage.ep_dataset.fetch_add(1, Ordering::Relaxed);

    match state.pipeline.dataset() {
        Ok(ds) => {
            let (no_disease, disease) = ds.class_counts();
            axum::Json(DatasetSummary {
                path: ds.source().display().to_string(),
                fingerprint: ds.fingerprint().to_string(),
                rows: ds.len(),
                columns: ds.column_names().iter().map(|c| c.to_string()).collect(),
                class_counts: ClassCounts {
                    no_disease,
                    disease,
                },
            })
            .into_response()
        }
        Err(e) => {
            state.usage.record_error();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({
                    "success": false,
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let dataset = state.pipeline.dataset().ok();
    let response = HealthResponse {
        status: if dataset.is_some() { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dataset_path: state.config.dataset_path.display().to_string(),
        dataset_fingerprint: dataset.as_ref().map(|d| d.fingerprint().to_string()),
        dataset_rows: dataset.as_ref().map(|d| d.len()).unwrap_or(0),
        encoding: state.config.encoding,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    };
    axum::Json(response)
}

pub async fn stats_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    state.usage.ep_stats.fetch_add(1, Ordering::Relaxed);

    let cache = state.pipeline.cache();
    let response = StatsResponse {
        uptime_seconds: state.start_time.elapsed().as_secs(),
        requests: RequestStats {
            total: state.usage.total_requests.load(Ordering::Relaxed),
            errors: state.usage.total_errors.load(Ordering::Relaxed),
        },
        predictions: PredictionStats {
            high_risk: state.usage.high_risk.load(Ordering::Relaxed),
            low_risk: state.usage.low_risk.load(Ordering::Relaxed),
            not_converged: state.usage.not_converged.load(Ordering::Relaxed),
        },
        endpoints: EndpointStats {
            form: state.usage.ep_form.load(Ordering::Relaxed),
            predict: state.usage.ep_predict.load(Ordering::Relaxed),
            dataset: state.usage.ep_dataset.load(Ordering::Relaxed),
            stats: state.usage.ep_stats.load(Ordering::Relaxed),
        },
        dataset_cache: CacheStats {
            loads: cache.loads(),
            hits: cache.hits(),
        },
    };
    axum::Json(response)
}
