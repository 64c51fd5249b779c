//! HTTP server for the HeartGuard prediction form.
//!
//! Serves the server-rendered form at `/` and a JSON API under `/api/v1`.
//! Every prediction request runs the full pipeline (cached load, fresh fit,
//! inference, presentation) on a blocking worker.
//!
//! Features:
//! - Per-IP rate limiting on the prediction routes, LRU-bounded to 10k entries
//! - JSONL access logging with size-based rotation (configurable via `max_access_log_bytes`)
//! - Dataset validated at startup; the server refuses to start on a bad CSV
//! - Structured logging via [`tracing`]

pub mod handlers;
pub mod logging;
pub mod middleware;
pub mod types;

pub use handlers::MAX_BODY_BYTES;
pub use logging::{RecordEvent, UsageMetrics};
pub use types::{
    AssessmentResult, CacheStats, ClassCounts, DatasetSummary, EndpointStats, HealthResponse,
    PredictRequest, PredictResponse, PredictionStats, RequestStats, ServerConfig, StatsResponse,
};

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use eyre::{Result, WrapErr};
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::info;

use crate::cache::DatasetCache;
use crate::pipeline::PredictionPipeline;

// ---------------------------------------------------------------------------
// Server state
// ---------------------------------------------------------------------------

pub struct ServerState {
    pub config: ServerConfig,
    pub pipeline: PredictionPipeline,
    pub start_time: Instant,
    pub rate_limiters: Mutex<LruCache<IpAddr, Arc<middleware::IpRateLimiter>>>,
    pub usage: UsageMetrics,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        let usage = UsageMetrics::new(&config.access_log_path, config.max_access_log_bytes);
        let cache = Arc::new(DatasetCache::new(config.reload_on_change));
        let pipeline = PredictionPipeline::new(cache, config.dataset_path.clone(), config.trainer);

        Self {
            config,
            pipeline,
            start_time: Instant::now(),
            rate_limiters: middleware::new_rate_limiter_cache(),
            usage,
        }
    }
}

/// Assemble the application router around `state`.
pub fn build_router(state: Arc<ServerState>) -> axum::Router {
    use axum::{
        extract::DefaultBodyLimit,
        middleware as axum_mw,
        routing::{get, post},
        Router,
    };
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    // Both routes that trigger a fit sit behind the rate limiter.
    let predict_routes = Router::new()
        .route("/", post(handlers::form_submit_handler))
        .route("/api/v1/predict", post(handlers::predict_handler))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::form_page_handler))
        .route("/health", get(handlers::health_handler))
        .route("/stats", get(handlers::stats_handler))
        .route("/api/v1/dataset", get(handlers::dataset_handler))
        .merge(predict_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// HTTP server
// ---------------------------------------------------------------------------

/// Run the HTTP server (blocking)
pub async fn run_server(config: ServerConfig) -> Result<()> {
    let rate_limit_rpm = config.rate_limit_rpm;
    let bind_addr = config.bind_addr;
    let access_log = config.access_log_path.clone();
    let state = Arc::new(ServerState::new(config));

    // Fail fast on a missing or malformed dataset instead of on first request.
    let dataset = state.pipeline.dataset().wrap_err_with(|| {
        format!(
            "failed to load training dataset {}",
            state.config.dataset_path.display()
        )
    })?;
    let (no_disease, disease) = dataset.class_counts();
    info!(
        path = %dataset.source().display(),
        rows = dataset.len(),
        no_disease,
        disease,
        fingerprint = dataset.fingerprint(),
        "training dataset ready"
    );

    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .wrap_err_with(|| format!("failed to bind {bind_addr}"))?;
    info!(bind = %bind_addr, encoding = ?state.config.encoding, "HeartGuard server listening");
    info!("Endpoints: GET / (form), POST / (form submit), POST /api/v1/predict, GET /api/v1/dataset, GET /health, GET /stats");
    if rate_limit_rpm > 0 {
        info!(rate_limit_rpm, "rate limiting enabled");
    } else {
        info!("rate limiting disabled");
    }
    if state.config.reload_on_change {
        info!("dataset reload on change enabled");
    }
    info!(access_log = %access_log);

    // Graceful shutdown on SIGTERM/SIGINT
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let sigterm_recv = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let sigterm_recv = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down gracefully"),
        _ = sigterm_recv => info!("received SIGTERM, shutting down gracefully"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::EncodingKind;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            dataset_path: "heart_disease_data.csv".to_string(),
            dataset_fingerprint: Some("sha256:abc".to_string()),
            dataset_rows: 303,
            encoding: EncodingKind::Labeled,
            uptime_seconds: 100,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"encoding\":\"labeled\""));
        assert!(json.contains("\"dataset_rows\":303"));
    }

    #[test]
    fn test_health_response_omits_missing_fingerprint() {
        let response = HealthResponse {
            status: "degraded".to_string(),
            version: "0.1.0".to_string(),
            dataset_path: "missing.csv".to_string(),
            dataset_fingerprint: None,
            dataset_rows: 0,
            encoding: EncodingKind::Numeric,
            uptime_seconds: 1,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("dataset_fingerprint"));
    }

    #[test]
    fn test_stats_response_serialization() {
        let response = StatsResponse {
            uptime_seconds: 3600,
            requests: RequestStats {
                total: 100,
                errors: 2,
            },
            predictions: PredictionStats {
                high_risk: 40,
                low_risk: 58,
                not_converged: 1,
            },
            endpoints: EndpointStats {
                form: 60,
                predict: 35,
                dataset: 3,
                stats: 2,
            },
            dataset_cache: CacheStats { loads: 1, hits: 99 },
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"total\":100"));
        assert!(json.contains("\"high_risk\":40"));
        assert!(json.contains("\"hits\":99"));
    }

    #[test]
    fn test_predict_request_deserialization() {
        let json = r#"{"patient": {"age": 63, "sex": 1, "cp": 3, "trestbps": 145,
            "chol": 233, "fbs": 1, "restecg": 0, "thalach": 150, "exang": 0,
            "oldpeak": 2.3, "slope": 0, "ca": 0, "thal": 1}}"#;
        let req: PredictRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.patient.age, 63.0);
        assert_eq!(req.patient.oldpeak, 2.3);
    }

    #[test]
    fn test_predict_request_requires_all_fields() {
        let json = r#"{"patient": {"age": 63}}"#;
        assert!(serde_json::from_str::<PredictRequest>(json).is_err());
    }

    #[test]
    fn test_failure_response_skips_assessment() {
        let resp = PredictResponse::failure("boom".to_string(), 4);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"success\":false"));
        assert!(!json.contains("assessment"));
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.rate_limit_rpm, 60);
        assert_eq!(config.encoding, EncodingKind::Labeled);
        assert!(!config.reload_on_change);
    }

    #[test]
    fn test_server_state_wires_reload_flag_into_cache() {
        let tmpdir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            dataset_path: tmpdir.path().join("heart.csv"),
            access_log_path: tmpdir.path().join("a.jsonl").to_str().unwrap().to_string(),
            reload_on_change: true,
            ..Default::default()
        };
        let state = ServerState::new(config);
        assert!(state.pipeline.cache().reload_on_change());
        assert_eq!(state.pipeline.dataset_path(), tmpdir.path().join("heart.csv"));
    }
}
