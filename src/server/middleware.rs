//! Per-IP rate limiting.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter};
use lru::LruCache;
use tokio::sync::Mutex;

use super::types::{PredictResponse, ServerConfig};
use crate::encoding::default_record;
use crate::ui::ResultView;

pub type IpRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Maximum number of per-IP rate limiter entries to keep in the LRU cache.
const MAX_RATE_LIMITER_ENTRIES: usize = 10_000;

/// Get or create a rate limiter for the given IP.
/// IPv6 addresses are masked to /64 to prevent per-address evasion.
pub async fn get_rate_limiter(
    config: &ServerConfig,
    rate_limiters: &Mutex<LruCache<IpAddr, Arc<IpRateLimiter>>>,
    ip: IpAddr,
) -> Option<Arc<IpRateLimiter>> {
    let rpm = NonZeroU32::new(config.rate_limit_rpm)?;

    let key = match ip {
        IpAddr::V4(_) => ip,
        IpAddr::V6(v6) => {
            let seg = v6.segments();
            IpAddr::V6(Ipv6Addr::new(seg[0], seg[1], seg[2], seg[3], 0, 0, 0, 0))
        }
    };

    let mut limiters = rate_limiters.lock().await;

    if let Some(limiter) = limiters.get(&key) {
        return Some(Arc::clone(limiter));
    }

    let quota = Quota::per_minute(rpm);
    let limiter = Arc::new(RateLimiter::direct(quota));
    limiters.push(key, Arc::clone(&limiter));

    Some(limiter)
}

pub fn new_rate_limiter_cache() -> Mutex<LruCache<IpAddr, Arc<IpRateLimiter>>> {
    Mutex::new(LruCache::new(
        std::num::NonZeroUsize::new(MAX_RATE_LIMITER_ENTRIES).expect("non-zero capacity"),
    ))
}

/// Reject requests over the per-IP quota with 429 before they reach the pipeline.
pub async fn rate_limit_middleware(
    axum::extract::State(state): axum::extract::State<Arc<super::ServerState>>,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<SocketAddr>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    if let Some(limiter) = get_rate_limiter(&state.config, &state.rate_limiters, addr.ip()).await {
        if limiter.check().is_err() {
            state.usage.record_error();
            tracing::warn!(client = %addr.ip(), path = %request.uri().path(), "rate limit exceeded");
            let message = format!(
                "Rate limit exceeded. Maximum {} requests per minute.",
                state.config.rate_limit_rpm
            );
            // Browsers submitting the form get the page back, API clients get JSON.
            if !request.uri().path().starts_with("/api/") {
                return super::handlers::form_page(
                    &state,
                    default_record(),
                    ResultView::Error(message),
                    StatusCode::TOO_MANY_REQUESTS,
                )
                .into_response();
            }
            return (
                StatusCode::TOO_MANY_REQUESTS,
                axum::Json(PredictResponse::failure(message, 0)),
            )
                .into_response();
        }
    }

    next.run(request).await
}
