//! HTTP surface: health check, cached snapshot and rate-limited passthrough.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer, set_header::SetResponseHeaderLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::client::{REQUEST_TIMEOUT, TuyaClient};
use crate::collector::looks_like_json;
use crate::error::StoreError;
use crate::limiter::RateLimiter;
use crate::store::Store;

pub const DATA_AGE_HEADER: &str = "x-data-age-ms";
pub const WINDOW_HEADER: &str = "x-ratelimit-window-seconds";
pub const RESET_AT_HEADER: &str = "x-ratelimit-reset-at";

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const SERVER_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Services shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<TuyaClient>,
    pub store: Store,
    pub limiter: Arc<RateLimiter>,
}

/// Builds the router with its middleware stack.
///
/// With `allowed_origin` set, CORS allows exactly that origin.
pub fn build_app(state: AppState, allowed_origin: Option<HeaderValue>) -> Router {
    let router = Router::new()
        .route("/healthz", any(healthz))
        .route("/info", get(info).fallback(method_not_allowed))
        .route("/dale", get(passthrough).fallback(method_not_allowed))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(request_timeout())
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("DENY"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::REFERRER_POLICY,
                    HeaderValue::from_static("no-referrer"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_XSS_PROTECTION,
                    HeaderValue::from_static("1; mode=block"),
                )),
        )
        .with_state(state);

    match allowed_origin {
        Some(origin) => router.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET]),
        ),
        None => router,
    }
}

fn request_timeout() -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, SERVER_REQUEST_TIMEOUT)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Serves the cached snapshot verbatim.
async fn info(State(state): State<AppState>) -> Result<Response, ApiError> {
    let snapshot = state.store.get().await.map_err(|e| match e {
        StoreError::NotFound => ApiError::NoData,
        other => {
            tracing::error!(error = %other, "Failed to read snapshot");
            ApiError::Store
        }
    })?;

    let age_ms = snapshot.age_ms(Utc::now());

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, JSON_CONTENT_TYPE.to_string()),
            (header::HeaderName::from_static(DATA_AGE_HEADER), age_ms.to_string()),
        ],
        snapshot.raw_json,
    )
        .into_response())
}

/// Calls the vendor live, at most once per window.
async fn passthrough(State(state): State<AppState>) -> Result<Response, ApiError> {
    let (allowed, retry_after) = state.limiter.allow();
    if !allowed {
        tracing::info!(retry_after_secs = retry_after.as_secs(), "Passthrough rate limited");
        return Err(ApiError::RateLimited {
            retry_after,
            window: state.limiter.window(),
        });
    }

    let response = tokio::time::timeout(REQUEST_TIMEOUT, state.client.get_device())
        .await
        .map_err(|_| ApiError::Upstream(format!("timed out after {REQUEST_TIMEOUT:?}")))?
        .map_err(|e| {
            tracing::error!(error = %e, "Passthrough fetch failed");
            ApiError::Upstream(e.to_string())
        })?;

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    if looks_like_json(&response.body) {
        return Ok((
            status,
            [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)],
            response.body,
        )
            .into_response());
    }

    let wrapped = serde_json::json!({
        "ok": status.is_success(),
        "status": response.status,
        "body": String::from_utf8_lossy(&response.body),
    });
    Ok((status, Json(wrapped)).into_response())
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// API error types
#[derive(Debug)]
pub enum ApiError {
    NoData,
    MethodNotAllowed,
    RateLimited {
        retry_after: Duration,
        window: Duration,
    },
    Upstream(String),
    Store,
}

#[derive(Serialize)]
struct ErrorBody {
    ok: bool,
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, Option<String>) {
        match self {
            Self::NoData => (
                StatusCode::SERVICE_UNAVAILABLE,
                "no_data",
                Some("No device data collected yet. Try again shortly.".to_string()),
            ),
            Self::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed", None),
            Self::RateLimited { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                Some("This route can only be called once per time window.".to_string()),
            ),
            Self::Upstream(msg) => (StatusCode::BAD_GATEWAY, "tuya_upstream_error", Some(msg.clone())),
            Self::Store => (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, description) = self.parts();
        let body = Json(ErrorBody {
            ok: false,
            error,
            description,
        });
        let mut response = (status, body).into_response();

        if let Self::RateLimited {
            retry_after,
            window,
        } = self
        {
            let retry_secs = ceil_secs(retry_after);
            let retry = chrono::Duration::from_std(retry_after).unwrap_or(chrono::Duration::zero());
            let reset_at = (Utc::now() + retry).to_rfc3339_opts(SecondsFormat::Secs, true);

            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_secs));
            headers.insert(WINDOW_HEADER, HeaderValue::from(window.as_secs()));
            if let Ok(value) = HeaderValue::from_str(&reset_at) {
                headers.insert(RESET_AT_HEADER, value);
            }
        }

        response
    }
}

/// Whole seconds, rounded up, so a client waiting that long is never early.
fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
