//! REST API handlers
//!
//! Two operations matter to the outside: start a sweep now, and list the
//! persisted offers. Health, the last sweep report and Prometheus metrics
//! sit alongside them.

use axum::{
    extract::{MatchedPath, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::Error;
use crate::models::{Offer, OfferId, OfferState};
use crate::scheduler::SchedulerError;
use crate::storage::{OfferFilter, OfferStats};
use crate::sweep::SweepTrigger;

use super::server::AppState;

/// Default page size for offer listings
const DEFAULT_LIMIT: usize = 100;

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Simple error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Scheduler(SchedulerError::SweepInProgress) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(category = self.category().as_str(), error = %self, "Request failed");
            // Store internals stay in the log
            return error_response(status, format!("{} error", self.category().as_str()));
        }
        error_response(status, self.to_string())
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub sweep_running: bool,
    pub offers: Option<OfferStats>,
}

/// Sweep request accepted
#[derive(Debug, Serialize)]
pub struct SweepAccepted {
    pub status: &'static str,
}

/// Query string for offer listings
#[derive(Debug, Default, Deserialize)]
pub struct OffersQuery {
    pub partition: Option<String>,
    pub state: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct OffersResponse {
    pub count: usize,
    pub offers: Vec<Offer>,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/sweep", post(start_sweep))
        .route("/api/sweep/last", get(last_sweep))
        .route("/api/offers", get(list_offers))
        .route("/api/offers/{id}", get(get_offer))
        .route("/metrics", get(metrics))
        .route_layer(middleware::from_fn(track_requests))
        .with_state(state)
}

/// Record request count and latency per matched route
async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    crate::metrics::record_api_request(
        &endpoint,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

// ============================================================================
// Health Handlers
// ============================================================================

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let offers = match state.store.stats() {
        Ok(stats) => Some(stats),
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "Health check could not read offer stats");
            None
        }
    };

    Json(ApiResponse::success(HealthResponse {
        status: if offers.is_some() { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        sweep_running: state.runner.is_running(),
        offers,
    }))
}

async fn metrics() -> Response {
    match crate::metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ============================================================================
// Sweep Handlers
// ============================================================================

/// Start a sweep in the background
async fn start_sweep(State(state): State<AppState>) -> Result<Response, Error> {
    state.runner.try_start(SweepTrigger::OnDemand)?;
    tracing::info!("On-demand sweep accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(SweepAccepted { status: "accepted" })),
    )
        .into_response())
}

async fn last_sweep(State(state): State<AppState>) -> Response {
    match state.runner.last_report().await {
        Some(report) => (StatusCode::OK, Json(ApiResponse::success(report))).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No sweep has finished yet"),
    }
}

// ============================================================================
// Offer Handlers
// ============================================================================

async fn list_offers(
    State(state): State<AppState>,
    Query(query): Query<OffersQuery>,
) -> Result<Response, Error> {
    let mut filter = OfferFilter::default().limit(query.limit.unwrap_or(DEFAULT_LIMIT));

    if let Some(partition) = query.partition.filter(|p| !p.is_empty()) {
        filter = filter.partition(partition);
    }
    if let Some(raw) = query.state.filter(|s| !s.is_empty()) {
        let offer_state: OfferState = raw.parse().map_err(Error::InvalidRequest)?;
        filter = filter.state(offer_state);
    }

    let offers = state.store.list_offers(&filter)?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::success(OffersResponse {
            count: offers.len(),
            offers,
        })),
    )
        .into_response())
}

async fn get_offer(
    State(state): State<AppState>,
    Path(id): Path<OfferId>,
) -> Result<Response, Error> {
    let offer = state.store.get_offer(id)?.ok_or(Error::NotFound(id))?;
    Ok((StatusCode::OK, Json(ApiResponse::success(offer))).into_response())
}

// ============================================================================
// Tests
// ============================================================================
