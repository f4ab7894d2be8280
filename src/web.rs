//! Read-only REST shell for the dashboard (spec.md §6). A thin layer over
//! the repositories and the scheduler's shared status state; it owns no
//! business logic of its own, matching the "external collaborator" framing
//! spec.md gives this surface.
//!
//! Grounded on the teacher's `web.rs` (Axum router, `AppState` holding a
//! pool, CORS layer, request-logging middleware) cut down to the handful of
//! endpoints this spec actually calls for.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::archiver::Archiver;
use crate::config::Config;
use crate::controllers::Controller;
use crate::controllers_repo::ControllersRepository;
use crate::db::PgPool;
use crate::error::CoreError;
use crate::filter_chain::FilterStats;
use crate::flights::Flight;
use crate::flights_repo::FlightsRepository;
use crate::scheduler::HealthState;
use crate::session::detector::SessionDetector;
use crate::session::reconnect::ReconnectionMerger;
use crate::summarizer::flight::FlightSummaryRow;
use crate::summarizer::FlightSummarizer;

#[derive(Clone)]
pub struct AppState {
    pub flights_repo: FlightsRepository,
    pub controllers_repo: ControllersRepository,
    pub flight_summarizer: FlightSummarizer,
    pub detector: SessionDetector,
    pub merger: ReconnectionMerger,
    pub archiver: Archiver,
    pub config: Config,
    pub filter_stats: Arc<Mutex<FilterStats>>,
    pub health: Arc<Mutex<HealthState>>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config, filter_stats: Arc<Mutex<FilterStats>>, health: Arc<Mutex<HealthState>>) -> Self {
        Self {
            flights_repo: FlightsRepository::new(pool.clone()),
            controllers_repo: ControllersRepository::new(pool.clone()),
            flight_summarizer: FlightSummarizer::new(FlightsRepository::new(pool.clone()), pool.clone()),
            detector: SessionDetector::new(pool.clone()),
            merger: ReconnectionMerger::new(pool.clone()),
            archiver: Archiver::new(pool),
            config,
            filter_stats,
            health,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> Response {
    (status, Json(ErrorBody { detail: detail.into() })).into_response()
}

fn core_error_response(err: CoreError) -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

#[derive(Debug, Serialize)]
struct StatusBody {
    healthy: bool,
    last_poll_at: Option<chrono::DateTime<chrono::Utc>>,
    last_poll_ok: bool,
    last_flush_at: Option<chrono::DateTime<chrono::Utc>>,
    last_flush_ok: bool,
    geo_admitted: u64,
    geo_rejected: u64,
    pattern_admitted: u64,
    pattern_rejected: u64,
}

async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.health.lock().await.clone();
    let stats = state.filter_stats.lock().await.clone();
    Json(StatusBody {
        healthy: health.healthy(),
        last_poll_at: health.last_poll_at,
        last_poll_ok: health.last_poll_ok,
        last_flush_at: health.last_flush_at,
        last_flush_ok: health.last_flush_ok,
        geo_admitted: stats.geo_admitted,
        geo_rejected: stats.geo_rejected,
        pattern_admitted: stats.pattern_admitted,
        pattern_rejected: stats.pattern_rejected,
    })
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let healthy = state.health.lock().await.healthy();
    if healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    }
}

async fn list_flights(State(state): State<AppState>) -> impl IntoResponse {
    match state.flights_repo.list_all().await {
        Ok(flights) => Json::<Vec<Flight>>(flights).into_response(),
        Err(e) => core_error_response(e),
    }
}

async fn get_flight(State(state): State<AppState>, Path(callsign): Path<String>) -> impl IntoResponse {
    match state.flights_repo.find_by_callsign(&callsign).await {
        Ok(Some(flight)) => Json(flight).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("no flight with callsign {callsign}")),
        Err(e) => core_error_response(e),
    }
}

async fn list_controllers(State(state): State<AppState>) -> impl IntoResponse {
    match state.controllers_repo.list_all().await {
        Ok(controllers) => Json::<Vec<Controller>>(controllers).into_response(),
        Err(e) => core_error_response(e),
    }
}

async fn list_flight_summaries(State(state): State<AppState>) -> impl IntoResponse {
    match state.flight_summarizer.list_summaries().await {
        Ok(summaries) => Json::<Vec<FlightSummaryRow>>(summaries).into_response(),
        Err(e) => core_error_response(e),
    }
}

#[derive(Debug, Serialize)]
struct ProcessReport {
    candidates_seen: usize,
    sessions_completed: usize,
}

/// Manually run one pass of the flight completion/summarize/archive
/// pipeline, outside its normal tick cadence — the "manual trigger"
/// endpoint spec.md §6 calls for.
async fn process_flight_summaries(State(state): State<AppState>) -> impl IntoResponse {
    let cutoff = chrono::Utc::now() - chrono::Duration::minutes(state.config.completion_minutes_flight);
    let candidates = match state.detector.flight_candidates(cutoff).await {
        Ok(c) => c,
        Err(e) => return core_error_response(e),
    };

    let mut completed = 0;
    for candidate in &candidates {
        let result: Result<(), CoreError> = async {
            let merged = state
                .merger
                .merge_flight_candidate(candidate.clone(), state.config.reconnection_threshold)
                .await?;
            match state.flight_summarizer.summarize(&merged).await {
                Ok(()) => {}
                Err(e) if e.is_already_summarized() => {}
                Err(e) => return Err(e),
            }
            state.archiver.archive_flight_session(&merged).await?;
            Ok(())
        }
        .await;
        if result.is_ok() {
            completed += 1;
        }
    }

    Json(ProcessReport {
        candidates_seen: candidates.len(),
        sessions_completed: completed,
    })
    .into_response()
}

async fn request_logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    info!(%method, %path, status = response.status().as_u16(), "request completed");
    response
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/flights", get(list_flights))
        .route("/api/flights/{callsign}", get(get_flight))
        .route("/api/flights/summaries", get(list_flight_summaries))
        .route("/api/flights/summaries/process", post(process_flight_summaries))
        .route("/api/controllers", get(list_controllers))
        .route("/healthz", get(healthz))
        .with_state(state)
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(CorsLayer::permissive())
}

pub async fn serve(interface: String, port: u16, state: AppState) -> Result<(), std::io::Error> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(format!("{interface}:{port}")).await?;
    info!("web shell listening on http://{interface}:{port}");
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_serializes_detail_field() {
        let body = ErrorBody {
            detail: "not found".into(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"detail":"not found"}"#);
    }

    #[test]
    fn test_process_report_counts_are_independent() {
        let report = ProcessReport {
            candidates_seen: 3,
            sessions_completed: 1,
        };
        assert_eq!(report.candidates_seen, 3);
        assert_eq!(report.sessions_completed, 1);
    }
}
