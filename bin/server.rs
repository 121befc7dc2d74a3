// PDN Monitor - Web Server
// Read-only dashboard API with Axum

use anyhow::{bail, Context};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{Local, NaiveDate};
use rusqlite::{Connection, InterruptHandle};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use pdn_monitor::{
    api_distribution, availability_distribution, build_dashboard, generate_alerts, init_tracing,
    open_read_only, rank_entities, summary, system_listing, trend_distribution, Alert,
    AggregationError, ChartSlice, DashboardPayload, EntityRanking, MonitorConfig, Snapshot,
    StoreError, Summary, SystemListing, VERSION,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
    /// Id of the capture currently running on `db`, if any
    active_capture: Arc<Mutex<Option<u64>>>,
    next_capture: Arc<AtomicU64>,
    config: Arc<MonitorConfig>,
}

impl AppState {
    fn new(conn: Connection, config: MonitorConfig) -> Self {
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Self {
            db: Arc::new(Mutex::new(conn)),
            interrupt,
            active_capture: Arc::new(Mutex::new(None)),
            next_capture: Arc::new(AtomicU64::new(1)),
            config: Arc::new(config),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

#[derive(Deserialize)]
struct RankingParams {
    limit: Option<i64>,
}

/// Aggregation failure tagged with what the endpoint was doing
struct ApiError {
    context: &'static str,
    source: AggregationError,
}

impl ApiError {
    fn new(context: &'static str, source: AggregationError) -> Self {
        Self { context, source }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.source {
            AggregationError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error!(error = %self.source, "{}", self.context);

        let body = ErrorResponse {
            detail: format!("{}: {}", self.context, self.source),
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Snapshot loading
// ============================================================================

fn slot_unavailable() -> StoreError {
    StoreError::Unavailable("capture slot lock poisoned".to_string())
}

/// Blocking half of [`load_snapshot`]
///
/// Once the connection is free, a request past its deadline returns without
/// querying. Otherwise the capture is registered under `capture_id` for as
/// long as it holds the connection.
fn capture_blocking(
    state: &AppState,
    capture_id: u64,
    deadline: Instant,
    as_of: NaiveDate,
) -> Result<Snapshot, AggregationError> {
    let conn = state
        .db
        .lock()
        .map_err(|_| StoreError::Unavailable("database lock poisoned".to_string()))?;

    {
        let mut active = state.active_capture.lock().map_err(|_| slot_unavailable())?;
        if Instant::now() >= deadline {
            debug!(capture_id, "deadline passed while waiting for the connection");
            return Err(AggregationError::Timeout(state.config.query_timeout_secs));
        }
        *active = Some(capture_id);
    }

    let result = Snapshot::capture_sqlite(&conn, as_of);

    if let Ok(mut active) = state.active_capture.lock() {
        *active = None;
    }
    Ok(result?)
}

/// Capture one snapshot on the blocking pool, bounded by the query timeout
///
/// On timeout the SQLite statement is interrupted only if this request's own
/// capture is the one holding the connection.
async fn load_snapshot(state: &AppState) -> Result<Snapshot, AggregationError> {
    let capture_id = state.next_capture.fetch_add(1, Ordering::Relaxed);
    let deadline = Instant::now() + state.config.query_timeout();
    let as_of = Local::now().date_naive();

    let worker_state = state.clone();
    let task = tokio::task::spawn_blocking(move || {
        capture_blocking(&worker_state, capture_id, deadline, as_of)
    });

    match tokio::time::timeout(state.config.query_timeout(), task).await {
        Err(_) => {
            warn!(
                capture_id,
                timeout_secs = state.config.query_timeout_secs,
                "snapshot capture timed out"
            );
            if let Ok(active) = state.active_capture.lock() {
                if *active == Some(capture_id) {
                    state.interrupt.interrupt();
                }
            }
            Err(AggregationError::Timeout(state.config.query_timeout_secs))
        }
        Ok(Err(join_error)) => Err(AggregationError::Worker(join_error.to_string())),
        Ok(Ok(result)) => result,
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /health - Health check
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: VERSION,
    })
}

/// GET /api/v1/dashboard/summary - Headline counters
async fn get_summary(State(state): State<AppState>) -> Result<Json<Summary>, ApiError> {
    let snapshot = load_snapshot(&state)
        .await
        .map_err(|e| ApiError::new("Error al obtener datos de resumen", e))?;
    Ok(Json(summary(&snapshot)))
}

/// GET /api/v1/dashboard/distribucion-apis - APIs per system (bar chart)
async fn get_api_distribution(
    State(state): State<AppState>,
) -> Result<Json<Vec<ChartSlice>>, ApiError> {
    let snapshot = load_snapshot(&state)
        .await
        .map_err(|e| ApiError::new("Error al obtener distribución de APIs", e))?;
    Ok(Json(api_distribution(&snapshot)))
}

/// GET /api/v1/dashboard/disponibilidad-apis - Availability tiers (pie chart)
async fn get_availability(State(state): State<AppState>) -> Result<Json<Vec<ChartSlice>>, ApiError> {
    let snapshot = load_snapshot(&state)
        .await
        .map_err(|e| ApiError::new("Error al obtener disponibilidad de APIs", e))?;
    Ok(Json(availability_distribution(&snapshot)))
}

/// GET /api/v1/dashboard/actualizacion-registros - Trend buckets (pie chart)
async fn get_record_updates(
    State(state): State<AppState>,
) -> Result<Json<Vec<ChartSlice>>, ApiError> {
    let snapshot = load_snapshot(&state)
        .await
        .map_err(|e| ApiError::new("Error al obtener actualización de registros", e))?;
    Ok(Json(trend_distribution(&snapshot)))
}

/// GET /api/v1/dashboard/ranking-entes?limit=N - Entity ranking
async fn get_entity_ranking(
    State(state): State<AppState>,
    Query(params): Query<RankingParams>,
) -> Result<Json<Vec<EntityRanking>>, ApiError> {
    let limit = state.config.clamp_ranking_limit(params.limit);
    let snapshot = load_snapshot(&state)
        .await
        .map_err(|e| ApiError::new("Error al obtener ranking de entes", e))?;
    Ok(Json(rank_entities(&snapshot, limit)))
}

/// GET /api/v1/dashboard/alertas-criticas - Alert list, HIGH first
async fn get_critical_alerts(State(state): State<AppState>) -> Result<Json<Vec<Alert>>, ApiError> {
    let snapshot = load_snapshot(&state)
        .await
        .map_err(|e| ApiError::new("Error al obtener alertas críticas", e))?;
    Ok(Json(generate_alerts(&snapshot)))
}

/// GET /api/v1/dashboard/dashboard-completo - Everything from one snapshot
async fn get_full_dashboard(
    State(state): State<AppState>,
) -> Result<Json<DashboardPayload>, ApiError> {
    let snapshot = load_snapshot(&state)
        .await
        .map_err(|e| ApiError::new("Error al obtener datos del dashboard", e))?;
    Ok(Json(build_dashboard(&snapshot, state.config.default_ranking_limit)))
}

/// GET /api/v1/sistemas - System catalog with display names
async fn get_systems(State(state): State<AppState>) -> Result<Json<Vec<SystemListing>>, ApiError> {
    let snapshot = load_snapshot(&state)
        .await
        .map_err(|e| ApiError::new("Error al obtener catálogo de sistemas", e))?;
    Ok(Json(system_listing(&snapshot)))
}

fn build_router(state: AppState) -> Router {
    let dashboard_routes = Router::new()
        .route("/summary", get(get_summary))
        .route("/distribucion-apis", get(get_api_distribution))
        .route("/disponibilidad-apis", get(get_availability))
        .route("/actualizacion-registros", get(get_record_updates))
        .route("/ranking-entes", get(get_entity_ranking))
        .route("/alertas-criticas", get(get_critical_alerts))
        .route("/dashboard-completo", get(get_full_dashboard));

    let api_routes = Router::new()
        .nest("/dashboard", dashboard_routes)
        .route("/sistemas", get(get_systems));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Main Server
// ============================================================================

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = MonitorConfig::load()?;

    if !config.database_path.exists() {
        bail!(
            "database not found at {} (set {} or database_path in the config file)",
            config.database_path.display(),
            pdn_monitor::config::DB_ENV
        );
    }

    let conn = open_read_only(&config.database_path, config.query_timeout())
        .context("Failed to open database")?;
    info!(path = %config.database_path.display(), "database opened read-only");

    let bind_addr = config.bind_addr.clone();
    let app = build_router(AppState::new(conn, config));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {bind_addr}"))?;

    info!(addr = %bind_addr, version = VERSION, "PDN monitor API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}
