// In crates/web-server/src/lib.rs

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
    routing::{delete, get, post},
};
use chrono::Utc;
use tokio::net::TcpListener;

use app_config::types::ServerSettings;
use core_types::{LogEntry, Symbol, WatchItem};
use database::Store;
use engine::SchedulerHandle;
use signal::DmaOutcome;

pub mod error;
pub mod types;

// Re-export our custom error type for convenience.
pub use error::{Error, Result};

use types::{
    ChartPoint, DeleteResponse, ForceCheckResponse, LogsParams, StatusResponse, WatchRequest,
    merge_history,
};

/// Header carrying the shared secret for privileged endpoints.
const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// How many bars the chart endpoint returns at most.
const CHART_WINDOW: u32 = 300;

/// Upper bound on `period + displacement`, so one symbol can never demand
/// more history than the store retains.
const MAX_REQUIRED_HISTORY: u32 = 400;

/// The shared application state that is available to all API handlers.
///
/// Everything in it is cheaply cloneable; handlers see the store and the
/// scheduler only through their shared interfaces.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub scheduler: Arc<SchedulerHandle>,
    pub admin_token: String,
}

/// Creates the main application router with all routes and middleware.
///
/// # Arguments
///
/// * `app_state`: The shared `AppState` containing the store and scheduler.
///
/// # Returns
///
/// The configured `axum::Router`.
pub fn create_router(app_state: AppState) -> Router {
    // Allow any origin while the dashboard is served from elsewhere. Tighten
    // this once the frontend has a fixed home.
    let cors = tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    // Define the API sub-router
    let api_router = Router::new()
        .route(
            "/watchlist",
            get(list_watchlist_handler).post(add_watch_handler),
        )
        .route("/watchlist/{symbol}", delete(remove_watch_handler))
        .route("/watchlist/{symbol}/history", get(get_history_handler))
        .route("/logs", get(get_logs_handler))
        .route("/status", get(get_status_handler))
        .route("/force-check", post(force_check_handler));

    // The main router.
    Router::new()
        .route("/health", get(health_check_handler))
        .nest("/api", api_router)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// A simple health check handler.
/// Responds with a 200 OK and a plain body.
async fn health_check_handler() -> &'static str {
    "OK"
}

/// Handler for `GET /api/watchlist`.
/// Returns every tracked symbol with its configuration and bookkeeping.
async fn list_watchlist_handler(State(state): State<AppState>) -> Result<Json<Vec<WatchItem>>> {
    Ok(Json(state.store.tracked_symbols().await?))
}

/// Handler for `POST /api/watchlist`.
/// Validates the request, then inserts or reconfigures the symbol. A
/// reconfigure keeps the symbol's stored history and alert state.
async fn add_watch_handler(
    State(state): State<AppState>,
    Json(req): Json<WatchRequest>,
) -> Result<Json<WatchItem>> {
    let symbol = Symbol::parse(&req.symbol).map_err(|e| Error::BadRequest(e.to_string()))?;
    if req.dma_period == 0 {
        return Err(Error::BadRequest(
            "dma_period must be at least 1".to_string(),
        ));
    }
    if req.dma_period as u64 + req.displacement as u64 > MAX_REQUIRED_HISTORY as u64 {
        return Err(Error::BadRequest(format!(
            "dma_period + displacement must not exceed {MAX_REQUIRED_HISTORY}"
        )));
    }
    if !req.alert_threshold_pct.is_finite() || req.alert_threshold_pct < 0.0 {
        return Err(Error::BadRequest(
            "alert_threshold_pct must be zero or a positive number".to_string(),
        ));
    }

    let item = WatchItem {
        symbol,
        dma_period: req.dma_period,
        displacement: req.displacement,
        alert_threshold_pct: req.alert_threshold_pct,
        enabled: req.enabled,
        last_price: None,
        last_checked: None,
        created_at: Utc::now(),
    };
    let stored = state.store.upsert_watch(&item).await?;
    tracing::info!(symbol = %stored.symbol, period = stored.dma_period, "watchlist updated");
    Ok(Json(stored))
}

/// Handler for `DELETE /api/watchlist/{symbol}`.
/// Drops the symbol along with its price history and alert state. The
/// activity log keeps its lines as an audit trail.
async fn remove_watch_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let symbol = Symbol::parse(&raw).map_err(|e| Error::BadRequest(e.to_string()))?;
    let removed = state.store.remove_watch(&symbol).await?;
    if !removed {
        return Err(Error::NotFound(format!("{symbol} is not tracked")));
    }
    tracing::info!(%symbol, "symbol removed from watchlist");
    Ok(Json(DeleteResponse { removed }))
}

/// Handler for `GET /api/watchlist/{symbol}/history`.
/// Returns the stored price bars with the displaced average zipped in, ready
/// for charting.
async fn get_history_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<Vec<ChartPoint>>> {
    let symbol = Symbol::parse(&raw).map_err(|e| Error::BadRequest(e.to_string()))?;
    let item = state
        .store
        .watch_item(&symbol)
        .await?
        .ok_or_else(|| Error::NotFound(format!("{symbol} is not tracked")))?;

    let history = state.store.price_history(&symbol, CHART_WINDOW).await?;
    let dma = match signal::compute(&history, item.dma_period, item.displacement)? {
        DmaOutcome::Series(points) => points,
        DmaOutcome::InsufficientHistory { .. } => Vec::new(),
    };
    Ok(Json(merge_history(&history, &dma)))
}

/// Handler for `GET /api/logs`.
/// Returns the newest activity log lines, newest first.
async fn get_logs_handler(
    State(state): State<AppState>,
    Query(params): Query<LogsParams>,
) -> Result<Json<Vec<LogEntry>>> {
    Ok(Json(state.store.recent_logs(params.limit).await?))
}

/// Handler for `GET /api/status`.
/// One call for the dashboard: scheduler counters plus a row per symbol.
async fn get_status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    let symbols = state.store.status().await?;
    Ok(Json(StatusResponse {
        scheduler: state.scheduler.snapshot(),
        symbols,
    }))
}

/// Handler for `POST /api/force-check`.
/// Kicks off a monitor cycle outside the schedule. Requests made while a
/// cycle is running coalesce into a single follow-up cycle.
async fn force_check_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ForceCheckResponse>> {
    let token = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    if token != Some(state.admin_token.as_str()) {
        tracing::warn!("force-check rejected: bad admin token");
        return Err(Error::Forbidden);
    }

    let outcome = state.scheduler.force_check();
    tracing::info!(?outcome, "force-check accepted");
    Ok(Json(ForceCheckResponse { outcome }))
}

/// The main entry point for running the web server.
///
/// This function sets up the TCP listener and serves the application router.
/// It will run until the process is terminated.
pub async fn run(settings: ServerSettings, app_state: AppState) -> Result<()> {
    let app = create_router(app_state);

    let address = format!("{}:{}", settings.host, settings.port);
    tracing::info!("web server listening on {}", address);

    let listener = TcpListener::bind(&address)
        .await
        .map_err(Error::ServerBind)?;
    axum::serve(listener, app.into_make_service())
        .await
        .map_err(Error::ServerBind)?;

    Ok(())
}
