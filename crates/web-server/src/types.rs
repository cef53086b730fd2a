// In crates/web-server/src/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_types::{DmaPoint, PricePoint};
use database::SymbolStatus;
use engine::{SchedulerSnapshot, TriggerOutcome};

/// Body of `POST /api/watchlist`: track a new symbol or reconfigure an
/// existing one.
#[derive(Debug, Deserialize)]
pub struct WatchRequest {
    pub symbol: String,
    pub dma_period: u32,
    #[serde(default)]
    pub displacement: u32,
    #[serde(default)]
    pub alert_threshold_pct: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// One chart row: a price bar plus the displaced average aligned to the
/// same bar, once enough history exists for it.
#[derive(Debug, Serialize)]
pub struct ChartPoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub dma: Option<f64>,
}

/// Query parameters for `GET /api/logs` (e.g. ?limit=100).
#[derive(Debug, Deserialize)]
pub struct LogsParams {
    #[serde(default = "default_log_limit")]
    pub limit: u32,
}

#[derive(Debug, Serialize)]
pub struct ForceCheckResponse {
    pub outcome: TriggerOutcome,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub removed: bool,
}

/// Response of `GET /api/status`: scheduler counters plus one row per
/// tracked symbol.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub scheduler: SchedulerSnapshot,
    pub symbols: Vec<SymbolStatus>,
}

// Helper functions for serde defaults.
fn default_enabled() -> bool {
    true
}
fn default_log_limit() -> u32 {
    50
}

/// Zips price history with its displaced average series, aligning each
/// average value to the bar it applies to. Bars older than the first
/// average value carry `None`.
pub(crate) fn merge_history(prices: &[PricePoint], dma: &[DmaPoint]) -> Vec<ChartPoint> {
    let offset = prices.len().saturating_sub(dma.len());
    prices
        .iter()
        .enumerate()
        .map(|(i, point)| ChartPoint {
            timestamp: point.timestamp,
            price: point.price,
            dma: i.checked_sub(offset).map(|j| dma[j].value),
        })
        .collect()
}
