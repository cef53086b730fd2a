// In crates/database/src/types.rs

use chrono::{DateTime, Utc};
use core_types::{Direction, LogEntry, LogKind, PricePoint, Symbol, WatchItem};
use serde::Serialize;

use crate::error::{Error, Result};

/// Everything the status endpoint reports for one tracked symbol: its
/// configuration joined with the latest check and notification bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolStatus {
    pub symbol: Symbol,
    pub enabled: bool,
    pub dma_period: u32,
    pub displacement: u32,
    pub alert_threshold_pct: f64,
    pub last_price: Option<f64>,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_direction: Direction,
    pub last_alert_at: Option<DateTime<Utc>>,
    pub last_notify_ok: Option<bool>,
    pub last_notify_at: Option<DateTime<Utc>>,
    pub last_notify_error: Option<String>,
}

// --- Row types ---
//
// sqlx's runtime queries hand these back straight from SELECTs; the
// conversion into core types is the one place raw database text gets
// validated.

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct WatchRow {
    pub symbol: String,
    pub dma_period: i64,
    pub displacement: i64,
    pub alert_threshold: f64,
    pub enabled: bool,
    pub last_price: Option<f64>,
    pub last_checked: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WatchRow {
    pub(crate) fn into_item(self) -> Result<WatchItem> {
        let symbol = parse_symbol(self.symbol)?;
        Ok(WatchItem {
            symbol,
            dma_period: to_u32("dma_period", self.dma_period)?,
            displacement: to_u32("displacement", self.displacement)?,
            alert_threshold_pct: self.alert_threshold,
            enabled: self.enabled,
            last_price: self.last_price,
            last_checked: self.last_checked,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PriceRow {
    pub ts: DateTime<Utc>,
    pub price: f64,
}

impl From<PriceRow> for PricePoint {
    fn from(row: PriceRow) -> Self {
        PricePoint {
            timestamp: row.ts,
            price: row.price,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct StateRow {
    pub last_direction: String,
    pub last_alert_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LogRow {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub kind: String,
    pub message: String,
}

impl LogRow {
    pub(crate) fn into_entry(self) -> Result<LogEntry> {
        Ok(LogEntry {
            id: self.id,
            timestamp: self.ts,
            symbol: parse_symbol(self.symbol)?,
            kind: parse_kind(&self.kind)?,
            message: self.message,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct StatusRow {
    pub symbol: String,
    pub enabled: bool,
    pub dma_period: i64,
    pub displacement: i64,
    pub alert_threshold: f64,
    pub last_price: Option<f64>,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_direction: Option<String>,
    pub last_alert_at: Option<DateTime<Utc>>,
    pub last_notify_ok: Option<bool>,
    pub last_notify_at: Option<DateTime<Utc>>,
    pub last_notify_error: Option<String>,
}

impl StatusRow {
    pub(crate) fn into_status(self) -> Result<SymbolStatus> {
        let last_direction = match self.last_direction.as_deref() {
            Some(raw) => parse_direction(raw)?,
            None => Direction::None,
        };
        Ok(SymbolStatus {
            symbol: parse_symbol(self.symbol)?,
            enabled: self.enabled,
            dma_period: to_u32("dma_period", self.dma_period)?,
            displacement: to_u32("displacement", self.displacement)?,
            alert_threshold_pct: self.alert_threshold,
            last_price: self.last_price,
            last_checked: self.last_checked,
            last_direction,
            last_alert_at: self.last_alert_at,
            last_notify_ok: self.last_notify_ok,
            last_notify_at: self.last_notify_at,
            last_notify_error: self.last_notify_error,
        })
    }
}

pub(crate) fn parse_symbol(raw: String) -> Result<Symbol> {
    Symbol::parse(&raw).map_err(|_| Error::Corrupt {
        column: "symbol",
        value: raw,
    })
}

pub(crate) fn parse_direction(raw: &str) -> Result<Direction> {
    Direction::parse(raw).ok_or_else(|| Error::Corrupt {
        column: "last_direction",
        value: raw.to_string(),
    })
}

fn parse_kind(raw: &str) -> Result<LogKind> {
    LogKind::parse(raw).ok_or_else(|| Error::Corrupt {
        column: "kind",
        value: raw.to_string(),
    })
}

fn to_u32(column: &'static str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::Corrupt {
        column,
        value: value.to_string(),
    })
}
