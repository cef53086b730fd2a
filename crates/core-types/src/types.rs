// In crates/core-types/src/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// A validated, canonical ticker symbol such as `AAPL` or `BRK.B`.
///
/// Symbols are always stored uppercase so that lookups, deduplication and
/// database keys agree no matter how the caller spelled them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub const MAX_LEN: usize = 12;

    /// Parses and canonicalizes a raw ticker string.
    ///
    /// Leading and trailing whitespace is stripped and the remainder is
    /// uppercased. Only ASCII alphanumerics plus `.` and `-` are accepted,
    /// between 1 and [`Symbol::MAX_LEN`] characters.
    pub fn parse(raw: &str) -> Result<Self> {
        let canonical = raw.trim().to_ascii_uppercase();
        if canonical.is_empty() || canonical.len() > Self::MAX_LEN {
            return Err(Error::InvalidSymbol(raw.to_string()));
        }
        let valid = canonical
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
        if !valid {
            return Err(Error::InvalidSymbol(raw.to_string()));
        }
        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Symbol {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single close-price observation for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// One evaluated point of a displaced moving average series, aligned to the
/// timestamp of the price bar it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DmaPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Which side of its displaced moving average a price currently sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
    /// Price exactly on the average, or never evaluated.
    #[default]
    None,
}

impl Direction {
    /// Classifies a price against an average value. Exact equality maps to
    /// [`Direction::None`] so a touch never counts as a cross.
    pub fn of(price: f64, dma: f64) -> Self {
        if price > dma {
            Direction::Above
        } else if price < dma {
            Direction::Below
        } else {
            Direction::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Above => "above",
            Direction::Below => "below",
            Direction::None => "none",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "above" => Some(Direction::Above),
            "below" => Some(Direction::Below),
            "none" => Some(Direction::None),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-symbol alert bookkeeping used to deduplicate notifications.
///
/// `last_direction` is the side recorded by the most recent evaluation;
/// `last_alert_at` is only set when an alert actually fired.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AlertState {
    pub last_direction: Direction,
    pub last_alert_at: Option<DateTime<Utc>>,
}

/// A tracked symbol plus the parameters controlling its evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchItem {
    pub symbol: Symbol,
    /// Averaging window in bars.
    pub dma_period: u32,
    /// How many bars back the averaging window is shifted.
    pub displacement: u32,
    /// Minimum distance from the average, as a percentage of the average,
    /// before a cross is considered strong enough to alert on. Zero disables
    /// the filter.
    pub alert_threshold_pct: f64,
    pub enabled: bool,
    pub last_price: Option<f64>,
    pub last_checked: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WatchItem {
    /// Number of stored prices needed before the displaced average has a
    /// value for the newest bar.
    pub fn required_history(&self) -> u32 {
        self.dma_period + self.displacement
    }
}

/// Category of a persisted activity-log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Alert,
    NotifyFailure,
    Info,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Alert => "alert",
            LogKind::NotifyFailure => "notify_failure",
            LogKind::Info => "info",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "alert" => Some(LogKind::Alert),
            "notify_failure" => Some(LogKind::NotifyFailure),
            "info" => Some(LogKind::Info),
            _ => None,
        }
    }
}

/// One line of the persistent activity log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub symbol: Symbol,
    pub kind: LogKind,
    pub message: String,
}

/// Result of the most recent notification attempt for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotifyOutcome {
    pub ok: bool,
    /// Transport error text when `ok` is false.
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}
