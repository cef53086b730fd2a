// In crates/api-client/src/lib.rs

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use app_config::types::TwelveDataSettings;
use core_types::{PricePoint, Symbol};

pub mod error;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use types::TwelveDataClient;

use types::{ApiErrorBody, TimeSeriesResponse};

/// The universal interface for a market data provider.
///
/// The monitoring engine needs exactly two things from a provider: the
/// newest close for a symbol, and a window of recent closes to warm up a
/// freshly added symbol. Everything else stays behind this seam.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetches the most recent close price for a symbol.
    async fn fetch_latest(&self, symbol: &Symbol) -> Result<PricePoint>;

    /// Fetches up to `bars` recent close prices, ordered oldest first.
    async fn fetch_series(&self, symbol: &Symbol, bars: u32) -> Result<Vec<PricePoint>>;
}

impl TwelveDataClient {
    /// Constructs a new TwelveDataClient from TwelveDataSettings.
    pub fn new(settings: &TwelveDataSettings) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(Error::RequestFailed)?;
        Ok(TwelveDataClient {
            http_client,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.clone(),
            interval: settings.interval.clone(),
        })
    }

    /// Calls `GET /time_series` and returns clean price points, oldest first.
    ///
    /// # Arguments
    ///
    /// * `symbol`: The symbol to fetch bars for.
    /// * `outputsize`: How many bars to request, newest backwards.
    async fn time_series(&self, symbol: &Symbol, outputsize: u32) -> Result<Vec<PricePoint>> {
        let url = format!(
            "{}/time_series?symbol={}&interval={}&outputsize={}&apikey={}",
            self.base_url, symbol, self.interval, outputsize, self.api_key
        );
        tracing::debug!(%symbol, outputsize, "requesting time series");

        let body = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(Error::RequestFailed)?
            .text()
            .await
            .map_err(Error::RequestFailed)?;

        parse_time_series(&body)
    }
}

#[async_trait]
impl PriceSource for TwelveDataClient {
    async fn fetch_latest(&self, symbol: &Symbol) -> Result<PricePoint> {
        let mut series = self.time_series(symbol, 1).await?;
        series.pop().ok_or(Error::EmptySeries)
    }

    async fn fetch_series(&self, symbol: &Symbol, bars: u32) -> Result<Vec<PricePoint>> {
        self.time_series(symbol, bars).await
    }
}

/// Parses a raw `/time_series` body.
///
/// Twelve Data reports problems with HTTP 200 and a JSON error object, so
/// the error shape is probed first. Rate limiting (code 429) and unknown
/// symbols get their own variants because the engine treats them differently
/// from generic API failures.
fn parse_time_series(body: &str) -> Result<Vec<PricePoint>> {
    if let Ok(err) = serde_json::from_str::<ApiErrorBody>(body) {
        if err.status == "error" {
            return Err(match err.code {
                429 => Error::RateLimited,
                400 | 404 => Error::SymbolNotFound(err.message),
                code => Error::ApiError {
                    code,
                    msg: err.message,
                },
            });
        }
    }

    let response: TimeSeriesResponse =
        serde_json::from_str(body).map_err(Error::DeserializationFailed)?;

    // Convert the raw bars into our clean, internal PricePoint type.
    let mut points = Vec::with_capacity(response.values.len());
    for bar in response.values {
        let price: f64 = bar.close.parse().map_err(|_| Error::MalformedField {
            field: "close",
            value: bar.close.clone(),
        })?;
        let timestamp = parse_bar_datetime(&bar.datetime)?;
        points.push(PricePoint { timestamp, price });
    }

    // Twelve Data sends newest first; the rest of the system wants oldest first.
    points.reverse();
    Ok(points)
}

/// Daily bars are stamped `YYYY-MM-DD`, intraday bars `YYYY-MM-DD HH:MM:SS`.
/// Both are taken as UTC.
fn parse_bar_datetime(raw: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN)))
        .map_err(|_| Error::MalformedField {
            field: "datetime",
            value: raw.to_string(),
        })?;
    Ok(naive.and_utc())
}
