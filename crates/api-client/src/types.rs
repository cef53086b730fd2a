// In crates/api-client/src/types.rs

use reqwest::Client;
use serde::Deserialize;

/// The main client for the Twelve Data REST API.
#[derive(Debug, Clone)]
pub struct TwelveDataClient {
    /// The persistent HTTP client.
    pub http_client: Client,
    /// The user's Twelve Data API key.
    pub api_key: String,
    /// The REST base URL for Twelve Data.
    pub base_url: String,
    /// Bar interval requested from the time series endpoint (e.g. "1day").
    pub interval: String,
}

/// Shape of a successful `/time_series` response. `values` arrives newest
/// first; only the fields we consume are declared.
#[derive(Debug, Deserialize)]
pub struct TimeSeriesResponse {
    pub values: Vec<RawBar>,
}

/// A single bar as Twelve Data returns it. Every numeric field is a string
/// on the wire.
#[derive(Debug, Deserialize)]
pub struct RawBar {
    pub datetime: String,
    pub close: String,
}

/// Shape of a Twelve Data error payload. Errors come back with HTTP 200 and
/// `status: "error"`, so this is probed before the happy path.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub message: String,
    pub status: String,
}
