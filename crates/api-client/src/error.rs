// In crates/api-client/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(#[from] serde_json::Error),
    #[error("API error: code {code}, msg: {msg}")]
    ApiError { code: i64, msg: String },
    #[error("Rate limited by the market data API")]
    RateLimited,
    #[error("Symbol not available: {0}")]
    SymbolNotFound(String),
    #[error("Malformed {field} in response: '{value}'")]
    MalformedField { field: &'static str, value: String },
    #[error("Time series response contained no bars")]
    EmptySeries,
}

pub type Result<T> = std::result::Result<T, Error>;
