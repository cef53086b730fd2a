// In crates/web-server/src/error.rs

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    BadRequest(String),

    #[error("admin token missing or wrong")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("store operation failed: {0}")]
    Store(#[from] database::Error),

    #[error("signal computation failed: {0}")]
    Signal(#[from] signal::Error),

    #[error("failed to bind server address: {0}")]
    ServerBind(std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            // Internal details stay in the log, not in the response body.
            Error::Store(_) | Error::Signal(_) | Error::ServerBind(_) => {
                tracing::error!(error = %self, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
