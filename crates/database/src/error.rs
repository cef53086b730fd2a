// In crates/database/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to connect to the database")]
    ConnectionError(#[from] sqlx::Error),
    #[error("Database migration failed: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),
    #[error("Failed to prepare the database file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database operation failed")]
    OperationFailed(sqlx::Error),
    #[error("Corrupt {column} value in database: '{value}'")]
    Corrupt {
        column: &'static str,
        value: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
