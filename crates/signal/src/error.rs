// In crates/signal/src/error.rs

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("moving average period must be at least 1")]
    InvalidPeriod,
}
