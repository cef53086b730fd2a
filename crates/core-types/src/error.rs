// In crates/core-types/src/error.rs

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid symbol '{0}': expected 1-12 ASCII letters, digits, '.' or '-'")]
    InvalidSymbol(String),
}
