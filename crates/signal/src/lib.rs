// In crates/signal/src/lib.rs

//! Pure calculation layer: displaced moving averages and the alert
//! evaluation rules built on top of them. Nothing in here talks to the
//! network or the database, which keeps every rule unit-testable.

pub mod dma;
pub mod error;
pub mod evaluator;

pub use dma::{DmaOutcome, compute};
pub use error::{Error, Result};
pub use evaluator::{Evaluation, evaluate};
