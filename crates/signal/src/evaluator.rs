// In crates/signal/src/evaluator.rs

use chrono::{DateTime, Utc};
use core_types::{AlertState, Direction, WatchItem};

/// What a single evaluation of the newest bar decided.
///
/// Variants that change persisted state carry the replacement [`AlertState`]
/// so the caller stores exactly what was decided here.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// The price moved to the other side of the average and cleared the
    /// noise threshold: send an alert.
    Trigger {
        direction: Direction,
        state: AlertState,
    },
    /// The side changed but the price is still inside the threshold band
    /// around the average. The new side is recorded without alerting, so a
    /// later widening of the same move stays silent.
    WeakCross {
        direction: Direction,
        state: AlertState,
    },
    /// The price landed exactly on the average. Recorded once; the previous
    /// alert timestamp is kept.
    WentFlat { state: AlertState },
    /// Same side as the previous evaluation. Nothing to store.
    NoChange,
}

/// Evaluates the newest price against its displaced moving average.
///
/// An alert fires only on a transition: the computed side differs from
/// `state.last_direction` and is an actual side, not [`Direction::None`].
/// Repeated evaluations on the same side are idempotent.
pub fn evaluate(
    item: &WatchItem,
    price: f64,
    dma: f64,
    state: &AlertState,
    now: DateTime<Utc>,
) -> Evaluation {
    let direction = Direction::of(price, dma);
    if direction == state.last_direction {
        return Evaluation::NoChange;
    }

    match direction {
        Direction::None => Evaluation::WentFlat {
            state: AlertState {
                last_direction: Direction::None,
                last_alert_at: state.last_alert_at,
            },
        },
        _ if too_weak(price, dma, item.alert_threshold_pct) => Evaluation::WeakCross {
            direction,
            state: AlertState {
                last_direction: direction,
                last_alert_at: state.last_alert_at,
            },
        },
        _ => Evaluation::Trigger {
            direction,
            state: AlertState {
                last_direction: direction,
                last_alert_at: Some(now),
            },
        },
    }
}

/// A cross is too weak when the price sits closer to the average than the
/// configured percentage. A non-positive threshold disables the filter, as
/// does a non-positive average (the ratio would be meaningless).
fn too_weak(price: f64, dma: f64, threshold_pct: f64) -> bool {
    if threshold_pct <= 0.0 || dma <= 0.0 {
        return false;
    }
    let distance_pct = ((price - dma).abs() / dma) * 100.0;
    distance_pct < threshold_pct
}
