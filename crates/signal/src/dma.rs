// In crates/signal/src/dma.rs

use core_types::{DmaPoint, PricePoint};

use crate::error::{Error, Result};

/// Outcome of a displaced moving average computation.
///
/// Too little history is an expected state for freshly added symbols, not an
/// error, so it gets its own variant instead of an `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum DmaOutcome {
    /// One point per price bar starting at the first bar with a full,
    /// displaced window behind it.
    Series(Vec<DmaPoint>),
    InsufficientHistory { required: u32, available: u32 },
}

/// Computes the displaced moving average over a price series.
///
/// The series must be ordered oldest first. The value aligned to bar `t` is
/// the arithmetic mean of the `period` prices ending `displacement` bars
/// before `t`, so the first computable bar is index `period + displacement - 1`
/// and the result always holds `len - period - displacement + 1` points.
///
/// # Arguments
/// * `series` - close prices, oldest first.
/// * `period` - averaging window in bars, at least 1.
/// * `displacement` - how many bars back the window is shifted.
pub fn compute(series: &[PricePoint], period: u32, displacement: u32) -> Result<DmaOutcome> {
    if period == 0 {
        return Err(Error::InvalidPeriod);
    }
    let period = period as usize;
    let displacement = displacement as usize;
    let required = period + displacement;
    if series.len() < required {
        return Ok(DmaOutcome::InsufficientHistory {
            required: required as u32,
            available: series.len() as u32,
        });
    }

    let mut points = Vec::with_capacity(series.len() - required + 1);

    // Seed the window with the oldest `period` prices, then roll it forward
    // one bar at a time instead of re-summing the whole window.
    let mut sum: f64 = series[..period].iter().map(|p| p.price).sum();
    points.push(DmaPoint {
        timestamp: series[required - 1].timestamp,
        value: sum / period as f64,
    });
    for t in required..series.len() {
        sum += series[t - displacement].price - series[t - displacement - period].price;
        points.push(DmaPoint {
            timestamp: series[t].timestamp,
            value: sum / period as f64,
        });
    }

    Ok(DmaOutcome::Series(points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn bar(day: u32, price: f64) -> PricePoint {
        let timestamp: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
        PricePoint { timestamp, price }
    }

    fn series(prices: &[f64]) -> Vec<PricePoint> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &p)| bar(i as u32 + 1, p))
            .collect()
    }

    #[test]
    fn zero_period_is_rejected() {
        let prices = series(&[1.0, 2.0, 3.0]);
        assert!(matches!(compute(&prices, 0, 0), Err(Error::InvalidPeriod)));
    }

    #[test]
    fn short_history_reports_requirements() {
        let prices = series(&[10.0, 11.0]);
        let outcome = compute(&prices, 3, 2).unwrap();
        assert_eq!(
            outcome,
            DmaOutcome::InsufficientHistory {
                required: 5,
                available: 2
            }
        );
    }

    #[test]
    fn empty_series_is_just_short_history() {
        let outcome = compute(&[], 3, 0).unwrap();
        assert_eq!(
            outcome,
            DmaOutcome::InsufficientHistory {
                required: 3,
                available: 0
            }
        );
    }

    #[test]
    fn output_length_matches_series_length() {
        let prices = series(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        for (period, displacement) in [(1u32, 0u32), (3, 0), (3, 2), (5, 3), (8, 0)] {
            let outcome = compute(&prices, period, displacement).unwrap();
            let DmaOutcome::Series(points) = outcome else {
                panic!("expected a series for period={period} displacement={displacement}");
            };
            let expected = prices.len() - (period + displacement) as usize + 1;
            assert_eq!(points.len(), expected);
        }
    }

    #[test]
    fn constant_series_yields_constant_average() {
        let prices = series(&[42.0; 10]);
        let DmaOutcome::Series(points) = compute(&prices, 4, 3).unwrap() else {
            panic!("expected a series");
        };
        assert_eq!(points.len(), 4);
        for point in points {
            assert_eq!(point.value, 42.0);
        }
    }

    #[test]
    fn displacement_shifts_the_window_back() {
        let prices = series(&[1.0, 2.0, 3.0, 4.0]);
        let DmaOutcome::Series(points) = compute(&prices, 2, 1).unwrap() else {
            panic!("expected a series");
        };
        // Window for bar t covers the two prices ending one bar earlier.
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].value, 1.5);
        assert_eq!(points[0].timestamp, prices[2].timestamp);
        assert_eq!(points[1].value, 2.5);
        assert_eq!(points[1].timestamp, prices[3].timestamp);
    }

    #[test]
    fn rolling_sum_matches_naive_mean() {
        let raw = [9.5, 10.25, 11.0, 10.5, 9.75, 12.0, 8.25, 10.0, 11.5, 9.0];
        let prices = series(&raw);
        let (period, displacement) = (4usize, 2usize);
        let DmaOutcome::Series(points) = compute(&prices, period as u32, displacement as u32)
            .unwrap()
        else {
            panic!("expected a series");
        };
        for (i, point) in points.iter().enumerate() {
            let t = i + period + displacement - 1;
            let window = &raw[t + 1 - period - displacement..=t - displacement];
            let naive: f64 = window.iter().sum::<f64>() / period as f64;
            assert!(
                (point.value - naive).abs() < 1e-9,
                "bar {t}: rolling {} vs naive {naive}",
                point.value
            );
        }
    }
}
