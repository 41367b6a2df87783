//! Windowed aggregates over a signal track.

use crate::config::Statistic;
use crate::data_handling::SignalSource;
use crate::error::SignalError;

/// Reduce per-base values to one statistic. `NaN` bases carry no data and are
/// skipped; a window with no data at all aggregates to 0.0.
pub fn aggregate(values: &[f32], stat: Statistic) -> f64 {
    let called: Vec<f64> = values
        .iter()
        .filter(|v| !v.is_nan())
        .map(|&v| v as f64)
        .collect();

    match stat {
        Statistic::Coverage if values.is_empty() => 0.0,
        Statistic::Coverage => called.len() as f64 / values.len() as f64,
        _ if called.is_empty() => 0.0,
        Statistic::Mean => called.iter().sum::<f64>() / called.len() as f64,
        Statistic::Sum => called.iter().sum(),
        Statistic::Max => called.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Statistic::Min => called.iter().copied().fold(f64::INFINITY, f64::min),
    }
}

/// Query `[start - extension, end + extension)` and reduce it to each statistic, in order.
pub fn window_statistics(
    track: &dyn SignalSource,
    chrom: &str,
    start: u64,
    end: u64,
    extension: u64,
    statistics: &[Statistic],
    out: &mut Vec<f64>,
) -> Result<(), SignalError> {
    let lo = start as i64 - extension as i64;
    let hi = end as i64 + extension as i64;
    let values = track.query(chrom, lo, hi)?;
    for &stat in statistics {
        out.push(aggregate(&values, stat));
    }
    Ok(())
}
