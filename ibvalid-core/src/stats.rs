//! Sample reduction: raw probe timings into per-pair summary statistics.
//!
//! The reduction is a pure function over an immutable sample sequence, so
//! synthetic sequences can exercise it without any real network timing.
//! Units are fixed per metric: latency statistics are microseconds,
//! bandwidth statistics are bytes per second.

use crate::sample::{MetricKind, PairMeasurement, Sample};
use crate::pair::Pair;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Numeric statistics over the successful samples of one pair/metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    /// Value at the configured percentile rank (nearest-rank method).
    /// For latency this is the slow tail; for bandwidth the mirrored
    /// rank is used so it is the slow tail there too.
    pub percentile: f64,
    pub std_dev: f64,
}

/// Reduced view of one [`PairMeasurement`]; immutable once derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// `None` when the pair never completed a single exchange.
    pub stats: Option<SampleStats>,
    pub samples: u32,
    pub failures: u32,
}

impl Summary {
    pub fn is_unreachable(&self) -> bool {
        self.stats.is_none()
    }
}

/// A [`Summary`] tagged with the pair and metric it describes. This is
/// the unit that travels through the gather to the coordinating rank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairSummary {
    pub pair: Pair,
    pub metric: MetricKind,
    pub summary: Summary,
}

/// Reduce one measurement into its summary.
///
/// `percentile_rank` is the percentile to report, e.g. `99.0`.
pub fn summarize(measurement: &PairMeasurement, percentile_rank: f64) -> PairSummary {
    let values: Vec<f64> = measurement
        .samples
        .iter()
        .map(|sample| sample_value(measurement.metric, sample))
        .collect();

    let stats = if values.is_empty() {
        None
    } else {
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let min = *sorted.first().expect("non-empty");
        let max = *sorted.last().expect("non-empty");
        let mean = mean_of(measurement.metric, &measurement.samples, &values);
        // report the slow tail for both metrics: high percentile of
        // latencies, mirrored (low) percentile of rates
        let rank = match measurement.metric {
            MetricKind::Latency => percentile_rank,
            MetricKind::Bandwidth => 100.0 - percentile_rank,
        };
        let percentile = percentile_from_sorted(&sorted, rank);
        let std_dev = std_dev_of(&values, arithmetic_mean(&values));

        Some(SampleStats {
            min,
            mean,
            max,
            percentile,
            std_dev,
        })
    };

    PairSummary {
        pair: measurement.pair,
        metric: measurement.metric,
        summary: Summary {
            stats,
            samples: measurement.samples.len() as u32,
            failures: measurement.failures,
        },
    }
}

/// Reduce a rank's whole measurement set, one summary per measurement.
///
/// Independent per pair and CPU-bound, so the reduction fans out over the
/// rayon thread pool.
pub fn summarize_all(
    measurements: &[PairMeasurement],
    percentile_rank: f64,
) -> Vec<PairSummary> {
    measurements
        .par_iter()
        .map(|measurement| summarize(measurement, percentile_rank))
        .collect()
}

fn sample_value(metric: MetricKind, sample: &Sample) -> f64 {
    match metric {
        // fractional microseconds
        MetricKind::Latency => sample.elapsed.as_secs_f64() * 1e6,
        // bytes per second
        MetricKind::Bandwidth => {
            let secs = sample.elapsed.as_secs_f64();
            if secs <= 0.0 { 0.0 } else { sample.bytes as f64 / secs }
        }
    }
}

/// The mean of a sample set.
///
/// Bandwidth sub-transfers of unequal duration must not be averaged rate
/// by rate (that biases toward short transfers); the aggregate rate is
/// total bytes over total time instead.
fn mean_of(metric: MetricKind, samples: &[Sample], values: &[f64]) -> f64 {
    match metric {
        MetricKind::Latency => arithmetic_mean(values),
        MetricKind::Bandwidth => {
            let total_bytes: u64 = samples.iter().map(|s| s.bytes).sum();
            let total_secs: f64 = samples.iter().map(|s| s.elapsed.as_secs_f64()).sum();
            if total_secs <= 0.0 {
                0.0
            } else {
                total_bytes as f64 / total_secs
            }
        }
    }
}

fn arithmetic_mean(values: &[f64]) -> f64 {
    debug_assert!(!values.is_empty());
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev_of(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}

/// Nearest-rank percentile over an ascending-sorted slice.
fn percentile_from_sorted(sorted: &[f64], rank: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let rank = rank.clamp(0.0, 100.0);
    let position = (rank / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[position.saturating_sub(1).min(sorted.len() - 1)]
}

/// Median of an unsorted value set; `None` when empty.
pub(crate) fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    let mid = n / 2;
    Some(if n % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    })
}
