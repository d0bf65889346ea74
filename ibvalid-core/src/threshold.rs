//! Classification of the gathered matrix against configured expectations.
//!
//! Limits are either absolute values or fractions of the run's own
//! median (to catch a node whose links are uniformly worse than its
//! peers without hard-coded expectations). The relative form can only be
//! resolved once the full matrix is gathered.

use crate::{
    matrix::GlobalMatrix,
    measure::{Bandwidth, Latency},
    pair::Pair,
    sample::MetricKind,
    stats,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a threshold's target value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Limit {
    /// A fixed value in the metric's unit (bytes/sec or µs).
    Absolute(f64),
    /// A fraction of the per-metric median of this run. Below `1.0`
    /// for bandwidth (e.g. `0.8`: within 80% of the median), above
    /// `1.0` for latency (e.g. `1.25`: no more than 125% of it).
    OfMedian(f64),
}

/// One expectation to hold the matrix against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub metric: MetricKind,
    pub limit: Limit,
    /// Fractional band past the target that is degraded rather than
    /// failed. `0.0` means any violation is a failure.
    #[serde(default)]
    pub tolerance: f64,
}

impl Threshold {
    pub const fn absolute(metric: MetricKind, target: f64, tolerance: f64) -> Self {
        Self {
            metric,
            limit: Limit::Absolute(target),
            tolerance,
        }
    }

    pub const fn of_median(metric: MetricKind, fraction: f64, tolerance: f64) -> Self {
        Self {
            metric,
            limit: Limit::OfMedian(fraction),
            tolerance,
        }
    }

    /// Expect at least this rate over every measured pair.
    pub fn min_bandwidth(bandwidth: Bandwidth, tolerance: f64) -> Self {
        Self::absolute(MetricKind::Bandwidth, bandwidth.as_f64(), tolerance)
    }

    /// Expect at most this one-way latency over every measured pair.
    pub fn max_latency(latency: Latency, tolerance: f64) -> Self {
        Self::absolute(MetricKind::Latency, latency.as_micros_f64(), tolerance)
    }
}

/// How one measured pair relates to its threshold.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Pass,
    /// Past the target but inside the tolerance band. Surfaced as a
    /// warning, does not fail the run.
    Degraded,
    Fail,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Degraded => write!(f, "DEGRADED"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// The classification of one `(pair, metric)` entry; immutable once
/// produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub pair: Pair,
    pub metric: MetricKind,
    /// Mean measured value, `None` for unreachable pairs.
    pub measured: Option<f64>,
    /// The resolved target the pair was held against.
    pub target: f64,
    pub outcome: Outcome,
}

/// Classify every matrix entry covered by a threshold.
///
/// Entries whose metric has no threshold get no verdict (they are still
/// reported, just not judged). Unreachable pairs and pairs that lost
/// their peer mid-probe are failures regardless of any measured value.
///
/// `median_includes_unreachable` controls whether dead pairs join the
/// median population of relative limits (as zero bandwidth or infinite
/// latency).
pub fn validate(
    matrix: &GlobalMatrix,
    thresholds: &[Threshold],
    median_includes_unreachable: bool,
) -> Vec<Verdict> {
    let mut verdicts = Vec::new();

    for threshold in thresholds {
        let target = resolve_target(matrix, threshold, median_includes_unreachable);

        for (pair, summary) in matrix.of_metric(threshold.metric) {
            let measured = summary.stats.map(|stats| stats.mean);
            let outcome = match measured {
                // a pair that dropped exchanges is not healthy even if
                // the surviving samples look fine
                Some(_) if summary.failures > 0 => Outcome::Fail,
                Some(value) => classify(threshold.metric, value, target, threshold.tolerance),
                None => Outcome::Fail,
            };
            verdicts.push(Verdict {
                pair,
                metric: threshold.metric,
                measured,
                target,
                outcome,
            });
        }
    }

    verdicts
}

fn resolve_target(
    matrix: &GlobalMatrix,
    threshold: &Threshold,
    median_includes_unreachable: bool,
) -> f64 {
    match threshold.limit {
        Limit::Absolute(value) => value,
        Limit::OfMedian(fraction) => {
            let population: Vec<f64> = matrix
                .of_metric(threshold.metric)
                .filter_map(|(_, summary)| match summary.stats {
                    Some(stats) => Some(stats.mean),
                    None if median_includes_unreachable => {
                        Some(match threshold.metric {
                            MetricKind::Bandwidth => 0.0,
                            MetricKind::Latency => f64::INFINITY,
                        })
                    }
                    None => None,
                })
                .collect();
            stats::median(population).map_or(f64::NAN, |median| median * fraction)
        }
    }
}

/// Boundary inclusive on the healthy side: a value exactly at the target
/// passes; exactly at the tolerance edge is degraded, not failed.
fn classify(metric: MetricKind, measured: f64, target: f64, tolerance: f64) -> Outcome {
    if target.is_nan() {
        // relative limit over an empty population: nothing to judge
        // against, and no reachable pair can exist either
        return Outcome::Fail;
    }
    match metric {
        MetricKind::Bandwidth => {
            if measured >= target {
                Outcome::Pass
            } else if measured >= target * (1.0 - tolerance) {
                Outcome::Degraded
            } else {
                Outcome::Fail
            }
        }
        MetricKind::Latency => {
            if measured <= target {
                Outcome::Pass
            } else if measured <= target * (1.0 + tolerance) {
                Outcome::Degraded
            } else {
                Outcome::Fail
            }
        }
    }
}
