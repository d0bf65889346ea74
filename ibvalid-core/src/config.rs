//! The run configuration handed over by the external CLI layer.
//!
//! Parsing command lines or config files is not this crate's concern;
//! whatever does it produces a [`ValidationConfig`] (deserializable, so
//! a TOML/JSON file maps straight onto it) and every rank receives the
//! same value. [`ValidationConfig::validate`] runs before any traffic:
//! a malformed configuration must abort identically on all ranks, never
//! leave some of them waiting at a barrier the others abandoned.

use crate::{
    defaults,
    pair::Pair,
    probe::ProbeConfig,
    report::ReportFormat,
    sample::MetricKind,
    schedule::Schedule,
    threshold::{Limit, Threshold},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Rejected configurations. All of these are fatal before any
/// measurement starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no metrics requested")]
    NoMetrics,

    #[error("metric {0} requested twice")]
    DuplicateMetric(MetricKind),

    #[error("latency probe needs at least one retained sample")]
    NoLatencySamples,

    #[error("bandwidth probe needs at least one transfer")]
    NoBandwidthTransfers,

    #[error("bandwidth payload must not be empty")]
    EmptyBandwidthPayload,

    #[error("per-call timeout must be non-zero")]
    ZeroTimeout,

    #[error("percentile {0} out of range (0, 100]")]
    PercentileOutOfRange(f64),

    #[error("more than one threshold configured for {0}")]
    DuplicateThreshold(MetricKind),

    #[error("threshold for {metric}: {reason}")]
    MalformedThreshold { metric: MetricKind, reason: String },
}

/// Everything one validation pass needs to know.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Which pairs to measure.
    pub schedule: Schedule,
    /// Which metrics to measure over each pair.
    pub metrics: Vec<MetricKind>,
    pub probe: ProbeConfig,
    /// Bound on every blocking transport call.
    pub timeout: Duration,
    /// Percentile rank reported in summaries.
    pub percentile: f64,
    pub thresholds: Vec<Threshold>,
    /// Whether dead pairs join the median population of relative
    /// thresholds (as zero bandwidth / infinite latency).
    pub median_includes_unreachable: bool,
    pub format: ReportFormat,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            schedule: Schedule::default(),
            metrics: vec![MetricKind::Latency, MetricKind::Bandwidth],
            probe: ProbeConfig::default(),
            timeout: defaults::DEFAULT_TIMEOUT,
            percentile: defaults::DEFAULT_PERCENTILE,
            thresholds: Vec::new(),
            median_includes_unreachable: false,
            format: ReportFormat::default(),
        }
    }
}

impl ValidationConfig {
    /// Reject configurations that would corrupt the run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metrics.is_empty() {
            return Err(ConfigError::NoMetrics);
        }
        for (i, metric) in self.metrics.iter().enumerate() {
            if self.metrics[..i].contains(metric) {
                return Err(ConfigError::DuplicateMetric(*metric));
            }
        }

        if self.metrics.contains(&MetricKind::Latency) && self.probe.latency_samples == 0 {
            return Err(ConfigError::NoLatencySamples);
        }
        if self.metrics.contains(&MetricKind::Bandwidth) {
            if self.probe.bandwidth_transfers == 0 {
                return Err(ConfigError::NoBandwidthTransfers);
            }
            if self.probe.bandwidth_payload == 0 {
                return Err(ConfigError::EmptyBandwidthPayload);
            }
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if !(self.percentile > 0.0 && self.percentile <= 100.0) {
            return Err(ConfigError::PercentileOutOfRange(self.percentile));
        }

        for (i, threshold) in self.thresholds.iter().enumerate() {
            if self.thresholds[..i].iter().any(|t| t.metric == threshold.metric) {
                return Err(ConfigError::DuplicateThreshold(threshold.metric));
            }
            check_threshold(threshold)?;
        }

        Ok(())
    }

    /// The full set of `(pair, metric)` combinations this configuration
    /// schedules on a fabric of `size` ranks. This is what the gathered
    /// matrix is held against.
    pub fn expected_entries(&self, size: u32) -> Vec<(Pair, MetricKind)> {
        let pairs = self.schedule.pairs(size);
        self.metrics
            .iter()
            .flat_map(|metric| pairs.iter().map(move |pair| (*pair, *metric)))
            .collect()
    }
}

fn check_threshold(threshold: &Threshold) -> Result<(), ConfigError> {
    let fail = |reason: &str| ConfigError::MalformedThreshold {
        metric: threshold.metric,
        reason: reason.to_owned(),
    };

    match threshold.limit {
        Limit::Absolute(value) => {
            if !value.is_finite() || value < 0.0 {
                return Err(fail("absolute target must be finite and non-negative"));
            }
        }
        Limit::OfMedian(fraction) => {
            if !fraction.is_finite() || fraction <= 0.0 {
                return Err(fail("median fraction must be finite and positive"));
            }
        }
    }

    if !threshold.tolerance.is_finite() || threshold.tolerance < 0.0 {
        return Err(fail("tolerance must be finite and non-negative"));
    }
    if threshold.metric == MetricKind::Bandwidth && threshold.tolerance >= 1.0 {
        // 1.0 would put the fail limit at zero: everything degraded
        return Err(fail("bandwidth tolerance must be below 1.0"));
    }

    Ok(())
}
