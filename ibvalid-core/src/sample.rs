use crate::pair::Pair;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// The quantity a probe measures over a pair.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// One-way latency, estimated from ping-pong round trips. Unit: µs.
    Latency,
    /// Sustained transfer rate. Unit: bytes/sec.
    Bandwidth,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latency => write!(f, "latency"),
            Self::Bandwidth => write!(f, "bandwidth"),
        }
    }
}

/// One raw timed exchange: how many bytes moved, and how long it took.
///
/// Timings come from monotonic clocks only; wall-clock adjustments during
/// a long run must not skew samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl Sample {
    pub const fn new(bytes: u64, elapsed: Duration) -> Self {
        Self { bytes, elapsed }
    }
}

/// The raw outcome of probing one `(pair, metric)` combination.
///
/// Owned exclusively by the rank that initiated the exchanges; immutable
/// once the probe round completes. Exchanges that timed out or lost their
/// peer are not numeric samples, they only increment `failures`.
#[derive(Debug, Clone)]
pub struct PairMeasurement {
    pub pair: Pair,
    pub metric: MetricKind,
    pub samples: Vec<Sample>,
    pub failures: u32,
}

impl PairMeasurement {
    pub fn new(pair: Pair, metric: MetricKind) -> Self {
        Self {
            pair,
            metric,
            samples: Vec::new(),
            failures: 0,
        }
    }

    /// The pair could not be measured at all: every attempted exchange
    /// failed, or the first failure aborted the probe loop.
    pub fn is_unreachable(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::Rank;

    #[test]
    fn unreachable_without_samples() {
        let mut m = PairMeasurement::new(
            Pair::new(Rank::ZERO, Rank::ONE),
            MetricKind::Latency,
        );
        assert!(m.is_unreachable());

        m.samples.push(Sample::new(8, Duration::from_micros(3)));
        assert!(!m.is_unreachable());
    }

    #[test]
    fn metric_display() {
        assert_eq!(MetricKind::Latency.to_string(), "latency");
        assert_eq!(MetricKind::Bandwidth.to_string(), "bandwidth");
    }
}
