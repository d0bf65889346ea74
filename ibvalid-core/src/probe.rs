//! The measurement engine: timed exchanges over scheduled pairs.
//!
//! Latency is estimated from minimal-payload ping-pong round trips (half
//! a round trip per sample); bandwidth from streaming a large payload and
//! dividing bytes by elapsed time. A transport failure is terminal for
//! the pair being probed and non-fatal for the run: it is recorded on the
//! measurement and the engine moves on.

use crate::{
    defaults,
    pair::Pair,
    sample::{MetricKind, PairMeasurement, Sample},
    transport::{ExchangeMode, Transport},
};
use rand_chacha::ChaChaRng;
use rand_core::{Rng as _, SeedableRng as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Knobs of a single probe pass. Must be identical on every rank: the
/// two ends of a pair run matching exchange counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Retained latency samples per pair.
    pub latency_samples: u32,
    /// Warm-up round trips discarded before sampling starts.
    pub warmup: u32,
    /// Latency probe payload size in bytes.
    pub latency_payload: usize,
    /// Bandwidth probe payload size in bytes.
    pub bandwidth_payload: usize,
    /// Streamed transfers per bandwidth probe.
    pub bandwidth_transfers: u32,
    /// Seed for the pseudorandom payload fill.
    pub seed: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            latency_samples: defaults::DEFAULT_LATENCY_SAMPLES,
            warmup: defaults::DEFAULT_WARMUP_SAMPLES,
            latency_payload: defaults::DEFAULT_LATENCY_PAYLOAD,
            bandwidth_payload: defaults::DEFAULT_BANDWIDTH_PAYLOAD,
            bandwidth_transfers: defaults::DEFAULT_BANDWIDTH_TRANSFERS,
            seed: 0,
        }
    }
}

impl ProbeConfig {
    fn iterations(&self, metric: MetricKind) -> u32 {
        match metric {
            MetricKind::Latency => self.warmup + self.latency_samples,
            MetricKind::Bandwidth => self.bandwidth_transfers,
        }
    }

    fn payload_len(&self, metric: MetricKind) -> usize {
        match metric {
            MetricKind::Latency => self.latency_payload,
            MetricKind::Bandwidth => self.bandwidth_payload,
        }
    }

    /// Probe payloads are incompressible on purpose: link-level
    /// compression would otherwise inflate bandwidth numbers. The fill is
    /// seeded per pair so runs stay reproducible.
    fn payload(&self, metric: MetricKind, pair: Pair) -> Vec<u8> {
        let seed = self
            .seed
            .wrapping_add((u64::from(pair.source.index() as u32) << 32))
            .wrapping_add(u64::from(pair.destination.index() as u32));
        let mut rng = ChaChaRng::seed_from_u64(seed);
        let mut payload = vec![0u8; self.payload_len(metric)];
        rng.fill_bytes(&mut payload);
        payload
    }
}

/// Probe one scheduled pair for one metric.
///
/// Returns `Some` on the pair's source rank, which owns the resulting
/// measurement; the destination answers the exchanges and returns `None`,
/// as does any rank the pair does not involve.
pub fn probe_pair<T: Transport + ?Sized>(
    transport: &mut T,
    pair: Pair,
    metric: MetricKind,
    config: &ProbeConfig,
) -> Option<PairMeasurement> {
    let me = transport.rank();
    if me == pair.source {
        Some(initiate(transport, pair, metric, config))
    } else if me == pair.destination {
        respond(transport, pair, metric, config);
        None
    } else {
        None
    }
}

fn initiate<T: Transport + ?Sized>(
    transport: &mut T,
    pair: Pair,
    metric: MetricKind,
    config: &ProbeConfig,
) -> PairMeasurement {
    debug!(%pair, %metric, "probing");

    let payload = config.payload(metric, pair);
    let mode = match metric {
        MetricKind::Latency => ExchangeMode::RoundTrip,
        MetricKind::Bandwidth => ExchangeMode::Push,
    };

    let mut measurement = PairMeasurement::new(pair, metric);
    for iteration in 0..config.iterations(metric) {
        match transport.exchange(pair.destination, &payload, mode) {
            Ok(elapsed) => {
                let sample = match metric {
                    // half a round trip is the one-way estimate
                    MetricKind::Latency => Sample::new(payload.len() as u64, elapsed / 2),
                    MetricKind::Bandwidth => Sample::new(payload.len() as u64, elapsed),
                };
                if metric != MetricKind::Latency || iteration >= config.warmup {
                    measurement.samples.push(sample);
                }
            }
            Err(error) => {
                // terminal for this pair: the remaining exchanges would
                // block on the same dead peer
                warn!(%pair, %metric, %error, "pair unreachable");
                measurement.failures += 1;
                break;
            }
        }
    }
    measurement
}

fn respond<T: Transport + ?Sized>(
    transport: &mut T,
    pair: Pair,
    metric: MetricKind,
    config: &ProbeConfig,
) {
    let expected = vec![0u8; config.payload_len(metric)];
    let mode = match metric {
        MetricKind::Latency => ExchangeMode::Echo,
        MetricKind::Bandwidth => ExchangeMode::Pull,
    };

    for _ in 0..config.iterations(metric) {
        if let Err(error) = transport.exchange(pair.source, &expected, mode) {
            // the initiator records the failure; our side just stops
            debug!(%pair, %metric, %error, "responder stopping");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        measure::Bandwidth,
        rank::Rank,
        transport::{FabricProfile, FixedFabric},
    };
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn small_config() -> ProbeConfig {
        ProbeConfig {
            latency_samples: 10,
            warmup: 2,
            latency_payload: 8,
            bandwidth_payload: 1_000,
            bandwidth_transfers: 4,
            seed: 0,
        }
    }

    #[test]
    fn latency_samples_are_halved_round_trips() {
        let profile = FabricProfile::uniform(Duration::from_micros(5), None);
        let mut cluster = FixedFabric::cluster(2, profile, TIMEOUT);
        let mut zero = cluster.remove(0);

        let pair = Pair::new(Rank::ZERO, Rank::ONE);
        let measurement = probe_pair(&mut zero, pair, MetricKind::Latency, &small_config())
            .expect("source rank owns the measurement");

        assert_eq!(measurement.samples.len(), 10); // warm-up discarded
        for sample in &measurement.samples {
            assert_eq!(sample.elapsed, Duration::from_micros(5));
        }
        assert_eq!(measurement.failures, 0);
    }

    #[test]
    fn bandwidth_samples_carry_payload_size() {
        let profile = FabricProfile::uniform(
            Duration::ZERO,
            Some(Bandwidth::from_bytes_per_sec(1_000_000)),
        );
        let mut cluster = FixedFabric::cluster(2, profile, TIMEOUT);
        let mut zero = cluster.remove(0);

        let config = small_config();
        let pair = Pair::new(Rank::ZERO, Rank::ONE);
        let measurement = probe_pair(&mut zero, pair, MetricKind::Bandwidth, &config).unwrap();

        assert_eq!(measurement.samples.len(), 4);
        for sample in &measurement.samples {
            assert_eq!(sample.bytes, 1_000);
            // 1000 bytes at 1 MB/s
            assert!((sample.elapsed.as_secs_f64() - 0.001).abs() < 1e-9);
        }
    }

    #[test]
    fn faulted_pair_is_unreachable_not_fatal() {
        let mut profile = FabricProfile::uniform(Duration::from_micros(5), None);
        profile.fail_link(Rank::ZERO, Rank::ONE);
        let mut cluster = FixedFabric::cluster(2, profile, TIMEOUT);
        let mut zero = cluster.remove(0);

        let pair = Pair::new(Rank::ZERO, Rank::ONE);
        let measurement = probe_pair(&mut zero, pair, MetricKind::Latency, &small_config())
            .unwrap();

        assert!(measurement.is_unreachable());
        assert_eq!(measurement.failures, 1);
    }

    #[test]
    fn uninvolved_rank_returns_none() {
        let profile = FabricProfile::uniform(Duration::from_micros(5), None);
        let mut cluster = FixedFabric::cluster(3, profile, TIMEOUT);
        let mut two = cluster.remove(2);

        let pair = Pair::new(Rank::ZERO, Rank::ONE);
        assert!(probe_pair(&mut two, pair, MetricKind::Latency, &small_config()).is_none());
    }

    #[test]
    fn payload_fill_is_deterministic() {
        let config = small_config();
        let pair = Pair::new(Rank::ZERO, Rank::ONE);
        assert_eq!(
            config.payload(MetricKind::Bandwidth, pair),
            config.payload(MetricKind::Bandwidth, pair),
        );
        // different pairs fill differently
        let other = Pair::new(Rank::ZERO, Rank::new(2));
        assert_ne!(
            config.payload(MetricKind::Bandwidth, pair),
            config.payload(MetricKind::Bandwidth, other),
        );
    }
}
