//! End-to-end validation passes over synthetic fabrics: every rank on
//! its own thread, real barriers and gathers, deterministic timings.

use anyhow::Result;
use ibvalid::{MetricKind, Outcome, Pair, ProbeConfig, Rank, Schedule, Threshold, run};
use ibvalid_core::{
    RankReport, RunReport, ScheduleError, Transport, TransportError, ValidationConfig,
    transport::{FabricProfile, FixedFabric, LinkProfile},
};
use std::{thread, time::Duration};

const TIMEOUT: Duration = Duration::from_secs(2);

fn quick_probe() -> ProbeConfig {
    ProbeConfig {
        latency_samples: 10,
        warmup: 2,
        latency_payload: 8,
        bandwidth_payload: 1_048_576,
        bandwidth_transfers: 3,
        seed: 0,
    }
}

/// Run the full pass on every rank of a fixed fabric, one thread per
/// rank, and return the coordinating rank's report.
fn run_cluster(size: u32, profile: FabricProfile, config: &ValidationConfig) -> RunReport {
    run_cluster_with(size, profile, config, |endpoint| endpoint)
}

/// Same as [`run_cluster`], with a hook to wrap each endpoint in a
/// misbehaving transport. Panics if the coordinating rank errors.
fn run_cluster_with<T, F>(
    size: u32,
    profile: FabricProfile,
    config: &ValidationConfig,
    wrap: F,
) -> RunReport
where
    T: Transport + 'static,
    F: Fn(FixedFabric) -> T,
{
    try_run_cluster_with(size, profile, config, wrap)
        .expect("validation pass failed")
        .expect("coordinating rank produced no report")
}

fn try_run_cluster_with<T, F>(
    size: u32,
    profile: FabricProfile,
    config: &ValidationConfig,
    wrap: F,
) -> Result<Option<RunReport>>
where
    T: Transport + 'static,
    F: Fn(FixedFabric) -> T,
{
    let handles: Vec<_> = FixedFabric::cluster(size, profile, config.timeout)
        .into_iter()
        .map(wrap)
        .map(|mut endpoint| {
            let config = config.clone();
            thread::spawn(move || run(&mut endpoint, &config))
        })
        .collect();

    let mut results: Vec<Result<Option<RunReport>>> = handles
        .into_iter()
        .map(|handle| handle.join().expect("rank thread panicked"))
        .collect();

    // rank 0 is the coordinating rank; its slot decides the test
    let root = results.remove(0);
    for (peer, result) in results.into_iter().enumerate() {
        assert!(
            result.as_ref().map(Option::is_none).unwrap_or(true),
            "rank {} unexpectedly produced a report",
            peer + 1
        );
    }
    root
}

// ----------------------------------------------------------------------
// schedule coverage
// ----------------------------------------------------------------------

#[test]
fn every_scheduled_pair_appears_exactly_once_per_metric() {
    let profile = FabricProfile::uniform(Duration::from_micros(3), None);
    let config = ValidationConfig {
        probe: quick_probe(),
        timeout: TIMEOUT,
        ..Default::default()
    };

    let report = run_cluster(5, profile, &config);

    // all-pairs over 5 ranks: 10 pairs, latency + bandwidth
    assert_eq!(report.matrix.len(), 20);
    for (pair, metric) in config.expected_entries(5) {
        assert!(
            report.matrix.get(pair, metric).is_some(),
            "{pair} {metric} missing from the matrix"
        );
    }
}

#[test]
fn latency_summaries_are_ordered_and_non_negative() {
    let profile = FabricProfile::uniform(Duration::from_micros(3), None);
    let config = ValidationConfig {
        metrics: vec![MetricKind::Latency],
        probe: quick_probe(),
        timeout: TIMEOUT,
        ..Default::default()
    };

    let report = run_cluster(4, profile, &config);

    for (pair, _, summary) in report.matrix.iter() {
        let stats = summary.stats.unwrap_or_else(|| panic!("{pair} unreachable"));
        assert!(stats.min >= 0.0);
        assert!(stats.min <= stats.mean, "{pair}: min > mean");
        assert!(stats.mean <= stats.max, "{pair}: mean > max");
        // the fabric is exact: every sample is the 3µs one-way latency
        assert!((stats.mean - 3.0).abs() < 1e-6, "{pair}: mean {}", stats.mean);
    }
}

// ----------------------------------------------------------------------
// measured values against the known fabric
// ----------------------------------------------------------------------

#[test]
fn bandwidth_equals_payload_over_delay() {
    // fixed 1ms transfer time regardless of size: the achieved rate must
    // come out as payload / delay
    let profile = FabricProfile::uniform(Duration::from_millis(1), None);
    let config = ValidationConfig {
        metrics: vec![MetricKind::Bandwidth],
        probe: quick_probe(),
        timeout: TIMEOUT,
        ..Default::default()
    };

    let report = run_cluster(2, profile, &config);

    let pair = Pair::new(Rank::ZERO, Rank::ONE);
    let stats = report
        .matrix
        .get(pair, MetricKind::Bandwidth)
        .unwrap()
        .stats
        .unwrap();
    let expected = 1_048_576.0 / 1e-3;
    assert!(
        ((stats.mean - expected) / expected).abs() < 1e-9,
        "measured {} expected {expected}",
        stats.mean
    );
}

#[test]
fn absolute_bandwidth_floor_pass_and_fail() {
    // exact boundary behaviour is covered by the validator's unit tests;
    // here the floor sits clearly on either side of the fabric's rate
    let rate = 1_000_000u64;
    let profile = FabricProfile::uniform(
        Duration::ZERO,
        Some(ibvalid_core::Bandwidth::from_bytes_per_sec(rate)),
    );
    let base = ValidationConfig {
        metrics: vec![MetricKind::Bandwidth],
        probe: quick_probe(),
        timeout: TIMEOUT,
        ..Default::default()
    };

    let config = ValidationConfig {
        thresholds: vec![Threshold::min_bandwidth(
            ibvalid_core::Bandwidth::from_bytes_per_sec(rate / 2),
            0.0,
        )],
        ..base.clone()
    };
    let report = run_cluster(2, profile.clone(), &config);
    assert_eq!(report.verdicts[0].outcome, Outcome::Pass);
    assert_eq!(report.exit_code(), 0);

    let config = ValidationConfig {
        thresholds: vec![Threshold::min_bandwidth(
            ibvalid_core::Bandwidth::from_bytes_per_sec(rate * 2),
            0.0,
        )],
        ..base
    };
    let report = run_cluster(2, profile, &config);
    assert_eq!(report.verdicts[0].outcome, Outcome::Fail);
    assert_eq!(report.exit_code(), 1);
}

// ----------------------------------------------------------------------
// relative thresholds
// ----------------------------------------------------------------------

#[test]
fn relative_mode_flags_only_the_outlier() {
    // hub 0 against five peers: four healthy links, one at a tenth of
    // their rate
    let mut profile = FabricProfile::uniform(
        Duration::ZERO,
        Some(ibvalid_core::Bandwidth::from_bytes_per_sec(10_000_000)),
    );
    profile.set_link(
        Rank::ZERO,
        Rank::new(5),
        LinkProfile {
            latency: Duration::ZERO,
            bandwidth: Some(ibvalid_core::Bandwidth::from_bytes_per_sec(1_000_000)),
        },
    );

    let config = ValidationConfig {
        schedule: Schedule::OneToMany { hub: Rank::ZERO },
        metrics: vec![MetricKind::Bandwidth],
        probe: quick_probe(),
        thresholds: vec![Threshold::of_median(MetricKind::Bandwidth, 0.8, 0.0)],
        timeout: TIMEOUT,
        ..Default::default()
    };

    let report = run_cluster(6, profile, &config);

    assert_eq!(report.verdicts.len(), 5);
    for verdict in &report.verdicts {
        let expected = if verdict.pair.destination == Rank::new(5) {
            Outcome::Fail
        } else {
            Outcome::Pass
        };
        assert_eq!(verdict.outcome, expected, "{}", verdict.pair);
    }
    assert_eq!(report.exit_code(), 1);
}

// ----------------------------------------------------------------------
// failure isolation
// ----------------------------------------------------------------------

#[test]
fn one_dead_link_leaves_the_rest_untouched() {
    let mut profile = FabricProfile::uniform(Duration::from_micros(3), None);
    profile.fail_link(Rank::ONE, Rank::new(3));

    let config = ValidationConfig {
        metrics: vec![MetricKind::Latency],
        probe: quick_probe(),
        // generous ceiling: everything reachable passes
        thresholds: vec![Threshold::max_latency("1ms".parse().unwrap(), 0.0)],
        timeout: TIMEOUT,
        ..Default::default()
    };

    let report = run_cluster(4, profile, &config);

    let dead = Pair::new(Rank::ONE, Rank::new(3));
    for verdict in &report.verdicts {
        if verdict.pair == dead {
            assert_eq!(verdict.outcome, Outcome::Fail);
            assert_eq!(verdict.measured, None);
        } else {
            assert_eq!(verdict.outcome, Outcome::Pass, "{}", verdict.pair);
        }
    }
    assert_eq!(report.exit_code(), 1);
}

// ----------------------------------------------------------------------
// corrupted gathers abort before any verdict
// ----------------------------------------------------------------------

/// Wraps a fabric endpoint; on the coordinating rank it tampers with the
/// gathered frames so rank 1 re-reports a pair rank 0 already owns.
struct Misreporting(FixedFabric);

impl Transport for Misreporting {
    fn rank(&self) -> Rank {
        self.0.rank()
    }
    fn size(&self) -> u32 {
        self.0.size()
    }
    fn exchange(
        &mut self,
        peer: Rank,
        payload: &[u8],
        mode: ibvalid_core::ExchangeMode,
    ) -> Result<Duration, TransportError> {
        self.0.exchange(peer, payload, mode)
    }
    fn barrier(&mut self) -> Result<(), TransportError> {
        self.0.barrier()
    }
    fn gather(
        &mut self,
        frame: Vec<u8>,
        root: Rank,
    ) -> Result<Option<Vec<Vec<u8>>>, TransportError> {
        let Some(mut frames) = self.0.gather(frame, root)? else {
            return Ok(None);
        };
        let donor: RankReport = serde_json::from_slice(&frames[0]).expect("valid frame");
        let mut duplicator: RankReport =
            serde_json::from_slice(&frames[1]).expect("valid frame");
        duplicator.summaries.push(donor.summaries[0]);
        frames[1] = duplicator.encode().expect("re-encodable frame");
        Ok(Some(frames))
    }
}

#[test]
fn duplicated_pair_report_aborts_with_schedule_error() {
    let profile = FabricProfile::uniform(Duration::from_micros(3), None);
    let config = ValidationConfig {
        metrics: vec![MetricKind::Latency],
        probe: quick_probe(),
        thresholds: vec![Threshold::max_latency("1ms".parse().unwrap(), 0.0)],
        timeout: TIMEOUT,
        ..Default::default()
    };

    let error = try_run_cluster_with(4, profile, &config, Misreporting)
        .expect_err("duplicate report must abort the run");
    assert!(
        matches!(
            error.downcast_ref::<ScheduleError>(),
            Some(ScheduleError::DuplicatePair { .. })
        ),
        "unexpected error: {error:#}"
    );
}

// ----------------------------------------------------------------------
// degenerate runs
// ----------------------------------------------------------------------

#[test]
fn single_rank_run_reports_an_empty_matrix() {
    let profile = FabricProfile::uniform(Duration::from_micros(3), None);
    let config = ValidationConfig {
        probe: quick_probe(),
        timeout: TIMEOUT,
        ..Default::default()
    };

    let report = run_cluster(1, profile, &config);
    assert!(report.matrix.is_empty());
    assert!(report.verdicts.is_empty());
    assert_eq!(report.exit_code(), 0);
}
