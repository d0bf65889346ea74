use anyhow::{Context as _, Result};
use ibvalid_core::{
    GlobalMatrix, Rank, RankReport, RunReport, Transport, ValidationConfig, probe_pair,
    summarize_all, threshold,
};
use tracing::{info, warn};

/// One full validation pass. Every rank calls this with the same
/// configuration; the coordinating rank returns the report, every other
/// rank returns `None`.
///
/// The transport's per-call timeout must come from the same
/// configuration (`config.timeout`) on every rank, so that a dead pair
/// stalls both of its ends for the same bounded time.
///
/// Rounds are barrier-bounded: no rank starts streaming bandwidth
/// traffic while another is still mid-latency-probe, which would corrupt
/// both measurements through contention.
///
/// # Errors
///
/// A rejected configuration aborts before any traffic — identically on
/// every rank, since all ranks validate the same value. A corrupted
/// gather (duplicate, missing or unscheduled pair) aborts on the
/// coordinating rank before any verdict is produced. Transport failures
/// during probing are *not* errors: they become unreachable markers on
/// the affected pair and the pass continues.
pub fn run<T: Transport + ?Sized>(
    transport: &mut T,
    config: &ValidationConfig,
) -> Result<Option<RunReport>> {
    config.validate().context("invalid configuration")?;

    let rank = transport.rank();
    let size = transport.size();
    let rounds = config.schedule.rounds(size);
    info!(
        %rank,
        size,
        schedule = %config.schedule,
        rounds = rounds.len(),
        "starting validation pass"
    );

    transport.barrier().context("barrier before first round")?;

    let mut measurements = Vec::new();
    for metric in &config.metrics {
        for round in &rounds {
            for pair in round {
                if let Some(measurement) =
                    probe_pair(transport, *pair, *metric, &config.probe)
                {
                    measurements.push(measurement);
                }
            }
            transport.barrier().context("barrier after round")?;
        }
    }

    let summaries = summarize_all(&measurements, config.percentile);
    let frame = RankReport::new(rank, summaries)
        .encode()
        .context("encoding rank report")?;
    let frames = transport
        .gather(frame, Rank::ZERO)
        .context("gathering rank reports")?;

    let Some(frames) = frames else {
        // not the coordinating rank: our summaries are on their way
        return Ok(None);
    };

    let matrix = GlobalMatrix::merge(config.expected_entries(size), &frames)
        .context("merging gathered rank reports")?;
    let verdicts = threshold::validate(
        &matrix,
        &config.thresholds,
        config.median_includes_unreachable,
    );

    let report = RunReport::new(matrix, verdicts);
    for verdict in report.degraded() {
        warn!(
            pair = %verdict.pair,
            metric = %verdict.metric,
            measured = verdict.measured,
            target = verdict.target,
            "pair degraded"
        );
    }
    Ok(Some(report))
}
