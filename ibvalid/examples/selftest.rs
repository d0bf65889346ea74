//! Single-host smoke run over a synthetic fabric.
//!
//! Spawns one thread per rank on a deterministic [`FixedFabric`] and
//! runs the full validation pass, including the relative thresholds a
//! real deployment would use. Degrade or kill individual links to see
//! the verdicts change:
//!
//! ```bash
//! cargo run --example selftest -- --ranks 6 --fail-link 1:4
//! ```

use anyhow::{Context as _, Result, bail};
use clap::Parser;
use ibvalid::{MetricKind, ProbeConfig, Rank, ReportFormat, Schedule, Threshold, run};
use ibvalid_core::{
    ValidationConfig,
    transport::{FabricProfile, FixedFabric, LinkProfile},
};
use std::{thread, time::Duration};

#[derive(Parser)]
struct Args {
    /// Number of simulated ranks.
    #[arg(long, default_value_t = 4)]
    ranks: u32,

    /// Pair schedule: all-pairs, ring or one-to-many:<rank>.
    #[arg(long, default_value = "all-pairs")]
    schedule: Schedule,

    /// Report format: table or json.
    #[arg(long, default_value = "table")]
    format: ReportFormat,

    /// Kill the link between two ranks (`a:b`), repeatable.
    #[arg(long)]
    fail_link: Vec<String>,

    /// Degrade the link between two ranks (`a:b`), repeatable.
    #[arg(long)]
    slow_link: Vec<String>,
}

fn parse_link(spec: &str) -> Result<(Rank, Rank)> {
    let Some((a, b)) = spec.split_once(':') else {
        bail!("link `{spec}` is not of the form a:b");
    };
    Ok((a.parse()?, b.parse()?))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    // healthy links: 2µs one-way, 100gbps
    let mut profile = FabricProfile::uniform(
        Duration::from_micros(2),
        Some("100gbps".parse().expect("valid bandwidth literal")),
    );
    for spec in &args.slow_link {
        let (a, b) = parse_link(spec)?;
        profile.set_link(
            a,
            b,
            LinkProfile {
                latency: Duration::from_micros(40),
                bandwidth: Some("10gbps".parse().expect("valid bandwidth literal")),
            },
        );
    }
    for spec in &args.fail_link {
        let (a, b) = parse_link(spec)?;
        profile.fail_link(a, b);
    }

    let config = ValidationConfig {
        schedule: args.schedule,
        format: args.format,
        probe: ProbeConfig {
            latency_samples: 50,
            warmup: 5,
            bandwidth_payload: 256 * 1_024,
            bandwidth_transfers: 4,
            ..Default::default()
        },
        thresholds: vec![
            Threshold::of_median(MetricKind::Bandwidth, 0.8, 0.1),
            Threshold::of_median(MetricKind::Latency, 1.25, 0.1),
        ],
        timeout: Duration::from_secs(1),
        ..Default::default()
    };

    let cluster = FixedFabric::cluster(args.ranks, profile, config.timeout);
    let handles: Vec<_> = cluster
        .into_iter()
        .map(|mut endpoint| {
            let config = config.clone();
            thread::spawn(move || run(&mut endpoint, &config))
        })
        .collect();

    let mut report = None;
    for handle in handles {
        let result = handle
            .join()
            .map_err(|panic| anyhow::anyhow!("rank panicked: {panic:?}"))?
            .context("validation pass failed")?;
        if let Some(rank_report) = result {
            report = Some(rank_report);
        }
    }

    let report = report.context("no rank produced a report")?;
    print!("{}", report.render(config.format));
    std::process::exit(report.exit_code())
}
