//! Multi-node validation run over TCP.
//!
//! Start one process per node under your launcher of choice and let the
//! environment describe the job:
//!
//! ```bash
//! # on every node i of [node0, node1, node2]:
//! IBVALID_RANK=$i IBVALID_SIZE=3 IBVALID_HOSTS=node0,node1,node2 \
//!     cargo run --release --example cluster -- --schedule all-pairs
//! ```
//!
//! Under SLURM, `srun` sets the rank and size for you; only the host
//! list is needed. The exit code is `0` when every judged pair passes
//! (degraded links warn but do not fail) and non-zero otherwise.

use anyhow::{Context as _, Result};
use clap::Parser;
use ibvalid::{MetricKind, ReportFormat, Schedule, Threshold, TcpMesh, launcher::LaunchEnv, run};
use ibvalid_core::ValidationConfig;

#[derive(Parser)]
struct Args {
    /// Pair schedule: all-pairs, ring or one-to-many:<rank>.
    #[arg(long, default_value = "all-pairs")]
    schedule: Schedule,

    /// Report format: table or json.
    #[arg(long, default_value = "table")]
    format: ReportFormat,

    /// Minimum acceptable bandwidth as a fraction of the run's median.
    #[arg(long, default_value_t = 0.8)]
    bandwidth_floor: f64,

    /// Maximum acceptable latency as a multiple of the run's median.
    #[arg(long, default_value_t = 1.25)]
    latency_ceiling: f64,

    /// Tolerance band past either target that is degraded, not failed.
    #[arg(long, default_value_t = 0.1)]
    tolerance: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = ValidationConfig {
        schedule: args.schedule,
        format: args.format,
        thresholds: vec![
            Threshold::of_median(MetricKind::Bandwidth, args.bandwidth_floor, args.tolerance),
            Threshold::of_median(MetricKind::Latency, args.latency_ceiling, args.tolerance),
        ],
        ..Default::default()
    };

    let env = LaunchEnv::from_env().context("reading the launcher environment")?;
    let mut mesh = TcpMesh::connect(&env, config.timeout).context("establishing the mesh")?;

    match run(&mut mesh, &config)? {
        Some(report) => {
            print!("{}", report.render(config.format));
            std::process::exit(report.exit_code())
        }
        None => Ok(()),
    }
}
