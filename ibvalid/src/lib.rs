/*!
# Interconnect validator

One process per node, started by an external launcher that assigns
ranks. Every rank runs the same [`run`] pass: barrier-bounded probe
rounds over the scheduled pairs, a parallel statistics reduction, a
gather of the per-rank summaries, and — on the coordinating rank only —
threshold validation and reporting.

```no_run
use ibvalid::{TcpMesh, launcher::LaunchEnv, run};
use ibvalid_core::ValidationConfig;

fn main() -> anyhow::Result<()> {
    let config = ValidationConfig::default();
    let env = LaunchEnv::from_env()?;
    let mut transport = TcpMesh::connect(&env, config.timeout)?;

    match run(&mut transport, &config)? {
        Some(report) => {
            print!("{}", report.render(config.format));
            std::process::exit(report.exit_code())
        }
        None => Ok(()), // non-coordinating ranks exit quietly
    }
}
```
*/

pub mod launcher;
mod runner;
mod tcp;

// convenient re-export of the core objects
pub use ibvalid_core::{
    GlobalMatrix, MetricKind, Outcome, Pair, ProbeConfig, Rank, ReportFormat, RunReport,
    Schedule, Threshold, Transport, ValidationConfig, Verdict,
};

pub use self::{runner::run, tcp::TcpMesh};
