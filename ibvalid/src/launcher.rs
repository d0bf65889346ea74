//! Launcher environment bootstrap.
//!
//! The validator never launches processes itself: an external launcher
//! (SLURM, mpirun, a shell loop) starts one process per node and
//! describes the job through environment variables. These helpers read
//! them, with SLURM fallbacks so `srun` works without extra plumbing.
//!
//! # Environment Variables
//!
//! | Variable | Fallback | Description |
//! |----------|----------|-------------|
//! | `IBVALID_RANK` | `SLURM_PROCID` | This process's rank |
//! | `IBVALID_SIZE` | `SLURM_NTASKS` | Total number of ranks |
//! | `IBVALID_HOSTS` | — | Comma-separated host per rank, in rank order |
//! | `IBVALID_PORT` | — | Base TCP port (rank `r` listens on port + `r`) |

use anyhow::{Context as _, Result, ensure};
use ibvalid_core::Rank;
use std::env;

/// Default base port; rank `r` listens on `DEFAULT_BASE_PORT + r`.
pub const DEFAULT_BASE_PORT: u16 = 18_515;

/// Get this process's rank.
pub fn rank() -> Option<u32> {
    var_u32("IBVALID_RANK").or_else(|| var_u32("SLURM_PROCID"))
}

/// Get the total number of participating ranks.
pub fn size() -> Option<u32> {
    var_u32("IBVALID_SIZE").or_else(|| var_u32("SLURM_NTASKS"))
}

/// Get the host list, one entry per rank in rank order.
pub fn hosts() -> Option<Vec<String>> {
    let hosts = env::var("IBVALID_HOSTS").ok()?;
    Some(hosts.split(',').map(|h| h.trim().to_owned()).collect())
}

/// Get the base TCP port, or the default.
pub fn base_port() -> u16 {
    env::var("IBVALID_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_BASE_PORT)
}

fn var_u32(name: &str) -> Option<u32> {
    env::var(name).ok().and_then(|s| s.parse().ok())
}

/// The complete job description a transport needs.
#[derive(Debug, Clone)]
pub struct LaunchEnv {
    pub rank: Rank,
    pub size: u32,
    /// One host per rank, in rank order.
    pub hosts: Vec<String>,
    pub base_port: u16,
}

impl LaunchEnv {
    /// Read the job description from the environment.
    ///
    /// # Errors
    ///
    /// Fails when rank or size is missing, when the rank is out of
    /// range, or when the host list does not have one entry per rank.
    pub fn from_env() -> Result<Self> {
        let rank = rank().context("IBVALID_RANK (or SLURM_PROCID) is not set")?;
        let size = size().context("IBVALID_SIZE (or SLURM_NTASKS) is not set")?;
        let hosts = hosts().context("IBVALID_HOSTS is not set")?;

        ensure!(size > 0, "IBVALID_SIZE must be positive");
        ensure!(
            rank < size,
            "rank {rank} is out of range for a job of {size} ranks"
        );
        ensure!(
            hosts.len() == size as usize,
            "IBVALID_HOSTS lists {} hosts for {size} ranks",
            hosts.len()
        );

        Ok(Self {
            rank: Rank::new(rank),
            size,
            hosts,
            base_port: base_port(),
        })
    }
}
