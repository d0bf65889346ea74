use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::{fmt, str};

/// The identifier of a participating process in the validation run.
///
/// Ranks are assigned by the external launcher (one process per node)
/// and are stable for the duration of the run. The coordinating rank is
/// always [`Rank::ZERO`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Rank(u32);

impl Rank {
    /// The coordinating rank. Aggregation and reporting happen here.
    pub const ZERO: Self = Rank::new(0);
    pub const ONE: Self = Rank::new(1);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Index into rank-ordered sequences (gather results, host lists).
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl str::FromStr for Rank {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self).map_err(|error| anyhow!("{error}"))
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
