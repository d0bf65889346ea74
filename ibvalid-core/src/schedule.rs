use crate::{pair::Pair, rank::Rank};
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Which rank pairs a validation run measures.
///
/// A schedule expands to barrier-bounded *rounds*: within one round every
/// rank takes part in at most one pair, so no rank is streaming bandwidth
/// traffic while also answering a latency probe. The runner places a
/// barrier between rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    /// Every unordered rank pair, scheduled with the circle method so each
    /// round is a (near-)perfect matching. `n * (n - 1) / 2` pairs in
    /// `n - 1` rounds (`n` rounds for odd `n`).
    AllPairs,
    /// Each rank to its successor: `(i, i + 1 mod n)`.
    Ring,
    /// A single hub rank probed against every other rank, one pair per
    /// round. Useful to re-validate one suspect node.
    OneToMany { hub: Rank },
}

impl Default for Schedule {
    fn default() -> Self {
        Self::AllPairs
    }
}

impl Schedule {
    /// Every pair this schedule measures, in round order.
    pub fn pairs(&self, size: u32) -> Vec<Pair> {
        self.rounds(size).into_iter().flatten().collect()
    }

    /// The schedule expanded into rounds.
    ///
    /// Fewer than two ranks means nothing to measure: the result is empty
    /// and the run reports an empty matrix.
    pub fn rounds(&self, size: u32) -> Vec<Vec<Pair>> {
        if size < 2 {
            return Vec::new();
        }
        match self {
            Self::AllPairs => circle_rounds(size),
            Self::Ring => pack_rounds(ring_pairs(size)),
            Self::OneToMany { hub } => (0..size)
                .map(Rank::new)
                .filter(|peer| peer != hub)
                .map(|peer| vec![Pair::new(*hub, peer)])
                .collect(),
        }
    }

    /// The pairs `rank` initiates, across all rounds.
    pub fn assigned(&self, rank: Rank, size: u32) -> Vec<Pair> {
        self.pairs(size)
            .into_iter()
            .filter(|pair| pair.source == rank)
            .collect()
    }
}

/// Round-robin tournament rounds over `0..size` (circle method).
///
/// Rank 0 stays fixed while the others rotate; an odd field gets a bye
/// slot. The lower rank of each match is the initiating source.
fn circle_rounds(size: u32) -> Vec<Vec<Pair>> {
    const BYE: u32 = u32::MAX;

    let mut field: Vec<u32> = (0..size).collect();
    if field.len() % 2 == 1 {
        field.push(BYE);
    }
    let m = field.len();

    let mut rounds = Vec::with_capacity(m - 1);
    for _ in 0..m - 1 {
        let mut round = Vec::with_capacity(m / 2);
        for i in 0..m / 2 {
            let (a, b) = (field[i], field[m - 1 - i]);
            if a == BYE || b == BYE {
                continue;
            }
            let (source, destination) = if a < b { (a, b) } else { (b, a) };
            round.push(Pair::new(Rank::new(source), Rank::new(destination)));
        }
        rounds.push(round);
        // rotate everything but the first slot
        field[1..].rotate_right(1);
    }
    rounds
}

fn ring_pairs(size: u32) -> Vec<Pair> {
    (0..size)
        .map(|i| Pair::new(Rank::new(i), Rank::new((i + 1) % size)))
        .collect()
}

/// Greedy packing of a pair list into rounds where no rank appears twice.
fn pack_rounds(pairs: Vec<Pair>) -> Vec<Vec<Pair>> {
    let mut rounds: Vec<(Vec<Pair>, Vec<Rank>)> = Vec::new();
    for pair in pairs {
        let slot = rounds.iter_mut().find(|(_, busy)| {
            !busy.contains(&pair.source) && !busy.contains(&pair.destination)
        });
        match slot {
            Some((round, busy)) => {
                round.push(pair);
                busy.push(pair.source);
                busy.push(pair.destination);
            }
            None => {
                rounds.push((vec![pair], vec![pair.source, pair.destination]));
            }
        }
    }
    rounds.into_iter().map(|(round, _)| round).collect()
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllPairs => write!(f, "all-pairs"),
            Self::Ring => write!(f, "ring"),
            Self::OneToMany { hub } => write!(f, "one-to-many:{hub}"),
        }
    }
}

impl FromStr for Schedule {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all-pairs" => Ok(Self::AllPairs),
            "ring" => Ok(Self::Ring),
            _ => {
                if let Some(hub) = s.strip_prefix("one-to-many:") {
                    return Ok(Self::OneToMany { hub: hub.parse()? });
                }
                bail!("unknown schedule `{s}` (expected all-pairs, ring or one-to-many:<rank>)")
            }
        }
    }
}
