//! Aggregation of per-rank summaries into the run's global view.
//!
//! Every rank owns the summaries of the pairs it initiated; a gather
//! brings them (as JSON frames) to the coordinating rank, which merges
//! them into one [`GlobalMatrix`]. A corrupted schedule — a pair reported
//! twice, or never — makes every downstream verdict untrustworthy, so
//! merging fails loudly instead of silently overwriting or dropping.

use crate::{
    pair::Pair,
    rank::Rank,
    sample::MetricKind,
    stats::{PairSummary, Summary},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

/// Fatal aggregation faults. Any of these aborts the run before a single
/// verdict is produced.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("pair {pair} ({metric}) reported more than once")]
    DuplicatePair { pair: Pair, metric: MetricKind },

    #[error("pair {pair} ({metric}) missing from the gathered results")]
    MissingPair { pair: Pair, metric: MetricKind },

    #[error("pair {pair} ({metric}) reported but never scheduled")]
    UnscheduledPair { pair: Pair, metric: MetricKind },

    #[error("frame from rank {rank} is not a valid rank report: {source}")]
    MalformedFrame {
        rank: Rank,
        #[source]
        source: serde_json::Error,
    },

    #[error("gather returned {got} frames for {expected} ranks")]
    FrameCount { got: usize, expected: usize },

    #[error("frame at index {index} claims to come from rank {claimed}")]
    RankMismatch { index: usize, claimed: Rank },
}

/// One rank's contribution to the gather: its identity and the summaries
/// of every pair it initiated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankReport {
    pub rank: Rank,
    pub summaries: Vec<PairSummary>,
}

impl RankReport {
    pub fn new(rank: Rank, summaries: Vec<PairSummary>) -> Self {
        Self { rank, summaries }
    }

    /// The gather frame for this report.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// The complete, gathered set of per-pair summaries for one validation
/// run. Built once on the coordinating rank; nothing mutates it after
/// [`GlobalMatrix::merge`] returns.
#[derive(Debug, Clone, Default)]
pub struct GlobalMatrix {
    entries: BTreeMap<(Pair, MetricKind), Summary>,
}

impl GlobalMatrix {
    /// Merge every rank's gather frame, checking the result covers the
    /// schedule exactly.
    ///
    /// `expected` is the full set of `(pair, metric)` combinations the
    /// schedule planned; each must be reported exactly once, by the
    /// pair's source rank.
    pub fn merge(
        expected: impl IntoIterator<Item = (Pair, MetricKind)>,
        frames: &[Vec<u8>],
    ) -> Result<Self, ScheduleError> {
        let expected: BTreeSet<(Pair, MetricKind)> = expected.into_iter().collect();

        let mut entries = BTreeMap::new();
        for (index, frame) in frames.iter().enumerate() {
            let rank = Rank::new(index as u32);
            let report: RankReport = serde_json::from_slice(frame)
                .map_err(|source| ScheduleError::MalformedFrame { rank, source })?;
            if report.rank != rank {
                return Err(ScheduleError::RankMismatch {
                    index,
                    claimed: report.rank,
                });
            }

            debug!(%rank, summaries = report.summaries.len(), "merging rank report");
            for summary in report.summaries {
                let key = (summary.pair, summary.metric);
                if !expected.contains(&key) {
                    return Err(ScheduleError::UnscheduledPair {
                        pair: summary.pair,
                        metric: summary.metric,
                    });
                }
                if entries.insert(key, summary.summary).is_some() {
                    return Err(ScheduleError::DuplicatePair {
                        pair: summary.pair,
                        metric: summary.metric,
                    });
                }
            }
        }

        for (pair, metric) in expected {
            if !entries.contains_key(&(pair, metric)) {
                return Err(ScheduleError::MissingPair { pair, metric });
            }
        }

        Ok(Self { entries })
    }

    pub fn get(&self, pair: Pair, metric: MetricKind) -> Option<&Summary> {
        self.entries.get(&(pair, metric))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Pair, MetricKind, &Summary)> {
        self.entries
            .iter()
            .map(|((pair, metric), summary)| (*pair, *metric, summary))
    }

    /// Summaries of one metric, in pair order.
    pub fn of_metric(
        &self,
        metric: MetricKind,
    ) -> impl Iterator<Item = (Pair, &Summary)> {
        self.entries
            .iter()
            .filter(move |((_, m), _)| *m == metric)
            .map(|((pair, _), summary)| (*pair, summary))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
