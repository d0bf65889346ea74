/*!
# ibvalid-core

Core engine of a distributed interconnect validator: every participating
process (one per node, rank assigned by the launcher) measures latency
and bandwidth against its scheduled peer pairs, summaries are gathered to
the coordinating rank, and the resulting matrix is held against
configured thresholds to classify each link as healthy or degraded.

The engine is written against the [`Transport`] trait; real fabrics plug
in at that seam while tests run over the in-process
[`transport::ChannelTransport`] mesh or the fully deterministic
[`transport::FixedFabric`].
*/

pub mod config;
pub mod defaults;
pub mod matrix;
pub mod measure;
pub mod probe;
pub mod report;
pub mod schedule;
pub mod stats;
pub mod threshold;
pub mod transport;

mod pair;
mod rank;
mod sample;
mod time;

pub use self::{
    config::{ConfigError, ValidationConfig},
    matrix::{GlobalMatrix, RankReport, ScheduleError},
    measure::{Bandwidth, Latency},
    pair::{LinkKey, Pair},
    probe::{ProbeConfig, probe_pair},
    rank::Rank,
    report::{ReportFormat, RunReport},
    sample::{MetricKind, PairMeasurement, Sample},
    schedule::Schedule,
    stats::{PairSummary, SampleStats, Summary, summarize, summarize_all},
    threshold::{Limit, Outcome, Threshold, Verdict, validate},
    time::DurationParseError,
    transport::{ExchangeMode, Transport, TransportError},
};
