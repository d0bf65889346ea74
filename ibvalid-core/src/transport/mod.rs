//! Message-passing primitives the measurement engine is written against.
//!
//! A [`Transport`] is one rank's view of the fabric: timed point-to-point
//! exchanges plus the two collectives the run needs (barrier, gather).
//! Every call is bounded by the transport's configured timeout — a dead
//! peer must surface as [`TransportError::Timeout`], never as a hang.

mod channel;
mod fixed;

pub use self::{
    channel::ChannelTransport,
    fixed::{FabricProfile, FixedFabric, LinkProfile},
};

use crate::rank::Rank;
use std::time::Duration;
use thiserror::Error;

/// How one timed exchange behaves. The two ends of a pair call
/// complementary modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeMode {
    /// Send the payload, wait for it to come back. Initiator side of a
    /// latency ping-pong.
    RoundTrip,
    /// Wait for the payload, send it back. Responder side of a latency
    /// ping-pong.
    Echo,
    /// Stream the payload out and wait for the drain acknowledgement.
    /// Initiator side of a bandwidth probe.
    Push,
    /// Absorb the inbound stream and acknowledge. Responder side of a
    /// bandwidth probe. Only the length of `payload` is meaningful.
    Pull,
}

/// Error raised by a transport operation.
///
/// These are per-call failures: the probe layer converts them into
/// unreachable markers on the affected pair and the run continues.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer {peer} did not answer within {after:?}")]
    Timeout { peer: Rank, after: Duration },

    #[error("peer {peer} disconnected")]
    Disconnected { peer: Rank },

    #[error("transport protocol violation: {0}")]
    Protocol(String),
}

/// One rank's handle on the fabric under test.
///
/// Implementations must use monotonic clocks for the elapsed times they
/// return, and must bound every blocking call with their configured
/// timeout.
pub trait Transport: Send {
    /// This process's launcher-assigned rank.
    fn rank(&self) -> Rank;

    /// Total number of participating ranks.
    fn size(&self) -> u32;

    /// Perform one timed exchange with `peer` and return the elapsed
    /// wall-clock time, sub-microsecond resolution.
    ///
    /// In receiving modes ([`ExchangeMode::Echo`], [`ExchangeMode::Pull`])
    /// only `payload.len()` is meaningful; the bytes themselves are the
    /// peer's.
    fn exchange(
        &mut self,
        peer: Rank,
        payload: &[u8],
        mode: ExchangeMode,
    ) -> Result<Duration, TransportError>;

    /// Block until every rank has called `barrier`.
    fn barrier(&mut self) -> Result<(), TransportError>;

    /// Collect one byte frame per rank at `root`.
    ///
    /// Returns `Some(frames)` indexed by rank on the root, `None` on
    /// every other rank.
    fn gather(
        &mut self,
        frame: Vec<u8>,
        root: Rank,
    ) -> Result<Option<Vec<Vec<u8>>>, TransportError>;
}
