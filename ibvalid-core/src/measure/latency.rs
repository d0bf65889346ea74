use crate::time::{DurationParseError, parse_duration};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};

/// A one-way signal propagation time between two ranks.
///
/// # truncation
///
/// The latency is precise up to the microsecond. Constructing a
/// [`Latency`] from a [`Duration`] that carries nanosecond precision
/// truncates the nanosecond part.
///
/// ```
/// # use ibvalid_core::measure::Latency;
/// # use std::time::Duration;
/// let latency = Latency::new(Duration::from_nanos(987_654_321));
/// assert_eq!(
///     latency.into_duration(),
///     Duration::from_micros(987_654),
/// );
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct Latency(u64);

impl Latency {
    /// The `0` latency. I.e. no latency.
    pub const ZERO: Self = Self::new(Duration::ZERO);

    #[inline(always)]
    pub const fn new(duration: Duration) -> Self {
        Self(duration.as_micros() as u64)
    }

    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    #[inline(always)]
    pub fn into_duration(self) -> Duration {
        Duration::from_micros(self.0)
    }

    #[inline]
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// The latency as a fractional microsecond count, the unit latency
    /// statistics are computed in.
    #[inline]
    pub fn as_micros_f64(self) -> f64 {
        self.0 as f64
    }
}

impl From<Latency> for Duration {
    fn from(value: Latency) -> Self {
        value.into_duration()
    }
}
impl From<Duration> for Latency {
    fn from(value: Duration) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <Duration as fmt::Debug>::fmt(&self.into_duration(), f)
    }
}

impl FromStr for Latency {
    type Err = DurationParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let duration = parse_duration(s)?;

        Ok(Self::new(duration))
    }
}
