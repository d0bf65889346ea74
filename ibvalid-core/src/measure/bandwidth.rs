use logos::{Lexer, Logos};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};

/// A data rate, stored as whole bytes per second.
///
/// Used both for configured expectations (parsed from strings such as
/// `"100gbps"`) and for achieved rates derived from a timed transfer.
///
/// # Example
///
/// ```
/// # use ibvalid_core::measure::Bandwidth;
/// # use std::time::Duration;
/// // 2 MB transferred in 500ms is a 4 MB/s rate
/// let bw = Bandwidth::of_transfer(2_000_000, Duration::from_millis(500));
/// assert_eq!(bw.bytes_per_sec(), 4_000_000);
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
pub struct Bandwidth(u64);

impl Bandwidth {
    pub const ZERO: Self = Self(0);

    /// Create a bandwidth of `data` bytes every `per`.
    ///
    /// ```
    /// # use ibvalid_core::measure::Bandwidth;
    /// # use std::time::Duration;
    /// // 200 MB per second
    /// let bw = Bandwidth::new(200 * 1_024 * 1_024, Duration::from_secs(1));
    /// ```
    pub fn new(data: u64, per: Duration) -> Self {
        Self::of_transfer(data, per)
    }

    /// The achieved rate of a completed transfer: `bytes / elapsed`.
    ///
    /// A zero `elapsed` yields [`Bandwidth::ZERO`] rather than a division
    /// error; the probe layer never records zero-length timings.
    pub fn of_transfer(bytes: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return Self::ZERO;
        }
        Self((bytes as f64 / secs) as u64)
    }

    pub const fn from_bytes_per_sec(bytes_per_sec: u64) -> Self {
        Self(bytes_per_sec)
    }

    #[inline]
    pub const fn bytes_per_sec(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_f64(self) -> f64 {
        self.0 as f64
    }
}

const K: u64 = 1_024;
const M: u64 = 1_024 * 1_024;
const G: u64 = 1_024 * 1_024 * 1_024;

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let v = self.0;
        let k = v / K;
        let m = v / M;
        let g = v / G;

        let v_r = v % K;
        let k_r = v % M;
        let m_r = v % G;

        if v < K || v_r != 0 {
            write!(f, "{v}bps")
        } else if v < M || k_r != 0 {
            write!(f, "{k}kbps")
        } else if v < G || m_r != 0 {
            write!(f, "{m}mbps")
        } else {
            write!(f, "{g}gbps")
        }
    }
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")] // Ignore this regex pattern between tokens
enum BandwidthToken {
    #[regex("bps")]
    Bps,
    #[regex("kbps")]
    Kbps,
    #[regex("mbps")]
    Mbps,
    #[regex("gbps")]
    Gbps,

    #[regex("[0-9]+")]
    Value,
}

impl FromStr for Bandwidth {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use anyhow::{bail, ensure};

        let mut lex = Lexer::<'_, BandwidthToken>::new(s);

        let Some(Ok(BandwidthToken::Value)) = lex.next() else {
            bail!("Expecting to parse a number")
        };
        let number: u64 = lex.slice().parse()?;
        let Some(Ok(token)) = lex.next() else {
            bail!("Expecting to parse a unit")
        };
        let bps = match token {
            BandwidthToken::Bps => number,
            BandwidthToken::Kbps => number * K,
            BandwidthToken::Mbps => number * M,
            BandwidthToken::Gbps => number * G,
            BandwidthToken::Value => bail!("Expecting to parse a unit (bps, kbps, ...)"),
        };

        ensure!(
            lex.next().is_none(),
            "Not expecting any other tokens to parse a bandwidth"
        );

        Ok(Self(bps))
    }
}
