use crate::{
    measure::Bandwidth,
    pair::LinkKey,
    rank::Rank,
    transport::{ChannelTransport, ExchangeMode, Transport, TransportError},
};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

/// Timing model of one link in a [`FabricProfile`].
#[derive(Debug, Clone, Copy)]
pub struct LinkProfile {
    /// One-way traversal time, applied per direction.
    pub latency: Duration,
    /// Serialization rate. `None` means the payload adds no time and the
    /// whole transfer costs exactly `latency`.
    pub bandwidth: Option<Bandwidth>,
}

/// A deterministic fabric description for [`FixedFabric`].
///
/// Every link inherits the default profile unless overridden; individual
/// links can also be declared faulted, in which case any exchange across
/// them times out.
#[derive(Debug, Clone)]
pub struct FabricProfile {
    default: LinkProfile,
    overrides: HashMap<LinkKey, LinkProfile>,
    faulted: HashSet<LinkKey>,
}

impl FabricProfile {
    /// A fabric where every link shares the same profile.
    pub fn uniform(latency: Duration, bandwidth: Option<Bandwidth>) -> Self {
        Self {
            default: LinkProfile { latency, bandwidth },
            overrides: HashMap::new(),
            faulted: HashSet::new(),
        }
    }

    /// Override the profile of the link between `a` and `b`.
    pub fn set_link(&mut self, a: Rank, b: Rank, profile: LinkProfile) -> &mut Self {
        self.overrides.insert(LinkKey::new((a, b)), profile);
        self
    }

    /// Declare the link between `a` and `b` dead: exchanges across it
    /// fail with [`TransportError::Timeout`].
    pub fn fail_link(&mut self, a: Rank, b: Rank) -> &mut Self {
        self.faulted.insert(LinkKey::new((a, b)));
        self
    }

    fn link(&self, key: LinkKey) -> &LinkProfile {
        self.overrides.get(&key).unwrap_or(&self.default)
    }
}

/// Synthetic transport with a fixed, known timing profile.
///
/// Exchanges never move real bytes; the elapsed time is computed from the
/// [`FabricProfile`], so measured values are exactly predictable — the
/// property-test substrate for the probe and statistics layers. Barrier
/// and gather delegate to a real in-process [`ChannelTransport`] mesh so
/// multi-threaded runs still converge.
pub struct FixedFabric {
    inner: ChannelTransport,
    profile: Arc<FabricProfile>,
    timeout: Duration,
}

impl FixedFabric {
    /// One endpoint per rank over the given profile.
    pub fn cluster(size: u32, profile: FabricProfile, timeout: Duration) -> Vec<Self> {
        let profile = Arc::new(profile);
        ChannelTransport::mesh(size, timeout)
            .into_iter()
            .map(|inner| Self {
                inner,
                profile: Arc::clone(&profile),
                timeout,
            })
            .collect()
    }

    fn transfer_time(&self, link: &LinkProfile, bytes: u64) -> Duration {
        let serialization = match link.bandwidth {
            Some(bandwidth) if bandwidth.bytes_per_sec() > 0 => {
                Duration::from_secs_f64(bytes as f64 / bandwidth.as_f64())
            }
            _ => Duration::ZERO,
        };
        link.latency + serialization
    }
}

impl Transport for FixedFabric {
    fn rank(&self) -> Rank {
        self.inner.rank()
    }

    fn size(&self) -> u32 {
        self.inner.size()
    }

    fn exchange(
        &mut self,
        peer: Rank,
        payload: &[u8],
        mode: ExchangeMode,
    ) -> Result<Duration, TransportError> {
        if peer == self.rank() {
            return Err(TransportError::Protocol(format!(
                "rank {peer} cannot exchange with itself"
            )));
        }

        let key = LinkKey::new((self.rank(), peer));
        if self.profile.faulted.contains(&key) {
            return Err(TransportError::Timeout {
                peer,
                after: self.timeout,
            });
        }

        let link = self.profile.link(key);
        let one_way = self.transfer_time(link, payload.len() as u64);
        Ok(match mode {
            // the payload crosses the link twice
            ExchangeMode::RoundTrip | ExchangeMode::Echo => one_way * 2,
            ExchangeMode::Push | ExchangeMode::Pull => one_way,
        })
    }

    fn barrier(&mut self) -> Result<(), TransportError> {
        self.inner.barrier()
    }

    fn gather(
        &mut self,
        frame: Vec<u8>,
        root: Rank,
    ) -> Result<Option<Vec<Vec<u8>>>, TransportError> {
        self.inner.gather(frame, root)
    }
}
