use crate::{
    rank::Rank,
    transport::{ExchangeMode, Transport, TransportError},
};
use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    time::{Duration, Instant},
};

/// In-process transport: a full mesh of mpsc channels between ranks.
///
/// Each ordered rank pair gets its own channel, so collectives and
/// exchanges never demultiplex each other's frames — a rank's timeline is
/// sequential and every channel carries one protocol step at a time.
///
/// This is the single-host substrate: integration tests and smoke runs
/// drive one [`ChannelTransport`] per thread.
///
/// ```
/// # use ibvalid_core::transport::{ChannelTransport, Transport};
/// # use std::time::Duration;
/// let endpoints = ChannelTransport::mesh(4, Duration::from_secs(1));
/// assert_eq!(endpoints.len(), 4);
/// assert_eq!(endpoints[3].rank().index(), 3);
/// ```
pub struct ChannelTransport {
    rank: Rank,
    size: u32,
    timeout: Duration,
    /// senders towards each peer, `None` at our own slot
    outboxes: Vec<Option<Sender<Vec<u8>>>>,
    /// receivers from each peer, `None` at our own slot
    inboxes: Vec<Option<Receiver<Vec<u8>>>>,
}

impl ChannelTransport {
    /// Build the full mesh for `size` ranks, one endpoint per rank.
    ///
    /// Every blocking receive on any endpoint is bounded by `timeout`.
    pub fn mesh(size: u32, timeout: Duration) -> Vec<Self> {
        let n = size as usize;

        let mut outboxes: Vec<Vec<Option<Sender<Vec<u8>>>>> =
            (0..n).map(|_| (0..n).map(|_| None).collect()).collect();
        let mut inboxes: Vec<Vec<Option<Receiver<Vec<u8>>>>> =
            (0..n).map(|_| (0..n).map(|_| None).collect()).collect();

        for from in 0..n {
            for to in 0..n {
                if from == to {
                    continue;
                }
                let (tx, rx) = mpsc::channel();
                outboxes[from][to] = Some(tx);
                inboxes[to][from] = Some(rx);
            }
        }

        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| Self {
                rank: Rank::new(rank as u32),
                size,
                timeout,
                outboxes,
                inboxes,
            })
            .collect()
    }

    fn send_to(&self, peer: Rank, bytes: Vec<u8>) -> Result<(), TransportError> {
        let Some(tx) = self.outboxes.get(peer.index()).and_then(Option::as_ref) else {
            return Err(TransportError::Protocol(format!(
                "rank {} has no channel towards {peer}",
                self.rank
            )));
        };
        tx.send(bytes)
            .map_err(|_| TransportError::Disconnected { peer })
    }

    fn recv_from(&self, peer: Rank) -> Result<Vec<u8>, TransportError> {
        let Some(rx) = self.inboxes.get(peer.index()).and_then(Option::as_ref) else {
            return Err(TransportError::Protocol(format!(
                "rank {} has no channel from {peer}",
                self.rank
            )));
        };
        rx.recv_timeout(self.timeout).map_err(|error| match error {
            RecvTimeoutError::Timeout => TransportError::Timeout {
                peer,
                after: self.timeout,
            },
            RecvTimeoutError::Disconnected => TransportError::Disconnected { peer },
        })
    }
}

impl Transport for ChannelTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> u32 {
        self.size
    }

    fn exchange(
        &mut self,
        peer: Rank,
        payload: &[u8],
        mode: ExchangeMode,
    ) -> Result<Duration, TransportError> {
        if peer == self.rank {
            return Err(TransportError::Protocol(format!(
                "rank {peer} cannot exchange with itself"
            )));
        }

        let start = Instant::now();
        match mode {
            ExchangeMode::RoundTrip => {
                self.send_to(peer, payload.to_vec())?;
                let echoed = self.recv_from(peer)?;
                if echoed.len() != payload.len() {
                    return Err(TransportError::Protocol(format!(
                        "ping-pong echo from {peer} was {} bytes, expected {}",
                        echoed.len(),
                        payload.len()
                    )));
                }
            }
            ExchangeMode::Echo => {
                let inbound = self.recv_from(peer)?;
                self.send_to(peer, inbound)?;
            }
            ExchangeMode::Push => {
                self.send_to(peer, payload.to_vec())?;
                // wait for the drain acknowledgement so the elapsed time
                // covers the full transfer, not just the local enqueue
                let ack = self.recv_from(peer)?;
                if !ack.is_empty() {
                    return Err(TransportError::Protocol(format!(
                        "unexpected {} byte frame from {peer} in place of an ack",
                        ack.len()
                    )));
                }
            }
            ExchangeMode::Pull => {
                let inbound = self.recv_from(peer)?;
                if inbound.len() != payload.len() {
                    return Err(TransportError::Protocol(format!(
                        "stream from {peer} was {} bytes, expected {}",
                        inbound.len(),
                        payload.len()
                    )));
                }
                self.send_to(peer, Vec::new())?;
            }
        }
        Ok(start.elapsed())
    }

    fn barrier(&mut self) -> Result<(), TransportError> {
        let root = Rank::ZERO;
        if self.rank == root {
            for peer in (1..self.size).map(Rank::new) {
                self.recv_from(peer)?;
            }
            for peer in (1..self.size).map(Rank::new) {
                self.send_to(peer, Vec::new())?;
            }
        } else {
            self.send_to(root, Vec::new())?;
            self.recv_from(root)?;
        }
        Ok(())
    }

    fn gather(
        &mut self,
        frame: Vec<u8>,
        root: Rank,
    ) -> Result<Option<Vec<Vec<u8>>>, TransportError> {
        if self.rank == root {
            let mut frames: Vec<Vec<u8>> = Vec::with_capacity(self.size as usize);
            for peer in (0..self.size).map(Rank::new) {
                if peer == root {
                    frames.push(frame.clone());
                } else {
                    frames.push(self.recv_from(peer)?);
                }
            }
            Ok(Some(frames))
        } else {
            self.send_to(root, frame)?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[test]
    fn round_trip_and_echo() {
        let mut endpoints = ChannelTransport::mesh(2, TIMEOUT);
        let mut right = endpoints.pop().unwrap();
        let mut left = endpoints.pop().unwrap();

        let responder = thread::spawn(move || {
            right.exchange(Rank::ZERO, &[0u8; 16], ExchangeMode::Echo)
        });

        let elapsed = left
            .exchange(Rank::ONE, &[42u8; 16], ExchangeMode::RoundTrip)
            .unwrap();
        assert!(elapsed > Duration::ZERO);
        responder.join().unwrap().unwrap();
    }

    #[test]
    fn push_pull() {
        let mut endpoints = ChannelTransport::mesh(2, TIMEOUT);
        let mut right = endpoints.pop().unwrap();
        let mut left = endpoints.pop().unwrap();

        let payload = vec![7u8; 1 << 16];
        let expected = payload.len();

        let responder = thread::spawn(move || {
            right.exchange(Rank::ZERO, &vec![0u8; expected], ExchangeMode::Pull)
        });

        left.exchange(Rank::ONE, &payload, ExchangeMode::Push)
            .unwrap();
        responder.join().unwrap().unwrap();
    }

    #[test]
    fn exchange_with_dead_peer_times_out() {
        let mut endpoints = ChannelTransport::mesh(2, Duration::from_millis(50));
        // rank 1's endpoint is dropped: the channels close
        drop(endpoints.pop().unwrap());
        let mut left = endpoints.pop().unwrap();

        let err = left
            .exchange(Rank::ONE, &[0u8; 8], ExchangeMode::RoundTrip)
            .unwrap_err();
        assert!(
            matches!(
                err,
                TransportError::Disconnected { .. } | TransportError::Timeout { .. }
            ),
            "unexpected error {err:?}"
        );
    }

    #[test]
    fn exchange_with_silent_peer_times_out() {
        let mut endpoints = ChannelTransport::mesh(2, Duration::from_millis(50));
        let _silent = endpoints.pop().unwrap(); // alive, never answers
        let mut left = endpoints.pop().unwrap();

        let err = left
            .exchange(Rank::ONE, &[0u8; 8], ExchangeMode::RoundTrip)
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout { peer, .. } if peer == Rank::ONE));
    }

    #[test]
    fn self_exchange_is_a_protocol_error() {
        let mut endpoints = ChannelTransport::mesh(2, TIMEOUT);
        let err = endpoints[0]
            .exchange(Rank::ZERO, &[], ExchangeMode::RoundTrip)
            .unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[test]
    fn barrier_releases_everyone() {
        let endpoints = ChannelTransport::mesh(3, TIMEOUT);
        let handles: Vec<_> = endpoints
            .into_iter()
            .map(|mut endpoint| thread::spawn(move || endpoint.barrier()))
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
    }

    #[test]
    fn gather_collects_in_rank_order() {
        let endpoints = ChannelTransport::mesh(3, TIMEOUT);
        let handles: Vec<_> = endpoints
            .into_iter()
            .map(|mut endpoint| {
                thread::spawn(move || {
                    let frame = vec![endpoint.rank().index() as u8];
                    endpoint.gather(frame, Rank::ZERO)
                })
            })
            .collect();

        let mut results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect();

        let root_frames = results.remove(0).expect("root sees all frames");
        assert_eq!(root_frames, vec![vec![0u8], vec![1u8], vec![2u8]]);
        assert!(results.iter().all(Option::is_none));
    }
}
