use crate::launcher::LaunchEnv;
use anyhow::{Context as _, Result, anyhow};
use ibvalid_core::{ExchangeMode, Rank, Transport, TransportError};
use std::{
    io::{self, Read as _, Write as _},
    net::{TcpListener, TcpStream},
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, info};

/// How long the mesh setup keeps redialing peers whose listener is not
/// up yet. Launchers do not start every process at the same instant.
const CONNECT_GRACE: Duration = Duration::from_secs(30);

const DIAL_RETRY: Duration = Duration::from_millis(100);

/// Full-mesh TCP transport between launcher-started processes.
///
/// Rank `r` listens on `base_port + r` and dials every higher rank;
/// each dialer introduces itself with its rank so the acceptor can file
/// the stream. Frames are length-prefixed byte blobs, every socket read
/// and write is bounded by the configured timeout, and `TCP_NODELAY` is
/// set so latency probes measure the fabric rather than Nagle's
/// algorithm.
pub struct TcpMesh {
    rank: Rank,
    size: u32,
    timeout: Duration,
    /// streams towards each peer, `None` at our own slot
    peers: Vec<Option<TcpStream>>,
}

impl TcpMesh {
    /// Establish the mesh described by the launcher environment.
    ///
    /// Blocks until every pairwise connection exists or the connect
    /// grace period runs out.
    pub fn connect(env: &LaunchEnv, timeout: Duration) -> Result<Self> {
        let rank = env.rank;
        let size = env.size;
        let n = size as usize;

        let listener = TcpListener::bind(("0.0.0.0", env.base_port + rank.index() as u16))
            .with_context(|| format!("binding listener for rank {rank}"))?;

        let mut peers: Vec<Option<TcpStream>> = (0..n).map(|_| None).collect();

        // dial every higher rank; accept from every lower rank
        for peer in rank.index() + 1..n {
            let address = format!("{}:{}", env.hosts[peer], env.base_port + peer as u16);
            let stream = dial(&address)
                .with_context(|| format!("dialing rank {peer} at {address}"))?;
            let hello = (rank.index() as u32).to_be_bytes();
            (&stream)
                .write_all(&hello)
                .with_context(|| format!("introducing ourselves to rank {peer}"))?;
            peers[peer] = Some(stream);
            debug!(%rank, peer, "dialed");
        }
        listener
            .set_nonblocking(true)
            .context("making the listener pollable")?;
        let deadline = Instant::now() + CONNECT_GRACE;
        let mut accepted = 0;
        while accepted < rank.index() {
            let (stream, remote) = match listener.accept() {
                Ok(connection) => connection,
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(anyhow!(
                            "only {accepted} of {} lower ranks dialed in within {CONNECT_GRACE:?}",
                            rank.index()
                        ));
                    }
                    thread::sleep(DIAL_RETRY);
                    continue;
                }
                Err(error) => return Err(error).context("accepting a peer"),
            };
            stream
                .set_nonblocking(false)
                .context("making the accepted stream blocking")?;
            let mut hello = [0u8; 4];
            (&stream)
                .read_exact(&mut hello)
                .with_context(|| format!("reading the introduction from {remote}"))?;
            let peer = u32::from_be_bytes(hello) as usize;
            if peer >= n || peers[peer].is_some() {
                return Err(anyhow!("{remote} introduced itself as bogus rank {peer}"));
            }
            peers[peer] = Some(stream);
            accepted += 1;
            debug!(%rank, peer, "accepted");
        }

        for stream in peers.iter().flatten() {
            stream.set_nodelay(true).context("setting TCP_NODELAY")?;
            stream
                .set_read_timeout(Some(timeout))
                .context("setting read timeout")?;
            stream
                .set_write_timeout(Some(timeout))
                .context("setting write timeout")?;
        }

        info!(%rank, size, "mesh established");
        Ok(Self {
            rank,
            size,
            timeout,
            peers,
        })
    }

    fn stream(&mut self, peer: Rank) -> Result<&mut TcpStream, TransportError> {
        self.peers
            .get_mut(peer.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| {
                TransportError::Protocol(format!("no connection towards rank {peer}"))
            })
    }

    fn send_frame(&mut self, peer: Rank, bytes: &[u8]) -> Result<(), TransportError> {
        let timeout = self.timeout;
        let stream = self.stream(peer)?;
        let result = (|| {
            stream.write_all(&(bytes.len() as u32).to_be_bytes())?;
            stream.write_all(bytes)
        })();
        result.map_err(|error| {
            let error = io_error(peer, error, timeout);
            // a stream that failed mid-frame is out of sync; a late
            // frame must never be misread as a later protocol step
            self.peers[peer.index()] = None;
            error
        })
    }

    fn recv_frame(&mut self, peer: Rank) -> Result<Vec<u8>, TransportError> {
        let timeout = self.timeout;
        let stream = self.stream(peer)?;
        let result = (|| {
            let mut header = [0u8; 4];
            stream.read_exact(&mut header)?;
            let mut frame = vec![0u8; u32::from_be_bytes(header) as usize];
            stream.read_exact(&mut frame)?;
            io::Result::Ok(frame)
        })();
        result.map_err(|error| {
            let error = io_error(peer, error, timeout);
            self.peers[peer.index()] = None;
            error
        })
    }
}

fn dial(address: &str) -> Result<TcpStream> {
    let deadline = Instant::now() + CONNECT_GRACE;
    loop {
        match TcpStream::connect(address) {
            Ok(stream) => return Ok(stream),
            Err(error) if Instant::now() < deadline => {
                debug!(address, %error, "peer not up yet, retrying");
                thread::sleep(DIAL_RETRY);
            }
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("no listener at {address} after {CONNECT_GRACE:?}"));
            }
        }
    }
}

fn io_error(peer: Rank, error: io::Error, timeout: Duration) -> TransportError {
    match error.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::Timeout {
            peer,
            after: timeout,
        },
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => TransportError::Disconnected { peer },
        _ => TransportError::Protocol(error.to_string()),
    }
}

impl Transport for TcpMesh {
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
                self.send_frame(peer, payload)?;
                let echoed = self.recv_frame(peer)?;
                if echoed.len() != payload.len() {
                    return Err(TransportError::Protocol(format!(
                        "ping-pong echo from {peer} was {} bytes, expected {}",
                        echoed.len(),
                        payload.len()
                    )));
                }
            }
            ExchangeMode::Echo => {
                let inbound = self.recv_frame(peer)?;
                self.send_frame(peer, &inbound)?;
            }
            ExchangeMode::Push => {
                self.send_frame(peer, payload)?;
                // wait for the drain acknowledgement so the elapsed time
                // covers the full transfer, not just the local write
                let ack = self.recv_frame(peer)?;
                if !ack.is_empty() {
                    return Err(TransportError::Protocol(format!(
                        "unexpected {} byte frame from {peer} in place of an ack",
                        ack.len()
                    )));
                }
            }
            ExchangeMode::Pull => {
                let inbound = self.recv_frame(peer)?;
                if inbound.len() != payload.len() {
                    return Err(TransportError::Protocol(format!(
                        "stream from {peer} was {} bytes, expected {}",
                        inbound.len(),
                        payload.len()
                    )));
                }
                self.send_frame(peer, &[])?;
            }
        }
        Ok(start.elapsed())
    }

    fn barrier(&mut self) -> Result<(), TransportError> {
        let root = Rank::ZERO;
        if self.rank == root {
            for peer in (1..self.size).map(Rank::new) {
                self.recv_frame(peer)?;
            }
            for peer in (1..self.size).map(Rank::new) {
                self.send_frame(peer, &[])?;
            }
        } else {
            self.send_frame(root, &[])?;
            self.recv_frame(root)?;
        }
        Ok(())
    }

    fn gather(
        &mut self,
        frame: Vec<u8>,
        root: Rank,
    ) -> Result<Option<Vec<Vec<u8>>>, TransportError> {
        if self.rank == root {
            let mut frames = Vec::with_capacity(self.size as usize);
            for peer in (0..self.size).map(Rank::new) {
                if peer == root {
                    frames.push(frame.clone());
                } else {
                    frames.push(self.recv_frame(peer)?);
                }
            }
            Ok(Some(frames))
        } else {
            self.send_frame(root, &frame)?;
            Ok(None)
        }
    }
}
