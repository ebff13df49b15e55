//! TCP peer group
//!
//! Each peer process listens on its own address and builds a full mesh:
//! it accepts links from every higher rank and connects to every lower rank.
//! The connecting side opens the link with a HELLO frame naming its rank.
//!
//! # Link Tasks
//!
//! The read half of every link is drained by a reader task. DATA frames go to
//! the peer's mailbox, barrier frames to a separate queue so barrier traffic
//! never mixes with protocol messages. Write halves are owned by the
//! `TcpComm` and written directly by `send`.
//!
//! # Barrier
//!
//! Rank 0 is the barrier root: every other rank sends BARRIER_ENTER to it and
//! waits for BARRIER_RELEASE, which rank 0 sends once all peers have entered.

use super::{check_dest, Communicator, Mailbox};
use crate::protocol::wire::{read_frame, write_frame, Frame, HelloFrame, PROTOCOL_VERSION};
use crate::protocol::{Envelope, ProtocolError, Rank, Source, Tag, TagFilter, RANK_COORD};
use crate::Result;
use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, trace};

/// Delay between connection attempts to a peer that is not listening yet
const CONNECT_RETRY: Duration = Duration::from_millis(50);

/// One peer of a TCP group
pub struct TcpComm {
    rank: Rank,
    size: usize,
    /// Write half of the link to every other peer (`None` at our own rank)
    writers: Vec<Option<OwnedWriteHalf>>,
    mailbox: Mailbox,
    barrier_rx: mpsc::UnboundedReceiver<(Rank, Frame)>,
    readers: Vec<JoinHandle<()>>,
}

impl TcpComm {
    /// Join the group described by `hosts` as `rank`
    ///
    /// `hosts[r]` is the `host:port` address of rank `r`. Returns once a link
    /// to every other peer is up, or fails after `connect_timeout`.
    pub async fn connect(rank: Rank, hosts: &[String], connect_timeout: Duration) -> Result<Self> {
        let size = hosts.len();
        if rank >= size {
            return Err(ProtocolError::RankOutOfRange { rank, size }.into());
        }

        let port = listen_port(&hosts[rank])?;
        let listener = TcpListener::bind(("0.0.0.0", port)).await
            .with_context(|| format!("Rank {}: failed to bind port {}", rank, port))?;
        debug!(rank, port, "listening for peers");

        let deadline = Instant::now() + connect_timeout;

        let accept = accept_higher(&listener, rank, size);
        let connect = connect_lower(rank, hosts, deadline);
        let (accepted, connected) = timeout(connect_timeout, async { tokio::try_join!(accept, connect) })
            .await
            .with_context(|| format!("Rank {}: timed out building peer links", rank))??;

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (barrier_tx, barrier_rx) = mpsc::unbounded_channel();

        let mut writers: Vec<Option<OwnedWriteHalf>> = (0..size).map(|_| None).collect();
        let mut readers = Vec::with_capacity(size.saturating_sub(1));

        for (peer, stream) in accepted.into_iter().chain(connected) {
            stream.set_nodelay(true)
                .with_context(|| format!("Rank {}: failed to configure link to {}", rank, peer))?;
            let (read_half, write_half) = stream.into_split();
            writers[peer] = Some(write_half);
            readers.push(tokio::spawn(read_link(
                rank,
                peer,
                read_half,
                inbox_tx.clone(),
                barrier_tx.clone(),
            )));
        }

        debug!(rank, links = readers.len(), "peer group connected");

        Ok(Self {
            rank,
            size,
            writers,
            mailbox: Mailbox::new(rank, inbox_rx),
            barrier_rx,
            readers,
        })
    }

    async fn write_to(&mut self, dest: Rank, frame: &Frame) -> Result<()> {
        let rank = self.rank;
        let writer = self
            .writers
            .get_mut(dest)
            .and_then(Option::as_mut)
            .ok_or_else(|| anyhow::anyhow!("Rank {}: no link to rank {}", rank, dest))?;

        write_frame(writer, frame).await
            .with_context(|| format!("Rank {}: failed to send to rank {}", rank, dest))
    }

    async fn next_barrier_frame(&mut self) -> Result<(Rank, Frame)> {
        self.barrier_rx.recv().await.ok_or_else(|| {
            anyhow::anyhow!("Rank {}: peer group disconnected during barrier", self.rank)
        })
    }
}

impl fmt::Debug for TcpComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .field("links", &self.writers.iter().filter(|w| w.is_some()).count())
            .field("pending", &self.mailbox.pending())
            .finish()
    }
}

impl Drop for TcpComm {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

#[async_trait]
impl Communicator for TcpComm {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    async fn send(&mut self, dest: Rank, tag: Tag, payload: Option<i64>) -> Result<()> {
        check_dest(self.rank, dest, self.size)?;
        trace!(from = self.rank, to = dest, %tag, ?payload, "send");

        let frame = Frame::Data(Envelope::new(self.rank, dest, tag, payload));
        self.write_to(dest, &frame).await
    }

    async fn recv(&mut self, source: Source, tag: TagFilter) -> Result<Envelope> {
        self.mailbox.recv(source, tag).await
    }

    async fn barrier(&mut self) -> Result<()> {
        if self.rank != RANK_COORD {
            self.write_to(RANK_COORD, &Frame::BarrierEnter { rank: self.rank }).await?;
            return match self.next_barrier_frame().await? {
                (RANK_COORD, Frame::BarrierRelease) => Ok(()),
                (peer, frame) => {
                    anyhow::bail!("Rank {}: unexpected barrier frame from {}: {:?}", self.rank, peer, frame)
                }
            };
        }

        let mut entered = HashSet::new();
        while entered.len() < self.size - 1 {
            match self.next_barrier_frame().await? {
                (peer, Frame::BarrierEnter { rank }) if rank == peer => {
                    entered.insert(peer);
                }
                (peer, frame) => {
                    anyhow::bail!("Rank {}: unexpected barrier frame from {}: {:?}", self.rank, peer, frame)
                }
            }
        }

        for peer in 1..self.size {
            self.write_to(peer, &Frame::BarrierRelease).await?;
        }
        Ok(())
    }
}

/// Port component of a `host:port` address
fn listen_port(addr: &str) -> Result<u16> {
    let (_, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("Address '{}' has no port", addr))?;
    port.parse()
        .with_context(|| format!("Invalid port in address '{}'", addr))
}

/// Accept one link from every rank above ours
async fn accept_higher(listener: &TcpListener, rank: Rank, size: usize) -> Result<Vec<(Rank, TcpStream)>> {
    let expected = size - rank - 1;
    let mut links: Vec<(Rank, TcpStream)> = Vec::with_capacity(expected);

    while links.len() < expected {
        let (mut stream, addr) = listener.accept().await
            .with_context(|| format!("Rank {}: failed to accept peer link", rank))?;

        let hello = match read_frame(&mut stream).await? {
            Frame::Hello(hello) => hello,
            other => anyhow::bail!("Rank {}: expected HELLO from {}, got {:?}", rank, addr, other),
        };

        if hello.protocol_version != PROTOCOL_VERSION {
            anyhow::bail!(
                "Protocol version mismatch: peer {}={}, rank {}={}",
                hello.rank, hello.protocol_version, rank, PROTOCOL_VERSION
            );
        }
        if hello.group_size != size {
            anyhow::bail!(
                "Group size mismatch: peer {} has {}, rank {} has {}",
                hello.rank, hello.group_size, rank, size
            );
        }
        if hello.rank <= rank || hello.rank >= size || links.iter().any(|(peer, _)| *peer == hello.rank) {
            anyhow::bail!("Rank {}: unexpected link from rank {} ({})", rank, hello.rank, addr);
        }

        debug!(rank, peer = hello.rank, %addr, "accepted peer link");
        links.push((hello.rank, stream));
    }

    Ok(links)
}

/// Open one link to every rank below ours
async fn connect_lower(rank: Rank, hosts: &[String], deadline: Instant) -> Result<Vec<(Rank, TcpStream)>> {
    let mut links = Vec::with_capacity(rank);

    for (peer, addr) in hosts.iter().enumerate().take(rank) {
        let mut stream = loop {
            match TcpStream::connect(addr.as_str()).await {
                Ok(stream) => break stream,
                Err(e) if Instant::now() < deadline => {
                    trace!(rank, peer, error = %e, "peer not reachable yet");
                    sleep(CONNECT_RETRY).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Rank {}: failed to connect to rank {} at {}", rank, peer, addr));
                }
            }
        };

        let hello = Frame::Hello(HelloFrame {
            protocol_version: PROTOCOL_VERSION,
            rank,
            group_size: hosts.len(),
        });
        write_frame(&mut stream, &hello).await?;

        debug!(rank, peer, %addr, "connected to peer");
        links.push((peer, stream));
    }

    Ok(links)
}

/// Drain one link until it closes
async fn read_link(
    rank: Rank,
    peer: Rank,
    mut read_half: OwnedReadHalf,
    inbox: mpsc::UnboundedSender<Envelope>,
    barrier: mpsc::UnboundedSender<(Rank, Frame)>,
) {
    loop {
        let frame = match read_frame(&mut read_half).await {
            Ok(frame) => frame,
            Err(e) => {
                debug!(rank, peer, error = %e, "link closed");
                return;
            }
        };

        let delivered = match frame {
            Frame::Data(env) if env.source == peer && env.dest == rank => inbox.send(env).is_ok(),
            Frame::Data(env) => {
                debug!(rank, peer, ?env, "dropping misaddressed message, closing link");
                return;
            }
            frame @ (Frame::BarrierEnter { .. } | Frame::BarrierRelease) => barrier.send((peer, frame)).is_ok(),
            Frame::Hello(hello) => {
                debug!(rank, peer, ?hello, "unexpected HELLO on open link, closing");
                return;
            }
        };

        if !delivered {
            return;
        }
    }
}
