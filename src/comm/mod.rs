//! Messaging substrate
//!
//! This module defines the contract every role relies on: a fixed-size group
//! of addressable peers that can send tagged messages to one another, receive
//! with exact or wildcard matching, and meet at a final barrier.
//!
//! # Implementations
//!
//! - `local`: every peer is a tokio task in one process, links are channels
//! - `tcp`: every peer is a process, links are TCP streams (full mesh)
//! - `mock`: scripted inbound messages for deterministic role tests
//!
//! # Ordering
//!
//! Messages between one ordered pair of peers arrive in send order. Nothing is
//! promised across different pairs. Both real substrates get this from using a
//! single FIFO link per pair feeding a single per-peer inbox.
//!
//! # Matching
//!
//! `recv` returns the oldest message that matches the filter. Messages that
//! arrive earlier but do not match stay in the mailbox backlog, in arrival
//! order, for later receives.

pub mod local;
pub mod mock;
pub mod tcp;

use crate::protocol::{self, Envelope, ProtocolError, Rank, Source, Tag, TagFilter};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::ops::Range;
use tokio::sync::mpsc;
use tracing::trace;

/// Point-to-point messaging between peers of a fixed-size group
///
/// Every method failure is fatal to the caller's role; there is no retry.
#[async_trait]
pub trait Communicator: Send {
    /// Address of this peer
    fn rank(&self) -> Rank;

    /// Number of peers in the group
    fn size(&self) -> usize;

    fn worker_count(&self) -> usize {
        protocol::worker_count(self.size())
    }

    fn worker_ranks(&self) -> Range<Rank> {
        protocol::worker_ranks(self.size())
    }

    /// Send a tagged message to `dest`
    ///
    /// Returns once the message is handed to the substrate, not when the
    /// receiver has processed it.
    async fn send(&mut self, dest: Rank, tag: Tag, payload: Option<i64>) -> Result<()>;

    /// Block until a message matching `source` and `tag` arrives
    async fn recv(&mut self, source: Source, tag: TagFilter) -> Result<Envelope>;

    /// Block until every peer in the group has entered the barrier
    async fn barrier(&mut self) -> Result<()>;
}

/// Check that `dest` is a valid destination for a send from `rank`
pub(crate) fn check_dest(rank: Rank, dest: Rank, size: usize) -> Result<()> {
    if dest >= size {
        return Err(ProtocolError::RankOutOfRange { rank: dest, size }.into());
    }
    if dest == rank {
        anyhow::bail!("Rank {} cannot send to itself", rank);
    }
    Ok(())
}

/// Inbound message queue of one peer
///
/// Wraps the peer's inbox channel with a backlog of messages that arrived
/// before anyone asked for them.
pub struct Mailbox {
    rank: Rank,
    inbound: mpsc::UnboundedReceiver<Envelope>,
    backlog: VecDeque<Envelope>,
}

impl Mailbox {
    pub fn new(rank: Rank, inbound: mpsc::UnboundedReceiver<Envelope>) -> Self {
        Self {
            rank,
            inbound,
            backlog: VecDeque::new(),
        }
    }

    /// Oldest message matching the filter, waiting for one if needed
    ///
    /// Fails when every sender feeding this mailbox is gone and nothing in the
    /// backlog matches.
    pub async fn recv(&mut self, source: Source, tag: TagFilter) -> Result<Envelope> {
        let queued = self
            .backlog
            .iter()
            .position(|env| source.matches(env.source) && tag.matches(env.tag));
        if let Some(env) = queued.and_then(|pos| self.backlog.remove(pos)) {
            return Ok(env);
        }

        loop {
            let env = self.inbound.recv().await.ok_or_else(|| {
                anyhow::anyhow!(
                    "Rank {}: peer group disconnected while waiting for {:?}/{:?}",
                    self.rank,
                    source,
                    tag
                )
            })?;

            if source.matches(env.source) && tag.matches(env.tag) {
                return Ok(env);
            }

            trace!(rank = self.rank, from = env.source, tag = %env.tag, "deferring message");
            self.backlog.push_back(env);
        }
    }

    /// Number of messages received but not yet matched
    pub fn pending(&self) -> usize {
        self.backlog.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailbox() -> (mpsc::UnboundedSender<Envelope>, Mailbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Mailbox::new(1, rx))
    }

    #[tokio::test]
    async fn test_wildcard_takes_arrival_order() {
        let (tx, mut mailbox) = mailbox();
        tx.send(Envelope::new(3, 1, Tag::DoWork, Some(30))).unwrap();
        tx.send(Envelope::new(2, 1, Tag::DoWork, Some(20))).unwrap();

        let first = mailbox.recv(Source::Any, TagFilter::Any).await.unwrap();
        let second = mailbox.recv(Source::Any, TagFilter::Any).await.unwrap();

        assert_eq!(first.payload, Some(30));
        assert_eq!(second.payload, Some(20));
    }

    #[tokio::test]
    async fn test_non_matching_messages_wait_in_backlog() {
        let (tx, mut mailbox) = mailbox();
        tx.send(Envelope::new(2, 1, Tag::DoWork, Some(1))).unwrap();
        tx.send(Envelope::new(3, 1, Tag::StopWork, None)).unwrap();
        tx.send(Envelope::new(2, 1, Tag::DoWork, Some(2))).unwrap();

        let stop = mailbox.recv(Source::Any, TagFilter::Only(Tag::StopWork)).await.unwrap();
        assert_eq!(stop.source, 3);
        assert_eq!(mailbox.pending(), 1);

        // Backlog is served before the channel, in arrival order
        let a = mailbox.recv(Source::Rank(2), TagFilter::Any).await.unwrap();
        let b = mailbox.recv(Source::Rank(2), TagFilter::Any).await.unwrap();
        assert_eq!(a.payload, Some(1));
        assert_eq!(b.payload, Some(2));
        assert_eq!(mailbox.pending(), 0);
    }

    #[tokio::test]
    async fn test_disconnected_group() {
        let (tx, mut mailbox) = mailbox();
        tx.send(Envelope::new(2, 1, Tag::DoWork, Some(1))).unwrap();
        drop(tx);

        // Queued message is still delivered, then the closed inbox is reported
        assert!(mailbox.recv(Source::Any, TagFilter::Any).await.is_ok());
        let err = mailbox.recv(Source::Any, TagFilter::Any).await.unwrap_err();
        assert!(err.to_string().contains("disconnected"));
    }

    #[test]
    fn test_check_dest() {
        assert!(check_dest(0, 2, 4).is_ok());
        assert!(check_dest(0, 0, 4).is_err());

        let err = check_dest(0, 4, 4).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ProtocolError>(),
            Some(&ProtocolError::RankOutOfRange { rank: 4, size: 4 })
        );
    }
}
