//! In-process peer group
//!
//! Every peer owns a `LocalComm`. Each peer has one unbounded inbox channel;
//! every other peer holds a sender to it. A single channel per receiver keeps
//! per-pair FIFO order, and unbounded channels keep sends fire-and-forget.

use super::{check_dest, Communicator, Mailbox};
use crate::protocol::{Envelope, Rank, Source, Tag, TagFilter};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Barrier};
use tracing::trace;

/// One peer of an in-process group
pub struct LocalComm {
    rank: Rank,
    size: usize,
    /// Senders to every other peer's inbox (`None` at our own rank)
    peers: Vec<Option<mpsc::UnboundedSender<Envelope>>>,
    mailbox: Mailbox,
    barrier: Arc<Barrier>,
}

/// Build a group of `size` connected peers, returned in rank order
pub fn local_group(size: usize) -> Result<Vec<LocalComm>> {
    if size == 0 {
        anyhow::bail!("Peer group must have at least one member");
    }

    let (senders, receivers): (Vec<_>, Vec<_>) =
        (0..size).map(|_| mpsc::unbounded_channel::<Envelope>()).unzip();
    let barrier = Arc::new(Barrier::new(size));

    let group = receivers
        .into_iter()
        .enumerate()
        .map(|(rank, inbound)| {
            let peers = senders
                .iter()
                .enumerate()
                .map(|(peer, tx)| (peer != rank).then(|| tx.clone()))
                .collect();

            LocalComm {
                rank,
                size,
                peers,
                mailbox: Mailbox::new(rank, inbound),
                barrier: Arc::clone(&barrier),
            }
        })
        .collect();

    Ok(group)
}

#[async_trait]
impl Communicator for LocalComm {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    async fn send(&mut self, dest: Rank, tag: Tag, payload: Option<i64>) -> Result<()> {
        check_dest(self.rank, dest, self.size)?;

        let tx = self.peers.get(dest).and_then(Option::as_ref).ok_or_else(|| {
            anyhow::anyhow!("Rank {}: no link to rank {}", self.rank, dest)
        })?;

        trace!(from = self.rank, to = dest, %tag, ?payload, "send");
        tx.send(Envelope::new(self.rank, dest, tag, payload))
            .map_err(|_| anyhow::anyhow!("Rank {}: peer {} has exited", self.rank, dest))
    }

    async fn recv(&mut self, source: Source, tag: TagFilter) -> Result<Envelope> {
        self.mailbox.recv(source, tag).await
    }

    async fn barrier(&mut self) -> Result<()> {
        self.barrier.wait().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_group_ranks() {
        let group = local_group(4).unwrap();
        assert_eq!(group.len(), 4);
        for (i, comm) in group.iter().enumerate() {
            assert_eq!(comm.rank(), i);
            assert_eq!(comm.size(), 4);
            assert_eq!(comm.worker_count(), 2);
        }
        assert!(local_group(0).is_err());
    }

    #[tokio::test]
    async fn test_fifo_per_pair() {
        let mut group = local_group(3).unwrap();
        let mut receiver = group.remove(1);
        let mut sender = group.remove(1);

        let sender_task = tokio::spawn(async move {
            for i in 0..500 {
                sender.send(1, Tag::DoWork, Some(i)).await.unwrap();
            }
            sender.send(1, Tag::StopWork, None).await.unwrap();
            sender
        });

        // The STOP_WORK sent last can never overtake a result sent earlier
        for expected in 0..500 {
            let env = receiver.recv(Source::Rank(2), TagFilter::Any).await.unwrap();
            assert_eq!(env.tag, Tag::DoWork);
            assert_eq!(env.payload, Some(expected));
        }
        let env = receiver.recv(Source::Rank(2), TagFilter::Any).await.unwrap();
        assert_eq!(env.tag, Tag::StopWork);

        sender_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_to_self_rejected() {
        let mut group = local_group(3).unwrap();
        assert!(group[0].send(0, Tag::DoWork, Some(1)).await.is_err());
        assert!(group[0].send(3, Tag::DoWork, Some(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_send_to_exited_peer() {
        let mut group = local_group(3).unwrap();
        group.truncate(2);

        // Rank 2 was dropped, its inbox is closed
        assert!(group[0].send(2, Tag::DoWork, Some(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_barrier_waits_for_everyone() {
        let mut group = local_group(3).unwrap();
        let mut last = group.pop().unwrap();

        let early: Vec<_> = group
            .into_iter()
            .map(|mut comm| tokio::spawn(async move { comm.barrier().await.unwrap() }))
            .collect();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(early.iter().all(|handle| !handle.is_finished()));

        last.barrier().await.unwrap();
        for handle in early {
            handle.await.unwrap();
        }
    }
}
