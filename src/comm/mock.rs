//! Scripted communicator for testing
//!
//! `ScriptedComm` plays one peer of a group whose other members are replaced
//! by a script: inbound messages are queued up front, and every send is
//! recorded for later inspection. Nothing blocks; a receive that the script
//! cannot satisfy is an error, so a test that under-scripts a role fails
//! instead of hanging.
//!
//! # Example
//!
//! ```
//! use coordwork::comm::{Communicator, mock::ScriptedComm};
//! use coordwork::protocol::{Envelope, Source, Tag, TagFilter};
//!
//! # tokio_test_block_on(async {
//! let mut comm = ScriptedComm::new(0, 4);
//! comm.push_inbound(Envelope::new(3, 0, Tag::DoWork, Some(3)));
//!
//! comm.send(2, Tag::DoWork, Some(10)).await?;
//! let env = comm.recv(Source::Any, TagFilter::Any).await?;
//!
//! assert_eq!(env.source, 3);
//! assert_eq!(comm.sent().len(), 1);
//! # Ok::<(), anyhow::Error>(())
//! # }).unwrap();
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use super::{check_dest, Communicator};
use crate::protocol::{Envelope, Rank, Source, Tag, TagFilter};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;

/// Communicator driven by a fixed inbound script
#[derive(Debug, Clone)]
pub struct ScriptedComm {
    rank: Rank,
    size: usize,
    inbound: VecDeque<Envelope>,
    sent: Vec<Envelope>,
    barriers: usize,
}

impl ScriptedComm {
    pub fn new(rank: Rank, size: usize) -> Self {
        Self {
            rank,
            size,
            inbound: VecDeque::new(),
            sent: Vec::new(),
            barriers: 0,
        }
    }

    /// Queue one inbound message
    pub fn push_inbound(&mut self, env: Envelope) {
        self.inbound.push_back(env);
    }

    /// Queue a DO_WORK message from `source` to this peer
    pub fn push_do_work(&mut self, source: Rank, payload: i64) {
        self.push_inbound(Envelope::new(source, self.rank, Tag::DoWork, Some(payload)));
    }

    /// Queue a STOP_WORK message from `source` to this peer
    pub fn push_stop_work(&mut self, source: Rank) {
        self.push_inbound(Envelope::new(source, self.rank, Tag::StopWork, None));
    }

    /// Every message sent so far, in send order
    pub fn sent(&self) -> &[Envelope] {
        &self.sent
    }

    /// Messages sent to one destination, in send order
    pub fn sent_to(&self, dest: Rank) -> Vec<&Envelope> {
        self.sent.iter().filter(|env| env.dest == dest).collect()
    }

    /// Inbound messages the role never consumed
    pub fn unread(&self) -> usize {
        self.inbound.len()
    }

    pub fn barrier_count(&self) -> usize {
        self.barriers
    }
}

#[async_trait]
impl Communicator for ScriptedComm {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    async fn send(&mut self, dest: Rank, tag: Tag, payload: Option<i64>) -> Result<()> {
        check_dest(self.rank, dest, self.size)?;
        self.sent.push(Envelope::new(self.rank, dest, tag, payload));
        Ok(())
    }

    async fn recv(&mut self, source: Source, tag: TagFilter) -> Result<Envelope> {
        let pos = self
            .inbound
            .iter()
            .position(|env| source.matches(env.source) && tag.matches(env.tag));

        pos.and_then(|pos| self.inbound.remove(pos)).ok_or_else(|| {
            anyhow::anyhow!(
                "Rank {}: script has no message matching {:?}/{:?}",
                self.rank,
                source,
                tag
            )
        })
    }

    async fn barrier(&mut self) -> Result<()> {
        self.barriers += 1;
        Ok(())
    }
}
