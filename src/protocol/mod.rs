//! Message-tag protocol
//!
//! This module defines the vocabulary shared by every role: peer addresses
//! (ranks), message tags, the envelope a message travels in, and the filters a
//! receive operation matches against.
//!
//! # Roles by Address
//!
//! ```text
//! rank 0        Coordinator   hands out work items, stops workers
//! rank 1        Writer        collects results, counts done signals
//! rank 2..N-1   Workers       compute results, report availability
//! ```
//!
//! # Message Flow
//!
//! ```text
//! Coordinator            Worker r                 Writer
//!     |--- DO_WORK(item) --->|                       |
//!     |                      |--- DO_WORK(result) -->|
//!     |<-- DO_WORK(r) -------|                       |
//!     |        ...           |                       |
//!     |--- STOP_WORK ------->|                       |
//!     |                      |--- STOP_WORK -------->|
//! ```
//!
//! The tag alone tells the receiver how to read the payload. A DO_WORK
//! payload is a work item, a result or an availability signal depending on
//! who receives it; STOP_WORK never carries a payload.

pub mod wire;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use thiserror::Error;

/// Address of one participant in the peer group
pub type Rank = usize;

/// Coordinator address
pub const RANK_COORD: Rank = 0;

/// Writer address
pub const RANK_WRITE: Rank = 1;

/// Number of addresses reserved for non-worker roles
pub const N_NON_WORKERS: usize = 2;

/// Smallest group that contains at least one worker
pub const MIN_GROUP_SIZE: usize = N_NON_WORKERS + 1;

/// Message classifier
///
/// Encoded on the wire as its integer code (1 = DO_WORK, 2 = STOP_WORK).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Tag {
    /// Work item, result, or availability signal depending on the receiver
    DoWork,
    /// End of work for a worker, or a worker's done signal to the writer
    StopWork,
}

impl Tag {
    /// Integer code used on the wire
    pub fn code(self) -> u8 {
        match self {
            Tag::DoWork => 1,
            Tag::StopWork => 2,
        }
    }
}

impl From<Tag> for u8 {
    fn from(tag: Tag) -> Self {
        tag.code()
    }
}

impl TryFrom<u8> for Tag {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Tag::DoWork),
            2 => Ok(Tag::StopWork),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::DoWork => write!(f, "DO_WORK"),
            Tag::StopWork => write!(f, "STOP_WORK"),
        }
    }
}

/// One message in transit
///
/// Envelopes are ephemeral: they are built by `send`, handed to the
/// substrate, and consumed by exactly one `recv` on the destination peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sending peer
    pub source: Rank,
    /// Receiving peer
    pub dest: Rank,
    /// Message classifier
    pub tag: Tag,
    /// Integer payload, `None` for STOP_WORK
    pub payload: Option<i64>,
}

impl Envelope {
    pub fn new(source: Rank, dest: Rank, tag: Tag, payload: Option<i64>) -> Self {
        Self {
            source,
            dest,
            tag,
            payload,
        }
    }

    /// Payload of a message that must carry one
    pub fn require_payload(&self) -> Result<i64, ProtocolError> {
        self.payload.ok_or(ProtocolError::MissingPayload {
            tag: self.tag,
            sender: self.source,
        })
    }
}

/// Source side of a receive filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Match any sender
    Any,
    /// Match one sender
    Rank(Rank),
}

impl Source {
    pub fn matches(self, source: Rank) -> bool {
        match self {
            Source::Any => true,
            Source::Rank(rank) => rank == source,
        }
    }
}

/// Tag side of a receive filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFilter {
    /// Match any tag
    Any,
    /// Match one tag
    Only(Tag),
}

impl TagFilter {
    pub fn matches(self, tag: Tag) -> bool {
        match self {
            TagFilter::Any => true,
            TagFilter::Only(expected) => expected == tag,
        }
    }
}

/// Role a peer plays, decided by its address alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Coordinator,
    Writer,
    Worker,
}

impl Role {
    /// Map a peer address to its role
    pub fn for_rank(rank: Rank) -> Self {
        match rank {
            RANK_COORD => Role::Coordinator,
            RANK_WRITE => Role::Writer,
            _ => Role::Worker,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Coordinator => write!(f, "coordinator"),
            Role::Writer => write!(f, "writer"),
            Role::Worker => write!(f, "worker"),
        }
    }
}

/// Number of workers in a group of `size` peers
pub fn worker_count(size: usize) -> usize {
    size.saturating_sub(N_NON_WORKERS)
}

/// Worker addresses in a group of `size` peers
pub fn worker_ranks(size: usize) -> Range<Rank> {
    N_NON_WORKERS..size.max(N_NON_WORKERS)
}

pub fn is_worker(rank: Rank, size: usize) -> bool {
    worker_ranks(size).contains(&rank)
}

/// Reject groups that have no worker
pub fn check_group_size(size: usize) -> Result<(), ProtocolError> {
    if size < MIN_GROUP_SIZE {
        return Err(ProtocolError::InvalidGroupSize { size });
    }
    Ok(())
}

/// Protocol violations
///
/// None of these are recoverable: the run aborts on the first one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("group size {size} has no workers (need at least {} peers)", MIN_GROUP_SIZE)]
    InvalidGroupSize { size: usize },

    #[error("rank {rank} is outside the group (size {size})")]
    RankOutOfRange { rank: Rank, size: usize },

    #[error("{tag} message from rank {sender} carries no payload")]
    MissingPayload { tag: Tag, sender: Rank },

    #[error("rank {rank} received {tag} from unexpected peer {sender}")]
    UnexpectedSender { rank: Rank, sender: Rank, tag: Tag },

    #[error("availability signal from rank {sender} names rank {payload}")]
    AvailabilityMismatch { sender: Rank, payload: i64 },

    #[error("rank {rank} received unexpected {tag} from rank {sender}")]
    UnexpectedTag { rank: Rank, sender: Rank, tag: Tag },

    #[error("worker {sender} sent more than one STOP_WORK")]
    DuplicateStop { sender: Rank },

    #[error("unknown message tag {0}")]
    UnknownTag(u8),
}
