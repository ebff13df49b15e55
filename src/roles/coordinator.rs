//! Coordinator role
//!
//! The coordinator is the only source of progress in a run. It feeds the work
//! stream to the worker pool in two phases:
//!
//! 1. **Flood-fill**: the first `W` items go to workers 2..2+W in order, so
//!    every worker has something to do before any reply is awaited.
//! 2. **Pull**: every later item goes to whichever worker reports itself
//!    available next, so slow workers are not handed more than they can take.
//!
//! Once the stream is exhausted the coordinator collects the availability
//! signals still in flight (one per worker that got work and was not fed
//! again), then sends one STOP_WORK to every worker.

use crate::comm::Communicator;
use crate::config::WorkConfig;
use crate::protocol::{self, ProtocolError, Rank, Source, Tag, TagFilter, N_NON_WORKERS};
use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One work item and the worker it was sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub item: i64,
    pub dest: Rank,
}

/// What the coordinator did during a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// Every dispatch, in send order
    ///
    /// One record per item, so this grows with the length of the stream.
    pub assignments: Vec<Assignment>,
    /// Availability signals consumed by pull dispatch
    pub availability_signals: usize,
    /// Availability signals collected after the stream ended
    pub drained_signals: usize,
    /// STOP_WORK messages sent
    pub stops_sent: usize,
}

impl DispatchReport {
    pub fn dispatched(&self) -> usize {
        self.assignments.len()
    }

    /// Destinations in dispatch order
    pub fn destinations(&self) -> Vec<Rank> {
        self.assignments.iter().map(|a| a.dest).collect()
    }

    /// Items sent to one worker, in dispatch order
    pub fn items_for(&self, rank: Rank) -> Vec<i64> {
        self.assignments
            .iter()
            .filter(|a| a.dest == rank)
            .map(|a| a.item)
            .collect()
    }

    /// Availability signals still in flight once dispatch is over
    ///
    /// Every dispatched item produces one signal; pull dispatch consumed
    /// `dispatched - W` of them, leaving `min(dispatched, W)`.
    pub fn outstanding(&self, worker_count: usize) -> usize {
        self.dispatched().min(worker_count)
    }
}

/// Send every item to a worker: flood-fill first, then pull-based
pub async fn dispatch_all<C, I>(comm: &mut C, items: I) -> Result<DispatchReport>
where
    C: Communicator + ?Sized,
    I: IntoIterator<Item = i64>,
{
    let worker_count = comm.worker_count();
    if worker_count == 0 {
        return Err(ProtocolError::InvalidGroupSize { size: comm.size() }.into());
    }

    let mut report = DispatchReport::default();

    for (cnt, item) in items.into_iter().enumerate() {
        let dest = if cnt < worker_count {
            cnt + N_NON_WORKERS
        } else {
            report.availability_signals += 1;
            await_available(comm).await?
        };

        comm.send(dest, Tag::DoWork, Some(item)).await
            .with_context(|| format!("Failed to send item {} to worker {}", item, dest))?;
        debug!(item, dest, "dispatched");

        report.assignments.push(Assignment { item, dest });
    }

    Ok(report)
}

/// Collect `outstanding` trailing availability signals
///
/// Afterwards every worker is idle and waiting for its next message.
pub async fn drain_availability<C>(comm: &mut C, outstanding: usize) -> Result<usize>
where
    C: Communicator + ?Sized,
{
    for _ in 0..outstanding {
        let rank = await_available(comm).await?;
        debug!(worker = rank, "worker idle");
    }
    Ok(outstanding)
}

/// Send one STOP_WORK to every worker
pub async fn shutdown_all<C>(comm: &mut C) -> Result<usize>
where
    C: Communicator + ?Sized,
{
    let mut sent = 0;
    for dest in comm.worker_ranks() {
        comm.send(dest, Tag::StopWork, None).await
            .with_context(|| format!("Failed to stop worker {}", dest))?;
        sent += 1;
    }
    Ok(sent)
}

/// Run the coordinator role to completion
pub async fn run<C>(comm: &mut C, work: &WorkConfig) -> Result<DispatchReport>
where
    C: Communicator + ?Sized,
{
    println!("COORD: Starting to send work.");

    let mut report = dispatch_all(comm, work.items()).await?;

    println!("COORD: Done sending work.");

    let outstanding = report.outstanding(comm.worker_count());
    report.drained_signals = drain_availability(comm, outstanding).await?;
    report.stops_sent = shutdown_all(comm).await?;

    info!(
        dispatched = report.dispatched(),
        pulled = report.availability_signals,
        drained = report.drained_signals,
        "coordinator finished"
    );

    Ok(report)
}

/// Wait for the next availability signal and return the worker it names
async fn await_available<C>(comm: &mut C) -> Result<Rank>
where
    C: Communicator + ?Sized,
{
    let env = comm.recv(Source::Any, TagFilter::Any).await
        .context("Failed to receive availability signal")?;

    if env.tag != Tag::DoWork {
        return Err(ProtocolError::UnexpectedTag {
            rank: comm.rank(),
            sender: env.source,
            tag: env.tag,
        }
        .into());
    }
    if !protocol::is_worker(env.source, comm.size()) {
        return Err(ProtocolError::UnexpectedSender {
            rank: comm.rank(),
            sender: env.source,
            tag: env.tag,
        }
        .into());
    }

    let payload = env.require_payload()?;
    if payload != env.source as i64 {
        return Err(ProtocolError::AvailabilityMismatch {
            sender: env.source,
            payload,
        }
        .into());
    }

    Ok(env.source)
}
