//! Worker role
//!
//! A worker is a small state machine:
//!
//! ```text
//!            DO_WORK(item)
//!   Ready ------------------> Busy
//!     ^                         |  result -> writer (DO_WORK)
//!     |                         |  own rank -> coordinator (DO_WORK)
//!     +-------------------------+
//!     |
//!     | STOP_WORK: forward STOP_WORK to the writer
//!     v
//!   Terminated
//! ```
//!
//! A worker only listens to the coordinator, and only while Ready, so a
//! STOP_WORK sent while it is Busy is picked up after the current item.
//! The result is always sent before the availability signal, and the
//! done signal is the last message a worker ever sends to the writer.

use crate::comm::Communicator;
use crate::protocol::{Rank, Source, Tag, TagFilter, RANK_COORD, RANK_WRITE};
use crate::work::Compute;
use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Worker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for the next message from the coordinator
    Ready,
    /// Holding one work item
    Busy { item: i64 },
    /// Done signal sent; no further messages
    Terminated,
}

/// What one worker did during a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub rank: Rank,
    pub items_processed: usize,
}

/// Run the worker role until the coordinator stops it
///
/// `work_delay` is slept after computing each result to model processing time.
pub async fn run<C, F>(comm: &mut C, compute: &mut F, work_delay: Duration) -> Result<WorkerReport>
where
    C: Communicator + ?Sized,
    F: Compute + ?Sized,
{
    let rank = comm.rank();
    let mut report = WorkerReport {
        rank,
        items_processed: 0,
    };
    let mut state = WorkerState::Ready;

    loop {
        state = match state {
            WorkerState::Ready => {
                let env = comm.recv(Source::Rank(RANK_COORD), TagFilter::Any).await
                    .with_context(|| format!("Worker {} failed to receive work", rank))?;

                match env.tag {
                    Tag::StopWork => {
                        comm.send(RANK_WRITE, Tag::StopWork, None).await
                            .with_context(|| format!("Worker {} failed to send done signal", rank))?;
                        WorkerState::Terminated
                    }
                    Tag::DoWork => WorkerState::Busy {
                        item: env.require_payload()?,
                    },
                }
            }
            WorkerState::Busy { item } => {
                let result = compute.compute(item);
                if !work_delay.is_zero() {
                    sleep(work_delay).await;
                }
                debug!(worker = rank, item, result, "item processed");

                comm.send(RANK_WRITE, Tag::DoWork, Some(result)).await
                    .with_context(|| format!("Worker {} failed to send result", rank))?;
                comm.send(RANK_COORD, Tag::DoWork, Some(rank as i64)).await
                    .with_context(|| format!("Worker {} failed to report availability", rank))?;

                report.items_processed += 1;
                WorkerState::Ready
            }
            WorkerState::Terminated => break,
        };
    }

    println!("WORKER {}: finished", rank);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::mock::ScriptedComm;
    use crate::protocol::{Envelope, ProtocolError};
    use crate::work::RandomOffset;

    /// Adds a fixed amount, so results are predictable
    struct AddFixed(i64);

    impl Compute for AddFixed {
        fn compute(&mut self, item: i64) -> i64 {
            item + self.0
        }
    }

    #[tokio::test]
    async fn test_process_then_stop() {
        let mut comm = ScriptedComm::new(3, 4);
        comm.push_do_work(RANK_COORD, 5);
        comm.push_do_work(RANK_COORD, 7);
        comm.push_stop_work(RANK_COORD);

        let report = run(&mut comm, &mut AddFixed(10), Duration::ZERO).await.unwrap();

        assert_eq!(report.rank, 3);
        assert_eq!(report.items_processed, 2);
        assert_eq!(
            comm.sent(),
            &[
                Envelope::new(3, RANK_WRITE, Tag::DoWork, Some(15)),
                Envelope::new(3, RANK_COORD, Tag::DoWork, Some(3)),
                Envelope::new(3, RANK_WRITE, Tag::DoWork, Some(17)),
                Envelope::new(3, RANK_COORD, Tag::DoWork, Some(3)),
                Envelope::new(3, RANK_WRITE, Tag::StopWork, None),
            ]
        );
    }

    #[tokio::test]
    async fn test_immediate_stop() {
        let mut comm = ScriptedComm::new(2, 3);
        comm.push_stop_work(RANK_COORD);

        let report = run(&mut comm, &mut AddFixed(0), Duration::ZERO).await.unwrap();

        assert_eq!(report.items_processed, 0);
        assert_eq!(comm.sent(), &[Envelope::new(2, RANK_WRITE, Tag::StopWork, None)]);
    }

    #[tokio::test]
    async fn test_stops_exactly_once() {
        let mut comm = ScriptedComm::new(2, 3);
        comm.push_stop_work(RANK_COORD);
        comm.push_do_work(RANK_COORD, 1);
        comm.push_stop_work(RANK_COORD);

        run(&mut comm, &mut AddFixed(0), Duration::ZERO).await.unwrap();

        // Terminated is final: later messages are never read
        assert_eq!(comm.unread(), 2);
        let stops = comm.sent().iter().filter(|env| env.tag == Tag::StopWork).count();
        assert_eq!(stops, 1);
    }

    #[tokio::test]
    async fn test_only_listens_to_coordinator() {
        let mut comm = ScriptedComm::new(2, 4);
        comm.push_do_work(3, 99);
        comm.push_do_work(RANK_COORD, 1);
        comm.push_stop_work(RANK_COORD);

        let report = run(&mut comm, &mut AddFixed(0), Duration::ZERO).await.unwrap();

        assert_eq!(report.items_processed, 1);
        assert_eq!(comm.sent_to(RANK_WRITE)[0].payload, Some(1));
        assert_eq!(comm.unread(), 1);
    }

    #[tokio::test]
    async fn test_work_without_payload_fails() {
        let mut comm = ScriptedComm::new(2, 3);
        comm.push_inbound(Envelope::new(RANK_COORD, 2, Tag::DoWork, None));

        let err = run(&mut comm, &mut AddFixed(0), Duration::ZERO).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<ProtocolError>(),
            Some(&ProtocolError::MissingPayload {
                tag: Tag::DoWork,
                sender: RANK_COORD
            })
        );
        assert!(comm.sent().is_empty());
    }

    #[tokio::test]
    async fn test_random_offset_results_in_range() {
        let mut comm = ScriptedComm::new(2, 3);
        for item in 0..20 {
            comm.push_do_work(RANK_COORD, item);
        }
        comm.push_stop_work(RANK_COORD);

        let mut compute = RandomOffset::with_seed(100, 1);
        run(&mut comm, &mut compute, Duration::ZERO).await.unwrap();

        let results: Vec<_> = comm.sent_to(RANK_WRITE).iter().filter_map(|env| env.payload).collect();
        assert_eq!(results.len(), 20);
        for (item, result) in results.iter().enumerate() {
            assert!((item as i64..=item as i64 + 100).contains(result));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_work_delay_is_slept() {
        let mut comm = ScriptedComm::new(2, 3);
        comm.push_do_work(RANK_COORD, 1);
        comm.push_do_work(RANK_COORD, 2);
        comm.push_stop_work(RANK_COORD);

        let start = tokio::time::Instant::now();
        run(&mut comm, &mut AddFixed(0), Duration::from_secs(5)).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(10));
    }
}
