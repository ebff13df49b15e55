//! Writer role
//!
//! The writer is a pure sink. It accepts messages from anyone, in arrival
//! order, and reads the tag to decide what each one is:
//!
//! - DO_WORK: a result, recorded and printed
//! - STOP_WORK: a worker's done signal, counted
//!
//! The loop ends when the done count reaches the number of workers, and only
//! then. Because each worker sends its done signal after all of its results
//! over the same FIFO link, no result can arrive after the last done signal.

use crate::comm::Communicator;
use crate::protocol::{self, ProtocolError, Source, Tag, TagFilter};
use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// What the writer collected during a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterReport {
    /// Results in arrival order
    ///
    /// One entry per item, so this grows with the length of the stream.
    pub results: Vec<i64>,
    /// Done signals received (equals the worker count on a clean run)
    pub done_signals: usize,
}

/// Run the writer role until every worker has signalled done
pub async fn run<C>(comm: &mut C) -> Result<WriterReport>
where
    C: Communicator + ?Sized,
{
    let worker_count = comm.worker_count();
    if worker_count == 0 {
        return Err(ProtocolError::InvalidGroupSize { size: comm.size() }.into());
    }

    let mut report = WriterReport::default();
    let mut done = HashSet::with_capacity(worker_count);

    loop {
        let env = comm.recv(Source::Any, TagFilter::Any).await
            .context("Writer failed to receive")?;

        if !protocol::is_worker(env.source, comm.size()) {
            return Err(ProtocolError::UnexpectedSender {
                rank: comm.rank(),
                sender: env.source,
                tag: env.tag,
            }
            .into());
        }

        match env.tag {
            Tag::DoWork => {
                let result = env.require_payload()?;
                println!("WRITER: Received a result. The result is {}", result);
                report.results.push(result);
            }
            Tag::StopWork => {
                if !done.insert(env.source) {
                    return Err(ProtocolError::DuplicateStop { sender: env.source }.into());
                }
                report.done_signals += 1;
                debug!(worker = env.source, done = report.done_signals, of = worker_count, "worker done");

                if report.done_signals == worker_count {
                    break;
                }
            }
        }
    }

    println!("WRITER: Finished");
    info!(results = report.results.len(), "writer finished");

    Ok(report)
}
