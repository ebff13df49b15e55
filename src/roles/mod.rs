//! Role drivers
//!
//! Each peer runs exactly one role, picked from its address by
//! `Role::for_rank`. The drivers only talk to the `Communicator` trait, so any
//! one of them can run against a real group or a scripted one.
//!
//! # Roles
//!
//! - `coordinator`: dispatches the work stream and stops the workers
//! - `worker`: computes results and reports availability
//! - `writer`: collects results and detects global completion

pub mod coordinator;
pub mod worker;
pub mod writer;

pub use coordinator::{Assignment, DispatchReport};
pub use worker::{WorkerReport, WorkerState};
pub use writer::WriterReport;

use crate::comm::Communicator;
use crate::config::WorkConfig;
use crate::protocol::{self, Role};
use crate::work::RandomOffset;
use crate::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outcome of one peer's role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum RoleReport {
    Coordinator(DispatchReport),
    Worker(WorkerReport),
    Writer(WriterReport),
}

impl RoleReport {
    pub fn role(&self) -> Role {
        match self {
            RoleReport::Coordinator(_) => Role::Coordinator,
            RoleReport::Worker(_) => Role::Worker,
            RoleReport::Writer(_) => Role::Writer,
        }
    }
}

/// Run the role for `comm.rank()`, then wait at the group barrier
pub async fn run_role<C>(comm: &mut C, work: &WorkConfig) -> Result<RoleReport>
where
    C: Communicator + ?Sized,
{
    protocol::check_group_size(comm.size())?;

    let rank = comm.rank();
    let role = Role::for_rank(rank);
    debug!(rank, %role, "starting role");

    let report = match role {
        Role::Coordinator => RoleReport::Coordinator(coordinator::run(comm, work).await?),
        Role::Writer => RoleReport::Writer(writer::run(comm).await?),
        Role::Worker => {
            let mut compute = RandomOffset::for_worker(work, rank);
            RoleReport::Worker(worker::run(comm, &mut compute, work.work_delay()).await?)
        }
    };

    comm.barrier().await?;
    debug!(rank, %role, "passed final barrier");

    Ok(report)
}
