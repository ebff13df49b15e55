//! Process bootstrap
//!
//! Two ways to bring a group to life:
//!
//! - `run_local_group`: every rank is a tokio task in this process, linked by
//!   channels. The whole run finishes (or fails) inside one call.
//! - `run_peer`: this process is one rank of a TCP group; the other ranks are
//!   separate processes started with the same host list.
//!
//! In-process, a failure in any role ends the run and the remaining tasks are
//! aborted. Across processes, a failed peer only exits itself: its neighbours
//! may stay blocked in a receive or the final barrier. `--mode launch` watches
//! its children and kills the remaining peers once one of them fails;
//! standalone peers have to be stopped by whoever started them.

use crate::comm::local::local_group;
use crate::comm::Communicator;
use crate::comm::tcp::TcpComm;
use crate::config::Config;
use crate::protocol::{self, Rank};
use crate::roles::{run_role, RoleReport};
use crate::Result;
use anyhow::Context;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Run every rank of a group in this process
///
/// Returns one report per rank, in rank order.
pub async fn run_local_group(config: &Config) -> Result<Vec<RoleReport>> {
    let size = config.group.size;
    protocol::check_group_size(size)?;

    let mut tasks = JoinSet::new();
    for mut comm in local_group(size)? {
        let work = config.work.clone();
        tasks.spawn(async move {
            let rank = comm.rank();
            let outcome = run_role(&mut comm, &work).await
                .with_context(|| format!("Rank {} failed", rank));
            (rank, outcome)
        });
    }
    info!(size, "local group started");

    let mut reports: Vec<Option<RoleReport>> = vec![None; size];
    while let Some(joined) = tasks.join_next().await {
        let (rank, outcome) = joined.context("Peer task panicked or was cancelled")?;
        match outcome {
            Ok(report) => {
                debug!(rank, "rank finished");
                reports[rank] = Some(report);
            }
            Err(e) => {
                tasks.abort_all();
                return Err(e);
            }
        }
    }

    reports
        .into_iter()
        .enumerate()
        .map(|(rank, report)| report.ok_or_else(|| anyhow::anyhow!("Rank {} produced no report", rank)))
        .collect()
}

/// Run one rank of a TCP group
pub async fn run_peer(config: &Config, rank: Rank) -> Result<RoleReport> {
    let hosts = &config.transport.hosts;
    protocol::check_group_size(hosts.len())?;

    let mut comm = TcpComm::connect(rank, hosts, config.transport.connect_timeout()).await
        .with_context(|| format!("Rank {} failed to join the peer group", rank))?;
    info!(rank, size = hosts.len(), "joined peer group");

    run_role(&mut comm, &config.work).await
        .with_context(|| format!("Rank {} failed", rank))
}
