//! coordwork - coordinator / worker / writer work distribution
//!
//! A fixed group of N peers, addressed by rank, splits a stream of work items:
//!
//! - rank 0, the **coordinator**, hands out items and stops the workers
//! - rank 1, the **writer**, collects every result
//! - ranks 2..N, the **workers**, turn items into results
//!
//! The coordinator fills every worker once, then feeds whichever worker
//! reports itself free, so fast workers take more of the stream.
//!
//! # Architecture
//!
//! - **Protocol**: ranks, tags, envelopes and the TCP wire format
//! - **Substrates**: in-process channels or a TCP mesh, behind one
//!   `Communicator` trait
//! - **Roles**: one driver per role, written against the trait only
//! - **Bootstrap**: bring up a whole group in-process, or one TCP peer

pub mod bootstrap;
pub mod comm;
pub mod config;
pub mod output;
pub mod protocol;
pub mod roles;
pub mod work;

// Re-export commonly used types
pub use comm::Communicator;
pub use config::Config;
pub use protocol::{Envelope, ProtocolError, Rank, Role, Tag};
pub use roles::RoleReport;

/// Result type used throughout coordwork
pub type Result<T> = anyhow::Result<T>;
