//! Run summaries
//!
//! A `RunSummary` gathers the role reports of a run (all of them in local
//! mode, this process's one in peer mode) together with when and where the
//! run happened. `text` prints it, `json` writes it to disk.

pub mod json;
pub mod text;

use crate::config::WorkConfig;
use crate::protocol::Rank;
use crate::roles::{DispatchReport, RoleReport, WorkerReport, WriterReport};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Duration with both milliseconds and human-readable format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonDuration {
    pub millis: u64,
    pub human: String,
}

impl JsonDuration {
    pub fn from_duration(d: Duration) -> Self {
        Self {
            millis: d.as_millis() as u64,
            human: format_duration_human(d),
        }
    }
}

/// Everything known about a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// RFC 3339 timestamp of when the summary was built
    pub generated_at: String,
    pub host: String,
    /// `local` or `peer`
    pub mode: String,
    pub group_size: usize,
    /// Set when the summary covers one rank only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<Rank>,
    pub elapsed: JsonDuration,
    pub work: WorkConfig,
    pub reports: Vec<RoleReport>,
}

impl RunSummary {
    pub fn new(
        mode: &str,
        group_size: usize,
        rank: Option<Rank>,
        elapsed: Duration,
        work: &WorkConfig,
        reports: Vec<RoleReport>,
    ) -> Self {
        Self {
            generated_at: chrono::Local::now().to_rfc3339(),
            host: host_name(),
            mode: mode.to_string(),
            group_size,
            rank,
            elapsed: JsonDuration::from_duration(elapsed),
            work: work.clone(),
            reports,
        }
    }

    pub fn dispatch(&self) -> Option<&DispatchReport> {
        self.reports.iter().find_map(|r| match r {
            RoleReport::Coordinator(d) => Some(d),
            _ => None,
        })
    }

    pub fn writer(&self) -> Option<&WriterReport> {
        self.reports.iter().find_map(|r| match r {
            RoleReport::Writer(w) => Some(w),
            _ => None,
        })
    }

    pub fn workers(&self) -> impl Iterator<Item = &WorkerReport> {
        self.reports.iter().filter_map(|r| match r {
            RoleReport::Worker(w) => Some(w),
            _ => None,
        })
    }

    /// Items processed across the workers in this summary
    pub fn items_processed(&self) -> usize {
        self.workers().map(|w| w.items_processed).sum()
    }
}

/// Host name, or "unknown" when it cannot be read
fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Format duration in human-readable format
pub(crate) fn format_duration_human(d: Duration) -> String {
    let micros = d.as_micros() as u64;

    if micros == 0 {
        return "0µs".to_string();
    }

    if micros < 1000 {
        format!("{}µs", micros)
    } else if micros < 1_000_000 {
        format!("{:.3}ms", micros as f64 / 1000.0)
    } else if micros < 60_000_000 {
        format!("{:.3}s", micros as f64 / 1_000_000.0)
    } else {
        format!("{:.2}m", micros as f64 / 60_000_000.0)
    }
}
