//! Human-readable text output

use super::RunSummary;
use std::fmt;

/// Print the run summary to the console
pub fn print_summary(summary: &RunSummary) {
    print!("{}", render_summary(summary));
}

/// Render the run summary as console text
pub fn render_summary(summary: &RunSummary) -> String {
    summary.to_string()
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_summary(f, self)
    }
}

fn write_summary(out: &mut fmt::Formatter<'_>, summary: &RunSummary) -> fmt::Result {
    writeln!(out, "═══════════════════════════════════════════════════════════")?;
    match summary.rank {
        Some(rank) => writeln!(out, "                  RUN SUMMARY (rank {})", rank)?,
        None => writeln!(out, "                      RUN SUMMARY")?,
    }
    writeln!(out, "═══════════════════════════════════════════════════════════")?;
    writeln!(out)?;

    writeln!(out, "Elapsed Time: {}", summary.elapsed.human)?;
    writeln!(out, "Group Size:   {}", summary.group_size)?;
    writeln!(out)?;

    if let Some(dispatch) = summary.dispatch() {
        writeln!(out, "Coordinator:")?;
        writeln!(out, "  Items dispatched:     {}", dispatch.dispatched())?;
        writeln!(out, "  Availability pulls:   {}", dispatch.availability_signals)?;
        writeln!(out, "  Drained at shutdown:  {}", dispatch.drained_signals)?;
        writeln!(out, "  Stops sent:           {}", dispatch.stops_sent)?;
        writeln!(out)?;
    }

    if let Some(writer) = summary.writer() {
        writeln!(out, "Writer:")?;
        writeln!(out, "  Results received:     {}", writer.results.len())?;
        writeln!(out, "  Done signals:         {}", writer.done_signals)?;
        if let (Some(min), Some(max)) = (writer.results.iter().min(), writer.results.iter().max()) {
            writeln!(out, "  Result range:         {}..={}", min, max)?;
        }
        writeln!(out)?;
    }

    let mut workers: Vec<_> = summary.workers().collect();
    if !workers.is_empty() {
        workers.sort_by_key(|w| w.rank);
        writeln!(out, "Workers:")?;
        for w in workers {
            writeln!(out, "  Worker {:<4} {} items", w.rank, w.items_processed)?;
        }
        writeln!(out)?;
    }

    writeln!(out, "═══════════════════════════════════════════════════════════")?;
    Ok(())
}
