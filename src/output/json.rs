//! JSON output formatting
//!
//! In peer mode every process writes its own file; `rank_path` derives the
//! per-rank name from the configured one so peers on a shared filesystem do
//! not overwrite each other.

use super::RunSummary;
use crate::protocol::Rank;
use crate::Result;
use anyhow::Context;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Write the run summary as pretty-printed JSON
pub fn write_summary(output_path: &Path, summary: &RunSummary) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create JSON output file: {}", output_path.display()))?;

    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, summary)
        .with_context(|| format!("Failed to write JSON summary to {}", output_path.display()))?;
    writer.flush()
        .with_context(|| format!("Failed to flush {}", output_path.display()))?;

    Ok(())
}

/// Per-rank output path: `summary.json` becomes `summary.rank2.json`
pub fn rank_path(path: &Path, rank: Rank) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "summary".to_string());

    let name = match path.extension() {
        Some(ext) => format!("{}.rank{}.{}", stem, rank, ext.to_string_lossy()),
        None => format!("{}.rank{}", stem, rank),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::sample_summary;

    #[test]
    fn test_write_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");

        write_summary(&path, &sample_summary()).unwrap();

        let value: serde_json::Value = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(value["mode"], "local");
        assert_eq!(value["group_size"], 4);
        assert_eq!(value["elapsed"]["millis"], 1500);
        assert!(value.get("rank").is_none());

        let reports = value["reports"].as_array().unwrap();
        assert_eq!(reports.len(), 4);
        assert_eq!(reports[0]["role"], "coordinator");
        assert_eq!(reports[1]["results"], serde_json::json!([40, 7, 90]));
    }

    #[test]
    fn test_summary_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let summary = sample_summary();

        write_summary(&path, &summary).unwrap();
        let back: RunSummary = serde_json::from_reader(File::open(&path).unwrap()).unwrap();

        assert_eq!(back.reports, summary.reports);
        assert_eq!(back.work, summary.work);
    }

    #[test]
    fn test_write_to_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("summary.json");
        assert!(write_summary(&path, &sample_summary()).is_err());
    }

    #[test]
    fn test_rank_path() {
        assert_eq!(
            rank_path(Path::new("/tmp/out/summary.json"), 2),
            PathBuf::from("/tmp/out/summary.rank2.json")
        );
        assert_eq!(rank_path(Path::new("results"), 0), PathBuf::from("results.rank0"));
    }
}
