// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Reading and writing benchmark output on the filesystem.
//!
//! Each run writes its records to
//! `invocations_<run>_<batch ts>_<batch id>.jsonl`, one record per line.
//! Failures go to `unprocessed/unprocessed_<ts>_<id>.json` as a pretty
//! JSON array, only when a run had any.

use crate::engine::RunOutput;
use crate::markdown;
use crate::orchestrator::RunSink;
use crate::result::{BenchmarkRecord, UnprocessedRecord};
use serde::Serialize;
use std::fs;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the unprocessed subdirectory.
pub const UNPROCESSED_DIR: &str = "unprocessed";

/// Summary file name.
pub const SUMMARY_FILE: &str = "summary.md";

fn json_error(e: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

fn short_id() -> String {
    let id = uuid::Uuid::new_v4().to_string();
    id.rsplit('-').next().unwrap_or(&id).to_string()
}

/// Writes every run of one benchmark under a single batch id.
#[derive(Debug, Clone)]
pub struct FileRunSink {
    output_dir: PathBuf,
    unprocessed_dir: PathBuf,
    batch_ts: String,
    batch_id: String,
}

impl FileRunSink {
    /// Create the sink and its directories.
    pub fn new(output_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let output_dir = output_dir.into();
        let unprocessed_dir = output_dir.join(UNPROCESSED_DIR);
        fs::create_dir_all(&output_dir)?;
        fs::create_dir_all(&unprocessed_dir)?;
        Ok(Self {
            output_dir,
            unprocessed_dir,
            batch_ts: chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string(),
            batch_id: short_id(),
        })
    }

    /// Directory the records are written to.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Directory the unprocessed files are written to.
    pub fn unprocessed_dir(&self) -> &Path {
        &self.unprocessed_dir
    }

    /// Path of the records file for `run`.
    pub fn records_path(&self, run: u32) -> PathBuf {
        self.output_dir.join(format!(
            "invocations_{}_{}_{}.jsonl",
            run, self.batch_ts, self.batch_id
        ))
    }

    fn unprocessed_path(&self) -> PathBuf {
        let ts = llm_jurybench_core::timestamp_iso().replace(':', "-");
        self.unprocessed_dir
            .join(format!("unprocessed_{}_{}.json", ts, short_id()))
    }
}

impl RunSink for FileRunSink {
    fn persist_run(&self, run: u32, output: &RunOutput) -> io::Result<()> {
        if !output.records.is_empty() {
            let path = self.records_path(run);
            write_records_jsonl(&output.records, &path)?;
            info!(run, records = output.records.len(), path = %path.display(), "wrote run records");
        }
        if !output.unprocessed.is_empty() {
            let path = self.unprocessed_path();
            write_unprocessed(&output.unprocessed, &path)?;
            info!(
                run,
                unprocessed = output.unprocessed.len(),
                path = %path.display(),
                "wrote unprocessed records"
            );
        }
        Ok(())
    }
}

/// Write records as JSON Lines.
pub fn write_records_jsonl(records: &[BenchmarkRecord], path: impl AsRef<Path>) -> io::Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    for record in records {
        serde_json::to_writer(&mut writer, record).map_err(json_error)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

/// Read records written by [`write_records_jsonl`]. Blank lines are skipped.
pub fn read_records_jsonl(path: impl AsRef<Path>) -> io::Result<Vec<BenchmarkRecord>> {
    let reader = io::BufReader::new(fs::File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line).map_err(json_error)?);
    }
    Ok(records)
}

fn write_pretty<T: Serialize + ?Sized>(value: &T, path: impl AsRef<Path>) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(json_error)?;
    fs::write(path, json)
}

/// Write failures as a pretty JSON array.
pub fn write_unprocessed(records: &[UnprocessedRecord], path: impl AsRef<Path>) -> io::Result<()> {
    write_pretty(records, path)
}

/// Read a file written by [`write_unprocessed`].
pub fn read_unprocessed(path: impl AsRef<Path>) -> io::Result<Vec<UnprocessedRecord>> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(json_error)
}

/// Number of `.json` files in an unprocessed directory. A missing directory
/// counts as zero.
pub fn count_unprocessed_files(dir: impl AsRef<Path>) -> io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut count = 0;
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            count += 1;
        }
    }
    Ok(count)
}

/// Write the markdown summary into `dir`, returning its path.
pub fn write_summary(
    records: &[BenchmarkRecord],
    experiment: &str,
    dir: impl AsRef<Path>,
) -> io::Result<PathBuf> {
    let path = dir.as_ref().join(SUMMARY_FILE);
    let summary = markdown::generate_summary(experiment, records)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    fs::write(&path, summary)?;
    debug!(path = %path.display(), "wrote summary");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::tests::scenario;
    use llm_jurybench_core::InvocationResult;

    fn record(model_id: &str) -> BenchmarkRecord {
        BenchmarkRecord::new(
            scenario(model_id),
            InvocationResult {
                response_text: "7".into(),
                response_cost: Some(0.01),
                ..InvocationResult::default()
            },
            1,
            1,
            "2025-01-01T00:00:00Z",
        )
    }

    #[test]
    fn test_persist_run_layout() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileRunSink::new(dir.path().join("results")).unwrap();
        let output = RunOutput {
            records: vec![record("a"), record("b")],
            unprocessed: vec![UnprocessedRecord::exception(
                Some(scenario("c")),
                "boom",
                "Exception during processing",
            )],
        };

        sink.persist_run(1, &output).unwrap();

        let written = read_records_jsonl(sink.records_path(1)).unwrap();
        assert_eq!(written, output.records);
        assert_eq!(count_unprocessed_files(sink.unprocessed_dir()).unwrap(), 1);

        let file = fs::read_dir(sink.unprocessed_dir())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        let name = file.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("unprocessed_"));
        assert!(!name.contains(':'));
        assert_eq!(read_unprocessed(&file).unwrap(), output.unprocessed);
    }

    #[test]
    fn test_empty_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileRunSink::new(dir.path()).unwrap();

        sink.persist_run(1, &RunOutput::default()).unwrap();

        assert!(!sink.records_path(1).exists());
        assert_eq!(count_unprocessed_files(sink.unprocessed_dir()).unwrap(), 0);
    }

    #[test]
    fn test_records_path_names_run() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileRunSink::new(dir.path()).unwrap();
        let name = sink.records_path(3);
        let name = name.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("invocations_3_"));
        assert!(name.ends_with(".jsonl"));
    }

    #[test]
    fn test_count_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(count_unprocessed_files(dir.path().join("nope")).unwrap(), 0);
    }

    #[test]
    fn test_write_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_summary(&[record("a")], "exp", dir.path()).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("| a |"));
    }
}
