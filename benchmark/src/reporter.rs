// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! JSON report generation for benchmark results.
//!
//! Reports are written to `<category>_<timestamp>_<run>.json` files so runs
//! started within the same second never overwrite each other.

use crate::metrics::BenchmarkReport;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("Report I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// JSON reporter for benchmark results.
pub struct JsonReporter {
    /// Output directory for benchmark data
    output_dir: PathBuf,
}

impl JsonReporter {
    /// Create a new JSON reporter with the specified output directory.
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self, ReporterError> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    /// Create a reporter using the default data directory.
    pub fn default_location() -> Result<Self, ReporterError> {
        let manifest_dir = env!("CARGO_MANIFEST_DIR");
        let data_dir = Path::new(manifest_dir).join("data");
        Self::new(data_dir)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Save a benchmark report to a JSON file.
    ///
    /// Returns the path to the created file.
    pub fn save(&self, report: &BenchmarkReport) -> Result<PathBuf, ReporterError> {
        let first = report.results.first().map(|r| r.category);
        let mixed = report.results.iter().any(|r| Some(r.category) != first);
        let category = match first {
            Some(category) if !mixed => category.to_string(),
            _ => "mixed".to_string(),
        };
        self.write(report, &category)
    }

    fn write(&self, report: &BenchmarkReport, category: &str) -> Result<PathBuf, ReporterError> {
        let timestamp = report.timestamp.format("%Y-%m-%dT%H-%M-%SZ");
        let run = report.run_id.simple().to_string();
        let filename = format!("{}_{}_{}.json", category, timestamp, &run[..8]);
        let filepath = self.output_dir.join(&filename);

        let file = File::create(&filepath)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, report)?;

        tracing::debug!(path = %filepath.display(), results = report.results.len(), "Report saved");
        Ok(filepath)
    }

    /// Save multiple reports, one per category.
    pub fn save_by_category(
        &self,
        report: &BenchmarkReport,
    ) -> Result<Vec<PathBuf>, ReporterError> {
        let mut by_category: HashMap<_, Vec<_>> = HashMap::new();
        for result in &report.results {
            by_category
                .entry(result.category)
                .or_default()
                .push(result.clone());
        }

        let mut paths = Vec::new();
        for (category, results) in by_category {
            let category_report = BenchmarkReport {
                results,
                ..report.clone()
            };
            paths.push(self.write(&category_report, &category.to_string())?);
        }
        paths.sort();

        Ok(paths)
    }

    /// List all existing benchmark files in the output directory.
    pub fn list_reports(&self) -> Result<Vec<PathBuf>, ReporterError> {
        let mut reports = Vec::new();
        for entry in fs::read_dir(&self.output_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                reports.push(path);
            }
        }
        reports.sort();
        Ok(reports)
    }

    /// Load an existing benchmark report from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<BenchmarkReport, ReporterError> {
        let file = File::open(path)?;
        let report = serde_json::from_reader(file)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::{BenchmarkSample, BulkTransfer, RoundTrip};
    use crate::metrics::BenchmarkResult;
    use std::time::Duration;
    use tempfile::TempDir;

    fn round_trip_result(name: &str) -> BenchmarkResult {
        let run = RoundTrip {
            sample: BenchmarkSample::new(Duration::from_micros(600), 64, 3),
            latencies_ns: vec![100, 200, 300],
        };
        BenchmarkResult::round_trip(name, &run, false)
    }

    fn bulk_result(name: &str) -> BenchmarkResult {
        let sample = BenchmarkSample::new(Duration::from_millis(1), 64, 10);
        let transfer = BulkTransfer {
            sent: 10,
            dropped: 0,
            received: 10,
            send: sample,
            recv: sample,
        };
        BenchmarkResult::bulk_transfer(name, &transfer)
    }

    #[test]
    fn test_reporter_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let reporter = JsonReporter::new(temp_dir.path()).unwrap();

        let mut report = BenchmarkReport::new();
        report.add_result(round_trip_result("reqrep_reference_64"));

        let path = reporter.save(&report).unwrap();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("reqrep_"));

        let loaded = JsonReporter::load(&path).unwrap();
        assert_eq!(loaded.results.len(), 1);
        assert_eq!(loaded.results[0].name, "reqrep_reference_64");
        assert_eq!(loaded.run_id, report.run_id);
    }

    #[test]
    fn test_mixed_report_and_split() {
        let temp_dir = TempDir::new().unwrap();
        let reporter = JsonReporter::new(temp_dir.path()).unwrap();

        let mut report = BenchmarkReport::new();
        report.add_result(round_trip_result("reqrep_reference_64"));
        report.add_result(bulk_result("pubsub_reference_64"));

        let path = reporter.save(&report).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("mixed_"));

        let split = reporter.save_by_category(&report).unwrap();
        assert_eq!(split.len(), 2);
        for path in &split {
            assert_eq!(JsonReporter::load(path).unwrap().results.len(), 1);
        }
    }

    #[test]
    fn test_list_reports() {
        let temp_dir = TempDir::new().unwrap();
        let reporter = JsonReporter::new(temp_dir.path()).unwrap();

        let mut report = BenchmarkReport::new();
        report.add_result(round_trip_result("reqrep_reference_64"));
        reporter.save(&report).unwrap();

        let mut second = BenchmarkReport::new();
        second.add_result(round_trip_result("reqrep_reference_256"));
        reporter.save(&second).unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let reports = reporter.list_reports().unwrap();
        assert_eq!(reports.len(), 2);
    }
}
