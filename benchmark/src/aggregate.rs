// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Aggregation of criterion output into a comparison report.
//!
//! Criterion writes one directory per benchmark under `target/criterion`,
//! each holding `base/` and `new/` snapshots with an `estimates.json`.
//! Grouped benchmarks nest one level per group. Estimates are read in
//! nanoseconds and reported in milliseconds.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Nanoseconds per millisecond.
const NS_PER_MS: f64 = 1e6;

/// Criterion's HTML report directory, present at every level.
const REPORT_DIR: &str = "report";

/// Snapshots in order of preference.
const SNAPSHOTS: [&str; 2] = ["base", "new"];

/// Errors raised while aggregating. Only `DirectoryMissing` is fatal; the
/// rest are recorded per benchmark and the benchmark is omitted.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("criterion directory not found: {path}")]
    DirectoryMissing { path: PathBuf },

    #[error("no estimate data for {benchmark} under {path}")]
    DataMissing { benchmark: String, path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("estimate for {benchmark} is not ordered: lower {lower} / point {point} / upper {upper} ms")]
    InvalidInterval {
        benchmark: String,
        lower: f64,
        point: f64,
        upper: f64,
    },
}

/// Unit of a criterion throughput descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThroughputUnit {
    Bytes,
    Elements,
}

/// Work done per benchmark iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Throughput {
    pub per_iteration: u64,
    #[serde(default = "default_unit")]
    pub unit: ThroughputUnit,
}

fn default_unit() -> ThroughputUnit {
    ThroughputUnit::Bytes
}

impl Throughput {
    /// Units per second given a mean iteration time.
    pub fn rate(&self, mean_ms: f64) -> Option<f64> {
        if mean_ms <= 0.0 {
            return None;
        }
        Some(self.per_iteration as f64 / (mean_ms / 1000.0))
    }
}

/// One benchmark's mean time with its confidence interval, in milliseconds.
///
/// `lower <= mean <= upper` holds for every constructed value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateEstimate {
    name: String,
    mean_ms: f64,
    lower_ms: f64,
    upper_ms: f64,
    throughput: Option<Throughput>,
}

impl AggregateEstimate {
    pub fn new(
        name: impl Into<String>,
        mean_ms: f64,
        lower_ms: f64,
        upper_ms: f64,
        throughput: Option<Throughput>,
    ) -> Result<Self, AggregationError> {
        let name = name.into();
        let finite = mean_ms.is_finite() && lower_ms.is_finite() && upper_ms.is_finite();
        if !finite || lower_ms > mean_ms || mean_ms > upper_ms {
            return Err(AggregationError::InvalidInterval {
                benchmark: name,
                lower: lower_ms,
                point: mean_ms,
                upper: upper_ms,
            });
        }
        Ok(Self {
            name,
            mean_ms,
            lower_ms,
            upper_ms,
            throughput,
        })
    }

    /// Build from criterion's nanosecond figures.
    pub fn from_nanos(
        name: impl Into<String>,
        point_ns: f64,
        lower_ns: f64,
        upper_ns: f64,
        throughput: Option<Throughput>,
    ) -> Result<Self, AggregationError> {
        Self::new(
            name,
            point_ns / NS_PER_MS,
            lower_ns / NS_PER_MS,
            upper_ns / NS_PER_MS,
            throughput,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mean_ms(&self) -> f64 {
        self.mean_ms
    }

    pub fn lower_ms(&self) -> f64 {
        self.lower_ms
    }

    pub fn upper_ms(&self) -> f64 {
        self.upper_ms
    }

    pub fn throughput(&self) -> Option<Throughput> {
        self.throughput
    }

    /// Throughput derived from the mean, formatted for display.
    pub fn formatted_throughput(&self) -> Option<String> {
        let throughput = self.throughput?;
        let rate = throughput.rate(self.mean_ms)?;
        Some(format_throughput(rate, throughput.unit))
    }
}

/// Format a per-second rate with two decimals.
pub fn format_throughput(value: f64, unit: ThroughputUnit) -> String {
    match unit {
        ThroughputUnit::Bytes => {
            if value >= 1e9 {
                format!("{:.2} GiB/s", value / 1e9)
            } else if value >= 1e6 {
                format!("{:.2} MiB/s", value / 1e6)
            } else {
                format!("{:.2} KiB/s", value / 1e3)
            }
        }
        ThroughputUnit::Elements => {
            if value >= 1e6 {
                format!("{:.2}M msg/s", value / 1e6)
            } else if value >= 1e3 {
                format!("{:.2}K msg/s", value / 1e3)
            } else {
                format!("{:.2} msg/s", value)
            }
        }
    }
}

/// How much faster a benchmark ran than its counterpart.
pub fn speedup(mean_ms: f64, counterpart_mean_ms: f64) -> f64 {
    counterpart_mean_ms / mean_ms
}

/// Render a speedup ratio as "X.XXx faster" or "X.XXx slower".
///
/// A ratio that is not a positive finite number, as produced by a zero mean
/// on either side, renders as "n/a".
pub fn format_speedup(speedup: f64) -> String {
    if !speedup.is_finite() || speedup <= 0.0 {
        "n/a".to_string()
    } else if speedup > 1.0 {
        format!("{:.2}x faster", speedup)
    } else {
        format!("{:.2}x slower", 1.0 / speedup)
    }
}

fn comparable(speedup: f64) -> bool {
    speedup.is_finite() && speedup > 0.0
}

/// Default categorizer: the leading `_`-separated token.
pub fn leading_token(name: &str) -> String {
    name.split('_').next().unwrap_or(name).to_string()
}

/// Parsed estimates plus the benchmarks that could not be read.
#[derive(Debug, Default)]
pub struct Aggregation {
    pub estimates: BTreeMap<String, AggregateEstimate>,
    pub skipped: Vec<AggregationError>,
}

/// A benchmark paired with its counterpart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub name: String,
    pub counterpart: String,
    pub speedup: f64,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, format_speedup(self.speedup))
    }
}

/// Everything the summary shows, computed once per aggregation run.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub title: String,
    pub generated: DateTime<Utc>,
    /// Category → estimates sorted by name.
    pub categories: BTreeMap<String, Vec<AggregateEstimate>>,
    /// Benchmark name → derived throughput.
    pub throughputs: BTreeMap<String, String>,
    pub highlight: String,
    /// Highlighted estimates, fastest first.
    pub highlights: Vec<AggregateEstimate>,
    pub tag: String,
    pub counterpart: String,
    /// Pairs sorted by descending speedup.
    pub comparisons: Vec<Comparison>,
    /// Human-readable reasons for omitted benchmarks.
    pub skipped: Vec<String>,
}

impl ComparisonReport {
    /// Render the report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("# {}\n\n", self.title));
        output.push_str(&format!("Generated: {}\n", self.generated.to_rfc3339()));

        for (category, estimates) in &self.categories {
            output.push_str(&format!("\n## {}\n\n", category.to_uppercase()));
            for estimate in estimates {
                output.push_str(&format!("### {}\n", estimate.name()));
                output.push_str(&format!(
                    "- **Mean Time**: {:.2} ms [{:.2}, {:.2}]\n",
                    estimate.mean_ms(),
                    estimate.lower_ms(),
                    estimate.upper_ms()
                ));
                if let Some(throughput) = self.throughputs.get(estimate.name()) {
                    output.push_str(&format!("- **Throughput**: {}\n", throughput));
                }
                output.push('\n');
            }
        }

        output.push_str("\n## Performance Highlights\n\n");

        if !self.highlights.is_empty() {
            output.push_str(&format!("### Benchmarks matching `{}`\n", self.highlight));
            for estimate in &self.highlights {
                let figure = self
                    .throughputs
                    .get(estimate.name())
                    .cloned()
                    .unwrap_or_else(|| format!("{:.2} ms", estimate.mean_ms()));
                output.push_str(&format!("- **{}**: {}\n", estimate.name(), figure));
            }
            output.push('\n');
        }

        if !self.comparisons.is_empty() {
            output.push_str(&format!(
                "### {} vs {} Comparison\n",
                self.tag, self.counterpart
            ));
            for comparison in &self.comparisons {
                output.push_str(&format!(
                    "- **{}**: {}\n",
                    comparison.name,
                    format_speedup(comparison.speedup)
                ));
            }
            output.push('\n');
        }

        if !self.skipped.is_empty() {
            output.push_str("## Skipped\n\n");
            for reason in &self.skipped {
                output.push_str(&format!("- {}\n", reason));
            }
        }

        output
    }
}

/// Maps a benchmark name to its report section.
pub type Categorizer = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Reads criterion output and builds a [`ComparisonReport`].
pub struct ResultAggregator {
    categorizer: Categorizer,
    highlight: String,
    tag: String,
    counterpart: String,
    title: String,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self {
            categorizer: Box::new(leading_token),
            highlight: "pipelined".to_string(),
            tag: "inproc".to_string(),
            counterpart: "reference".to_string(),
            title: "Wirecheck Benchmark Results Summary".to_string(),
        }
    }

    pub fn categorizer<F>(mut self, categorizer: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.categorizer = Box::new(categorizer);
        self
    }

    /// Names containing `pattern` are listed as highlights.
    pub fn highlight(mut self, pattern: impl Into<String>) -> Self {
        self.highlight = pattern.into();
        self
    }

    /// Compare benchmarks named with `tag` against the same name with
    /// `counterpart` substituted.
    pub fn compare(mut self, tag: impl Into<String>, counterpart: impl Into<String>) -> Self {
        self.tag = tag.into();
        self.counterpart = counterpart.into();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Parse every benchmark under `criterion_dir`.
    ///
    /// # Errors
    /// Only a missing or unreadable root directory is an error; per-benchmark
    /// problems land in [`Aggregation::skipped`].
    pub fn collect(&self, criterion_dir: &Path) -> Result<Aggregation, AggregationError> {
        if !criterion_dir.is_dir() {
            return Err(AggregationError::DirectoryMissing {
                path: criterion_dir.to_path_buf(),
            });
        }

        let mut aggregation = Aggregation::default();
        for (name, path) in benchmark_dirs(criterion_dir)? {
            visit(&path, name, &mut aggregation);
        }

        tracing::info!(
            found = aggregation.estimates.len(),
            skipped = aggregation.skipped.len(),
            "Parsed criterion results"
        );
        Ok(aggregation)
    }

    /// Derive throughput, highlights and speedups.
    pub fn report(&self, aggregation: &Aggregation, generated: DateTime<Utc>) -> ComparisonReport {
        let estimates = &aggregation.estimates;

        let mut categories: BTreeMap<String, Vec<AggregateEstimate>> = BTreeMap::new();
        for estimate in estimates.values() {
            categories
                .entry((self.categorizer)(estimate.name()))
                .or_default()
                .push(estimate.clone());
        }

        let throughputs = estimates
            .values()
            .filter_map(|e| e.formatted_throughput().map(|t| (e.name().to_string(), t)))
            .collect();

        let mut highlights: Vec<AggregateEstimate> = estimates
            .values()
            .filter(|e| e.name().contains(&self.highlight))
            .cloned()
            .collect();
        highlights.sort_by(|a, b| a.mean_ms().total_cmp(&b.mean_ms()));

        let mut comparisons = Vec::new();
        if !self.tag.is_empty() {
            for estimate in estimates.values() {
                if !estimate.name().contains(&self.tag) {
                    continue;
                }
                let counterpart = estimate.name().replace(&self.tag, &self.counterpart);
                if let Some(other) = estimates.get(&counterpart) {
                    comparisons.push(Comparison {
                        name: estimate.name().to_string(),
                        counterpart,
                        speedup: speedup(estimate.mean_ms(), other.mean_ms()),
                    });
                }
            }
        }
        // Ratios that cannot be rendered go last.
        comparisons.sort_by(|a, b| {
            comparable(b.speedup)
                .cmp(&comparable(a.speedup))
                .then_with(|| b.speedup.total_cmp(&a.speedup))
        });

        ComparisonReport {
            title: self.title.clone(),
            generated,
            categories,
            throughputs,
            highlight: self.highlight.clone(),
            highlights,
            tag: self.tag.clone(),
            counterpart: self.counterpart.clone(),
            comparisons,
            skipped: aggregation.skipped.iter().map(ToString::to_string).collect(),
        }
    }

    /// Collect, derive and render in one step, stamped with the current time.
    pub fn summarize(&self, criterion_dir: &Path) -> Result<String, AggregationError> {
        let aggregation = self.collect(criterion_dir)?;
        Ok(self.report(&aggregation, Utc::now()).to_markdown())
    }
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Benchmark subdirectories of `dir`, sorted by name.
fn benchmark_dirs(dir: &Path) -> Result<Vec<(String, PathBuf)>, AggregationError> {
    let entries = fs::read_dir(dir).map_err(|source| AggregationError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut dirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_dir() && name != REPORT_DIR {
            dirs.push((name, path));
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn is_snapshot_dir(dir: &Path) -> bool {
    SNAPSHOTS.iter().any(|snapshot| dir.join(snapshot).is_dir())
}

/// Load a benchmark directory, descending into groups.
fn visit(dir: &Path, name: String, aggregation: &mut Aggregation) {
    if is_snapshot_dir(dir) {
        match load_benchmark(dir, &name) {
            Ok(estimate) => {
                aggregation.estimates.insert(name, estimate);
            }
            Err(e) => {
                tracing::warn!(benchmark = %name, error = %e, "Skipping benchmark");
                aggregation.skipped.push(e);
            }
        }
        return;
    }

    match benchmark_dirs(dir) {
        Ok(children) if children.is_empty() => {
            tracing::warn!(benchmark = %name, "No estimate data");
            aggregation.skipped.push(AggregationError::DataMissing {
                benchmark: name,
                path: dir.to_path_buf(),
            });
        }
        Ok(children) => {
            for (child, path) in children {
                visit(&path, format!("{}_{}", name, child), aggregation);
            }
        }
        Err(e) => aggregation.skipped.push(e),
    }
}

#[derive(Debug, Deserialize)]
struct RawInterval {
    lower_bound: f64,
    upper_bound: f64,
}

#[derive(Debug, Deserialize)]
struct RawEstimate {
    point_estimate: f64,
    confidence_interval: RawInterval,
}

#[derive(Debug, Deserialize)]
struct RawEstimates {
    mean: RawEstimate,
    #[serde(default)]
    throughput: Option<Throughput>,
}

/// Criterion's own `benchmark.json`. Throughput is kept loose so that a shape
/// this reader does not know is reported rather than failing the file.
#[derive(Debug, Deserialize)]
struct RawBenchmark {
    #[serde(default)]
    throughput: Option<serde_json::Value>,
}

/// Criterion's throughput variants as they appear in `benchmark.json`.
#[derive(Debug, Deserialize)]
enum CriterionThroughput {
    Bytes(u64),
    BytesDecimal(u64),
    Elements(u64),
    ElementsAndBytes { elements: u64, bytes: u64 },
}

impl From<CriterionThroughput> for Throughput {
    fn from(raw: CriterionThroughput) -> Self {
        let (per_iteration, unit) = match raw {
            CriterionThroughput::Bytes(n) | CriterionThroughput::BytesDecimal(n) => {
                (n, ThroughputUnit::Bytes)
            }
            CriterionThroughput::Elements(n) => (n, ThroughputUnit::Elements),
            // Byte rate is the figure the summary compares across transports.
            CriterionThroughput::ElementsAndBytes { bytes, .. } => (bytes, ThroughputUnit::Bytes),
        };
        Throughput {
            per_iteration,
            unit,
        }
    }
}

fn load_benchmark(dir: &Path, name: &str) -> Result<AggregateEstimate, AggregationError> {
    let snapshot = SNAPSHOTS
        .iter()
        .map(|snapshot| dir.join(snapshot))
        .find(|snapshot| snapshot.join("estimates.json").is_file())
        .ok_or_else(|| AggregationError::DataMissing {
            benchmark: name.to_string(),
            path: dir.to_path_buf(),
        })?;

    let raw: RawEstimates = read_json(&snapshot.join("estimates.json"))?;
    let throughput = match raw.throughput {
        Some(throughput) => Some(throughput),
        None => criterion_throughput(&snapshot.join("benchmark.json")),
    };

    AggregateEstimate::from_nanos(
        name,
        raw.mean.point_estimate,
        raw.mean.confidence_interval.lower_bound,
        raw.mean.confidence_interval.upper_bound,
        throughput,
    )
}

fn criterion_throughput(path: &Path) -> Option<Throughput> {
    if !path.is_file() {
        return None;
    }
    let raw: RawBenchmark = match read_json(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unreadable benchmark.json");
            return None;
        }
    };
    let value = raw.throughput?;
    match serde_json::from_value::<CriterionThroughput>(value.clone()) {
        Ok(throughput) => Some(throughput.into()),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                throughput = %value,
                error = %e,
                "Skipping unrecognized throughput in benchmark.json"
            );
            None
        }
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, AggregationError> {
    let content = fs::read_to_string(path).map_err(|source| AggregationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| AggregationError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn estimate(name: &str, mean_ms: f64) -> AggregateEstimate {
        AggregateEstimate::new(name, mean_ms, mean_ms * 0.9, mean_ms * 1.1, None).unwrap()
    }

    fn aggregation(estimates: Vec<AggregateEstimate>) -> Aggregation {
        Aggregation {
            estimates: estimates
                .into_iter()
                .map(|e| (e.name().to_string(), e))
                .collect(),
            skipped: Vec::new(),
        }
    }

    fn write_estimates(dir: &Path, snapshot: &str, point_ns: f64, extra: &str) {
        let snapshot_dir = dir.join(snapshot);
        fs::create_dir_all(&snapshot_dir).unwrap();
        fs::write(
            snapshot_dir.join("estimates.json"),
            format!(
                r#"{{"mean": {{"confidence_interval": {{"confidence_level": 0.95, "lower_bound": {}, "upper_bound": {}}}, "point_estimate": {}, "standard_error": 1.0}}{}}}"#,
                point_ns * 0.95,
                point_ns * 1.05,
                point_ns,
                extra
            ),
        )
        .unwrap();
    }

    #[test]
    fn test_one_millisecond_kibibyte_throughput() {
        let estimate = AggregateEstimate::from_nanos(
            "reqrep_reference_1024",
            1_000_000.0,
            900_000.0,
            1_100_000.0,
            Some(Throughput {
                per_iteration: 1024,
                unit: ThroughputUnit::Bytes,
            }),
        )
        .unwrap();

        assert!((estimate.mean_ms() - 1.0).abs() < 1e-12);
        assert_eq!(estimate.formatted_throughput().unwrap(), "1.02 MiB/s");
    }

    #[test]
    fn test_interval_is_ordered_after_conversion() {
        let estimate =
            AggregateEstimate::from_nanos("a", 2_500_000.0, 2_000_000.0, 3_000_000.0, None)
                .unwrap();
        assert!(estimate.lower_ms() <= estimate.mean_ms());
        assert!(estimate.mean_ms() <= estimate.upper_ms());

        let err = AggregateEstimate::from_nanos("b", 1.0, 2.0, 3.0, None).unwrap_err();
        assert!(matches!(err, AggregationError::InvalidInterval { .. }));
    }

    #[test]
    fn test_format_throughput_units() {
        assert_eq!(format_throughput(2.5e9, ThroughputUnit::Bytes), "2.50 GiB/s");
        assert_eq!(format_throughput(512.0, ThroughputUnit::Bytes), "0.51 KiB/s");
        assert_eq!(format_throughput(3.2e6, ThroughputUnit::Elements), "3.20M msg/s");
        assert_eq!(format_throughput(4500.0, ThroughputUnit::Elements), "4.50K msg/s");
        assert_eq!(format_throughput(12.0, ThroughputUnit::Elements), "12.00 msg/s");
    }

    #[test]
    fn test_speedup_symmetry() {
        let forward = speedup(2.0, 5.0);
        let backward = speedup(5.0, 2.0);
        assert!((forward * backward - 1.0).abs() < 1e-12);
        assert_eq!(format_speedup(forward), "2.50x faster");
        assert_eq!(format_speedup(backward), "2.50x slower");
        assert_eq!(format_speedup(1.0), "1.00x slower");
    }

    #[test]
    fn test_grouping_and_ordering() {
        let aggregation = aggregation(vec![
            estimate("pubsub_reference_64", 3.0),
            estimate("reqrep_reference_256", 2.0),
            estimate("reqrep_inproc_64", 1.0),
        ]);
        let report = ResultAggregator::new().report(&aggregation, Utc::now());

        let categories: Vec<_> = report.categories.keys().cloned().collect();
        assert_eq!(categories, vec!["pubsub", "reqrep"]);
        let names: Vec<_> = report.categories["reqrep"]
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["reqrep_inproc_64", "reqrep_reference_256"]);
    }

    #[test]
    fn test_injected_categorizer() {
        let aggregation = aggregation(vec![
            estimate("reqrep_inproc_64", 1.0),
            estimate("reqrep_reference_64", 2.0),
        ]);
        let report = ResultAggregator::new()
            .categorizer(|name| {
                if name.contains("inproc") {
                    "mock".to_string()
                } else {
                    "wire".to_string()
                }
            })
            .report(&aggregation, Utc::now());
        assert_eq!(report.categories["mock"].len(), 1);
        assert_eq!(report.categories["wire"].len(), 1);
    }

    #[test]
    fn test_highlights_sorted_by_mean() {
        let aggregation = aggregation(vec![
            estimate("reqrep_pipelined_slow", 9.0),
            estimate("reqrep_pipelined_fast", 1.0),
            estimate("reqrep_single", 0.5),
        ]);
        let report = ResultAggregator::new().report(&aggregation, Utc::now());
        let names: Vec<_> = report.highlights.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["reqrep_pipelined_fast", "reqrep_pipelined_slow"]);
    }

    #[test]
    fn test_comparisons_sorted_descending() {
        let aggregation = aggregation(vec![
            estimate("reqrep_inproc_64", 1.0),
            estimate("reqrep_reference_64", 4.0),
            estimate("pubsub_inproc_64", 2.0),
            estimate("pubsub_reference_64", 3.0),
            estimate("reqrep_inproc_128", 1.0),
        ]);
        let report = ResultAggregator::new().report(&aggregation, Utc::now());

        assert_eq!(report.comparisons.len(), 2);
        assert_eq!(report.comparisons[0].name, "reqrep_inproc_64");
        assert_eq!(report.comparisons[0].counterpart, "reqrep_reference_64");
        assert!((report.comparisons[0].speedup - 4.0).abs() < 1e-12);
        assert!((report.comparisons[1].speedup - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_mean_speedup_is_not_applicable() {
        assert_eq!(format_speedup(speedup(0.0, 2.0)), "n/a");
        assert_eq!(format_speedup(speedup(2.0, 0.0)), "n/a");
        assert_eq!(format_speedup(speedup(0.0, 0.0)), "n/a");

        let aggregation = aggregation(vec![
            estimate("reqrep_inproc_64", 0.0),
            estimate("reqrep_reference_64", 2.0),
            estimate("pubsub_inproc_64", 1.0),
            estimate("pubsub_reference_64", 3.0),
        ]);
        let report = ResultAggregator::new().report(&aggregation, Utc::now());

        assert_eq!(report.comparisons.len(), 2);
        assert_eq!(report.comparisons[0].name, "pubsub_inproc_64");
        assert_eq!(report.comparisons[1].name, "reqrep_inproc_64");
        assert_eq!(report.comparisons[1].to_string(), "reqrep_inproc_64: n/a");

        let summary = report.to_markdown();
        assert!(summary.contains("- **reqrep_inproc_64**: n/a"));
        assert!(!summary.contains("inf"));
        assert!(!summary.contains("NaN"));
    }

    #[test]
    fn test_collect_prefers_base_and_descends_groups() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        let flat = root.join("reqrep_reference_64");
        write_estimates(&flat, "base", 2_000_000.0, "");
        write_estimates(&flat, "new", 4_000_000.0, "");

        let grouped = root.join("pubsub_reference").join("1024");
        write_estimates(&grouped, "new", 1_000_000.0, "");
        fs::write(
            grouped.join("new").join("benchmark.json"),
            r#"{"group_id": "pubsub_reference", "throughput": {"Bytes": 1024}}"#,
        )
        .unwrap();

        fs::create_dir_all(root.join("report")).unwrap();
        fs::create_dir_all(root.join("pubsub_reference").join("report")).unwrap();

        let aggregation = ResultAggregator::new().collect(root).unwrap();
        assert!(aggregation.skipped.is_empty(), "{:?}", aggregation.skipped);
        assert_eq!(aggregation.estimates.len(), 2);

        let flat = &aggregation.estimates["reqrep_reference_64"];
        assert!((flat.mean_ms() - 2.0).abs() < 1e-9);

        let grouped = &aggregation.estimates["pubsub_reference_1024"];
        assert_eq!(grouped.formatted_throughput().unwrap(), "1.02 MiB/s");
    }

    #[test]
    fn test_estimates_throughput_wins_over_benchmark_json() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("pubsub_inproc_64");
        write_estimates(
            &dir,
            "new",
            1_000_000.0,
            r#", "throughput": {"per_iteration": 1000, "unit": "elements"}"#,
        );
        fs::write(
            dir.join("new").join("benchmark.json"),
            r#"{"throughput": {"Bytes": 64}}"#,
        )
        .unwrap();

        let aggregation = ResultAggregator::new().collect(temp_dir.path()).unwrap();
        let estimate = &aggregation.estimates["pubsub_inproc_64"];
        assert_eq!(estimate.formatted_throughput().unwrap(), "1.00M msg/s");
    }

    #[test]
    fn test_benchmark_json_throughput_variants() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let cases = [
            ("pubsub_reference_a", r#"{"BytesDecimal": 2048}"#, Some("2.05 MiB/s")),
            ("pubsub_reference_b", r#"{"Elements": 1000}"#, Some("1.00M msg/s")),
            (
                "pubsub_reference_c",
                r#"{"ElementsAndBytes": {"elements": 1, "bytes": 1024}}"#,
                Some("1.02 MiB/s"),
            ),
            ("pubsub_reference_d", r#"{"Frames": 7}"#, None),
        ];
        for (name, throughput, _) in &cases {
            let dir = root.join(name);
            write_estimates(&dir, "new", 1_000_000.0, "");
            fs::write(
                dir.join("new").join("benchmark.json"),
                format!(r#"{{"throughput": {}}}"#, throughput),
            )
            .unwrap();
        }

        let aggregation = ResultAggregator::new().collect(root).unwrap();
        assert!(aggregation.skipped.is_empty(), "{:?}", aggregation.skipped);
        for (name, _, expected) in &cases {
            let estimate = &aggregation.estimates[*name];
            assert_eq!(estimate.formatted_throughput().as_deref(), *expected, "{}", name);
        }
    }

    #[test]
    fn test_missing_data_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write_estimates(&root.join("reqrep_reference_64"), "new", 1_000_000.0, "");
        fs::create_dir_all(root.join("reqrep_broken").join("new")).unwrap();
        fs::create_dir_all(root.join("reqrep_empty")).unwrap();

        let corrupt = root.join("reqrep_corrupt").join("new");
        fs::create_dir_all(&corrupt).unwrap();
        fs::write(corrupt.join("estimates.json"), "{ not json").unwrap();

        let aggregation = ResultAggregator::new().collect(root).unwrap();
        assert_eq!(aggregation.estimates.len(), 1);
        assert_eq!(aggregation.skipped.len(), 3);
        assert!(aggregation.skipped.iter().any(|e| matches!(
            e,
            AggregationError::DataMissing { benchmark, .. } if benchmark == "reqrep_broken"
        )));
        assert!(aggregation
            .skipped
            .iter()
            .any(|e| matches!(e, AggregationError::Parse { .. })));
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let err = ResultAggregator::new()
            .collect(&temp_dir.path().join("absent"))
            .unwrap_err();
        assert!(matches!(err, AggregationError::DirectoryMissing { .. }));
    }

    #[test]
    fn test_markdown_sections() {
        let mut aggregation = aggregation(vec![
            AggregateEstimate::new(
                "reqrep_inproc_1024",
                1.0,
                0.9,
                1.1,
                Some(Throughput {
                    per_iteration: 1024,
                    unit: ThroughputUnit::Bytes,
                }),
            )
            .unwrap(),
            estimate("reqrep_reference_1024", 2.0),
        ]);
        aggregation.skipped.push(AggregationError::DataMissing {
            benchmark: "reqrep_gone".to_string(),
            path: PathBuf::from("/tmp/reqrep_gone"),
        });

        let markdown = ResultAggregator::new()
            .report(&aggregation, Utc::now())
            .to_markdown();

        assert!(markdown.starts_with("# Wirecheck Benchmark Results Summary"));
        assert!(markdown.contains("## REQREP"));
        assert!(markdown.contains("### reqrep_inproc_1024"));
        assert!(markdown.contains("- **Mean Time**: 1.00 ms [0.90, 1.10]"));
        assert!(markdown.contains("- **Throughput**: 1.02 MiB/s"));
        assert!(markdown.contains("### inproc vs reference Comparison"));
        assert!(markdown.contains("- **reqrep_inproc_1024**: 2.00x faster"));
        assert!(markdown.contains("reqrep_gone"));
    }
}
