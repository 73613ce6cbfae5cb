// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Wirecheck Benchmarking Framework
//!
//! Throughput and latency measurement for request-reply and
//! publish-subscribe sockets, plus aggregation of criterion output into a
//! comparison summary.
//!
//! # Benchmark Categories
//!
//! - **REQ/REP**: full round trips at fixed payload sizes
//! - **PUB/SUB**: bulk non-blocking publish with a polling subscriber
//!
//! # Data Output
//!
//! `run_benchmarks` writes timestamped JSON reports. Criterion benches write
//! to `target/criterion`, which [`ResultAggregator`] turns into markdown.

pub mod aggregate;
pub mod harness;
pub mod metrics;
pub mod reporter;

pub use aggregate::{
    AggregateEstimate, Aggregation, AggregationError, ComparisonReport, ResultAggregator,
    Throughput, ThroughputUnit,
};
pub use harness::{BenchmarkError, BenchmarkRunner, BenchmarkSample, BulkTransfer, RoundTrip};
pub use metrics::{
    BenchmarkCategory, BenchmarkReport, BenchmarkResult, LatencyMetrics, SystemInfo,
    ThroughputMetrics,
};
pub use reporter::JsonReporter;
