// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI tool to run the socket-pattern benchmarks and generate reports.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use wirecheck_benchmark::{
    BenchmarkCategory, BenchmarkReport, BenchmarkResult, BenchmarkRunner, JsonReporter,
    LatencyMetrics, ThroughputMetrics,
};
use wirecheck_core::pattern::zmq;
use wirecheck_core::pattern::{PubSubVerifier, Publication};
use wirecheck_core::{Subscribe, Subscription, TcpEndpoint};

const REQ_REP_SIZES: [usize; 4] = [64, 256, 1024, 10240];
const PUB_SUB_SIZES: [usize; 3] = [64, 256, 1024];

#[derive(Parser)]
#[command(name = "run_benchmarks")]
#[command(about = "Run wirecheck socket benchmarks and generate JSON reports")]
struct Args {
    /// Output directory for benchmark data
    #[arg(short, long, default_value = "data")]
    output: PathBuf,

    /// Round trips per REQ/REP payload size
    #[arg(short, long, default_value_t = 10_000)]
    iterations: u64,

    /// Messages per PUB/SUB payload size
    #[arg(short, long, default_value_t = 100_000)]
    messages: u64,

    /// Categories to run (reqrep, pubsub; all if not specified)
    #[arg(short, long)]
    category: Option<Vec<String>>,

    /// Run REQ/REP against a remote echo endpoint instead of a local replier
    #[arg(long)]
    endpoint: Option<TcpEndpoint>,

    /// Host for locally bound reference sockets
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Run in quick mode (fewer iterations)
    #[arg(long)]
    quick: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    let (iterations, messages) = if args.quick {
        (args.iterations.min(1_000), args.messages.min(10_000))
    } else {
        (args.iterations, args.messages)
    };

    println!("Wirecheck Benchmark Suite");
    println!("=========================");
    println!("Output directory: {:?}", args.output);
    println!("REQ/REP round trips: {}", iterations);
    println!("PUB/SUB messages: {}", messages);
    println!();

    let reporter = JsonReporter::new(&args.output)?;
    let mut report = BenchmarkReport::new();
    let runner = BenchmarkRunner::new();

    let run_all = args.category.is_none();
    let categories: Vec<String> = args.category.clone().unwrap_or_default();
    let should_run = |cat: BenchmarkCategory| -> bool {
        run_all
            || categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&cat.to_string()))
    };

    if should_run(BenchmarkCategory::ReqRep) {
        println!("Running REQ/REP benchmarks...");
        run_req_rep(&mut report, &runner, &args, iterations).await?;
    }

    if should_run(BenchmarkCategory::PubSub) {
        println!("Running PUB/SUB benchmarks...");
        run_pub_sub(&mut report, &runner, &args.host, messages).await?;
    }

    let path = reporter.save(&report)?;
    println!();
    println!("Benchmark report saved to: {:?}", path);
    println!();

    print_summary(&report);

    Ok(())
}

async fn run_req_rep(
    report: &mut BenchmarkReport,
    runner: &BenchmarkRunner,
    args: &Args,
    iterations: u64,
) -> anyhow::Result<()> {
    for size in REQ_REP_SIZES {
        let (name, run) = match &args.endpoint {
            Some(endpoint) => {
                let mut requester = zmq::connect_req(endpoint).await?;
                let run = runner.round_trip(&mut requester, None, size, iterations).await?;
                requester.close().await;
                (format!("reqrep_remote_{}", size), run)
            }
            None => {
                let (mut replier, endpoint) = zmq::bind_rep(&args.host).await?;
                let mut requester = zmq::connect_req(&endpoint).await?;
                let run = runner
                    .round_trip(&mut requester, Some(&mut replier), size, iterations)
                    .await?;
                requester.close().await;
                replier.close().await;
                (format!("reqrep_reference_{}", size), run)
            }
        };

        report.add_result(
            BenchmarkResult::round_trip(&name, &run, true)
                .with_metadata("payload_size_bytes", size)
                .with_metadata("latency_us", run.latency_us()),
        );
        println!("  ✓ {}", name);
    }
    Ok(())
}

async fn run_pub_sub(
    report: &mut BenchmarkReport,
    runner: &BenchmarkRunner,
    host: &str,
    messages: u64,
) -> anyhow::Result<()> {
    let handshake = PubSubVerifier::new(
        Publication::new(Subscription::all(), Vec::new()),
        Duration::from_millis(100),
        Duration::from_secs(5),
    );

    for size in PUB_SUB_SIZES {
        let (mut publisher, endpoint) = zmq::bind_pub(host).await?;
        let mut subscriber = zmq::connect_sub(&endpoint).await?;
        subscriber.subscribe(&Subscription::all()).await?;
        handshake.confirm_local(&mut publisher, &mut subscriber).await?;

        let transfer = runner
            .bulk_transfer(&mut publisher, &mut subscriber, size, messages)
            .await?;
        publisher.close().await;
        subscriber.close().await;

        let name = format!("pubsub_reference_{}", size);
        report.add_result(
            BenchmarkResult::bulk_transfer(&name, &transfer)
                .with_metadata("payload_size_bytes", size),
        );
        println!("  ✓ {}", name);
    }
    Ok(())
}

fn print_summary(report: &BenchmarkReport) {
    println!("Summary");
    println!("-------");
    println!();

    for result in &report.results {
        println!("{} ({} bytes)", result.name, result.payload_size);
        match result.category {
            BenchmarkCategory::ReqRep => {
                if let Some(throughput) = &result.throughput {
                    println!("  Throughput: {:.0} msg/s", throughput.messages_per_sec);
                    println!(
                        "  Latency:    {:.2} μs",
                        throughput.duration_ns as f64 / 1_000.0 / result.iterations.max(1) as f64
                    );
                    println!(
                        "  Elapsed:    {:.3} s",
                        throughput.duration_ns as f64 / 1_000_000_000.0
                    );
                }
                if let Some(latency) = &result.latency {
                    println!(
                        "  median={}, p99={}",
                        LatencyMetrics::format_latency(latency.median_ns),
                        LatencyMetrics::format_latency(latency.p99_ns)
                    );
                }
            }
            BenchmarkCategory::PubSub => {
                if let Some(send) = &result.throughput {
                    println!(
                        "  Send throughput: {:.0} msg/s ({})",
                        send.messages_per_sec,
                        ThroughputMetrics::format_bytes_per_sec(send.bytes_per_sec)
                    );
                }
                if let Some(recv) = &result.recv_throughput {
                    println!(
                        "  Recv throughput: {:.0} msg/s ({})",
                        recv.messages_per_sec,
                        ThroughputMetrics::format_bytes_per_sec(recv.bytes_per_sec)
                    );
                }
                if let Some(dropped) = result.metadata.get("dropped") {
                    println!("  Dropped:         {}", dropped);
                }
            }
        }
        println!();
    }
}
