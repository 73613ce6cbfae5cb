// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Socket-pattern benchmarks.
//!
//! Each pattern runs over the reference `zeromq` backend on loopback TCP and
//! over the in-process mock peer. Group names follow
//! `<pattern>_<backend>` so the aggregator pairs `inproc` results with their
//! `reference` counterparts.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;
use wirecheck_benchmark::BenchmarkRunner;
use wirecheck_core::pattern::inproc::{self, InprocPublisher};
use wirecheck_core::pattern::zmq;
use wirecheck_core::pattern::{PubSubVerifier, Publication};
use wirecheck_core::{MessageReceiver, MessageSender, Subscribe, Subscription};

const REQ_REP_SIZES: &[usize] = &[64, 256, 1024, 10240];
const PUB_SUB_SIZES: &[usize] = &[64, 256, 1024];

/// Bulk transfers are split into batches no larger than a subscriber queue.
const BATCH: u64 = 1000;

fn runtime() -> Runtime {
    Runtime::new().expect("Failed to build tokio runtime")
}

fn runner() -> BenchmarkRunner {
    BenchmarkRunner::new().warmup(0).retry_budget(50)
}

/// Time `iters` bulk messages as a sequence of batches.
fn bulk_batches(
    rt: &Runtime,
    runner: &BenchmarkRunner,
    publisher: &mut dyn MessageSender,
    subscriber: &mut dyn MessageReceiver,
    size: usize,
    iters: u64,
) -> Duration {
    let mut elapsed = Duration::ZERO;
    let mut remaining = iters;
    while remaining > 0 {
        let batch = remaining.min(BATCH);
        let transfer = rt
            .block_on(runner.bulk_transfer(&mut *publisher, &mut *subscriber, size, batch))
            .expect("Bulk transfer failed");
        elapsed += transfer.total_elapsed();
        remaining -= batch;
    }
    elapsed
}

/// Benchmark REQ/REP round trips over loopback TCP.
fn bench_reqrep_reference(c: &mut Criterion) {
    let rt = runtime();
    let runner = runner();
    let mut group = c.benchmark_group("reqrep_reference");
    group.measurement_time(Duration::from_secs(5));

    for &size in REQ_REP_SIZES {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let (mut replier, mut requester) = rt.block_on(async {
                let (replier, endpoint) = zmq::bind_rep("127.0.0.1").await.expect("Bind failed");
                let requester = zmq::connect_req(&endpoint).await.expect("Connect failed");
                (replier, requester)
            });

            b.iter_custom(|iters| {
                rt.block_on(runner.round_trip(&mut requester, Some(&mut replier), size, iters))
                    .expect("Round trip failed")
                    .sample
                    .elapsed()
            });
        });
    }

    group.finish();
}

/// Benchmark REQ/REP round trips through the in-process pair.
fn bench_reqrep_inproc(c: &mut Criterion) {
    let rt = runtime();
    let runner = runner();
    let mut group = c.benchmark_group("reqrep_inproc");

    for &size in REQ_REP_SIZES {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let (mut requester, mut replier) = inproc::pair();

            b.iter_custom(|iters| {
                rt.block_on(runner.round_trip(&mut requester, Some(&mut replier), size, iters))
                    .expect("Round trip failed")
                    .sample
                    .elapsed()
            });
        });
    }

    group.finish();
}

/// Benchmark PUB/SUB bulk delivery over loopback TCP.
fn bench_pubsub_reference(c: &mut Criterion) {
    let rt = runtime();
    let runner = runner();
    let handshake = PubSubVerifier::new(
        Publication::new(Subscription::all(), Vec::new()),
        Duration::from_millis(100),
        Duration::from_secs(5),
    );
    let mut group = c.benchmark_group("pubsub_reference");
    group.measurement_time(Duration::from_secs(5));

    for &size in PUB_SUB_SIZES {
        group.throughput(Throughput::Elements(1));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let (mut publisher, mut subscriber) = rt.block_on(async {
                let (mut publisher, endpoint) =
                    zmq::bind_pub("127.0.0.1").await.expect("Bind failed");
                let mut subscriber = zmq::connect_sub(&endpoint).await.expect("Connect failed");
                subscriber
                    .subscribe(&Subscription::all())
                    .await
                    .expect("Subscribe failed");
                handshake
                    .confirm_local(&mut publisher, &mut subscriber)
                    .await
                    .expect("Subscription never propagated");
                (publisher, subscriber)
            });

            b.iter_custom(|iters| {
                bulk_batches(&rt, &runner, &mut publisher, &mut subscriber, size, iters)
            });
        });
    }

    group.finish();
}

/// Benchmark PUB/SUB bulk delivery through the in-process publisher.
fn bench_pubsub_inproc(c: &mut Criterion) {
    let rt = runtime();
    let runner = runner();
    let mut group = c.benchmark_group("pubsub_inproc");

    for &size in PUB_SUB_SIZES {
        group.throughput(Throughput::Elements(1));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut publisher = InprocPublisher::with_capacity(BATCH as usize);
            let mut subscriber = publisher.subscriber();
            rt.block_on(subscriber.subscribe(&Subscription::all()))
                .expect("Subscribe failed");

            b.iter_custom(|iters| {
                bulk_batches(&rt, &runner, &mut publisher, &mut subscriber, size, iters)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_reqrep_reference,
    bench_reqrep_inproc,
    bench_pubsub_reference,
    bench_pubsub_inproc,
);
criterion_main!(benches);
