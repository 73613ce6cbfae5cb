// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Benchmark harness for socket-pattern loops.
//!
//! Both loops are written against the socket seams from `wirecheck-core`, so
//! the same measurement runs over the reference `zeromq` backend, the
//! in-process mock peer, or a remote echo endpoint.

use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wirecheck_core::pattern::{self, pubsub, Replier, Requester};
use wirecheck_core::{
    Duplex, MessageReceiver, MessageSender, Multipart, ScenarioError, TransportError,
};

/// Warm-up exchanges discarded before measuring.
pub const DEFAULT_WARMUP: u64 = 100;

/// Sleep between empty polls of the bulk receive loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Consecutive empty polls tolerated before the receive loop gives up.
pub const DEFAULT_RETRY_BUDGET: u32 = 2000;

/// Errors that abort a benchmark run.
#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("exchange failed: {0}")]
    Exchange(#[from] ScenarioError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("iteration count must be positive")]
    NoIterations,
}

/// Elapsed wall time for a batch of messages of one size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSample {
    elapsed: Duration,
    payload_size: usize,
    messages: u64,
}

impl BenchmarkSample {
    pub fn new(elapsed: Duration, payload_size: usize, messages: u64) -> Self {
        Self {
            elapsed,
            payload_size,
            messages,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    pub fn messages(&self) -> u64 {
        self.messages
    }

    /// Messages per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.messages as f64 / secs
    }

    /// Mean time per message in microseconds.
    pub fn latency_us(&self) -> f64 {
        if self.messages == 0 {
            return 0.0;
        }
        self.elapsed.as_secs_f64() / self.messages as f64 * 1_000_000.0
    }

    pub fn total_bytes(&self) -> u64 {
        self.messages * self.payload_size as u64
    }
}

/// Outcome of one round-trip run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundTrip {
    /// The whole measured loop.
    pub sample: BenchmarkSample,
    /// Per-exchange latencies in nanoseconds, in run order.
    pub latencies_ns: Vec<u64>,
}

impl RoundTrip {
    pub fn throughput(&self) -> f64 {
        self.sample.throughput()
    }

    pub fn latency_us(&self) -> f64 {
        self.sample.latency_us()
    }
}

/// Outcome of one bulk publish/receive run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BulkTransfer {
    /// Messages accepted by the publisher without blocking.
    pub sent: u64,
    /// Sends that could not complete immediately.
    pub dropped: u64,
    pub received: u64,
    /// Publish phase, timed over accepted messages.
    pub send: BenchmarkSample,
    /// Receive phase, from the first poll to the last delivery.
    pub recv: BenchmarkSample,
}

impl BulkTransfer {
    pub fn send_throughput(&self) -> f64 {
        self.send.throughput()
    }

    pub fn recv_throughput(&self) -> f64 {
        self.recv.throughput()
    }

    pub fn total_elapsed(&self) -> Duration {
        self.send.elapsed() + self.recv.elapsed()
    }
}

/// Runs round-trip and bulk-transfer loops.
#[derive(Debug, Clone)]
pub struct BenchmarkRunner {
    /// Exchanges run and discarded before the clock starts
    warmup_iterations: u64,
    /// Per-receive deadline inside the round-trip loop
    recv_timeout: Duration,
    /// Sleep between empty polls
    poll_interval: Duration,
    /// Consecutive empty polls before the receive loop stops
    retry_budget: u32,
}

impl BenchmarkRunner {
    /// Create a runner with default settings.
    pub fn new() -> Self {
        Self {
            warmup_iterations: DEFAULT_WARMUP,
            recv_timeout: Duration::from_secs(5),
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }

    /// Set the number of warmup iterations.
    pub fn warmup(mut self, iterations: u64) -> Self {
        self.warmup_iterations = iterations;
        self
    }

    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn retry_budget(mut self, polls: u32) -> Self {
        self.retry_budget = polls;
        self
    }

    /// Time `iterations` full request-reply exchanges of a `payload_size`
    /// payload.
    ///
    /// With a `replier` both sides are driven from this task; without one
    /// the requester talks to a remote echo endpoint.
    pub async fn round_trip(
        &self,
        requester: &mut dyn Duplex,
        replier: Option<&mut dyn Duplex>,
        payload_size: usize,
        iterations: u64,
    ) -> Result<RoundTrip, BenchmarkError> {
        if iterations == 0 {
            return Err(BenchmarkError::NoIterations);
        }

        let payload = Multipart::single(Bytes::from(vec![b'X'; payload_size]));
        let mut requester = Requester::new(requester);
        let mut replier = replier.map(Replier::new);

        for index in 0..self.warmup_iterations {
            self.exchange(&mut requester, replier.as_mut(), &payload, index)
                .await?;
        }

        let mut latencies_ns = Vec::with_capacity(iterations as usize);
        let start = Instant::now();
        for index in 0..iterations {
            let exchange_start = Instant::now();
            self.exchange(&mut requester, replier.as_mut(), &payload, index)
                .await?;
            latencies_ns.push(exchange_start.elapsed().as_nanos() as u64);
        }
        let sample = BenchmarkSample::new(start.elapsed(), payload_size, iterations);

        tracing::debug!(
            payload_size,
            iterations,
            elapsed_ms = sample.elapsed().as_millis() as u64,
            "Round-trip run complete"
        );
        Ok(RoundTrip {
            sample,
            latencies_ns,
        })
    }

    async fn exchange<Q, P>(
        &self,
        requester: &mut Requester<Q>,
        replier: Option<&mut Replier<P>>,
        payload: &Multipart,
        index: u64,
    ) -> Result<(), BenchmarkError>
    where
        Q: Duplex,
        P: Duplex,
    {
        let index = index as usize;
        requester.send(payload.clone()).await?;
        if let Some(replier) = replier {
            let request = replier.recv(index, self.recv_timeout).await?;
            replier.reply(request).await?;
        }
        requester.recv(index, self.recv_timeout).await?;
        Ok(())
    }

    /// Publish `count` messages without blocking, then poll the subscriber.
    ///
    /// The subscription must already be in place. Probe messages left over
    /// from a subscription handshake are not counted.
    pub async fn bulk_transfer(
        &self,
        publisher: &mut dyn MessageSender,
        subscriber: &mut dyn MessageReceiver,
        payload_size: usize,
        count: u64,
    ) -> Result<BulkTransfer, BenchmarkError> {
        if count == 0 {
            return Err(BenchmarkError::NoIterations);
        }

        let payload = Multipart::single(Bytes::from(vec![b'X'; payload_size]));
        let mut sent = 0u64;
        let mut dropped = 0u64;

        let send_start = Instant::now();
        for _ in 0..count {
            if pattern::try_send(publisher, payload.clone()).await? {
                sent += 1;
            } else {
                dropped += 1;
            }
        }
        let send = BenchmarkSample::new(send_start.elapsed(), payload_size, sent);

        let recv_start = Instant::now();
        let mut last_delivery = recv_start;
        let mut received = 0u64;
        let mut empty_polls = 0u32;
        while received < count {
            match pattern::try_recv(subscriber).await? {
                Some(message) if pubsub::is_probe(&message) => {}
                Some(_) => {
                    received += 1;
                    empty_polls = 0;
                    last_delivery = Instant::now();
                }
                None => {
                    empty_polls += 1;
                    if empty_polls >= self.retry_budget {
                        tracing::warn!(
                            received,
                            expected = count,
                            empty_polls,
                            "Receive budget exhausted"
                        );
                        break;
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
        let recv = BenchmarkSample::new(
            last_delivery.duration_since(recv_start),
            payload_size,
            received,
        );

        tracing::debug!(payload_size, sent, dropped, received, "Bulk transfer complete");
        Ok(BulkTransfer {
            sent,
            dropped,
            received,
            send,
            recv,
        })
    }
}

impl Default for BenchmarkRunner {
    fn default() -> Self {
        Self::new()
    }
}
