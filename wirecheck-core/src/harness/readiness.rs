// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Endpoint readiness detection.
//!
//! Replaces blind startup sleeps with an explicit signal: a READY line on
//! stdout (optionally carrying the bound endpoint), or a TCP connection
//! probe. Both poll with bounded exponential backoff.

use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use super::process::EndpointProcess;
use crate::error::StartupFailure;
use crate::types::{PortSpec, TcpEndpoint};

/// Default READY marker printed by endpoints.
pub const READY_MARKER: &str = "READY";

const BACKOFF_INITIAL: Duration = Duration::from_millis(5);
const BACKOFF_MAX: Duration = Duration::from_millis(200);

/// How a session decides its endpoint is ready for traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Wait for a stdout line starting with `marker`. A `tcp://host:port`
    /// token on that line is read back as the bound endpoint.
    OutputMarker { marker: String },
    /// Poll until a TCP connection to the fixed port succeeds.
    ConnectProbe,
    /// Fixed delay, for endpoints offering no handshake at all.
    Settle { delay: Duration },
}

impl Default for Readiness {
    fn default() -> Self {
        Self::OutputMarker {
            marker: READY_MARKER.to_string(),
        }
    }
}

/// Exponential backoff for polling loops.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial,
            max,
        }
    }

    /// Next delay; doubles each call up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Sleep for the next delay, never past `deadline`.
    pub async fn wait(&mut self, deadline: Instant) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::time::sleep(self.next_delay().min(remaining)).await;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BACKOFF_INITIAL, BACKOFF_MAX)
    }
}

/// Extract a `tcp://` endpoint from a READY line, if present.
pub fn parse_ready_line(line: &str, marker: &str) -> Option<TcpEndpoint> {
    line.strip_prefix(marker)?
        .split_whitespace()
        .find_map(|token| token.parse::<TcpEndpoint>().ok())
}

/// Wait until the process is ready, returning the endpoint it reported or
/// was probed on.
///
/// # Errors
/// `ExitedImmediately` if the process dies while waiting, `ReadyTimeout` if
/// the deadline passes, `PortUnresolved` for a connection probe without a
/// fixed port.
pub async fn await_ready(
    process: &mut EndpointProcess,
    readiness: &Readiness,
    host: &str,
    port: PortSpec,
    timeout: Duration,
) -> Result<Option<TcpEndpoint>, StartupFailure> {
    let started = Instant::now();
    let deadline = started + timeout;
    let mut backoff = Backoff::default();

    let result = match readiness {
        Readiness::OutputMarker { marker } => loop {
            if let Some(line) = process
                .output()
                .find_stdout(|line| line.starts_with(marker.as_str()))
            {
                break Ok(parse_ready_line(&line, marker));
            }
            check_alive(process).await?;
            if Instant::now() >= deadline {
                break Err(ready_timeout(process, timeout));
            }
            backoff.wait(deadline).await;
        },
        Readiness::ConnectProbe => {
            let fixed = port.fixed().ok_or_else(|| StartupFailure::PortUnresolved {
                program: process.program().to_string(),
            })?;
            let endpoint = TcpEndpoint::new(host, fixed);
            loop {
                if TcpStream::connect(endpoint.socket_addr()).await.is_ok() {
                    break Ok(Some(endpoint));
                }
                check_alive(process).await?;
                if Instant::now() >= deadline {
                    break Err(ready_timeout(process, timeout));
                }
                backoff.wait(deadline).await;
            }
        }
        Readiness::Settle { delay } => {
            tokio::time::sleep(*delay).await;
            check_alive(process).await?;
            Ok(None)
        }
    };

    if result.is_ok() {
        tracing::info!(
            program = %process.program(),
            pid = %process.pid(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Endpoint ready"
        );
    }
    result
}

async fn check_alive(process: &mut EndpointProcess) -> Result<(), StartupFailure> {
    match process.try_status() {
        Some(status) => {
            process.drain_readers().await;
            Err(StartupFailure::ExitedImmediately {
                program: process.program().to_string(),
                status: status.to_string(),
                stderr: process.output().stderr_tail(),
            })
        }
        None => Ok(()),
    }
}

fn ready_timeout(process: &EndpointProcess, timeout: Duration) -> StartupFailure {
    StartupFailure::ReadyTimeout {
        program: process.program().to_string(),
        waited_ms: timeout.as_millis() as u64,
    }
}
