// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Endpoint process harness.
//!
//! Launches endpoint executables, confirms readiness and guarantees
//! termination on every exit path.

mod process;
mod readiness;
mod session;

use std::path::Path;
use std::time::Duration;

pub use process::{CapturedOutput, EndpointProcess, TerminationResult};
pub use readiness::{await_ready, parse_ready_line, Backoff, Readiness, READY_MARKER};
pub use session::{EndpointSpec, TestSession};

use crate::config::HarnessConfig;
use crate::error::{ScenarioResult, StartupFailure};
use crate::types::ExecutablePath;

/// How long a freshly spawned process must survive to count as started.
const LIVENESS_PROBE: Duration = Duration::from_millis(50);

/// Starts and stops endpoint processes with the suite's timeouts.
#[derive(Debug, Clone, Default)]
pub struct ProcessHarness {
    config: HarnessConfig,
}

impl ProcessHarness {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Spawn an executable and make sure it does not exit straight away.
    ///
    /// # Errors
    /// `StartupFailure` if the executable is missing, cannot be spawned, or
    /// exits during the liveness probe.
    pub async fn start(
        &self,
        executable: &ExecutablePath,
        args: &[String],
        working_dir: Option<&Path>,
    ) -> Result<EndpointProcess, StartupFailure> {
        let mut process = EndpointProcess::start(executable, args, working_dir)?;
        process.ensure_alive(LIVENESS_PROBE).await?;
        Ok(process)
    }

    /// SIGTERM, wait for the configured grace period, then SIGKILL.
    pub async fn stop(&self, process: &mut EndpointProcess) -> TerminationResult {
        process.terminate(self.config.grace_timeout).await
    }

    /// Spawn an endpoint and wait until it is ready for traffic.
    pub async fn open_session(
        &self,
        label: &str,
        spec: &EndpointSpec,
        extra_args: &[String],
        binds: bool,
    ) -> ScenarioResult<TestSession> {
        TestSession::open(label, spec, extra_args, binds, &self.config).await
    }
}
