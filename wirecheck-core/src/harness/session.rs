// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! A scenario-owned endpoint session.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use super::process::{CapturedOutput, EndpointProcess, TerminationResult};
use super::readiness::{await_ready, Readiness};
use crate::config::HarnessConfig;
use crate::error::{ScenarioError, ScenarioResult, StartupFailure};
use crate::state::{SessionState, SessionStateMachine};
use crate::types::{ExecutablePath, PortSpec, TcpEndpoint};

/// How to launch one endpoint under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    pub executable: ExecutablePath,
    /// Arguments placed before the harness-supplied `--port`/`--topic` flags.
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Port for binding endpoints; ignored by connecting ones.
    pub port: PortSpec,
    pub readiness: Readiness,
}

impl EndpointSpec {
    pub fn new(executable: ExecutablePath) -> Self {
        Self {
            executable,
            args: Vec::new(),
            working_dir: None,
            port: PortSpec::Ephemeral,
            readiness: Readiness::default(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_port(mut self, port: PortSpec) -> Self {
        self.port = port;
        self
    }

    pub fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// A live endpoint process plus its lifecycle state.
///
/// Exactly one owner (the scenario) stops the session. A session dropped
/// without `stop` kills its process.
#[derive(Debug)]
pub struct TestSession {
    process: EndpointProcess,
    state: SessionStateMachine,
    endpoint: Option<TcpEndpoint>,
    grace_timeout: Duration,
}

impl TestSession {
    /// Spawn the endpoint and wait for readiness.
    ///
    /// `binds` marks endpoints that own a listening port; their resolved
    /// endpoint must be known once ready.
    pub(crate) async fn open(
        label: &str,
        spec: &EndpointSpec,
        extra_args: &[String],
        binds: bool,
        config: &HarnessConfig,
    ) -> ScenarioResult<Self> {
        let mut args = spec.args.clone();
        args.extend_from_slice(extra_args);

        let process = EndpointProcess::start(&spec.executable, &args, spec.working_dir.as_deref())?;
        let mut session = Self {
            process,
            state: SessionStateMachine::new(label),
            endpoint: None,
            grace_timeout: config.grace_timeout,
        };

        match session.await_ready(spec, binds, config).await {
            Ok(endpoint) => {
                session.endpoint = endpoint;
                session.state.transition_to(SessionState::Ready)?;
                tracing::debug!(
                    session = %label,
                    endpoint = ?session.endpoint.as_ref().map(ToString::to_string),
                    "Session ready"
                );
                Ok(session)
            }
            Err(failure) => {
                session.state.transition_to(SessionState::Failed)?;
                session.stop().await;
                Err(failure.into())
            }
        }
    }

    async fn await_ready(
        &mut self,
        spec: &EndpointSpec,
        binds: bool,
        config: &HarnessConfig,
    ) -> Result<Option<TcpEndpoint>, StartupFailure> {
        let reported = await_ready(
            &mut self.process,
            &spec.readiness,
            &config.host,
            spec.port,
            config.ready_timeout,
        )
        .await?;

        let endpoint =
            reported.or_else(|| spec.port.fixed().map(|port| TcpEndpoint::new(&config.host, port)));

        if binds && endpoint.is_none() {
            return Err(StartupFailure::PortUnresolved {
                program: self.process.program().to_string(),
            });
        }
        Ok(endpoint)
    }

    pub fn state(&self) -> SessionState {
        self.state.state()
    }

    pub fn label(&self) -> &str {
        self.state.label()
    }

    /// Endpoint the process bound, if it binds.
    pub fn endpoint(&self) -> Option<&TcpEndpoint> {
        self.endpoint.as_ref()
    }

    /// Endpoint of a binding session; `PortUnresolved` if none is known.
    pub fn require_endpoint(&self) -> ScenarioResult<TcpEndpoint> {
        self.endpoint.clone().ok_or_else(|| {
            StartupFailure::PortUnresolved {
                program: self.process.program().to_string(),
            }
            .into()
        })
    }

    /// Whether the process has exited.
    pub fn has_exited(&mut self) -> bool {
        !self.process.is_running()
    }

    pub fn output(&self) -> &CapturedOutput {
        self.process.output()
    }

    pub fn pid(&self) -> crate::types::ProcessId {
        self.process.pid()
    }

    /// `ProcessFailure` if the process has already exited.
    pub fn check_alive(&mut self) -> ScenarioResult<()> {
        match self.process.try_status() {
            Some(status) => Err(self.fail(format!("exited unexpectedly with {}", status))),
            None => Ok(()),
        }
    }

    /// Wait for the process to exit on its own; `ProcessFailure` past `limit`.
    pub async fn wait_for_exit(&mut self, limit: Duration) -> ScenarioResult<ExitStatus> {
        match self.process.wait_exit(limit).await {
            Some(status) => Ok(status),
            None => Err(self.fail(format!("did not exit within {}ms", limit.as_millis()))),
        }
    }

    /// Wait for exit and require a zero status.
    pub async fn expect_success(&mut self, limit: Duration) -> ScenarioResult<()> {
        let status = self.wait_for_exit(limit).await?;
        if status.success() {
            Ok(())
        } else {
            Err(self.fail(format!("exited with {}", status)))
        }
    }

    /// Build a `ProcessFailure` and mark the session failed.
    pub fn fail(&mut self, reason: String) -> ScenarioError {
        if self.state.state() != SessionState::Failed && !self.state.state().is_terminal() {
            let _ = self.state.transition_to(SessionState::Failed);
        }
        ScenarioError::ProcessFailure {
            program: self.process.program().to_string(),
            reason,
            stderr: self.process.output().stderr_tail(),
        }
    }

    /// Terminate the process (SIGTERM, then SIGKILL after the grace period).
    pub async fn stop(&mut self) -> TerminationResult {
        let result = self.process.terminate(self.grace_timeout).await;
        if self.state.needs_stop() {
            let _ = self.state.transition_to(SessionState::Stopped);
        }
        tracing::debug!(
            session = %self.state.label(),
            result = ?result,
            lifetime_ms = self.state.age().as_millis() as u64,
            "Session stopped"
        );
        result
    }
}

impl Drop for TestSession {
    fn drop(&mut self) {
        if self.state.needs_stop() {
            tracing::warn!(session = %self.state.label(), "Session dropped without stop, killing endpoint");
            self.process.kill_now();
        }
    }
}
