// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Endpoint process management.
//!
//! Spawns an endpoint executable with captured stdout/stderr and terminates it
//! with SIGTERM, escalating to SIGKILL once the grace period runs out.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::error::StartupFailure;
use crate::types::{ExecutablePath, ProcessId};

/// Upper bound on waiting for reader tasks to flush after exit.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Lines of stderr carried into error messages.
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Line-buffered stdout/stderr of an endpoint process.
#[derive(Debug, Default)]
pub struct CapturedOutput {
    stdout: Mutex<Vec<String>>,
    stderr: Mutex<Vec<String>>,
}

impl CapturedOutput {
    fn lock(lines: &Mutex<Vec<String>>) -> MutexGuard<'_, Vec<String>> {
        lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, stream: OutputStream, line: String) {
        let target = match stream {
            OutputStream::Stdout => &self.stdout,
            OutputStream::Stderr => &self.stderr,
        };
        Self::lock(target).push(line);
    }

    #[cfg(test)]
    pub(crate) fn push_stdout(&self, line: &str) {
        self.push(OutputStream::Stdout, line.to_string());
    }

    /// Snapshot of the stdout lines captured so far.
    pub fn stdout_lines(&self) -> Vec<String> {
        Self::lock(&self.stdout).clone()
    }

    /// Snapshot of the stderr lines captured so far.
    pub fn stderr_lines(&self) -> Vec<String> {
        Self::lock(&self.stderr).clone()
    }

    /// First stdout line satisfying `predicate`.
    pub fn find_stdout<F>(&self, predicate: F) -> Option<String>
    where
        F: Fn(&str) -> bool,
    {
        Self::lock(&self.stdout)
            .iter()
            .find(|line| predicate(line))
            .cloned()
    }

    /// Whether any stdout line satisfies `predicate`.
    pub fn stdout_contains<F>(&self, predicate: F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        Self::lock(&self.stdout).iter().any(|line| predicate(line))
    }

    /// The last few stderr lines joined for diagnostics.
    pub fn stderr_tail(&self) -> String {
        let lines = Self::lock(&self.stderr);
        let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
        lines[start..].join("\n")
    }
}

/// How a process ended when it was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationResult {
    /// Exited within the grace period after SIGTERM.
    Graceful(ExitStatus),
    /// Ignored SIGTERM and was killed.
    Killed,
    /// Had already exited before termination was requested.
    AlreadyExited(ExitStatus),
}

impl TerminationResult {
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self {
            Self::Graceful(status) | Self::AlreadyExited(status) => Some(*status),
            Self::Killed => None,
        }
    }

    pub fn was_forced(&self) -> bool {
        matches!(self, Self::Killed)
    }
}

/// A spawned endpoint process.
///
/// The child is spawned with kill-on-drop, so dropping the handle on any
/// exit path (including a panic) still releases the process and its port.
pub struct EndpointProcess {
    program: String,
    child: Child,
    pid: ProcessId,
    output: Arc<CapturedOutput>,
    readers: Vec<JoinHandle<()>>,
    exit_status: Option<ExitStatus>,
}

impl EndpointProcess {
    /// Spawn an endpoint executable.
    ///
    /// Must be called from within a Tokio runtime: output capture runs on
    /// spawned tasks. Readiness is not confirmed here.
    ///
    /// # Errors
    /// Returns StartupFailure if the executable is missing or cannot be spawned.
    pub fn start(
        executable: &ExecutablePath,
        args: &[String],
        working_dir: Option<&Path>,
    ) -> Result<Self, StartupFailure> {
        let program = executable.program_name();

        if executable.is_explicit() && !executable.as_path().exists() {
            return Err(StartupFailure::ExecutableMissing {
                path: executable.as_path().to_path_buf(),
            });
        }

        let mut command = Command::new(executable.as_path());
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StartupFailure::ExecutableMissing {
                    path: executable.as_path().to_path_buf(),
                }
            } else {
                StartupFailure::SpawnFailed {
                    program: program.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let pid = child
            .id()
            .and_then(|raw| ProcessId::new(raw).ok())
            .ok_or_else(|| StartupFailure::SpawnFailed {
                program: program.clone(),
                reason: "spawned process has no pid".to_string(),
            })?;

        let output = Arc::new(CapturedOutput::default());
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, Arc::clone(&output), OutputStream::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, Arc::clone(&output), OutputStream::Stderr));
        }

        tracing::debug!(
            program = %program,
            pid = %pid,
            args = ?args,
            "Spawned endpoint process"
        );

        Ok(Self {
            program,
            child,
            pid,
            output,
            readers,
            exit_status: None,
        })
    }

    /// Get the process ID.
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Short program name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Captured output, readable while the process runs and after it exits.
    pub fn output(&self) -> &Arc<CapturedOutput> {
        &self.output
    }

    /// Exit status if the process has exited, without blocking.
    pub fn try_status(&mut self) -> Option<ExitStatus> {
        if self.exit_status.is_none() {
            self.exit_status = self.child.try_wait().ok().flatten();
        }
        self.exit_status
    }

    /// Check if the process is still running.
    pub fn is_running(&mut self) -> bool {
        self.try_status().is_none()
    }

    /// Wait up to `limit` for the process to exit on its own.
    pub async fn wait_exit(&mut self, limit: Duration) -> Option<ExitStatus> {
        if let Some(status) = self.try_status() {
            self.drain_readers().await;
            return Some(status);
        }
        match tokio::time::timeout(limit, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.exit_status = Some(status);
                self.drain_readers().await;
                Some(status)
            }
            Ok(Err(e)) => {
                tracing::warn!(program = %self.program, error = %e, "wait on endpoint failed");
                None
            }
            Err(_) => None,
        }
    }

    /// Fail with `ExitedImmediately` if the process exits within `probe`.
    pub async fn ensure_alive(&mut self, probe: Duration) -> Result<(), StartupFailure> {
        match self.wait_exit(probe).await {
            Some(status) => Err(StartupFailure::ExitedImmediately {
                program: self.program.clone(),
                status: status.to_string(),
                stderr: self.output.stderr_tail(),
            }),
            None => Ok(()),
        }
    }

    /// Send SIGTERM, wait up to `grace`, then SIGKILL.
    pub async fn terminate(&mut self, grace: Duration) -> TerminationResult {
        if let Some(status) = self.try_status() {
            self.drain_readers().await;
            return TerminationResult::AlreadyExited(status);
        }

        let pid = Pid::from_raw(self.pid.value() as i32);
        match signal::kill(pid, Signal::SIGTERM) {
            Ok(()) => {}
            Err(Errno::ESRCH) => {
                tracing::debug!(program = %self.program, pid = %self.pid, "process vanished before SIGTERM");
            }
            Err(e) => {
                tracing::warn!(program = %self.program, pid = %self.pid, error = %e, "SIGTERM failed");
            }
        }

        let result = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.exit_status = Some(status);
                TerminationResult::Graceful(status)
            }
            Ok(Err(e)) => {
                tracing::warn!(program = %self.program, error = %e, "wait after SIGTERM failed");
                self.force_kill().await;
                TerminationResult::Killed
            }
            Err(_) => {
                tracing::warn!(
                    program = %self.program,
                    pid = %self.pid,
                    grace_ms = grace.as_millis() as u64,
                    "Endpoint ignored SIGTERM, sending SIGKILL"
                );
                self.force_kill().await;
                TerminationResult::Killed
            }
        };

        self.drain_readers().await;
        result
    }

    /// Request SIGKILL without waiting; used from `Drop` paths.
    pub fn kill_now(&mut self) {
        if self.is_running() {
            let _ = self.child.start_kill();
        }
    }

    async fn force_kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!(program = %self.program, error = %e, "SIGKILL failed");
        }
        self.exit_status = self.child.try_wait().ok().flatten();
    }

    /// Wait briefly for captured output to be flushed after exit.
    pub(crate) async fn drain_readers(&mut self) {
        for reader in self.readers.drain(..) {
            let _ = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, reader).await;
        }
    }
}

impl std::fmt::Debug for EndpointProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointProcess")
            .field("program", &self.program)
            .field("pid", &self.pid)
            .field("exit_status", &self.exit_status)
            .finish()
    }
}

fn spawn_reader<R>(reader: R, output: Arc<CapturedOutput>, stream: OutputStream) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    tracing::trace!(stream = ?stream, line = %line, "endpoint output");
                    output.push(stream, line);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(stream = ?stream, error = %e, "endpoint output closed");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> (ExecutablePath, Vec<String>) {
        (
            ExecutablePath::new_unchecked("sh"),
            vec!["-c".to_string(), script.to_string()],
        )
    }

    #[tokio::test]
    async fn test_missing_executable_is_startup_failure() {
        let exe = ExecutablePath::new_unchecked("/no/such/endpoint");
        let err = EndpointProcess::start(&exe, &[], None).unwrap_err();
        assert!(matches!(err, StartupFailure::ExecutableMissing { .. }));
    }

    #[tokio::test]
    async fn test_output_is_captured_after_exit() {
        let (exe, args) = sh("echo READY; echo oops 1>&2");
        let mut process = EndpointProcess::start(&exe, &args, None).unwrap();
        let status = process.wait_exit(Duration::from_secs(5)).await.unwrap();
        assert!(status.success());
        assert_eq!(process.output().stdout_lines(), vec!["READY".to_string()]);
        assert_eq!(process.output().stderr_tail(), "oops");
    }

    #[tokio::test]
    async fn test_immediate_exit_detected() {
        let (exe, args) = sh("echo bind failed 1>&2; exit 3");
        let mut process = EndpointProcess::start(&exe, &args, None).unwrap();
        let err = process
            .ensure_alive(Duration::from_secs(2))
            .await
            .unwrap_err();
        match err {
            StartupFailure::ExitedImmediately { stderr, .. } => {
                assert!(stderr.contains("bind failed"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_graceful_termination() {
        let (exe, args) = sh("sleep 30");
        let mut process = EndpointProcess::start(&exe, &args, None).unwrap();
        assert!(process.is_running());
        let result = process.terminate(Duration::from_secs(5)).await;
        assert!(matches!(result, TerminationResult::Graceful(_)));
        assert!(!process.is_running());
    }

    #[tokio::test]
    async fn test_sigterm_ignored_escalates_to_kill() {
        let (exe, args) = sh("trap '' TERM; echo READY; while true; do sleep 1; done");
        let mut process = EndpointProcess::start(&exe, &args, None).unwrap();
        // Let the shell install its trap before signalling.
        for _ in 0..100 {
            if process.output().stdout_contains(|l| l == "READY") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let result = process.terminate(Duration::from_millis(200)).await;
        assert!(result.was_forced());
        assert!(!process.is_running());
    }

    #[tokio::test]
    async fn test_terminate_after_exit_reports_already_exited() {
        let (exe, args) = sh("exit 0");
        let mut process = EndpointProcess::start(&exe, &args, None).unwrap();
        process.wait_exit(Duration::from_secs(5)).await.unwrap();
        let result = process.terminate(Duration::from_secs(1)).await;
        assert!(matches!(result, TerminationResult::AlreadyExited(_)));
    }
}
