// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for wirecheck.
//!
//! Every failure a scenario can surface is an explicit enum variant carrying
//! enough context (scenario, expected vs. actual, captured stderr) to be
//! diagnosed without rerunning. No `Box<dyn Error>`, no `anyhow::Result`.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::ScenarioName;

/// Top-level error type for wirecheck.
#[derive(Debug, Error)]
pub enum WireError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Suite Files
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Scenario Errors - Fatal to One Scenario Only
    // =========================================================================
    #[error("Scenario '{scenario}' failed: {source}")]
    Scenario {
        scenario: ScenarioName,
        #[source]
        source: ScenarioError,
    },

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Hard validation errors reject a suite before any process is spawned.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid port: {port} - {reason}")]
    InvalidPort { port: u16, reason: String },

    #[error("Invalid endpoint address: {value} - {reason}")]
    InvalidEndpoint { value: String, reason: String },

    #[error("Endpoint executable does not exist: {path}")]
    ExecutableNotFound { path: PathBuf },

    #[error("Endpoint executable is not executable: {path}")]
    ExecutableNotExecutable { path: PathBuf },

    #[error("Duplicate scenario name: {name}")]
    DuplicateScenarioName { name: String },

    #[error("Schema validation failed: {message}")]
    SchemaValidation { message: String },
}

/// State transition errors for the session state machine.
#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Cannot transition from {from} to {to} for session {session}")]
    InvalidTransition {
        session: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("Session {session} is in terminal state: {state}")]
    TerminalState {
        session: String,
        state: &'static str,
    },
}

/// The endpoint never became usable.
#[derive(Debug, Error)]
pub enum StartupFailure {
    #[error("Endpoint executable not found: {path}")]
    ExecutableMissing { path: PathBuf },

    #[error("Failed to spawn {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("{program} exited immediately with {status}; stderr: {stderr}")]
    ExitedImmediately {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} did not signal readiness within {waited_ms}ms")]
    ReadyTimeout { program: String, waited_ms: u64 },

    #[error("{program} signalled readiness without reporting its bound port")]
    PortUnresolved { program: String },

    #[error("Failed to bind {endpoint}: {reason}")]
    BindConflict { endpoint: String, reason: String },
}

/// Misuse of a strict-alternation socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("requester sent a second request before the prior reply arrived")]
    SendWhileAwaitingReply,

    #[error("requester attempted to receive without an outstanding request")]
    RecvWithoutRequest,

    #[error("replier attempted to send without a pending request")]
    ReplyWithoutRequest,

    #[error("replier attempted to receive before answering the pending request")]
    RecvWhileReplying,
}

/// Errors raised by a socket backend.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bind to {endpoint} failed: {reason}")]
    Bind { endpoint: String, reason: String },

    #[error("connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("send failed: {reason}")]
    Send { reason: String },

    #[error("receive failed: {reason}")]
    Recv { reason: String },

    #[error("subscription change failed: {reason}")]
    Subscribe { reason: String },

    #[error("a multipart message must contain at least one frame")]
    EmptyMessage,

    #[error("peer closed the connection")]
    Closed,
}

/// A message line printed by an endpoint could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineDecodeError {
    #[error("line ends inside an escape sequence")]
    DanglingEscape,

    #[error("unknown escape '\\{escape}' at byte {offset}")]
    UnknownEscape { escape: char, offset: usize },

    #[error("invalid hex escape at byte {offset}")]
    InvalidHex { offset: usize },
}

/// What kind of expectation a mismatch violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchKind {
    /// Reply carried a different number of frames.
    FrameCount,
    /// A frame's bytes differ.
    FrameContent { frame: usize },
    /// A delivered message does not match the subscription.
    FilterViolation,
    /// Observed messages differ from the expected sequence.
    Sequence,
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameCount => write!(f, "frame count"),
            Self::FrameContent { frame } => write!(f, "content of frame {}", frame),
            Self::FilterViolation => write!(f, "topic filter"),
            Self::Sequence => write!(f, "message sequence"),
        }
    }
}

/// A structured expected-vs-actual report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Index of the exchange or message that failed, if applicable.
    pub index: Option<usize>,
    pub kind: MismatchKind,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(index) = self.index {
            write!(f, "#{} ", index)?;
        }
        write!(
            f,
            "{} differs: expected {}, got {}",
            self.kind, self.expected, self.actual
        )
    }
}

/// Errors that abort a single scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("startup failure: {0}")]
    Startup(#[from] StartupFailure),

    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(Mismatch),

    #[error("receive #{index} timed out after {timeout_ms}ms")]
    ReceiveTimeout { index: usize, timeout_ms: u64 },

    #[error("process failure in {program}: {reason}; stderr: {stderr}")]
    ProcessFailure {
        program: String,
        reason: String,
        stderr: String,
    },

    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] ProtocolViolation),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("session state error: {0}")]
    State(#[from] StateTransitionError),
}

impl ScenarioError {
    /// Only environmental startup problems are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Startup(_))
    }
}

impl From<Mismatch> for ScenarioError {
    fn from(mismatch: Mismatch) -> Self {
        Self::ProtocolMismatch(mismatch)
    }
}

/// Result type alias using WireError.
pub type WireResult<T> = Result<T, WireError>;

/// Result type alias for a single scenario.
pub type ScenarioResult<T> = Result<T, ScenarioError>;
