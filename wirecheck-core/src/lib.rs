// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Wirecheck Core Library
//!
//! Conformance harness for ZeroMQ-compatible messaging stacks.
//! Provides endpoint process management, request-reply and
//! publish-subscribe verification against a reference implementation,
//! and suite configuration parsing.

pub mod config;
pub mod error;
pub mod harness;
pub mod message;
pub mod pattern;
pub mod scenario;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use config::{ConfigLoader, HarnessConfig, SuiteConfig};
pub use error::{
    HardValidationError, Mismatch, MismatchKind, ProtocolViolation, ScenarioError,
    ScenarioResult, StartupFailure, TransportError, WireError, WireResult,
};
pub use harness::{EndpointSpec, ProcessHarness, Readiness, TerminationResult, TestSession};
pub use message::{Multipart, Subscription, SubscriptionSet};
pub use pattern::{Duplex, MessageReceiver, MessageSender, Subscribe};
pub use scenario::{ScenarioKind, ScenarioOutcome, ScenarioRunner, ScenarioSpec, Side};
pub use state::{SessionState, SessionStateMachine};
pub use types::{ExecutablePath, Port, PortSpec, ProcessId, ScenarioName, TcpEndpoint};
