// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Test session state machine with typed state transitions.
//!
//! Implements the endpoint lifecycle: Starting → Ready → Stopped, with Failed
//! reachable from any live state. Invalid transitions result in
//! StateTransitionError.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::StateTransitionError;

/// Endpoint session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Process spawned, readiness not yet confirmed.
    Starting,

    /// Endpoint confirmed ready; protocol traffic may flow.
    Ready,

    /// Process terminated and reaped. Terminal.
    Stopped,

    /// Startup or a mandatory phase failed; the process still needs stopping.
    Failed,
}

impl SessionState {
    /// Get the state name for error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Starting => "Starting",
            Self::Ready => "Ready",
            Self::Stopped => "Stopped",
            Self::Failed => "Failed",
        }
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        matches!(
            (self, target),
            // From Starting
            (Self::Starting, Self::Ready) |
            (Self::Starting, Self::Failed) |
            (Self::Starting, Self::Stopped) |
            // From Ready
            (Self::Ready, Self::Stopped) |
            (Self::Ready, Self::Failed) |
            // From Failed
            (Self::Failed, Self::Stopped)
        )
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State machine for one endpoint session.
#[derive(Debug)]
pub struct SessionStateMachine {
    label: String,
    current_state: SessionState,
    started_at: Instant,
    last_transition: Instant,
    transition_count: u64,
}

impl SessionStateMachine {
    /// Create a new state machine in the Starting state.
    pub fn new(label: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            label: label.into(),
            current_state: SessionState::Starting,
            started_at: now,
            last_transition: now,
            transition_count: 0,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> SessionState {
        self.current_state
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Get time since last transition.
    pub fn time_in_current_state(&self) -> std::time::Duration {
        self.last_transition.elapsed()
    }

    /// Time since the session was created.
    pub fn age(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Get total number of transitions.
    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&mut self, target: SessionState) -> Result<(), StateTransitionError> {
        if self.current_state.is_terminal() {
            return Err(StateTransitionError::TerminalState {
                session: self.label.clone(),
                state: self.current_state.name(),
            });
        }

        if !self.current_state.can_transition_to(target) {
            return Err(StateTransitionError::InvalidTransition {
                session: self.label.clone(),
                from: self.current_state.name(),
                to: target.name(),
            });
        }

        tracing::debug!(
            session = %self.label,
            from = self.current_state.name(),
            to = target.name(),
            "Session transition"
        );

        self.current_state = target;
        self.last_transition = Instant::now();
        self.transition_count += 1;

        Ok(())
    }

    /// Whether protocol traffic may be issued against the endpoint.
    pub fn is_ready(&self) -> bool {
        matches!(self.current_state, SessionState::Ready)
    }

    /// Whether the process still has to be terminated.
    pub fn needs_stop(&self) -> bool {
        !self.current_state.is_terminal()
    }
}
