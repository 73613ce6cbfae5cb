// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! All types validate their invariants at creation time.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Validated scenario identifier.
/// Must be non-empty, alphanumeric with hyphens/underscores, max 64 chars.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScenarioName(String);

impl ScenarioName {
    /// Create a new ScenarioName with validation.
    pub fn new(name: impl Into<String>) -> Result<Self, HardValidationError> {
        let name = name.into();

        if name.is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "name",
                value: name,
                reason: "Scenario name cannot be empty".to_string(),
            });
        }

        if name.len() > 64 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "name",
                value: name.clone(),
                reason: format!("Scenario name too long: {} chars (max 64)", name.len()),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            return Err(HardValidationError::InvalidFieldValue {
                field: "name",
                value: name,
                reason: "Scenario name must contain only alphanumeric characters, hyphens, and underscores".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScenarioName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ScenarioName {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ScenarioName> for String {
    fn from(name: ScenarioName) -> Self {
        name.0
    }
}

/// Validated network port.
/// Must be in range 1-65535 (0 means "ephemeral" and is modelled by [`PortSpec`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Port(u16);

impl Port {
    /// Create a new Port with validation.
    pub fn new(port: u16) -> Result<Self, HardValidationError> {
        if port == 0 {
            return Err(HardValidationError::InvalidPort {
                port,
                reason: "Port 0 requests ephemeral binding and has no fixed value".to_string(),
            });
        }
        Ok(Self(port))
    }

    /// Get the inner port value.
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for Port {
    type Error = HardValidationError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Port> for u16 {
    fn from(port: Port) -> Self {
        port.0
    }
}

/// How a binding endpoint obtains its port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PortSpec {
    /// Bind to this exact port; must be unique across a suite.
    Fixed(Port),
    /// Bind to port 0 and read the resolved port back from the endpoint.
    #[default]
    Ephemeral,
}

impl PortSpec {
    /// Value passed on the `--port` flag.
    pub fn flag_value(&self) -> u16 {
        match self {
            Self::Fixed(port) => port.value(),
            Self::Ephemeral => 0,
        }
    }

    pub fn fixed(&self) -> Option<Port> {
        match self {
            Self::Fixed(port) => Some(*port),
            Self::Ephemeral => None,
        }
    }
}

impl From<u16> for PortSpec {
    fn from(value: u16) -> Self {
        match Port::new(value) {
            Ok(port) => Self::Fixed(port),
            Err(_) => Self::Ephemeral,
        }
    }
}

/// A `tcp://<host>:<port>` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TcpEndpoint {
    host: String,
    port: Port,
}

impl TcpEndpoint {
    pub fn new(host: impl Into<String>, port: Port) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Port {
        self.port
    }

    /// `host:port` form for plain socket APIs.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for TcpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}:{}", self.host, self.port)
    }
}

impl FromStr for TcpEndpoint {
    type Err = HardValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| HardValidationError::InvalidEndpoint {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let rest = value
            .strip_prefix("tcp://")
            .ok_or_else(|| invalid("expected tcp:// scheme"))?;
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing :port"))?;
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port: u16 = port.parse().map_err(|_| invalid("port is not a number"))?;
        let port = Port::new(port).map_err(|_| invalid("port must be resolved (non-zero)"))?;

        Ok(Self::new(host, port))
    }
}

/// Path to an endpoint executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "PathBuf", from = "PathBuf")]
pub struct ExecutablePath(PathBuf);

impl ExecutablePath {
    /// Create a new ExecutablePath with existence and permission validation.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, HardValidationError> {
        let path = path.into();

        if !path.exists() {
            return Err(HardValidationError::ExecutableNotFound { path });
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = path.metadata() {
                let mode = metadata.permissions().mode();
                if mode & 0o111 == 0 {
                    return Err(HardValidationError::ExecutableNotExecutable { path });
                }
            }
        }

        Ok(Self(path))
    }

    /// Create without validation. Bare program names (`sh`) are resolved via
    /// `PATH` at spawn time; a missing file then surfaces as a startup failure.
    pub fn new_unchecked(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Get the inner path.
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Whether the path names a file rather than a `PATH` lookup.
    pub fn is_explicit(&self) -> bool {
        self.0.components().count() > 1
    }

    /// Short program name for logs and error messages.
    pub fn program_name(&self) -> String {
        self.0
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.0.display().to_string())
    }
}

impl fmt::Display for ExecutablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<PathBuf> for ExecutablePath {
    fn from(value: PathBuf) -> Self {
        Self::new_unchecked(value)
    }
}

impl From<ExecutablePath> for PathBuf {
    fn from(path: ExecutablePath) -> Self {
        path.0
    }
}

/// Validated process ID.
/// Must be positive (non-zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessId(u32);

impl ProcessId {
    /// Create a new ProcessId with validation.
    pub fn new(pid: u32) -> Result<Self, HardValidationError> {
        if pid == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "process_id",
                value: "0".to_string(),
                reason: "Process ID 0 is reserved".to_string(),
            });
        }
        Ok(Self(pid))
    }

    /// Get the inner PID value.
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_name_valid() {
        assert!(ScenarioName::new("echo-single").is_ok());
        assert!(ScenarioName::new("pubsub_alert_filter").is_ok());
    }

    #[test]
    fn test_scenario_name_invalid() {
        assert!(ScenarioName::new("").is_err());
        assert!(ScenarioName::new("a".repeat(65)).is_err());
        assert!(ScenarioName::new("req rep").is_err());
    }

    #[test]
    fn test_port_invalid() {
        assert!(Port::new(0).is_err());
        assert!(Port::new(5555).is_ok());
    }

    #[test]
    fn test_port_spec_from_raw() {
        assert_eq!(PortSpec::from(0), PortSpec::Ephemeral);
        assert_eq!(PortSpec::from(15555).flag_value(), 15555);
        assert_eq!(PortSpec::Ephemeral.flag_value(), 0);
    }

    #[test]
    fn test_endpoint_round_trip() {
        let endpoint: TcpEndpoint = "tcp://127.0.0.1:25555".parse().unwrap();
        assert_eq!(endpoint.host(), "127.0.0.1");
        assert_eq!(endpoint.port().value(), 25555);
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:25555");
        assert_eq!(endpoint.socket_addr(), "127.0.0.1:25555");
    }

    #[test]
    fn test_endpoint_rejects_unresolved_and_foreign() {
        assert!("tcp://127.0.0.1:0".parse::<TcpEndpoint>().is_err());
        assert!("ipc:///tmp/sock".parse::<TcpEndpoint>().is_err());
        assert!("tcp://:80".parse::<TcpEndpoint>().is_err());
    }

    #[test]
    fn test_executable_path_missing() {
        assert!(ExecutablePath::new("/definitely/not/here").is_err());
        assert!(!ExecutablePath::new_unchecked("sh").is_explicit());
        assert!(ExecutablePath::new_unchecked("/bin/sh").is_explicit());
    }

    #[test]
    fn test_process_id_invalid() {
        assert!(ProcessId::new(0).is_err());
        assert!(ProcessId::new(42).is_ok());
    }
}
