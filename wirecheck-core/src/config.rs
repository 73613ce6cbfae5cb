// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML suite parser with strict schema validation.
//!
//! Validates scenario definitions before any endpoint is spawned.
//! Any invalid field results in a HardValidationError that aborts the run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HardValidationError, WireError, WireResult};
use crate::harness::{EndpointSpec, Readiness};
use crate::message::{Multipart, Subscription};
use crate::pattern::pubsub::Publication;
use crate::pattern::reqrep::{Exchange, ReplyRule};
use crate::scenario::{ScenarioKind, ScenarioSpec, Side};
use crate::types::{ExecutablePath, PortSpec, ScenarioName};

/// Raw harness settings as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHarnessConfig {
    #[serde(default = "default_grace_timeout_ms")]
    grace_timeout_ms: u64,
    #[serde(default = "default_ready_timeout_ms")]
    ready_timeout_ms: u64,
    #[serde(default = "default_recv_timeout_ms")]
    recv_timeout_ms: u64,
    #[serde(default = "default_observation_window_ms")]
    observation_window_ms: u64,
    #[serde(default = "default_retry_attempts")]
    retry_attempts: u32,
    #[serde(default = "default_host")]
    host: String,
}

fn default_grace_timeout_ms() -> u64 {
    2000
}

fn default_ready_timeout_ms() -> u64 {
    5000
}

fn default_recv_timeout_ms() -> u64 {
    5000
}

fn default_observation_window_ms() -> u64 {
    1000
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for RawHarnessConfig {
    fn default() -> Self {
        Self {
            grace_timeout_ms: default_grace_timeout_ms(),
            ready_timeout_ms: default_ready_timeout_ms(),
            recv_timeout_ms: default_recv_timeout_ms(),
            observation_window_ms: default_observation_window_ms(),
            retry_attempts: default_retry_attempts(),
            host: default_host(),
        }
    }
}

/// `local` or an endpoint object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSide {
    Keyword(String),
    Endpoint(RawEndpoint),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEndpoint {
    executable: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    port: u16,
    #[serde(default)]
    working_dir: Option<String>,
    #[serde(default)]
    ready: Option<RawReady>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawReady {
    marker: Option<String>,
    #[serde(default)]
    connect_probe: bool,
    settle_ms: Option<u64>,
}

/// `echo`, `{ prefix_first: "..." }` or `{ fixed: [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawReplyRule {
    Keyword(String),
    Detailed(RawReplyRuleDetail),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawReplyRuleDetail {
    prefix_first: Option<String>,
    fixed: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawExchange {
    request: Vec<String>,
    #[serde(default)]
    expect: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawScenario {
    name: String,
    pattern: String,
    requester: Option<RawSide>,
    replier: Option<RawSide>,
    publisher: Option<RawSide>,
    subscriber: Option<RawSide>,
    reply_rule: Option<RawReplyRule>,
    #[serde(default)]
    exchanges: Vec<RawExchange>,
    #[serde(default)]
    topic: String,
    #[serde(default)]
    messages: Vec<String>,
}

/// Raw root suite file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSuite {
    #[serde(default)]
    harness: RawHarnessConfig,
    scenarios: Vec<RawScenario>,
}

/// Validated harness settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub grace_timeout: Duration,
    pub ready_timeout: Duration,
    pub recv_timeout: Duration,
    pub observation_window: Duration,
    pub retry_attempts: u32,
    /// Host endpoints bind and connect on.
    pub host: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            grace_timeout: Duration::from_millis(default_grace_timeout_ms()),
            ready_timeout: Duration::from_millis(default_ready_timeout_ms()),
            recv_timeout: Duration::from_millis(default_recv_timeout_ms()),
            observation_window: Duration::from_millis(default_observation_window_ms()),
            retry_attempts: default_retry_attempts(),
            host: default_host(),
        }
    }
}

/// Complete validated suite.
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    pub harness: HarnessConfig,
    pub scenarios: Vec<ScenarioSpec>,
}

impl SuiteConfig {
    /// Scenarios whose names are in `names`; all of them when `names` is empty.
    ///
    /// # Errors
    /// `InvalidFieldValue` for a name that is not in the suite.
    pub fn select(&self, names: &[String]) -> Result<Vec<ScenarioSpec>, HardValidationError> {
        if names.is_empty() {
            return Ok(self.scenarios.clone());
        }
        names
            .iter()
            .map(|name| {
                self.scenarios
                    .iter()
                    .find(|s| s.name.as_str() == name)
                    .cloned()
                    .ok_or_else(|| HardValidationError::InvalidFieldValue {
                        field: "scenario",
                        value: name.clone(),
                        reason: "No scenario with this name in the suite".to_string(),
                    })
            })
            .collect()
    }
}

/// Suite loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate a suite from a YAML file.
    /// Returns HardValidationError for any invalid fields.
    pub fn load_file(path: impl AsRef<Path>) -> WireResult<SuiteConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(WireError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| WireError::Io {
            context: "reading suite file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate a suite from a YAML string.
    pub fn load_string(content: &str) -> WireResult<SuiteConfig> {
        let raw: RawSuite = serde_yaml::from_str(content).map_err(|e| WireError::ConfigParse {
            message: format!("YAML parse error: {}", e),
        })?;

        Self::validate(raw)
    }

    fn validate(raw: RawSuite) -> WireResult<SuiteConfig> {
        let harness = Self::validate_harness(raw.harness)?;

        if raw.scenarios.is_empty() {
            return Err(HardValidationError::SchemaValidation {
                message: "Suite must define at least one scenario".to_string(),
            }
            .into());
        }

        let mut scenarios = Vec::with_capacity(raw.scenarios.len());
        let mut seen_names = HashSet::new();
        let mut seen_ports = HashSet::new();

        for (index, raw_scenario) in raw.scenarios.into_iter().enumerate() {
            let scenario = Self::validate_scenario(raw_scenario, index)?;

            if !seen_names.insert(scenario.name.clone()) {
                return Err(HardValidationError::DuplicateScenarioName {
                    name: scenario.name.to_string(),
                }
                .into());
            }

            for port in bound_ports(&scenario) {
                if !seen_ports.insert(port) {
                    return Err(HardValidationError::InvalidPort {
                        port,
                        reason: format!(
                            "Port already used by another endpoint (scenario '{}')",
                            scenario.name
                        ),
                    }
                    .into());
                }
            }

            scenarios.push(scenario);
        }

        Ok(SuiteConfig { harness, scenarios })
    }

    fn validate_harness(raw: RawHarnessConfig) -> WireResult<HarnessConfig> {
        let positive = |field: &'static str, value: u64| -> Result<Duration, HardValidationError> {
            if value == 0 {
                return Err(HardValidationError::InvalidFieldValue {
                    field,
                    value: "0".to_string(),
                    reason: "Must be greater than 0".to_string(),
                });
            }
            Ok(Duration::from_millis(value))
        };

        let grace_timeout = positive("grace_timeout_ms", raw.grace_timeout_ms)?;
        let ready_timeout = positive("ready_timeout_ms", raw.ready_timeout_ms)?;
        let recv_timeout = positive("recv_timeout_ms", raw.recv_timeout_ms)?;
        let observation_window = positive("observation_window_ms", raw.observation_window_ms)?;

        if raw.retry_attempts == 0 || raw.retry_attempts > 10 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "retry_attempts",
                value: raw.retry_attempts.to_string(),
                reason: "Must be between 1 and 10".to_string(),
            }
            .into());
        }

        if raw.host.trim().is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "host",
                value: raw.host,
                reason: "Host cannot be empty".to_string(),
            }
            .into());
        }

        Ok(HarnessConfig {
            grace_timeout,
            ready_timeout,
            recv_timeout,
            observation_window,
            retry_attempts: raw.retry_attempts,
            host: raw.host,
        })
    }

    fn validate_scenario(raw: RawScenario, index: usize) -> WireResult<ScenarioSpec> {
        let name = ScenarioName::new(&raw.name)?;
        let context = format!("scenario '{}' (index {})", name, index);

        let kind = match raw.pattern.as_str() {
            "req_rep" => {
                let requester = Self::validate_side(raw.requester, "requester", &context)?;
                let replier = Self::validate_side(raw.replier, "replier", &context)?;
                let rule = Self::validate_reply_rule(raw.reply_rule)?;

                if raw.exchanges.is_empty() {
                    return Err(HardValidationError::MissingRequiredField {
                        field: "exchanges",
                        context,
                    }
                    .into());
                }
                let exchanges = raw
                    .exchanges
                    .into_iter()
                    .map(|exchange| Self::validate_exchange(exchange, &rule))
                    .collect::<Result<Vec<_>, _>>()?;

                if requester.is_remote() && exchanges.iter().any(|e| e.request.len() > 1) {
                    return Err(HardValidationError::InvalidFieldValue {
                        field: "exchanges",
                        value: context,
                        reason: "A remote requester takes single-frame requests only".to_string(),
                    }
                    .into());
                }

                ScenarioKind::RequestReply {
                    requester,
                    replier,
                    rule,
                    exchanges,
                }
            }
            "pub_sub" => {
                let publisher = Self::validate_side(raw.publisher, "publisher", &context)?;
                let subscriber = Self::validate_side(raw.subscriber, "subscriber", &context)?;

                if raw.messages.is_empty() {
                    return Err(HardValidationError::MissingRequiredField {
                        field: "messages",
                        context,
                    }
                    .into());
                }
                let messages = raw.messages.into_iter().map(Multipart::from).collect();

                ScenarioKind::PublishSubscribe {
                    publisher,
                    subscriber,
                    publication: Publication::new(Subscription::new(raw.topic), messages),
                }
            }
            other => {
                return Err(HardValidationError::InvalidFieldValue {
                    field: "pattern",
                    value: other.to_string(),
                    reason: "Expected req_rep or pub_sub".to_string(),
                }
                .into())
            }
        };

        Ok(ScenarioSpec { name, kind })
    }

    fn validate_side(
        raw: Option<RawSide>,
        field: &'static str,
        context: &str,
    ) -> Result<Side, HardValidationError> {
        match raw {
            None => Err(HardValidationError::MissingRequiredField {
                field,
                context: context.to_string(),
            }),
            Some(RawSide::Keyword(keyword)) if keyword == "local" => Ok(Side::Local),
            Some(RawSide::Keyword(keyword)) => Err(HardValidationError::InvalidFieldValue {
                field,
                value: keyword,
                reason: "Expected 'local' or an endpoint definition".to_string(),
            }),
            Some(RawSide::Endpoint(endpoint)) => Self::validate_endpoint(endpoint).map(Side::Remote),
        }
    }

    fn validate_endpoint(raw: RawEndpoint) -> Result<EndpointSpec, HardValidationError> {
        if raw.executable.trim().is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "executable",
                value: raw.executable,
                reason: "Executable cannot be empty".to_string(),
            });
        }

        // Bare program names are resolved through PATH at spawn time.
        let unchecked = ExecutablePath::new_unchecked(&raw.executable);
        let executable = if unchecked.is_explicit() {
            ExecutablePath::new(&raw.executable)?
        } else {
            unchecked
        };

        let readiness = Self::validate_ready(raw.ready.unwrap_or_default())?;
        let port = PortSpec::from(raw.port);
        if readiness == Readiness::ConnectProbe && port.fixed().is_none() {
            return Err(HardValidationError::InvalidPort {
                port: raw.port,
                reason: "connect_probe readiness needs a fixed port".to_string(),
            });
        }

        Ok(EndpointSpec {
            executable,
            args: raw.args,
            working_dir: raw.working_dir.map(PathBuf::from),
            port,
            readiness,
        })
    }

    fn validate_ready(raw: RawReady) -> Result<Readiness, HardValidationError> {
        let chosen = usize::from(raw.marker.is_some())
            + usize::from(raw.connect_probe)
            + usize::from(raw.settle_ms.is_some());
        if chosen > 1 {
            return Err(HardValidationError::SchemaValidation {
                message: "ready takes exactly one of marker, connect_probe, settle_ms".to_string(),
            });
        }

        if raw.connect_probe {
            return Ok(Readiness::ConnectProbe);
        }
        if let Some(ms) = raw.settle_ms {
            return Ok(Readiness::Settle {
                delay: Duration::from_millis(ms),
            });
        }
        match raw.marker {
            Some(marker) if marker.trim().is_empty() => Err(HardValidationError::InvalidFieldValue {
                field: "ready.marker",
                value: marker,
                reason: "Marker cannot be empty".to_string(),
            }),
            Some(marker) => Ok(Readiness::OutputMarker { marker }),
            None => Ok(Readiness::default()),
        }
    }

    fn validate_reply_rule(raw: Option<RawReplyRule>) -> Result<ReplyRule, HardValidationError> {
        match raw {
            None => Ok(ReplyRule::Echo),
            Some(RawReplyRule::Keyword(keyword)) if keyword == "echo" => Ok(ReplyRule::Echo),
            Some(RawReplyRule::Keyword(keyword)) => Err(HardValidationError::InvalidFieldValue {
                field: "reply_rule",
                value: keyword,
                reason: "Expected echo, prefix_first or fixed".to_string(),
            }),
            Some(RawReplyRule::Detailed(detail)) => match (detail.prefix_first, detail.fixed) {
                (Some(prefix), None) => Ok(ReplyRule::PrefixFirst(prefix)),
                (None, Some(frames)) => Ok(ReplyRule::Fixed(frames_to_multipart(frames, "reply_rule.fixed")?)),
                _ => Err(HardValidationError::SchemaValidation {
                    message: "reply_rule takes exactly one of prefix_first, fixed".to_string(),
                }),
            },
        }
    }

    fn validate_exchange(raw: RawExchange, rule: &ReplyRule) -> Result<Exchange, HardValidationError> {
        let request = frames_to_multipart(raw.request, "exchanges.request")?;
        match raw.expect {
            Some(expect) => Ok(Exchange::new(
                request,
                frames_to_multipart(expect, "exchanges.expect")?,
            )),
            None => Ok(Exchange::derived(request, rule)),
        }
    }
}

fn frames_to_multipart(frames: Vec<String>, field: &'static str) -> Result<Multipart, HardValidationError> {
    Multipart::from_parts(frames).map_err(|e| HardValidationError::InvalidFieldValue {
        field,
        value: "[]".to_string(),
        reason: e.to_string(),
    })
}

/// Fixed ports bound by the remote sides of a scenario.
fn bound_ports(scenario: &ScenarioSpec) -> Vec<u16> {
    let binders = match &scenario.kind {
        ScenarioKind::RequestReply { replier, .. } => [replier],
        ScenarioKind::PublishSubscribe { publisher, .. } => [publisher],
    };
    binders
        .into_iter()
        .filter_map(|side| side.fixed_port())
        .map(|port| port.value())
        .collect()
}
