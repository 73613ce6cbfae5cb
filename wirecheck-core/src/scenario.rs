// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Scenario definitions and the runner that executes them.
//!
//! Each role of a scenario is played either by a reference socket inside
//! this process or by an endpoint process under test. Scenarios with a
//! process side run behind a retry layer that only retries startup
//! failures. Every session is stopped before a scenario returns.

use std::time::{Duration, Instant};

use crate::config::HarnessConfig;
use crate::error::{ScenarioError, ScenarioResult, WireError};
use crate::harness::{EndpointSpec, ProcessHarness, TestSession};
use crate::message::Multipart;
use crate::pattern::line::{self, REPLY_MARKER};
use crate::pattern::pubsub::{PubSubVerifier, Publication};
use crate::pattern::reqrep::{Exchange, Replier, ReplyRule, RequestReplyVerifier, Requester};
use crate::pattern::{zmq, Subscribe};
use crate::types::{Port, ScenarioName, TcpEndpoint};

/// Who plays a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Side {
    /// Reference socket in this process.
    Local,
    /// Endpoint process under test.
    Remote(EndpointSpec),
}

impl Side {
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Fixed port this side binds, if any.
    pub(crate) fn fixed_port(&self) -> Option<Port> {
        match self {
            Self::Remote(spec) => spec.port.fixed(),
            Self::Local => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioKind {
    RequestReply {
        requester: Side,
        replier: Side,
        rule: ReplyRule,
        exchanges: Vec<Exchange>,
    },
    PublishSubscribe {
        publisher: Side,
        subscriber: Side,
        publication: Publication,
    },
}

/// A named, validated scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioSpec {
    pub name: ScenarioName,
    pub kind: ScenarioKind,
}

impl ScenarioSpec {
    pub fn has_remote_side(&self) -> bool {
        match &self.kind {
            ScenarioKind::RequestReply {
                requester, replier, ..
            } => requester.is_remote() || replier.is_remote(),
            ScenarioKind::PublishSubscribe {
                publisher,
                subscriber,
                ..
            } => publisher.is_remote() || subscriber.is_remote(),
        }
    }

    pub fn pattern_name(&self) -> &'static str {
        match self.kind {
            ScenarioKind::RequestReply { .. } => "req_rep",
            ScenarioKind::PublishSubscribe { .. } => "pub_sub",
        }
    }
}

/// Result of one scenario after retries.
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub name: ScenarioName,
    pub attempts: u32,
    pub elapsed: Duration,
    /// Number of exchanges or messages verified.
    pub result: ScenarioResult<usize>,
}

impl ScenarioOutcome {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<usize, WireError> {
        self.result.map_err(|source| WireError::Scenario {
            scenario: self.name,
            source,
        })
    }
}

/// Executes scenarios with the suite's harness settings.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    harness: ProcessHarness,
}

impl ScenarioRunner {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            harness: ProcessHarness::new(config),
        }
    }

    fn config(&self) -> &HarnessConfig {
        self.harness.config()
    }

    /// Run scenarios one after another.
    pub async fn run_all(&self, scenarios: &[ScenarioSpec]) -> Vec<ScenarioOutcome> {
        let mut outcomes = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            outcomes.push(self.run(scenario).await);
        }
        outcomes
    }

    /// Run one scenario, retrying startup failures of process sides.
    pub async fn run(&self, scenario: &ScenarioSpec) -> ScenarioOutcome {
        let started = Instant::now();
        let max_attempts = if scenario.has_remote_side() {
            self.config().retry_attempts.max(1)
        } else {
            1
        };

        let mut attempts = 0;
        let result = loop {
            attempts += 1;
            let result = self.attempt(scenario).await;
            match result {
                Err(ref e) if e.is_retryable() && attempts < max_attempts => {
                    tracing::warn!(
                        scenario = %scenario.name,
                        attempt = attempts,
                        error = %e,
                        "Startup failed, retrying scenario"
                    );
                }
                other => break other,
            }
        };

        let elapsed = started.elapsed();
        match &result {
            Ok(checked) => tracing::info!(
                scenario = %scenario.name,
                pattern = scenario.pattern_name(),
                checked,
                attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                "Scenario passed"
            ),
            Err(e) => tracing::error!(
                scenario = %scenario.name,
                pattern = scenario.pattern_name(),
                attempts,
                error = %e,
                "Scenario failed"
            ),
        }

        ScenarioOutcome {
            name: scenario.name.clone(),
            attempts,
            elapsed,
            result,
        }
    }

    async fn attempt(&self, scenario: &ScenarioSpec) -> ScenarioResult<usize> {
        let name = scenario.name.as_str();
        match &scenario.kind {
            ScenarioKind::RequestReply {
                requester,
                replier,
                rule,
                exchanges,
            } => {
                let verifier = RequestReplyVerifier::new(exchanges.clone(), self.config().recv_timeout);
                match (requester, replier) {
                    (Side::Local, Side::Local) => self.req_rep_local(&verifier, rule).await,
                    (Side::Local, Side::Remote(rep)) => {
                        self.req_rep_remote_replier(name, &verifier, rep).await
                    }
                    (Side::Remote(req), Side::Local) => {
                        self.req_rep_remote_requester(name, &verifier, req, rule).await
                    }
                    (Side::Remote(req), Side::Remote(rep)) => {
                        self.req_rep_remote_both(name, &verifier, req, rep).await
                    }
                }
            }
            ScenarioKind::PublishSubscribe {
                publisher,
                subscriber,
                publication,
            } => {
                let verifier = PubSubVerifier::new(
                    publication.clone(),
                    self.config().observation_window,
                    self.config().ready_timeout,
                );
                match (publisher, subscriber) {
                    (Side::Local, Side::Local) => self.pub_sub_local(&verifier).await,
                    (Side::Local, Side::Remote(sub)) => {
                        self.pub_sub_remote_subscriber(name, &verifier, sub).await
                    }
                    (Side::Remote(publ), Side::Local) => {
                        self.pub_sub_remote_publisher(name, &verifier, publ).await
                    }
                    (Side::Remote(publ), Side::Remote(sub)) => {
                        self.pub_sub_remote_both(name, &verifier, publ, sub).await
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Request-reply
    // ------------------------------------------------------------------

    async fn req_rep_local(&self, verifier: &RequestReplyVerifier, rule: &ReplyRule) -> ScenarioResult<usize> {
        let (rep, endpoint) = zmq::bind_rep(&self.config().host).await?;
        let req = zmq::connect_req(&endpoint).await?;

        let server_verifier = verifier.clone();
        let server_rule = rule.clone();
        let server = tokio::spawn(async move {
            let mut replier = Replier::new(rep);
            server_verifier.verify_requests(&mut replier, &server_rule).await
        });

        let mut requester = Requester::new(req);
        let result = verifier.verify_replies(&mut requester).await;
        if result.is_err() {
            server.abort();
            return result;
        }
        join_server(server, self.config().recv_timeout).await?;
        result
    }

    async fn req_rep_remote_replier(
        &self,
        name: &str,
        verifier: &RequestReplyVerifier,
        rep: &EndpointSpec,
    ) -> ScenarioResult<usize> {
        let mut replier = self
            .harness
            .open_session(&label(name, "replier"), rep, &port_args(rep.port.flag_value()), true)
            .await?;

        let result = async {
            let endpoint = replier.require_endpoint()?;
            let mut requester = Requester::new(zmq::connect_req(&endpoint).await?);
            verifier.verify_replies(&mut requester).await
        }
        .await;

        let result = settle(result, &mut [&mut replier]);
        replier.stop().await;
        result
    }

    async fn req_rep_remote_requester(
        &self,
        name: &str,
        verifier: &RequestReplyVerifier,
        req: &EndpointSpec,
        rule: &ReplyRule,
    ) -> ScenarioResult<usize> {
        let (rep, endpoint) = zmq::bind_rep(&self.config().host).await?;

        let server_verifier = verifier.clone();
        let server_rule = rule.clone();
        let server = tokio::spawn(async move {
            let mut replier = Replier::new(rep);
            server_verifier.verify_requests(&mut replier, &server_rule).await
        });

        let mut args = port_args(endpoint.port().value());
        args.extend(message_args(verifier.exchanges().iter().map(|e| &e.request)));

        let mut requester = match self
            .harness
            .open_session(&label(name, "requester"), req, &args, false)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                server.abort();
                return Err(e);
            }
        };

        let exit = requester.expect_success(self.exit_limit(verifier.exchanges().len())).await;
        requester.stop().await;

        // A mismatch seen by the local replier is more specific than the
        // requester's exit status.
        let served = join_server(server, self.config().recv_timeout).await;
        match (served, exit) {
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Ok(_), Ok(())) => verify_reported_replies(verifier, &requester),
        }
    }

    async fn req_rep_remote_both(
        &self,
        name: &str,
        verifier: &RequestReplyVerifier,
        req: &EndpointSpec,
        rep: &EndpointSpec,
    ) -> ScenarioResult<usize> {
        let mut replier = self
            .harness
            .open_session(&label(name, "replier"), rep, &port_args(rep.port.flag_value()), true)
            .await?;

        let result = async {
            let endpoint = replier.require_endpoint()?;
            let mut args = port_args(endpoint.port().value());
            args.extend(message_args(verifier.exchanges().iter().map(|e| &e.request)));

            let mut requester = self
                .harness
                .open_session(&label(name, "requester"), req, &args, false)
                .await?;
            let exit = requester.expect_success(self.exit_limit(verifier.exchanges().len())).await;
            requester.stop().await;
            exit?;
            verify_reported_replies(verifier, &requester)
        }
        .await;

        let result = settle(result, &mut [&mut replier]);
        replier.stop().await;
        result
    }

    // ------------------------------------------------------------------
    // Publish-subscribe
    // ------------------------------------------------------------------

    async fn pub_sub_local(&self, verifier: &PubSubVerifier) -> ScenarioResult<usize> {
        let (mut publisher, endpoint) = zmq::bind_pub(&self.config().host).await?;
        let mut subscriber = zmq::connect_sub(&endpoint).await?;
        verifier.run_local(&mut publisher, &mut subscriber).await
    }

    async fn pub_sub_remote_subscriber(
        &self,
        name: &str,
        verifier: &PubSubVerifier,
        sub: &EndpointSpec,
    ) -> ScenarioResult<usize> {
        let (mut publisher, endpoint) = zmq::bind_pub(&self.config().host).await?;
        let args = subscriber_args(&endpoint, verifier);
        let mut subscriber = self
            .harness
            .open_session(&label(name, "subscriber"), sub, &args, false)
            .await?;

        let result = async {
            verifier.confirm_remote(&mut publisher, subscriber.output()).await?;
            verifier.publish(&mut publisher).await?;
            let observed = verifier.collect_output(subscriber.output()).await;
            verifier.verify_exact(&observed)?;
            Ok(observed.len())
        }
        .await;

        let result = settle(result, &mut [&mut subscriber]);
        subscriber.stop().await;
        result
    }

    async fn pub_sub_remote_publisher(
        &self,
        name: &str,
        verifier: &PubSubVerifier,
        publ: &EndpointSpec,
    ) -> ScenarioResult<usize> {
        let mut args = port_args(publ.port.flag_value());
        args.extend(message_args(verifier.publication().messages.iter()));
        let mut publisher = self
            .harness
            .open_session(&label(name, "publisher"), publ, &args, true)
            .await?;

        let result = async {
            let endpoint = publisher.require_endpoint()?;
            let mut subscriber = zmq::connect_sub(&endpoint).await?;
            subscriber
                .subscribe(&verifier.publication().subscription)
                .await?;
            let mut observed: Vec<Multipart> =
                verifier.await_first_delivery(&mut subscriber).await?.into_iter().collect();
            observed.extend(verifier.collect(&mut subscriber).await?);
            verifier.verify_cycle(&observed)?;
            Ok(observed.len())
        }
        .await;

        let result = settle(result, &mut [&mut publisher]);
        publisher.stop().await;
        result
    }

    async fn pub_sub_remote_both(
        &self,
        name: &str,
        verifier: &PubSubVerifier,
        publ: &EndpointSpec,
        sub: &EndpointSpec,
    ) -> ScenarioResult<usize> {
        let mut args = port_args(publ.port.flag_value());
        args.extend(message_args(verifier.publication().messages.iter()));
        let mut publisher = self
            .harness
            .open_session(&label(name, "publisher"), publ, &args, true)
            .await?;

        let result = async {
            let endpoint = publisher.require_endpoint()?;
            let args = subscriber_args(&endpoint, verifier);
            let mut subscriber = self
                .harness
                .open_session(&label(name, "subscriber"), sub, &args, false)
                .await?;
            let verdict = async {
                verifier.await_first_output(subscriber.output()).await?;
                let observed = verifier.collect_output(subscriber.output()).await;
                verifier.verify_cycle(&observed)?;
                Ok(observed.len())
            }
            .await;
            let verdict = settle(verdict, &mut [&mut subscriber]);
            subscriber.stop().await;
            verdict
        }
        .await;

        let result = settle(result, &mut [&mut publisher]);
        publisher.stop().await;
        result
    }

    /// How long a remote requester gets to finish all its exchanges.
    fn exit_limit(&self, exchanges: usize) -> Duration {
        self.config().recv_timeout * (exchanges as u32 + 1)
    }
}

/// A receive timeout caused by a dead peer process is a process failure.
fn settle(result: ScenarioResult<usize>, sessions: &mut [&mut TestSession]) -> ScenarioResult<usize> {
    match result {
        Err(ScenarioError::ReceiveTimeout { index, timeout_ms }) => {
            for session in sessions.iter_mut() {
                if session.has_exited() {
                    return Err(session.fail(format!(
                        "exited before receive #{} completed ({}ms timeout)",
                        index, timeout_ms
                    )));
                }
            }
            Err(ScenarioError::ReceiveTimeout { index, timeout_ms })
        }
        other => other,
    }
}

/// Replies a requester process printed, held against the expected replies.
fn verify_reported_replies(
    verifier: &RequestReplyVerifier,
    requester: &TestSession,
) -> ScenarioResult<usize> {
    let replies = line::reported(requester.output(), REPLY_MARKER);
    tracing::debug!(
        session = requester.label(),
        reported = replies.len(),
        "Checking reported replies"
    );
    Ok(verifier.verify_reported(&replies)?)
}

async fn join_server(
    server: tokio::task::JoinHandle<ScenarioResult<usize>>,
    limit: Duration,
) -> ScenarioResult<usize> {
    let abort = server.abort_handle();
    match tokio::time::timeout(limit, server).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(ScenarioError::ProcessFailure {
            program: "local replier".to_string(),
            reason: e.to_string(),
            stderr: String::new(),
        }),
        Err(_) => {
            abort.abort();
            Err(ScenarioError::ReceiveTimeout {
                index: 0,
                timeout_ms: limit.as_millis() as u64,
            })
        }
    }
}

fn label(scenario: &str, role: &str) -> String {
    format!("{}/{}", scenario, role)
}

fn port_args(port: u16) -> Vec<String> {
    vec!["--port".to_string(), port.to_string()]
}

fn subscriber_args(endpoint: &TcpEndpoint, verifier: &PubSubVerifier) -> Vec<String> {
    let mut args = port_args(endpoint.port().value());
    args.push("--topic".to_string());
    args.push(verifier.publication().subscription.prefix().to_string());
    args
}

/// One `--message` flag per message; endpoints take single text frames.
fn message_args<'a, I>(messages: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Multipart>,
{
    messages
        .into_iter()
        .flat_map(|message| {
            [
                "--message".to_string(),
                String::from_utf8_lossy(message.first()).into_owned(),
            ]
        })
        .collect()
}
