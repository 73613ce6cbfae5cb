// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Request-reply verification.
//!
//! Strict alternation is enforced by explicit state machines on both sides:
//! a requester may not send twice without a reply, a replier may not answer
//! before a request arrives. Exchanges run in order and the first mismatch
//! aborts the scenario.

use std::time::Duration;

use bytes::{BufMut, BytesMut};

use super::{recv_within, Duplex};
use crate::error::{Mismatch, MismatchKind, ProtocolViolation, ScenarioResult};
use crate::message::Multipart;

/// How a replier derives its answer from a request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReplyRule {
    /// Reply with the request unchanged.
    #[default]
    Echo,
    /// Prefix the first frame, echo the remaining frames verbatim.
    PrefixFirst(String),
    /// Always reply with the same message.
    Fixed(Multipart),
}

impl ReplyRule {
    pub fn apply(&self, request: &Multipart) -> Multipart {
        match self {
            Self::Echo => request.clone(),
            Self::PrefixFirst(prefix) => {
                let mut first = BytesMut::with_capacity(prefix.len() + request.first().len());
                first.put_slice(prefix.as_bytes());
                first.put_slice(request.first());
                request.with_first(first.freeze())
            }
            Self::Fixed(reply) => reply.clone(),
        }
    }
}

/// One request and the reply it must produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub request: Multipart,
    pub expected: Multipart,
}

impl Exchange {
    pub fn new(request: Multipart, expected: Multipart) -> Self {
        Self { request, expected }
    }

    /// Expected reply derived from the replier's rule.
    pub fn derived(request: Multipart, rule: &ReplyRule) -> Self {
        let expected = rule.apply(&request);
        Self { request, expected }
    }
}

/// Compare a received message against its expectation, frame by frame.
pub fn compare(index: usize, expected: &Multipart, actual: &Multipart) -> Result<(), Mismatch> {
    if expected.len() != actual.len() {
        return Err(Mismatch {
            index: Some(index),
            kind: MismatchKind::FrameCount,
            expected: format!("{} frames {}", expected.len(), expected),
            actual: format!("{} frames {}", actual.len(), actual),
        });
    }
    let differing = expected
        .frames()
        .iter()
        .zip(actual.frames())
        .position(|(e, a)| e != a);
    match differing {
        Some(frame) => Err(Mismatch {
            index: Some(index),
            kind: MismatchKind::FrameContent { frame },
            expected: expected.to_string(),
            actual: actual.to_string(),
        }),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequesterState {
    Idle,
    AwaitingReply,
}

/// Requesting side of a strict alternation.
#[derive(Debug)]
pub struct Requester<S> {
    socket: S,
    state: RequesterState,
}

impl<S: Duplex> Requester<S> {
    pub fn new(socket: S) -> Self {
        Self {
            socket,
            state: RequesterState::Idle,
        }
    }

    pub fn state(&self) -> RequesterState {
        self.state
    }

    pub async fn send(&mut self, request: Multipart) -> ScenarioResult<()> {
        if self.state == RequesterState::AwaitingReply {
            return Err(ProtocolViolation::SendWhileAwaitingReply.into());
        }
        self.socket.send(request).await?;
        self.state = RequesterState::AwaitingReply;
        Ok(())
    }

    /// Receive the reply to the outstanding request. After a timeout the
    /// requester stays in `AwaitingReply`.
    pub async fn recv(&mut self, index: usize, timeout: Duration) -> ScenarioResult<Multipart> {
        if self.state == RequesterState::Idle {
            return Err(ProtocolViolation::RecvWithoutRequest.into());
        }
        let reply = recv_within(&mut self.socket, index, timeout).await?;
        self.state = RequesterState::Idle;
        Ok(reply)
    }

    /// Send then receive.
    pub async fn request(
        &mut self,
        request: Multipart,
        index: usize,
        timeout: Duration,
    ) -> ScenarioResult<Multipart> {
        self.send(request).await?;
        self.recv(index, timeout).await
    }

    pub fn into_inner(self) -> S {
        self.socket
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplierState {
    AwaitingRequest,
    Replying,
}

/// Replying side of a strict alternation.
#[derive(Debug)]
pub struct Replier<S> {
    socket: S,
    state: ReplierState,
}

impl<S: Duplex> Replier<S> {
    pub fn new(socket: S) -> Self {
        Self {
            socket,
            state: ReplierState::AwaitingRequest,
        }
    }

    pub fn state(&self) -> ReplierState {
        self.state
    }

    pub async fn recv(&mut self, index: usize, timeout: Duration) -> ScenarioResult<Multipart> {
        if self.state == ReplierState::Replying {
            return Err(ProtocolViolation::RecvWhileReplying.into());
        }
        let request = recv_within(&mut self.socket, index, timeout).await?;
        self.state = ReplierState::Replying;
        Ok(request)
    }

    pub async fn reply(&mut self, reply: Multipart) -> ScenarioResult<()> {
        if self.state == ReplierState::AwaitingRequest {
            return Err(ProtocolViolation::ReplyWithoutRequest.into());
        }
        self.socket.send(reply).await?;
        self.state = ReplierState::AwaitingRequest;
        Ok(())
    }

    /// Receive one request and answer it with `rule`, returning the request.
    pub async fn serve_one(
        &mut self,
        rule: &ReplyRule,
        index: usize,
        timeout: Duration,
    ) -> ScenarioResult<Multipart> {
        let request = self.recv(index, timeout).await?;
        self.reply(rule.apply(&request)).await?;
        Ok(request)
    }

    pub fn into_inner(self) -> S {
        self.socket
    }
}

/// Drives an ordered list of exchanges from either side.
#[derive(Debug, Clone)]
pub struct RequestReplyVerifier {
    exchanges: Vec<Exchange>,
    recv_timeout: Duration,
}

impl RequestReplyVerifier {
    pub fn new(exchanges: Vec<Exchange>, recv_timeout: Duration) -> Self {
        Self {
            exchanges,
            recv_timeout,
        }
    }

    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    /// Act as the requester: send each request, check each reply.
    ///
    /// Returns the number of exchanges verified.
    pub async fn verify_replies<S: Duplex>(
        &self,
        requester: &mut Requester<S>,
    ) -> ScenarioResult<usize> {
        for (index, exchange) in self.exchanges.iter().enumerate() {
            let reply = requester
                .request(exchange.request.clone(), index, self.recv_timeout)
                .await?;
            compare(index, &exchange.expected, &reply)?;
            tracing::trace!(index, reply = %reply, "Exchange verified");
        }
        Ok(self.exchanges.len())
    }

    /// Act as the replier: check each incoming request and answer with `rule`.
    pub async fn verify_requests<S: Duplex>(
        &self,
        replier: &mut Replier<S>,
        rule: &ReplyRule,
    ) -> ScenarioResult<usize> {
        for (index, exchange) in self.exchanges.iter().enumerate() {
            let request = replier.serve_one(rule, index, self.recv_timeout).await?;
            compare(index, &exchange.request, &request)?;
        }
        Ok(self.exchanges.len())
    }

    /// Check the replies a requester process reported, in exchange order.
    pub fn verify_reported(&self, replies: &[Multipart]) -> Result<usize, Mismatch> {
        for (index, exchange) in self.exchanges.iter().enumerate() {
            let reply = replies.get(index).ok_or_else(|| Mismatch {
                index: Some(index),
                kind: MismatchKind::Sequence,
                expected: exchange.expected.to_string(),
                actual: "no reply reported".to_string(),
            })?;
            compare(index, &exchange.expected, reply)?;
        }
        if let Some(extra) = replies.get(self.exchanges.len()) {
            return Err(Mismatch {
                index: Some(self.exchanges.len()),
                kind: MismatchKind::Sequence,
                expected: format!("{} replies", self.exchanges.len()),
                actual: format!("{} replies, first extra {}", replies.len(), extra),
            });
        }
        Ok(self.exchanges.len())
    }
}
