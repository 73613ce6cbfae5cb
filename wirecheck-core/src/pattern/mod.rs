// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Socket-pattern verification.
//!
//! The verifiers only see the socket seams below, so the same request-reply
//! and publish-subscribe checks run against the reference `zeromq` backend,
//! the in-process mock peer, or an endpoint process under test.

pub mod inproc;
pub mod line;
pub mod pubsub;
pub mod reqrep;
pub mod zmq;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ScenarioError, ScenarioResult, TransportError};
use crate::message::{Multipart, Subscription};

pub use pubsub::{PubSubVerifier, Publication, PROBE_MARKER};
pub use reqrep::{Exchange, Replier, ReplyRule, RequestReplyVerifier, Requester};

/// Sending half of a socket.
#[async_trait]
pub trait MessageSender: Send {
    /// Send one multipart message, frame boundaries preserved.
    async fn send(&mut self, message: Multipart) -> Result<(), TransportError>;
}

/// Receiving half of a socket.
#[async_trait]
pub trait MessageReceiver: Send {
    /// Wait for the next multipart message.
    async fn recv(&mut self) -> Result<Multipart, TransportError>;
}

/// A subscriber socket with prefix subscriptions.
#[async_trait]
pub trait Subscribe: MessageReceiver {
    async fn subscribe(&mut self, subscription: &Subscription) -> Result<(), TransportError>;

    async fn unsubscribe(&mut self, subscription: &Subscription) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: MessageSender + ?Sized> MessageSender for Box<T> {
    async fn send(&mut self, message: Multipart) -> Result<(), TransportError> {
        (**self).send(message).await
    }
}

#[async_trait]
impl<T: MessageSender + ?Sized> MessageSender for &mut T {
    async fn send(&mut self, message: Multipart) -> Result<(), TransportError> {
        (**self).send(message).await
    }
}

#[async_trait]
impl<T: MessageReceiver + ?Sized> MessageReceiver for Box<T> {
    async fn recv(&mut self) -> Result<Multipart, TransportError> {
        (**self).recv().await
    }
}

#[async_trait]
impl<T: MessageReceiver + ?Sized> MessageReceiver for &mut T {
    async fn recv(&mut self) -> Result<Multipart, TransportError> {
        (**self).recv().await
    }
}

#[async_trait]
impl<T: Subscribe + ?Sized> Subscribe for Box<T> {
    async fn subscribe(&mut self, subscription: &Subscription) -> Result<(), TransportError> {
        (**self).subscribe(subscription).await
    }

    async fn unsubscribe(&mut self, subscription: &Subscription) -> Result<(), TransportError> {
        (**self).unsubscribe(subscription).await
    }
}

/// A socket that both sends and receives (REQ, REP, an in-process pair end).
pub trait Duplex: MessageSender + MessageReceiver {}

impl<T> Duplex for T where T: MessageSender + MessageReceiver + ?Sized {}

/// Receive with a per-call deadline.
///
/// # Errors
/// `ReceiveTimeout` carrying `index` if nothing arrives within `timeout`.
pub async fn recv_within<R>(
    receiver: &mut R,
    index: usize,
    timeout: Duration,
) -> ScenarioResult<Multipart>
where
    R: MessageReceiver + ?Sized,
{
    match tokio::time::timeout(timeout, receiver.recv()).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ScenarioError::ReceiveTimeout {
            index,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Non-blocking receive: `None` if no message is ready right now.
pub async fn try_recv<R>(receiver: &mut R) -> Result<Option<Multipart>, TransportError>
where
    R: MessageReceiver + ?Sized,
{
    match tokio::time::timeout(Duration::ZERO, receiver.recv()).await {
        Ok(result) => result.map(Some),
        Err(_) => Ok(None),
    }
}

/// Non-blocking send: `false` if the message could not be queued right now.
pub async fn try_send<S>(sender: &mut S, message: Multipart) -> Result<bool, TransportError>
where
    S: MessageSender + ?Sized,
{
    match tokio::time::timeout(Duration::ZERO, sender.send(message)).await {
        Ok(result) => result.map(|()| true),
        Err(_) => Ok(false),
    }
}
