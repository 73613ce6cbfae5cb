// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! In-process mock peer.
//!
//! Channel-backed sockets with the same seams as the reference backend, so
//! framing, alternation and filter logic can be exercised without processes
//! or TCP. Publishers filter per subscriber like a ZMTP publisher, and a
//! subscription takes effect as soon as `subscribe` returns.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{MessageReceiver, MessageSender, Subscribe};
use crate::error::TransportError;
use crate::message::{Multipart, Subscription, SubscriptionSet};

/// Queue depth per direction; a full subscriber queue drops messages.
pub const DEFAULT_CAPACITY: usize = 1024;

/// One end of a bidirectional in-process link.
#[derive(Debug)]
pub struct InprocEnd {
    tx: mpsc::Sender<Multipart>,
    rx: mpsc::Receiver<Multipart>,
}

/// Two connected ends, e.g. a requester and its replier.
pub fn pair() -> (InprocEnd, InprocEnd) {
    pair_with_capacity(DEFAULT_CAPACITY)
}

pub fn pair_with_capacity(capacity: usize) -> (InprocEnd, InprocEnd) {
    let (a_tx, b_rx) = mpsc::channel(capacity);
    let (b_tx, a_rx) = mpsc::channel(capacity);
    (
        InprocEnd { tx: a_tx, rx: a_rx },
        InprocEnd { tx: b_tx, rx: b_rx },
    )
}

#[async_trait]
impl MessageSender for InprocEnd {
    async fn send(&mut self, message: Multipart) -> Result<(), TransportError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl MessageReceiver for InprocEnd {
    async fn recv(&mut self) -> Result<Multipart, TransportError> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }
}

type SharedSubscriptions = Arc<Mutex<SubscriptionSet>>;

fn lock(set: &SharedSubscriptions) -> MutexGuard<'_, SubscriptionSet> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
struct Attached {
    subscriptions: SharedSubscriptions,
    tx: mpsc::Sender<Multipart>,
}

/// Fan-out publisher with publisher-side topic filtering.
#[derive(Debug)]
pub struct InprocPublisher {
    capacity: usize,
    subscribers: Vec<Attached>,
    dropped: u64,
}

impl InprocPublisher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            subscribers: Vec::new(),
            dropped: 0,
        }
    }

    /// Attach a new subscriber. It starts with no subscriptions and so
    /// receives nothing until it subscribes.
    pub fn subscriber(&mut self) -> InprocSubscriber {
        let (tx, rx) = mpsc::channel(self.capacity);
        let subscriptions = SharedSubscriptions::default();
        self.subscribers.push(Attached {
            subscriptions: Arc::clone(&subscriptions),
            tx,
        });
        InprocSubscriber { subscriptions, rx }
    }

    /// Messages discarded because a subscriber queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for InprocPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageSender for InprocPublisher {
    async fn send(&mut self, message: Multipart) -> Result<(), TransportError> {
        // Detached subscribers are pruned; publishing never blocks.
        self.subscribers.retain(|s| !s.tx.is_closed());
        for attached in &self.subscribers {
            if !lock(&attached.subscriptions).matches(message.first()) {
                continue;
            }
            if let Err(mpsc::error::TrySendError::Full(_)) = attached.tx.try_send(message.clone()) {
                self.dropped += 1;
            }
        }
        Ok(())
    }
}

/// Subscriber attached to an [`InprocPublisher`].
#[derive(Debug)]
pub struct InprocSubscriber {
    subscriptions: SharedSubscriptions,
    rx: mpsc::Receiver<Multipart>,
}

impl InprocSubscriber {
    pub fn subscription_count(&self) -> usize {
        lock(&self.subscriptions).len()
    }
}

#[async_trait]
impl MessageReceiver for InprocSubscriber {
    async fn recv(&mut self) -> Result<Multipart, TransportError> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl Subscribe for InprocSubscriber {
    async fn subscribe(&mut self, subscription: &Subscription) -> Result<(), TransportError> {
        lock(&self.subscriptions).subscribe(subscription.clone());
        Ok(())
    }

    async fn unsubscribe(&mut self, subscription: &Subscription) -> Result<(), TransportError> {
        lock(&self.subscriptions).unsubscribe(subscription);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::try_recv;

    #[tokio::test]
    async fn test_pair_preserves_frames() {
        let (mut a, mut b) = pair();
        let message = Multipart::from_parts(["x", "", "z"]).unwrap();
        a.send(message.clone()).await.unwrap();
        assert_eq!(b.recv().await.unwrap(), message);
    }

    #[tokio::test]
    async fn test_closed_peer() {
        let (mut a, b) = pair();
        drop(b);
        assert!(matches!(
            a.send(Multipart::from("x")).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_unsubscribed_receives_nothing() {
        let mut publisher = InprocPublisher::new();
        let mut sub = publisher.subscriber();
        publisher.send(Multipart::from("ALERT: b")).await.unwrap();
        assert!(try_recv(&mut sub).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_publisher_side_filtering() {
        let mut publisher = InprocPublisher::new();
        let mut alerts = publisher.subscriber();
        let mut everything = publisher.subscriber();
        alerts.subscribe(&Subscription::new("ALERT")).await.unwrap();
        everything.subscribe(&Subscription::all()).await.unwrap();

        for text in ["INFO: a", "ALERT: b"] {
            publisher.send(Multipart::from(text)).await.unwrap();
        }

        assert_eq!(alerts.recv().await.unwrap(), Multipart::from("ALERT: b"));
        assert!(try_recv(&mut alerts).await.unwrap().is_none());
        assert_eq!(everything.recv().await.unwrap(), Multipart::from("INFO: a"));
        assert_eq!(everything.recv().await.unwrap(), Multipart::from("ALERT: b"));
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        let mut publisher = InprocPublisher::with_capacity(2);
        let mut sub = publisher.subscriber();
        sub.subscribe(&Subscription::all()).await.unwrap();
        for _ in 0..5 {
            publisher.send(Multipart::from("m")).await.unwrap();
        }
        assert_eq!(publisher.dropped(), 3);
    }
}
