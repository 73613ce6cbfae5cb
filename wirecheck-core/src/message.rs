// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Frames, multipart messages and topic subscriptions.

use std::fmt;

use bytes::Bytes;

use crate::error::TransportError;

/// Longest frame prefix rendered in diagnostics.
const RENDER_LIMIT: usize = 48;

/// A non-empty ordered sequence of frames delivered atomically.
///
/// Only the last frame is final; every other frame carries the "more"
/// continuation flag on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Multipart {
    frames: Vec<Bytes>,
}

impl Multipart {
    /// Build a message from frames, rejecting the empty sequence.
    pub fn new(frames: Vec<Bytes>) -> Result<Self, TransportError> {
        if frames.is_empty() {
            return Err(TransportError::EmptyMessage);
        }
        Ok(Self { frames })
    }

    /// Single-frame message.
    pub fn single(frame: impl Into<Bytes>) -> Self {
        Self {
            frames: vec![frame.into()],
        }
    }

    /// Build from anything byte-like; used heavily by scenario definitions.
    pub fn from_parts<I, B>(parts: I) -> Result<Self, TransportError>
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self::new(parts.into_iter().map(Into::into).collect())
    }

    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Bytes> {
        self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false: a multipart has at least one frame.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// First frame, which carries the topic for publish-subscribe.
    pub fn first(&self) -> &Bytes {
        &self.frames[0]
    }

    /// Copy of this message with the first frame replaced.
    pub fn with_first(&self, frame: Bytes) -> Self {
        let mut frames = self.frames.clone();
        frames[0] = frame;
        Self { frames }
    }

    /// Whether the frame at `index` is the final one.
    pub fn is_final(&self, index: usize) -> bool {
        index + 1 == self.frames.len()
    }

    /// Total payload bytes across all frames.
    pub fn payload_len(&self) -> usize {
        self.frames.iter().map(Bytes::len).sum()
    }
}

impl From<Bytes> for Multipart {
    fn from(frame: Bytes) -> Self {
        Self::single(frame)
    }
}

impl From<&str> for Multipart {
    fn from(frame: &str) -> Self {
        Self::single(Bytes::copy_from_slice(frame.as_bytes()))
    }
}

impl From<String> for Multipart {
    fn from(frame: String) -> Self {
        Self::single(Bytes::from(frame))
    }
}

impl fmt::Display for Multipart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (index, frame) in self.frames.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", render_frame(frame))?;
        }
        write!(f, "]")
    }
}

/// Human-readable frame rendering that stays short for megabyte payloads.
pub fn render_frame(frame: &[u8]) -> String {
    if frame.len() <= RENDER_LIMIT {
        format!("{:?}", String::from_utf8_lossy(frame))
    } else {
        format!(
            "{:?}…({} bytes)",
            String::from_utf8_lossy(&frame[..RENDER_LIMIT]),
            frame.len()
        )
    }
}

/// A topic-prefix subscription. The empty prefix matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Subscription {
    prefix: String,
}

impl Subscription {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Subscription that receives every message.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether a message whose first frame is `topic` is delivered.
    pub fn matches(&self, topic: &[u8]) -> bool {
        topic.starts_with(self.prefix.as_bytes())
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.prefix)
    }
}

/// The subscriptions held by one socket; delivery is the union of matches.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription. Returns false if it was already present.
    pub fn subscribe(&mut self, subscription: Subscription) -> bool {
        if self.subscriptions.contains(&subscription) {
            return false;
        }
        self.subscriptions.push(subscription);
        true
    }

    /// Remove a subscription. Returns false if it was not present.
    pub fn unsubscribe(&mut self, subscription: &Subscription) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s != subscription);
        before != self.subscriptions.len()
    }

    /// No subscriptions means nothing is delivered.
    pub fn matches(&self, topic: &[u8]) -> bool {
        self.subscriptions.iter().any(|s| s.matches(topic))
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
