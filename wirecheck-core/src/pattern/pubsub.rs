// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Publish-subscribe verification.
//!
//! Subscription readiness is its own phase: the publisher emits probe
//! messages under the subscribed prefix, with backoff, until the subscriber
//! has seen one. Probes never count as observed traffic. After the last
//! publish the subscriber is observed for a fixed window; late arrivals are
//! not collected.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use bytes::Bytes;

use super::line::{self, RECV_MARKER};
use super::{MessageReceiver, MessageSender, Subscribe};
use crate::error::{Mismatch, MismatchKind, ScenarioResult, StartupFailure};
use crate::harness::{Backoff, CapturedOutput};
use crate::message::{render_frame, Multipart, Subscription};

/// Marker embedded in every probe message, right after the topic prefix.
pub const PROBE_MARKER: &str = "\u{1}wirecheck-probe:";

/// Probe number `seq` for a subscription.
pub fn probe_message(subscription: &Subscription, seq: u64) -> Multipart {
    Multipart::single(Bytes::from(format!(
        "{}{}{}",
        subscription.prefix(),
        PROBE_MARKER,
        seq
    )))
}

pub fn is_probe(message: &Multipart) -> bool {
    message
        .first()
        .windows(PROBE_MARKER.len())
        .any(|window| window == PROBE_MARKER.as_bytes())
}

/// Messages a subscriber endpoint reported on stdout, probes excluded.
pub fn observed_in_output(output: &CapturedOutput) -> Vec<Multipart> {
    line::reported(output, RECV_MARKER)
        .into_iter()
        .filter(|message| !is_probe(message))
        .collect()
}

fn probe_seen_in_output(output: &CapturedOutput) -> bool {
    line::reported(output, RECV_MARKER).iter().any(is_probe)
}

/// What a publisher sends and what the subscriber subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub subscription: Subscription,
    pub messages: Vec<Multipart>,
}

impl Publication {
    pub fn new(subscription: Subscription, messages: Vec<Multipart>) -> Self {
        Self {
            subscription,
            messages,
        }
    }

    /// Published messages the subscription should deliver, in publish order.
    pub fn expected(&self) -> Vec<Multipart> {
        self.messages
            .iter()
            .filter(|m| self.subscription.matches(m.first()))
            .cloned()
            .collect()
    }
}

/// Drives one publish-subscribe scenario.
#[derive(Debug, Clone)]
pub struct PubSubVerifier {
    publication: Publication,
    window: Duration,
    handshake_timeout: Duration,
}

impl PubSubVerifier {
    pub fn new(publication: Publication, window: Duration, handshake_timeout: Duration) -> Self {
        Self {
            publication,
            window,
            handshake_timeout,
        }
    }

    pub fn publication(&self) -> &Publication {
        &self.publication
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Probe until a local subscriber receives one. Returns the probes sent.
    pub async fn confirm_local<P, S>(&self, publisher: &mut P, subscriber: &mut S) -> ScenarioResult<u64>
    where
        P: MessageSender + ?Sized,
        S: MessageReceiver + ?Sized,
    {
        let deadline = Instant::now() + self.handshake_timeout;
        let mut backoff = Backoff::default();
        let mut seq = 0;
        loop {
            seq += 1;
            publisher
                .send(probe_message(&self.publication.subscription, seq))
                .await?;
            let wait = backoff
                .next_delay()
                .min(deadline.saturating_duration_since(Instant::now()));
            if let Ok(received) = tokio::time::timeout(wait, subscriber.recv()).await {
                if is_probe(&received?) {
                    tracing::debug!(probes = seq, "Subscription confirmed");
                    return Ok(seq);
                }
            }
            if Instant::now() >= deadline {
                return Err(self.handshake_failed("subscriber").into());
            }
        }
    }

    /// Probe until a remote subscriber reports one on stdout.
    pub async fn confirm_remote<P>(&self, publisher: &mut P, output: &CapturedOutput) -> ScenarioResult<u64>
    where
        P: MessageSender + ?Sized,
    {
        let deadline = Instant::now() + self.handshake_timeout;
        let mut backoff = Backoff::default();
        let mut seq = 0;
        loop {
            seq += 1;
            publisher
                .send(probe_message(&self.publication.subscription, seq))
                .await?;
            backoff.wait(deadline).await;
            if probe_seen_in_output(output) {
                tracing::debug!(probes = seq, "Remote subscription confirmed");
                return Ok(seq);
            }
            if Instant::now() >= deadline {
                return Err(self.handshake_failed("remote subscriber").into());
            }
        }
    }

    /// Wait for the first delivery from a publisher that repeats its
    /// messages, so observation starts on a live stream.
    pub async fn await_first_delivery<S>(&self, subscriber: &mut S) -> ScenarioResult<Option<Multipart>>
    where
        S: MessageReceiver + ?Sized,
    {
        if self.publication.expected().is_empty() {
            return Ok(None);
        }
        match tokio::time::timeout(self.handshake_timeout, subscriber.recv()).await {
            Ok(received) => Ok(Some(received?)),
            Err(_) => Err(self.handshake_failed("publisher").into()),
        }
    }

    /// Wait until a remote subscriber reports its first message.
    pub async fn await_first_output(&self, output: &CapturedOutput) -> ScenarioResult<()> {
        if self.publication.expected().is_empty() {
            return Ok(());
        }
        let deadline = Instant::now() + self.handshake_timeout;
        let mut backoff = Backoff::default();
        while !output.stdout_contains(|text| text.starts_with(RECV_MARKER)) {
            if Instant::now() >= deadline {
                return Err(self.handshake_failed("remote subscriber").into());
            }
            backoff.wait(deadline).await;
        }
        Ok(())
    }

    /// Publish every message once, in order.
    pub async fn publish<P>(&self, publisher: &mut P) -> ScenarioResult<()>
    where
        P: MessageSender + ?Sized,
    {
        for message in &self.publication.messages {
            publisher.send(message.clone()).await?;
        }
        Ok(())
    }

    /// Collect everything delivered within the observation window.
    pub async fn collect<S>(&self, subscriber: &mut S) -> ScenarioResult<Vec<Multipart>>
    where
        S: MessageReceiver + ?Sized,
    {
        let deadline = Instant::now() + self.window;
        let mut observed = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, subscriber.recv()).await {
                Ok(received) => {
                    let message = received?;
                    if !is_probe(&message) {
                        observed.push(message);
                    }
                }
                Err(_) => break,
            }
        }
        Ok(observed)
    }

    /// Let the window elapse, then read what a remote subscriber printed.
    pub async fn collect_output(&self, output: &CapturedOutput) -> Vec<Multipart> {
        tokio::time::sleep(self.window).await;
        observed_in_output(output)
    }

    /// Observed must equal the matching published messages, in order.
    pub fn verify_exact(&self, observed: &[Multipart]) -> Result<(), Mismatch> {
        self.check_filter(observed)?;
        let expected = self.publication.expected();
        if observed != expected.as_slice() {
            let position = expected
                .iter()
                .zip(observed)
                .position(|(e, o)| e != o)
                .unwrap_or_else(|| expected.len().min(observed.len()));
            return Err(Mismatch {
                index: Some(position),
                kind: MismatchKind::Sequence,
                expected: render_all(&expected),
                actual: render_all(observed),
            });
        }
        Ok(())
    }

    /// For publishers that repeat their messages: everything observed is a
    /// matching published message and every matching message was observed.
    pub fn verify_cycle(&self, observed: &[Multipart]) -> Result<(), Mismatch> {
        self.check_filter(observed)?;
        let expected = self.publication.expected();

        if let Some(index) = observed.iter().position(|o| !expected.contains(o)) {
            return Err(Mismatch {
                index: Some(index),
                kind: MismatchKind::Sequence,
                expected: format!("one of {}", render_all(&expected)),
                actual: observed[index].to_string(),
            });
        }

        let seen: HashSet<&Multipart> = observed.iter().collect();
        let missing: Vec<Multipart> = expected
            .iter()
            .filter(|e| !seen.contains(e))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(Mismatch {
                index: None,
                kind: MismatchKind::Sequence,
                expected: render_all(&expected),
                actual: format!("missing {}", render_all(&missing)),
            });
        }
        Ok(())
    }

    /// Subscribe, confirm, publish once, observe and compare exactly.
    pub async fn run_local<P, S>(&self, publisher: &mut P, subscriber: &mut S) -> ScenarioResult<usize>
    where
        P: MessageSender + ?Sized,
        S: Subscribe + ?Sized,
    {
        subscriber.subscribe(&self.publication.subscription).await?;
        self.confirm_local(publisher, subscriber).await?;
        self.publish(publisher).await?;
        let observed = self.collect(subscriber).await?;
        self.verify_exact(&observed)?;
        Ok(observed.len())
    }

    fn check_filter(&self, observed: &[Multipart]) -> Result<(), Mismatch> {
        match observed
            .iter()
            .position(|m| !self.publication.subscription.matches(m.first()))
        {
            Some(index) => Err(Mismatch {
                index: Some(index),
                kind: MismatchKind::FilterViolation,
                expected: format!("topic prefix {}", self.publication.subscription),
                actual: render_frame(observed[index].first()),
            }),
            None => Ok(()),
        }
    }

    fn handshake_failed(&self, role: &str) -> StartupFailure {
        StartupFailure::ReadyTimeout {
            program: role.to_string(),
            waited_ms: self.handshake_timeout.as_millis() as u64,
        }
    }
}

fn render_all(messages: &[Multipart]) -> String {
    let rendered: Vec<String> = messages.iter().map(ToString::to_string).collect();
    format!("[{}]", rendered.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScenarioError;
    use crate::pattern::inproc::InprocPublisher;

    const WINDOW: Duration = Duration::from_millis(100);
    const HANDSHAKE: Duration = Duration::from_secs(2);

    fn alerts() -> Publication {
        Publication::new(
            Subscription::new("ALERT"),
            ["INFO: a", "ALERT: b", "DEBUG: c", "ALERT: d"]
                .into_iter()
                .map(Multipart::from)
                .collect(),
        )
    }

    fn verifier(publication: Publication) -> PubSubVerifier {
        PubSubVerifier::new(publication, WINDOW, HANDSHAKE)
    }

    #[test]
    fn test_probe_matches_subscription() {
        let subscription = Subscription::new("ALERT");
        let probe = probe_message(&subscription, 3);
        assert!(subscription.matches(probe.first()));
        assert!(is_probe(&probe));
        assert!(!is_probe(&Multipart::from("ALERT: b")));
    }

    #[test]
    fn test_expected_keeps_publish_order() {
        let expected = alerts().expected();
        assert_eq!(
            expected,
            vec![Multipart::from("ALERT: b"), Multipart::from("ALERT: d")]
        );
    }

    #[test]
    fn test_filter_violation_detected() {
        let observed = vec![Multipart::from("ALERT: b"), Multipart::from("INFO: a")];
        let mismatch = verifier(alerts()).verify_exact(&observed).unwrap_err();
        assert_eq!(mismatch.kind, MismatchKind::FilterViolation);
        assert_eq!(mismatch.index, Some(1));
    }

    #[test]
    fn test_reordering_is_a_sequence_mismatch() {
        let observed = vec![Multipart::from("ALERT: d"), Multipart::from("ALERT: b")];
        let mismatch = verifier(alerts()).verify_exact(&observed).unwrap_err();
        assert_eq!(mismatch.kind, MismatchKind::Sequence);
        assert_eq!(mismatch.index, Some(0));
    }

    #[test]
    fn test_substring_is_not_a_match() {
        let observed = vec![Multipart::from("ALERT: b!"), Multipart::from("ALERT: d")];
        assert!(verifier(alerts()).verify_exact(&observed).is_err());
    }

    #[test]
    fn test_cycle_accepts_repeats_and_rejects_gaps() {
        let verifier = verifier(alerts());
        let repeated = vec![
            Multipart::from("ALERT: d"),
            Multipart::from("ALERT: b"),
            Multipart::from("ALERT: d"),
        ];
        assert!(verifier.verify_cycle(&repeated).is_ok());

        let partial = vec![Multipart::from("ALERT: d")];
        let mismatch = verifier.verify_cycle(&partial).unwrap_err();
        assert!(mismatch.actual.contains("ALERT: b"));
    }

    #[test]
    fn test_output_parsing_skips_probes() {
        let output = CapturedOutput::default();
        let probe = format!("RECV ALERT{}1", PROBE_MARKER);
        for line in ["READY", probe.as_str(), "RECV ALERT: b", "RECV ALERT: d"] {
            output.push_stdout(line);
        }
        assert_eq!(
            observed_in_output(&output),
            vec![Multipart::from("ALERT: b"), Multipart::from("ALERT: d")]
        );
        assert!(probe_seen_in_output(&output));
    }

    #[test]
    fn test_output_parsing_decodes_escaped_lines() {
        let output = CapturedOutput::default();
        output.push_stdout("RECV ALERT\\x01wirecheck-probe:2");
        output.push_stdout("RECV ALERT: two\\nlines");
        assert!(probe_seen_in_output(&output));
        assert_eq!(
            observed_in_output(&output),
            vec![Multipart::from("ALERT: two\nlines")]
        );
    }

    #[tokio::test]
    async fn test_topic_filter_against_mock_peer() {
        let mut publisher = InprocPublisher::new();
        let mut subscriber = publisher.subscriber();
        let count = verifier(alerts())
            .run_local(&mut publisher, &mut subscriber)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_empty_prefix_receives_everything() {
        let mut publication = alerts();
        publication.subscription = Subscription::all();
        let mut publisher = InprocPublisher::new();
        let mut subscriber = publisher.subscriber();
        let count = verifier(publication)
            .run_local(&mut publisher, &mut subscriber)
            .await
            .unwrap();
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_unconfirmed_subscription_times_out() {
        let mut publisher = InprocPublisher::new();
        // Attached but never subscribed, so probes are filtered out.
        let mut subscriber = publisher.subscriber();
        let verifier = PubSubVerifier::new(alerts(), WINDOW, Duration::from_millis(100));
        let err = verifier
            .confirm_local(&mut publisher, &mut subscriber)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScenarioError::Startup(StartupFailure::ReadyTimeout { .. })
        ));
    }
}
