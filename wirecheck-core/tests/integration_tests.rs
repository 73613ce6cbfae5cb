// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! End-to-end integration tests for wirecheck-core.
//!
//! These tests drive the reference backend over loopback TCP and the
//! scenario runner from a suite file on disk.

use std::time::Duration;

use bytes::Bytes;
use tempfile::TempDir;
use wirecheck_core::pattern::pubsub::{PubSubVerifier, Publication};
use wirecheck_core::pattern::reqrep::{Exchange, Replier, ReplyRule, RequestReplyVerifier, Requester};
use wirecheck_core::pattern::zmq;
use wirecheck_core::{
    ConfigLoader, HarnessConfig, MismatchKind, Multipart, ScenarioError, ScenarioRunner,
    StartupFailure, Subscription,
};

const TIMEOUT: Duration = Duration::from_secs(10);

fn echo_rule() -> ReplyRule {
    ReplyRule::PrefixFirst("Echo: ".to_string())
}

/// Spawn a reference replier applying `rule` to `count` requests.
async fn spawn_replier(
    rule: ReplyRule,
    count: usize,
) -> (tokio::task::JoinHandle<()>, wirecheck_core::TcpEndpoint) {
    let (rep, endpoint) = zmq::bind_rep("127.0.0.1").await.expect("bind rep");
    let handle = tokio::spawn(async move {
        let mut replier = Replier::new(rep);
        for index in 0..count {
            replier
                .serve_one(&rule, index, TIMEOUT)
                .await
                .expect("serve request");
        }
    });
    (handle, endpoint)
}

/// Echo over the reference backend for sizes up to one megabyte
#[tokio::test]
async fn test_echo_payload_sizes() {
    let sizes = [0usize, 1, 1024, 1_048_576];
    let (server, endpoint) = spawn_replier(echo_rule(), sizes.len()).await;
    let mut requester = Requester::new(zmq::connect_req(&endpoint).await.unwrap());

    for (index, size) in sizes.into_iter().enumerate() {
        let payload = Bytes::from(vec![b'X'; size]);
        let reply = requester
            .request(Multipart::single(payload), index, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(reply.len(), 1);
        assert_eq!(reply.first().len(), size + 6);
        assert!(reply.first().starts_with(b"Echo: "));
    }
    server.await.unwrap();
}

/// Multipart frame boundaries survive a round trip
#[tokio::test]
async fn test_multipart_boundaries_preserved() {
    let (server, endpoint) = spawn_replier(echo_rule(), 1).await;
    let mut requester = Requester::new(zmq::connect_req(&endpoint).await.unwrap());

    let reply = requester
        .request(Multipart::from_parts(["f1", "f2", "f3"]).unwrap(), 0, TIMEOUT)
        .await
        .unwrap();
    let frames: Vec<&[u8]> = reply.frames().iter().map(|f| &f[..]).collect();
    assert_eq!(frames, vec![&b"Echo: f1"[..], b"f2", b"f3"]);
    server.await.unwrap();
}

/// A replier that drops the prefix is reported with expected and actual
#[tokio::test]
async fn test_reference_mismatch_is_reported() {
    let (server, endpoint) = spawn_replier(ReplyRule::Echo, 1).await;
    let mut requester = Requester::new(zmq::connect_req(&endpoint).await.unwrap());

    let verifier = RequestReplyVerifier::new(
        vec![Exchange::derived(Multipart::from("Hello"), &echo_rule())],
        TIMEOUT,
    );
    let err = verifier.verify_replies(&mut requester).await.unwrap_err();
    match err {
        ScenarioError::ProtocolMismatch(mismatch) => {
            assert_eq!(mismatch.index, Some(0));
            assert_eq!(mismatch.kind, MismatchKind::FrameContent { frame: 0 });
            assert!(mismatch.expected.contains("Echo: Hello"));
            assert!(mismatch.actual.contains("Hello"));
        }
        other => panic!("unexpected error: {other}"),
    }
    server.await.unwrap();
}

fn alert_publication(prefix: &str) -> Publication {
    Publication::new(
        Subscription::new(prefix),
        ["INFO: a", "ALERT: b", "DEBUG: c", "ALERT: d"]
            .into_iter()
            .map(Multipart::from)
            .collect(),
    )
}

/// Topic filtering over the reference backend
#[tokio::test]
async fn test_reference_topic_filtering() {
    let (mut publisher, endpoint) = zmq::bind_pub("127.0.0.1").await.unwrap();
    let mut subscriber = zmq::connect_sub(&endpoint).await.unwrap();

    let verifier = PubSubVerifier::new(
        alert_publication("ALERT"),
        Duration::from_millis(300),
        TIMEOUT,
    );
    let observed = verifier
        .run_local(&mut publisher, &mut subscriber)
        .await
        .unwrap();
    assert_eq!(observed, 2);
}

/// Empty prefix receives every published message
#[tokio::test]
async fn test_reference_empty_prefix() {
    let (mut publisher, endpoint) = zmq::bind_pub("127.0.0.1").await.unwrap();
    let mut subscriber = zmq::connect_sub(&endpoint).await.unwrap();

    let verifier = PubSubVerifier::new(alert_publication(""), Duration::from_millis(300), TIMEOUT);
    let observed = verifier
        .run_local(&mut publisher, &mut subscriber)
        .await
        .unwrap();
    assert_eq!(observed, 4);
}

/// Suite file on disk drives the runner
#[tokio::test]
async fn test_suite_file_runs_local_scenarios() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let suite_path = temp_dir.path().join("suite.yaml");
    std::fs::write(
        &suite_path,
        r#"
harness:
  observation_window_ms: 300
scenarios:
  - name: echo
    pattern: req_rep
    requester: local
    replier: local
    reply_rule: { prefix_first: "Echo: " }
    exchanges:
      - request: ["Hello"]
      - request: ["f1", "f2", "f3"]
  - name: alerts
    pattern: pub_sub
    publisher: local
    subscriber: local
    topic: ALERT
    messages: ["INFO: a", "ALERT: b", "DEBUG: c", "ALERT: d"]
"#,
    )
    .expect("Failed to write suite");

    let suite = ConfigLoader::load_file(&suite_path).unwrap();
    let runner = ScenarioRunner::new(suite.harness.clone());
    let outcomes = runner.run_all(&suite.scenarios).await;

    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        assert!(outcome.passed(), "{}: {:?}", outcome.name, outcome.result);
    }
}

/// A replier process that dies on startup is retried, then reported
#[tokio::test]
async fn test_startup_failure_is_retried() {
    let yaml = r#"
harness:
  retry_attempts: 3
  ready_timeout_ms: 2000
scenarios:
  - name: crashing
    pattern: req_rep
    requester: local
    replier:
      executable: sh
      args: ["-c", "echo 'bind failed' 1>&2; exit 1", "sh"]
    exchanges:
      - request: ["Hello"]
"#;
    let suite = ConfigLoader::load_string(yaml).unwrap();
    let outcome = ScenarioRunner::new(suite.harness.clone())
        .run(&suite.scenarios[0])
        .await;

    assert_eq!(outcome.attempts, 3);
    match outcome.result {
        Err(ScenarioError::Startup(StartupFailure::ExitedImmediately { stderr, .. })) => {
            assert!(stderr.contains("bind failed"))
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

/// Mismatches are never retried
#[tokio::test]
async fn test_mismatch_is_not_retried() {
    let yaml = r#"
harness:
  retry_attempts: 3
scenarios:
  - name: wrong-expectation
    pattern: req_rep
    requester: local
    replier: local
    reply_rule: echo
    exchanges:
      - request: ["Hello"]
        expect: ["Goodbye"]
"#;
    let suite = ConfigLoader::load_string(yaml).unwrap();
    let outcome = ScenarioRunner::new(HarnessConfig::default())
        .run(&suite.scenarios[0])
        .await;
    assert_eq!(outcome.attempts, 1);
    assert!(matches!(
        outcome.result,
        Err(ScenarioError::ProtocolMismatch(_))
    ));
}
