// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `wirecheck endpoint` command - Reference endpoints.
//!
//! Each role follows the harness invocation convention: `--port`, `--topic`
//! and repeated `--message` flags, a `READY [tcp://host:port]` line once
//! bound or connected, one `RECV <message>` line per delivery and one
//! `REPLY <message>` line per reply. Reported messages are line-encoded;
//! judging them is left to the harness.

use std::time::Duration;

use clap::{Args, ValueEnum};
use thiserror::Error;
use wirecheck_core::harness::READY_MARKER;
use wirecheck_core::pattern::line::{self, RECV_MARKER, REPLY_MARKER};
use wirecheck_core::pattern::zmq::{ReferencePub, ReferenceRep, ReferenceReq, ReferenceSub};
use wirecheck_core::pattern::{ReplyRule, Requester};
use wirecheck_core::{
    MessageReceiver, MessageSender, Multipart, Port, PortSpec, Subscribe, Subscription,
    TcpEndpoint,
};

/// Socket role played by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Role {
    /// Bind a reply socket and answer every request
    Rep,
    /// Connect a request socket, send each message in turn and report the replies
    Req,
    /// Bind a publisher and repeat the messages until terminated
    Pub,
    /// Connect a subscriber and print every delivery
    Sub,
}

#[derive(Debug, Args)]
pub struct EndpointArgs {
    #[arg(value_enum)]
    pub role: Role,

    /// Port to bind (rep, pub; 0 picks one) or connect to (req, sub)
    #[arg(short, long, default_value_t = 0)]
    pub port: u16,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Subscription prefix (sub)
    #[arg(short, long, default_value = "")]
    pub topic: String,

    /// Message to send (req, pub; repeatable)
    #[arg(short, long = "message")]
    pub messages: Vec<String>,

    /// Prefix added to the first reply frame (rep)
    #[arg(long, default_value = "Echo: ")]
    pub prefix: String,

    /// Per-reply timeout in milliseconds (req)
    #[arg(long, default_value_t = 5000)]
    pub timeout_ms: u64,

    /// Pause between publish cycles in milliseconds (pub)
    #[arg(long, default_value_t = 20)]
    pub interval_ms: u64,

    /// Exit after answering this many requests (rep)
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("--port must name the peer to connect to")]
    MissingPort,
}

pub async fn execute(args: EndpointArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing::debug!(role = ?args.role, port = args.port, host = %args.host, "Starting endpoint");
    match args.role {
        Role::Rep => run_rep(&args).await,
        Role::Req => run_req(&args).await,
        Role::Pub => run_pub(&args).await,
        Role::Sub => run_sub(&args).await,
    }
}

fn announce(endpoint: Option<&TcpEndpoint>) {
    match endpoint {
        Some(endpoint) => println!("{} {}", READY_MARKER, endpoint),
        None => println!("{}", READY_MARKER),
    }
}

fn peer(args: &EndpointArgs) -> Result<TcpEndpoint, EndpointError> {
    let port = Port::new(args.port).map_err(|_| EndpointError::MissingPort)?;
    Ok(TcpEndpoint::new(&args.host, port))
}

async fn run_rep(args: &EndpointArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut socket = ReferenceRep::new();
    let endpoint = socket.bind(&args.host, PortSpec::from(args.port)).await?;
    announce(Some(&endpoint));

    let rule = ReplyRule::PrefixFirst(args.prefix.clone());
    let mut served = 0usize;
    while args.count.map_or(true, |count| served < count) {
        let request = socket.recv().await?;
        socket.send(rule.apply(&request)).await?;
        served += 1;
        tracing::debug!(served, frames = request.len(), "Answered request");
    }

    socket.close().await;
    Ok(())
}

async fn run_req(args: &EndpointArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut socket = ReferenceReq::new();
    socket.connect(&peer(args)?).await?;
    announce(None);

    let timeout = Duration::from_millis(args.timeout_ms);
    let mut requester = Requester::new(socket);

    for (index, message) in args.messages.iter().enumerate() {
        let reply = requester
            .request(Multipart::from(message.clone()), index, timeout)
            .await?;
        println!("{}{}", REPLY_MARKER, line::encode(&reply));
    }

    requester.into_inner().close().await;
    Ok(())
}

async fn run_pub(args: &EndpointArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut socket = ReferencePub::new();
    let endpoint = socket.bind(&args.host, PortSpec::from(args.port)).await?;
    announce(Some(&endpoint));

    let messages: Vec<Multipart> = args
        .messages
        .iter()
        .map(|message| Multipart::from(message.clone()))
        .collect();
    let interval = Duration::from_millis(args.interval_ms);

    // Late subscribers see a later cycle; runs until terminated.
    loop {
        for message in &messages {
            socket.send(message.clone()).await?;
        }
        tokio::time::sleep(interval).await;
    }
}

async fn run_sub(args: &EndpointArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut socket = ReferenceSub::new();
    socket.connect(&peer(args)?).await?;
    socket.subscribe(&Subscription::new(args.topic.as_str())).await?;
    announce(None);

    loop {
        let message = socket.recv().await?;
        println!("{}{}", RECV_MARKER, line::encode(&message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        endpoint: EndpointArgs,
    }

    #[test]
    fn test_parses_harness_flags() {
        let parsed = Harness::parse_from([
            "endpoint", "sub", "--port", "5555", "--topic", "ALERT",
        ]);
        assert_eq!(parsed.endpoint.role, Role::Sub);
        assert_eq!(parsed.endpoint.port, 5555);
        assert_eq!(parsed.endpoint.topic, "ALERT");
    }

    #[test]
    fn test_repeated_messages_and_empty_topic() {
        let parsed = Harness::parse_from([
            "endpoint", "pub", "--port", "0", "--topic", "", "--message", "a", "--message", "b",
        ]);
        assert_eq!(parsed.endpoint.messages, vec!["a", "b"]);
        assert_eq!(parsed.endpoint.topic, "");
    }

    #[test]
    fn test_connecting_roles_need_a_port() {
        let parsed = Harness::parse_from(["endpoint", "req"]);
        assert!(matches!(peer(&parsed.endpoint), Err(EndpointError::MissingPort)));
    }
}
