// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Reference backend on the pure-Rust `zeromq` crate.

use async_trait::async_trait;
use bytes::Bytes;
use zeromq::{Endpoint, Socket, SocketRecv, SocketSend, ZmqMessage};

use super::{MessageReceiver, MessageSender, Subscribe};
use crate::error::TransportError;
use crate::message::{Multipart, Subscription};
use crate::types::{Port, PortSpec, TcpEndpoint};

/// A reference ZeroMQ socket behind the pattern seams.
pub struct ReferenceSocket<S> {
    inner: S,
}

pub type ReferenceReq = ReferenceSocket<zeromq::ReqSocket>;
pub type ReferenceRep = ReferenceSocket<zeromq::RepSocket>;
pub type ReferencePub = ReferenceSocket<zeromq::PubSocket>;
pub type ReferenceSub = ReferenceSocket<zeromq::SubSocket>;

impl<S: Socket> ReferenceSocket<S> {
    pub fn new() -> Self {
        Self { inner: S::new() }
    }

    /// Bind on `host`. For an ephemeral port the resolved endpoint is read
    /// back from the socket.
    pub async fn bind(&mut self, host: &str, port: PortSpec) -> Result<TcpEndpoint, TransportError> {
        let requested = format!("tcp://{}:{}", host, port.flag_value());
        let bound = self
            .inner
            .bind(&requested)
            .await
            .map_err(|e| TransportError::Bind {
                endpoint: requested.clone(),
                reason: e.to_string(),
            })?;

        let resolved = match bound {
            Endpoint::Tcp(_, resolved) => resolved,
            other => {
                return Err(TransportError::Bind {
                    endpoint: requested,
                    reason: format!("bound to non-tcp endpoint {}", other),
                })
            }
        };
        let port = Port::new(resolved).map_err(|e| TransportError::Bind {
            endpoint: requested.clone(),
            reason: e.to_string(),
        })?;

        tracing::debug!(endpoint = %requested, port = resolved, "Reference socket bound");
        Ok(TcpEndpoint::new(host, port))
    }

    pub async fn connect(&mut self, endpoint: &TcpEndpoint) -> Result<(), TransportError> {
        let address = endpoint.to_string();
        self.inner
            .connect(&address)
            .await
            .map_err(|e| TransportError::Connect {
                endpoint: address,
                reason: e.to_string(),
            })
    }

    /// Close the socket and release its port.
    pub async fn close(self) {
        for error in self.inner.close().await {
            tracing::debug!(error = %error, "error while closing reference socket");
        }
    }
}

impl<S: Socket> Default for ReferenceSocket<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> std::fmt::Debug for ReferenceSocket<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceSocket")
            .field("kind", &std::any::type_name::<S>())
            .finish()
    }
}

fn to_wire(message: Multipart) -> Result<ZmqMessage, TransportError> {
    ZmqMessage::try_from(message.into_frames()).map_err(|e| TransportError::Send {
        reason: e.to_string(),
    })
}

fn from_wire(message: ZmqMessage) -> Result<Multipart, TransportError> {
    let frames: Vec<Bytes> = message.into_vec();
    Multipart::new(frames)
}

#[async_trait]
impl<S> MessageSender for ReferenceSocket<S>
where
    S: SocketSend + Send,
{
    async fn send(&mut self, message: Multipart) -> Result<(), TransportError> {
        let message = to_wire(message)?;
        self.inner
            .send(message)
            .await
            .map_err(|e| TransportError::Send {
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl<S> MessageReceiver for ReferenceSocket<S>
where
    S: SocketRecv + Send,
{
    async fn recv(&mut self) -> Result<Multipart, TransportError> {
        let message = self.inner.recv().await.map_err(|e| TransportError::Recv {
            reason: e.to_string(),
        })?;
        from_wire(message)
    }
}

#[async_trait]
impl Subscribe for ReferenceSub {
    async fn subscribe(&mut self, subscription: &Subscription) -> Result<(), TransportError> {
        self.inner
            .subscribe(subscription.prefix())
            .await
            .map_err(|e| TransportError::Subscribe {
                reason: e.to_string(),
            })
    }

    async fn unsubscribe(&mut self, subscription: &Subscription) -> Result<(), TransportError> {
        self.inner
            .unsubscribe(subscription.prefix())
            .await
            .map_err(|e| TransportError::Subscribe {
                reason: e.to_string(),
            })
    }
}

/// Bind a reply socket on an ephemeral loopback port.
pub async fn bind_rep(host: &str) -> Result<(ReferenceRep, TcpEndpoint), TransportError> {
    let mut socket = ReferenceRep::new();
    let endpoint = socket.bind(host, PortSpec::Ephemeral).await?;
    Ok((socket, endpoint))
}

/// Bind a publisher socket on an ephemeral loopback port.
pub async fn bind_pub(host: &str) -> Result<(ReferencePub, TcpEndpoint), TransportError> {
    let mut socket = ReferencePub::new();
    let endpoint = socket.bind(host, PortSpec::Ephemeral).await?;
    Ok((socket, endpoint))
}

/// Connect a request socket to `endpoint`.
pub async fn connect_req(endpoint: &TcpEndpoint) -> Result<ReferenceReq, TransportError> {
    let mut socket = ReferenceReq::new();
    socket.connect(endpoint).await?;
    Ok(socket)
}

/// Connect a subscriber socket to `endpoint`. No subscription is made.
pub async fn connect_sub(endpoint: &TcpEndpoint) -> Result<ReferenceSub, TransportError> {
    let mut socket = ReferenceSub::new();
    socket.connect(endpoint).await?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_ephemeral_bind_reads_back_port() {
        let (rep, endpoint) = bind_rep("127.0.0.1").await.unwrap();
        assert_ne!(endpoint.port().value(), 0);
        assert_eq!(endpoint.host(), "127.0.0.1");
        rep.close().await;
    }

    #[tokio::test]
    async fn test_multipart_loopback() {
        let (mut rep, endpoint) = bind_rep("127.0.0.1").await.unwrap();
        let mut req = connect_req(&endpoint).await.unwrap();

        let request = Multipart::from_parts(["a", "b", "c"]).unwrap();
        req.send(request.clone()).await.unwrap();
        let received = tokio::time::timeout(Duration::from_secs(5), rep.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, request);

        rep.send(received).await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(5), req.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.len(), 3);
    }
}
