// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Transport seam to the RPC collaborator.
//!
//! The client treats the collaborator as one synchronous call per
//! submission: `submit(Request) → Response | Error`. Connection management,
//! authentication, and wire encoding live behind this trait;
//! [`SocketTransport`] is the framed Unix-socket implementation.

use async_trait::async_trait;
use lattice_proto::wire::{decode_message, encode_message, WireError, CHECKSUM_SIZE, HEADER_SIZE};
use lattice_proto::{ErrorPayload, Message, Request, Response};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::debug;

/// Errors from the RPC collaborator.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Socket-level failure.
    #[error("connection: {0}")]
    Io(#[from] io::Error),

    /// Framing or codec failure.
    #[error("wire: {0}")]
    Wire(#[from] WireError),

    /// The server processed the submission and rejected it.
    #[error("server rejected submission: {0}")]
    Rejected(ErrorPayload),

    /// The stream closed before a full reply arrived.
    #[error("connection closed mid-reply")]
    Closed,

    /// The peer sent a message that cannot stand in reply position.
    #[error("unexpected {0} message in reply position")]
    Unexpected(&'static str),
}

/// One synchronous submission per call. Implementations must be shareable
/// across the pipeline's submission workers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit one request and wait for the server's reply.
    async fn submit(&self, req: Request) -> Result<Response, TransportError>;
}

/// Framed CBOR transport over a Unix socket.
///
/// Requests and replies are strictly alternating on one stream, so the
/// stream sits behind a mutex; concurrency across submissions comes from
/// the pipeline, not from pipelining a single socket.
pub struct SocketTransport {
    stream: Mutex<UnixStream>,
    ts: AtomicU64,
}

impl SocketTransport {
    /// Connect to the server at the given socket path.
    pub async fn connect(path: impl AsRef<Path>) -> io::Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-connected stream (e.g., one half of a test pair).
    pub fn from_stream(stream: UnixStream) -> Self {
        Self {
            stream: Mutex::new(stream),
            ts: AtomicU64::new(0),
        }
    }

    /// Read one full frame. Reads the header to completion first so short
    /// reads cannot desynchronize framing.
    async fn read_frame(stream: &mut UnixStream) -> Result<Vec<u8>, TransportError> {
        let mut header = [0u8; HEADER_SIZE];
        let mut read = 0usize;
        while read < header.len() {
            let n = stream.read(&mut header[read..]).await?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            read += n;
        }
        let len = u32::from_be_bytes([header[8], header[9], header[10], header[11]]) as usize;
        let mut rest = vec![0u8; len + CHECKSUM_SIZE];
        stream.read_exact(&mut rest).await?;
        let mut packet = Vec::with_capacity(HEADER_SIZE + rest.len());
        packet.extend_from_slice(&header);
        packet.extend_from_slice(&rest);
        Ok(packet)
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn submit(&self, req: Request) -> Result<Response, TransportError> {
        let ts = self.ts.fetch_add(1, Ordering::Relaxed);
        let pkt = encode_message(&Message::Submit(req), ts)?;

        let mut stream = self.stream.lock().await;
        stream.write_all(&pkt).await?;
        let reply = Self::read_frame(&mut stream).await?;
        drop(stream);

        let (msg, reply_ts, _) = decode_message(&reply)?;
        debug!(ts, reply_ts, "submission round trip");
        match msg {
            Message::Reply(resp) => Ok(resp),
            Message::Error(err) => Err(TransportError::Rejected(err)),
            Message::Submit(_) => Err(TransportError::Unexpected("submit")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_proto::{Mutation, NQuad, Object, ScalarValue, Subject};
    use std::collections::BTreeMap;

    fn one_edge_request() -> Request {
        Request {
            mutation: Mutation {
                set: vec![NQuad {
                    subject: Subject::Blank("person1".into()),
                    predicate: "name".into(),
                    object: Object::Value(ScalarValue::Str("Steven Spielberg".into())),
                    facets: BTreeMap::new(),
                }],
                delete: vec![],
            },
            ..Request::default()
        }
    }

    /// Serve exactly one submission on the peer half of a stream pair.
    async fn serve_one(mut server: UnixStream, reply: Message) {
        let mut header = [0u8; HEADER_SIZE];
        server.read_exact(&mut header).await.unwrap();
        let len = u32::from_be_bytes([header[8], header[9], header[10], header[11]]) as usize;
        let mut rest = vec![0u8; len + CHECKSUM_SIZE];
        server.read_exact(&mut rest).await.unwrap();
        let mut packet = Vec::new();
        packet.extend_from_slice(&header);
        packet.extend_from_slice(&rest);
        let (msg, ts, _) = decode_message(&packet).unwrap();
        assert!(matches!(msg, Message::Submit(_)));
        let out = encode_message(&reply, ts).unwrap();
        server.write_all(&out).await.unwrap();
    }

    #[tokio::test]
    async fn submit_round_trips_over_a_socket_pair() {
        let (client_half, server_half) = UnixStream::pair().unwrap();
        let reply = Message::Reply(Response {
            assigned: BTreeMap::from([("person1".into(), 0xbeef)]),
            tree: None,
        });
        let server = tokio::spawn(serve_one(server_half, reply));

        let transport = SocketTransport::from_stream(client_half);
        let resp = transport.submit(one_edge_request()).await.unwrap();
        assert_eq!(resp.assigned.get("person1"), Some(&0xbeef));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn server_error_payload_surfaces_as_rejection() {
        let (client_half, server_half) = UnixStream::pair().unwrap();
        let reply = Message::Error(ErrorPayload {
            code: 3,
            name: "E_BAD_QUERY".into(),
            message: "syntax error".into(),
        });
        let server = tokio::spawn(serve_one(server_half, reply));

        let transport = SocketTransport::from_stream(client_half);
        let err = transport.submit(one_edge_request()).await.unwrap_err();
        assert!(matches!(err, TransportError::Rejected(p) if p.name == "E_BAD_QUERY"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn closed_stream_reports_closed_not_garbage() {
        let (client_half, server_half) = UnixStream::pair().unwrap();
        drop(server_half);
        let transport = SocketTransport::from_stream(client_half);
        let err = transport.submit(one_edge_request()).await.unwrap_err();
        // Write may fail with a broken pipe or the read may see EOF;
        // either way no partial reply is decoded.
        assert!(matches!(
            err,
            TransportError::Closed | TransportError::Io(_)
        ));
    }
}
