// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Client library for a remote graph store.
//!
//! A [`Client`] owns one session against the server: a session-scoped
//! identity map resolving symbolic node labels, a batched and backpressured
//! mutation pipeline, and a one-shot request path for composed
//! mutations/queries. Results come back as a dynamic tagged tree that
//! [`unmarshal`](unmarshal::unmarshal) decodes into caller structures.
//!
//! ```no_run
//! use lattice_client::{BatchOptions, Client, SocketTransport};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(SocketTransport::connect("/run/lattice.sock").await?);
//! let client = Client::new(transport, BatchOptions::default())?;
//!
//! let person = client.node_blank("person1")?;
//! let mut name = person.edge("name");
//! name.set_string("Steven Spielberg")?;
//! client.batch_set(name).await?;
//! client.batch_flush().await?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod edge;
pub mod error;
pub mod ident;
pub mod req;
pub mod transport;
pub mod unmarshal;

pub use batch::{BatchOptions, FlushError, FlushSummary, SubmissionFailure};
pub use edge::{Edge, Node};
pub use error::ClientError;
pub use ident::{IdentityMap, LabelKind};
pub use req::Req;
pub use transport::{SocketTransport, Transport, TransportError};
pub use unmarshal::{unmarshal, unmarshal_all, BindKind, FieldBinding, FromResult, UnmarshalError};

pub use lattice_proto::{Mutation, NQuad, Object, Request, Response, ResultNode, ScalarValue, Subject, Uid};

use crate::batch::Pipeline;
use crate::ident::check_label;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Predicate under which external ids are stored server-side.
const XID_PREDICATE: &str = "xid";

/// One session against the graph store.
///
/// The identity map and the batch pipeline live exactly as long as the
/// client; label bindings are never shared across sessions.
pub struct Client {
    idents: Arc<IdentityMap>,
    transport: Arc<dyn Transport>,
    pipeline: Pipeline,
    // External-id lookup/create is serialized so two concurrent callers of
    // the same unseen label cannot both create a vertex.
    xid_lock: Mutex<()>,
}

impl Client {
    /// Create a session over the given transport. Fails when the batch
    /// options are out of range.
    pub fn new(transport: Arc<dyn Transport>, opts: BatchOptions) -> Result<Self, ClientError> {
        let idents = Arc::new(IdentityMap::new());
        let pipeline = Pipeline::new(&opts, Arc::clone(&transport), Arc::clone(&idents))?;
        Ok(Self {
            idents,
            transport,
            pipeline,
            xid_lock: Mutex::new(()),
        })
    }

    /// Handle for a vertex whose server id is already known.
    pub fn node_uid(&self, uid: Uid) -> Node {
        Node::from_subject(Subject::Uid(uid))
    }

    /// Resolve a blank-node label. Idempotent within the session: the label
    /// stays blank until a successful submission binds it to its assigned
    /// uid, after which every resolution observes that uid.
    pub fn node_blank(&self, label: &str) -> Result<Node, ClientError> {
        self.idents.resolve_blank(label)
    }

    /// Resolve a query-variable label. Never rewritten client-side.
    pub fn node_var(&self, name: &str) -> Result<Node, ClientError> {
        self.idents.resolve_var(name)
    }

    /// Resolve an external id to its vertex, creating the vertex on first
    /// use. At most one lookup/create round trip per label per session;
    /// later calls are served from the identity map.
    pub async fn node_xid(&self, label: &str) -> Result<Node, ClientError> {
        check_label(label).map_err(|reason| ClientError::InvalidLabel {
            label: label.to_string(),
            reason,
        })?;
        if let Some(node) = self.idents.lookup_external(label) {
            return Ok(node);
        }

        let _guard = self.xid_lock.lock().await;
        // A racing caller may have bound it while we waited.
        if let Some(node) = self.idents.lookup_external(label) {
            return Ok(node);
        }

        let req = Request {
            mutation: Mutation {
                set: vec![NQuad {
                    subject: Subject::Blank(label.to_string()),
                    predicate: XID_PREDICATE.to_string(),
                    object: Object::Value(ScalarValue::Str(label.to_string())),
                    facets: BTreeMap::new(),
                }],
                delete: vec![],
            },
            ..Request::default()
        };
        let resp = self.transport.submit(req).await?;
        let uid = resp
            .assigned
            .get(label)
            .copied()
            .ok_or_else(|| ClientError::ExternalIdUnresolved(label.to_string()))?;
        debug!(label, uid, "external id bound");
        Ok(self.idents.bind_external(label, uid))
    }

    /// Submit one composed request and wait for its reply. On success, any
    /// server-assigned uids are bound into the identity map.
    pub async fn run(&self, req: Req) -> Result<Response, ClientError> {
        let resp = self.transport.submit(req.into_request()).await?;
        for (label, uid) in &resp.assigned {
            self.idents.bind(label, *uid);
        }
        Ok(resp)
    }

    /// [`run`](Self::run) bounded by a deadline. On expiry the reply is
    /// abandoned and no labels are bound.
    pub async fn run_with_deadline(
        &self,
        req: Req,
        deadline: Duration,
    ) -> Result<Response, ClientError> {
        match tokio::time::timeout(deadline, self.run(req)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::DeadlineExceeded),
        }
    }

    /// Queue an edge for batched assertion. Blocks only when a full batch
    /// seals while every pipeline slot is in flight.
    pub async fn batch_set(&self, edge: Edge) -> Result<(), ClientError> {
        let nq = edge.into_nquad()?;
        self.pipeline.enqueue_set(nq).await;
        Ok(())
    }

    /// Queue an edge for batched retraction.
    pub async fn batch_delete(&self, edge: Edge) -> Result<(), ClientError> {
        let nq = edge.into_nquad()?;
        self.pipeline.enqueue_delete(nq).await;
        Ok(())
    }

    /// Seal the open batch and wait for every outstanding submission.
    /// Failed batches come back in the error with their edges intact;
    /// labels they referenced stay pending for a caller-driven retry.
    pub async fn batch_flush(&self) -> Result<FlushSummary, FlushError> {
        self.pipeline.flush().await
    }

    /// The session's identity map.
    pub fn identities(&self) -> &IdentityMap {
        &self.idents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lattice_proto::ErrorPayload;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    /// Records submissions and assigns uids to every blank subject seen.
    struct FakeServer {
        requests: std::sync::Mutex<Vec<Request>>,
        calls: AtomicUsize,
        next_uid: AtomicU64,
        delay: Option<Duration>,
        reject: bool,
    }

    impl FakeServer {
        fn raw() -> Self {
            Self {
                requests: std::sync::Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                next_uid: AtomicU64::new(0x100),
                delay: None,
                reject: false,
            }
        }

        fn new() -> Arc<Self> {
            Arc::new(Self::raw())
        }

        fn slow(delay: Duration) -> Arc<Self> {
            let mut s = Self::raw();
            s.delay = Some(delay);
            Arc::new(s)
        }

        fn rejecting() -> Arc<Self> {
            let mut s = Self::raw();
            s.reject = true;
            Arc::new(s)
        }
    }

    #[async_trait]
    impl Transport for FakeServer {
        async fn submit(&self, req: Request) -> Result<Response, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.reject {
                return Err(TransportError::Rejected(ErrorPayload {
                    code: 1,
                    name: "E_REJECTED".into(),
                    message: "rejected".into(),
                }));
            }
            let mut assigned = BTreeMap::new();
            for nq in req.mutation.set.iter().chain(req.mutation.delete.iter()) {
                if let Subject::Blank(label) = &nq.subject {
                    assigned
                        .entry(label.clone())
                        .or_insert_with(|| self.next_uid.fetch_add(1, Ordering::SeqCst));
                }
            }
            self.requests.lock().unwrap().push(req);
            Ok(Response {
                assigned,
                tree: None,
            })
        }
    }

    fn client(server: &Arc<FakeServer>) -> Client {
        let transport: Arc<dyn Transport> = Arc::clone(server) as Arc<dyn Transport>;
        Client::new(transport, BatchOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn blank_label_promotes_after_batch_flush() {
        let server = FakeServer::new();
        let client = client(&server);

        let person = client.node_blank("person1").unwrap();
        assert!(person.uid().is_none());
        // Same label, same handle, both before submission.
        assert_eq!(client.node_blank("person1").unwrap(), person);

        let mut name = person.edge("name");
        name.set_string("Steven Spielberg").unwrap();
        client.batch_set(name).await.unwrap();
        let summary = client.batch_flush().await.unwrap();
        assert_eq!(summary.edges_applied, 1);

        let promoted = client.node_blank("person1").unwrap();
        assert!(promoted.uid().is_some());
    }

    #[tokio::test]
    async fn external_id_costs_one_round_trip_per_session() {
        let server = FakeServer::new();
        let client = client(&server);

        let a = client.node_xid("profile.alice").await.unwrap();
        let b = client.node_xid("profile.alice").await.unwrap();
        assert_eq!(a, b);
        assert!(a.uid().is_some());
        assert_eq!(server.calls.load(Ordering::SeqCst), 1);

        let stored = &server.requests.lock().unwrap()[0];
        assert_eq!(stored.mutation.set[0].predicate, "xid");
    }

    #[tokio::test]
    async fn run_submits_mutations_and_binds_assigned() {
        let server = FakeServer::new();
        let client = client(&server);

        let alice = client.node_blank("alice").unwrap();
        let mut req = Req::new();
        let mut e = alice.edge("name");
        e.set_string("Alice").unwrap();
        req.set(e).unwrap();
        req.set_query("{ me(func: uid(alice)) { name } }");

        let resp = client.run(req).await.unwrap();
        let uid = *resp.assigned.get("alice").unwrap();
        // The one-shot path binds assigned labels just like the batch path.
        assert_eq!(client.node_blank("alice").unwrap().uid(), Some(uid));
    }

    #[tokio::test]
    async fn deadline_expiry_abandons_the_reply() {
        let server = FakeServer::slow(Duration::from_secs(5));
        let client = client(&server);

        let alice = client.node_blank("alice").unwrap();
        let mut req = Req::new();
        let mut e = alice.edge("name");
        e.set_string("Alice").unwrap();
        req.set(e).unwrap();

        let err = client
            .run_with_deadline(req, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::DeadlineExceeded));
        // The label was not bound by the abandoned reply.
        assert!(client.node_blank("alice").unwrap().uid().is_none());
    }

    #[tokio::test]
    async fn rejected_submission_surfaces_and_binds_nothing() {
        let server = FakeServer::rejecting();
        let client = client(&server);

        let err = client.node_xid("profile.bob").await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert!(client.identities().is_empty());
    }

    #[tokio::test]
    async fn uid_and_var_handles_are_direct() {
        let server = FakeServer::new();
        let client = client(&server);

        assert_eq!(client.node_uid(42).uid(), Some(42));
        let v = client.node_var("a").unwrap();
        assert_eq!(v.subject(), &Subject::Var("a".into()));
        assert_eq!(server.calls.load(Ordering::SeqCst), 0);
    }
}
