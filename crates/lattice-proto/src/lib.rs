// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wire schema for the Lattice graph service: typed edge mutations, verbatim
//! schema/query text, and the dynamic result trees queries produce.
//! Pure data (serde) plus the framed CBOR codec in [`wire`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod wire;

/// Server-assigned node identifier.
pub type Uid = u64;

/// The subject (or node-valued object) of an edge.
///
/// Blank and var subjects are symbolic: the server resolves blanks to fresh
/// uids per submission and vars per query execution. Only `Uid` denotes a
/// persisted vertex.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Subject {
    /// Concrete server-assigned identifier.
    Uid(Uid),
    /// Client-local blank-node label, not yet persisted.
    Blank(String),
    /// Query-bound variable name, resolved server-side per execution.
    Var(String),
}

/// A typed scalar, used both as mutation values and result-tree attributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ScalarValue {
    /// UTF-8 text.
    Str(String),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Opaque byte sequence.
    Bytes(Vec<u8>),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
}

impl ScalarValue {
    /// Stable name of this scalar's type tag (for diagnostics).
    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarValue::Str(_) => "Str",
            ScalarValue::Int(_) => "Int",
            ScalarValue::Float(_) => "Float",
            ScalarValue::Bool(_) => "Bool",
            ScalarValue::Bytes(_) => "Bytes",
            ScalarValue::Timestamp(_) => "Timestamp",
        }
    }
}

impl std::fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarValue::Str(s) => write!(f, "{s:?}"),
            ScalarValue::Int(i) => write!(f, "{i}"),
            ScalarValue::Float(x) => write!(f, "{x}"),
            ScalarValue::Bool(b) => write!(f, "{b}"),
            ScalarValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            ScalarValue::Timestamp(t) => write!(f, "ts:{t}"),
        }
    }
}

/// The target of an edge: a scalar value or another node, never both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Object {
    /// Scalar-valued edge.
    Value(ScalarValue),
    /// Node-to-node edge.
    Node(Subject),
}

/// One edge mutation: subject, predicate, target, plus facet annotations.
///
/// Facet values are literal text on the wire; the map keeps at most one
/// value per facet name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NQuad {
    /// Edge source.
    pub subject: Subject,
    /// Predicate name.
    pub predicate: String,
    /// Scalar value or target node.
    pub object: Object,
    /// Facet name → literal value annotations.
    pub facets: BTreeMap<String, String>,
}

/// Set/delete edge groups submitted together.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Mutation {
    /// Edges to assert.
    pub set: Vec<NQuad>,
    /// Edges to retract.
    pub delete: Vec<NQuad>,
}

impl Mutation {
    /// True when there is nothing to assert or retract.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.delete.is_empty()
    }
}

/// One unit of work: mutations, optional schema text, optional query text.
///
/// Mutations and a query may coexist; the server applies the mutation and
/// then executes the query in the same submission. Schema and query strings
/// travel verbatim — the client never parses them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Request {
    /// Edge mutations.
    pub mutation: Mutation,
    /// Optional schema-mutation text.
    pub schema: Option<String>,
    /// Optional query text.
    pub query: Option<String>,
    /// Query-variable name → substituted value.
    pub vars: BTreeMap<String, String>,
}

impl Request {
    /// True when the request carries no mutations, schema, or query.
    pub fn is_empty(&self) -> bool {
        self.mutation.is_empty() && self.schema.is_none() && self.query.is_none()
    }
}

/// Server reply to a [`Request`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// Blank-node label → server-assigned uid, for every blank label the
    /// submitted mutation referenced.
    pub assigned: BTreeMap<String, Uid>,
    /// Nested result tree when a query was attached.
    pub tree: Option<ResultNode>,
}

/// One node of the dynamic, schema-less result tree.
///
/// Mirrors a query's nested selection shape: named scalar attributes plus
/// named, possibly-repeated child lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResultNode {
    /// Named scalar attributes.
    pub attrs: BTreeMap<String, ScalarValue>,
    /// Named child lists, in result order.
    pub children: BTreeMap<String, Vec<ResultNode>>,
}

impl ResultNode {
    /// Look up a scalar attribute.
    pub fn attr(&self, name: &str) -> Option<&ScalarValue> {
        self.attrs.get(name)
    }

    /// First child under `name`, if any.
    pub fn child(&self, name: &str) -> Option<&ResultNode> {
        self.children.get(name).and_then(|list| list.first())
    }

    /// All children under `name` (empty slice when absent).
    pub fn child_list(&self, name: &str) -> &[ResultNode] {
        self.children.get(name).map_or(&[], Vec::as_slice)
    }
}

/// Error payload returned for a failed submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    /// Numeric error code.
    pub code: u32,
    /// Stable identifier (e.g., "E_BAD_QUERY").
    pub name: String,
    /// Human-readable message.
    pub message: String,
}

impl std::fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.code, self.message)
    }
}

/// Wire message kinds carried inside envelope payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Message {
    /// Submit a request (op = "submit").
    Submit(Request),
    /// Successful reply (op = "reply").
    Reply(Response),
    /// Failed submission (op = "error").
    Error(ErrorPayload),
}

impl Message {
    /// Canonical op string for this message variant.
    pub fn op_name(&self) -> &'static str {
        match self {
            Message::Submit(_) => "submit",
            Message::Reply(_) => "reply",
            Message::Error(_) => "error",
        }
    }
}

/// Envelope carried as the payload of a framed packet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpEnvelope<P> {
    /// Operation name (see [`Message::op_name`]).
    pub op: String,
    /// Logical timestamp (request/reply correlation).
    pub ts: u64,
    /// Operation-specific body.
    pub payload: P,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_emptiness_tracks_both_directions() {
        let mut m = Mutation::default();
        assert!(m.is_empty());
        m.delete.push(NQuad {
            subject: Subject::Uid(7),
            predicate: "name".into(),
            object: Object::Value(ScalarValue::Str("gone".into())),
            facets: BTreeMap::new(),
        });
        assert!(!m.is_empty());
    }

    #[test]
    fn result_node_accessors_handle_missing_names() {
        let mut node = ResultNode::default();
        node.attrs
            .insert("name".into(), ScalarValue::Str("Alex".into()));
        node.children.insert(
            "friend".into(),
            vec![ResultNode::default(), ResultNode::default()],
        );

        assert_eq!(node.attr("name"), Some(&ScalarValue::Str("Alex".into())));
        assert!(node.attr("age").is_none());
        assert!(node.child("friend").is_some());
        assert!(node.child("foe").is_none());
        assert_eq!(node.child_list("friend").len(), 2);
        assert!(node.child_list("foe").is_empty());
    }

    #[test]
    fn scalar_type_names_are_stable() {
        assert_eq!(ScalarValue::Str("x".into()).type_name(), "Str");
        assert_eq!(ScalarValue::Timestamp(0).type_name(), "Timestamp");
    }
}
