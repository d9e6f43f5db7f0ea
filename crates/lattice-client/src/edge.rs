// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Node handles and the typed edge builder.
//!
//! A [`Node`] is an opaque, immutable handle over a wire [`Subject`];
//! relabeling is not supported. An [`Edge`] is built from a source node and
//! a predicate, then given exactly one value: a typed scalar or a target
//! node. The value variants are mutually exclusive — a second typed setter
//! fails with [`ClientError::EdgeAlreadyTyped`] rather than overwriting.

use crate::error::ClientError;
use lattice_proto::{NQuad, Object, ScalarValue, Subject, Uid};
use std::collections::BTreeMap;

/// Opaque handle denoting a graph vertex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    subject: Subject,
}

impl Node {
    pub(crate) fn from_subject(subject: Subject) -> Self {
        Self { subject }
    }

    /// The wire subject this handle denotes.
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Server-assigned uid, when this handle carries one.
    pub fn uid(&self) -> Option<Uid> {
        match self.subject {
            Subject::Uid(uid) => Some(uid),
            _ => None,
        }
    }

    /// Start an edge from this node with the given predicate.
    pub fn edge(&self, predicate: impl Into<String>) -> Edge {
        Edge {
            subject: self.subject.clone(),
            predicate: predicate.into(),
            object: None,
            facets: BTreeMap::new(),
        }
    }

    /// Sugar for an edge whose target is another node.
    pub fn connect_to(&self, predicate: impl Into<String>, target: &Node) -> Edge {
        Edge {
            subject: self.subject.clone(),
            predicate: predicate.into(),
            object: Some(Object::Node(target.subject.clone())),
            facets: BTreeMap::new(),
        }
    }
}

/// A (source, predicate, value-or-target) triple under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    subject: Subject,
    predicate: String,
    object: Option<Object>,
    facets: BTreeMap<String, String>,
}

impl Edge {
    /// Set a string value.
    pub fn set_string(&mut self, v: impl Into<String>) -> Result<(), ClientError> {
        self.set_value(ScalarValue::Str(v.into()))
    }

    /// Set an integer value.
    pub fn set_int(&mut self, v: i64) -> Result<(), ClientError> {
        self.set_value(ScalarValue::Int(v))
    }

    /// Set a floating-point value.
    pub fn set_float(&mut self, v: f64) -> Result<(), ClientError> {
        self.set_value(ScalarValue::Float(v))
    }

    /// Set a boolean value.
    pub fn set_bool(&mut self, v: bool) -> Result<(), ClientError> {
        self.set_value(ScalarValue::Bool(v))
    }

    /// Set a byte-sequence value.
    pub fn set_bytes(&mut self, v: impl Into<Vec<u8>>) -> Result<(), ClientError> {
        self.set_value(ScalarValue::Bytes(v.into()))
    }

    /// Set a timestamp value (milliseconds since the Unix epoch).
    pub fn set_timestamp(&mut self, millis: i64) -> Result<(), ClientError> {
        self.set_value(ScalarValue::Timestamp(millis))
    }

    /// Point this edge at another node instead of a scalar.
    pub fn set_target(&mut self, target: &Node) -> Result<(), ClientError> {
        self.set_object(Object::Node(target.subject().clone()))
    }

    /// Attach a facet. Values are literal text on the wire and are not
    /// type-checked locally; a duplicate name overwrites the earlier value.
    pub fn add_facet(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.facets.insert(name.into(), value.into());
        self
    }

    /// Predicate this edge asserts.
    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    /// True once a typed setter or target has been applied.
    pub fn is_typed(&self) -> bool {
        self.object.is_some()
    }

    fn set_value(&mut self, v: ScalarValue) -> Result<(), ClientError> {
        self.set_object(Object::Value(v))
    }

    fn set_object(&mut self, object: Object) -> Result<(), ClientError> {
        if let Some(existing) = &self.object {
            return Err(ClientError::EdgeAlreadyTyped {
                predicate: self.predicate.clone(),
                have: match existing {
                    Object::Value(v) => v.type_name(),
                    Object::Node(_) => "node",
                },
            });
        }
        self.object = Some(object);
        Ok(())
    }

    /// Finish the edge into its wire form. Fails when no value was set.
    pub(crate) fn into_nquad(self) -> Result<NQuad, ClientError> {
        let object = self.object.ok_or(ClientError::EdgeUntyped {
            predicate: self.predicate.clone(),
        })?;
        Ok(NQuad {
            subject: self.subject,
            predicate: self.predicate,
            object,
            facets: self.facets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(label: &str) -> Node {
        Node::from_subject(Subject::Blank(label.into()))
    }

    #[test]
    fn second_typed_setter_fails() {
        let mut e = blank("person1").edge("name");
        e.set_string("Steven Spielberg").unwrap();
        let err = e.set_float(13333.6161).unwrap_err();
        assert!(matches!(
            err,
            ClientError::EdgeAlreadyTyped { ref have, .. } if *have == "Str"
        ));
        // The original value survives the failed call.
        let nq = e.into_nquad().unwrap();
        assert_eq!(
            nq.object,
            Object::Value(ScalarValue::Str("Steven Spielberg".into()))
        );
    }

    #[test]
    fn scalar_and_node_targets_are_exclusive() {
        let p2 = blank("person2");
        let mut e = blank("person1").edge("friend");
        e.set_target(&p2).unwrap();
        assert!(matches!(
            e.set_string("not allowed"),
            Err(ClientError::EdgeAlreadyTyped { have: "node", .. })
        ));
    }

    #[test]
    fn connect_to_builds_a_node_edge_with_facets() {
        let p1 = blank("person1");
        let p2 = blank("person2");
        let mut e = p1.connect_to("friend", &p2);
        e.add_facet("close", "true");
        e.add_facet("close", "false"); // duplicate name overwrites
        let nq = e.into_nquad().unwrap();
        assert_eq!(nq.object, Object::Node(Subject::Blank("person2".into())));
        assert_eq!(nq.facets.get("close").map(String::as_str), Some("false"));
    }

    #[test]
    fn untyped_edge_cannot_become_an_nquad() {
        let e = blank("person1").edge("name");
        assert!(matches!(
            e.into_nquad(),
            Err(ClientError::EdgeUntyped { .. })
        ));
    }
}
