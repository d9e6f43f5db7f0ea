// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Session-scoped identity map: symbolic labels → node handles.
//!
//! The map is created with the client session, grows monotonically (entries
//! are never evicted), and dies with the session. Two sessions never share
//! one. Blank-label entries are rebound to the server-assigned uid only
//! after a submission referencing them is confirmed successful, so no
//! reader ever observes an id from a submission that later failed.

use crate::edge::Node;
use crate::error::ClientError;
use lattice_proto::{Subject, Uid};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The three symbolic label kinds the map resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKind {
    /// Client-local blank-node label; the server assigns the real id.
    Blank,
    /// Caller-meaningful external id, deduplicated per session.
    External,
    /// Query-bound variable name; resolution is deferred to the server
    /// per query execution and never rewritten client-side.
    Var,
}

/// Characters that can never appear in a label (wire-reserved).
const RESERVED: &[char] = &['<', '>', '"', '{', '}', '|', '^', '`', '\\'];

/// Validate a symbolic label. Returns the reason on rejection.
pub(crate) fn check_label(label: &str) -> Result<(), &'static str> {
    if label.is_empty() {
        return Err("label is empty");
    }
    if label
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || RESERVED.contains(&c))
    {
        return Err("label contains reserved or whitespace characters");
    }
    Ok(())
}

/// Concurrency-safe `(label, kind) → Node` map for one client session.
#[derive(Debug, Default)]
pub struct IdentityMap {
    map: RwLock<HashMap<(LabelKind, String), Node>>,
}

impl IdentityMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<(LabelKind, String), Node>> {
        self.map.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<(LabelKind, String), Node>> {
        self.map.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve a blank-node label. Idempotent for the session: every call
    /// with the same label yields an interchangeable handle — blank until a
    /// successful submission binds it, the server-assigned uid afterwards.
    pub fn resolve_blank(&self, label: &str) -> Result<Node, ClientError> {
        self.resolve_with(LabelKind::Blank, label, || {
            Node::from_subject(Subject::Blank(label.to_string()))
        })
    }

    /// Resolve a query-variable label. The handle always defers to the
    /// server; [`bind`](Self::bind) never touches var entries.
    pub fn resolve_var(&self, name: &str) -> Result<Node, ClientError> {
        self.resolve_with(LabelKind::Var, name, || {
            Node::from_subject(Subject::Var(name.to_string()))
        })
    }

    /// Look up an external-id label previously bound in this session.
    pub fn lookup_external(&self, label: &str) -> Option<Node> {
        self.read()
            .get(&(LabelKind::External, label.to_string()))
            .cloned()
    }

    /// Bind an external-id label to its server-side vertex. Called once per
    /// session after the lookup/create round trip succeeds.
    pub fn bind_external(&self, label: &str, uid: Uid) -> Node {
        let node = Node::from_subject(Subject::Uid(uid));
        self.write()
            .entry((LabelKind::External, label.to_string()))
            .or_insert(node)
            .clone()
    }

    /// Rebind a blank label to the server-assigned uid returned by a
    /// *successful* submission. Later resolutions of the label observe the
    /// uid; a label from a failed batch stays blank and remains usable for
    /// a caller-initiated retry.
    pub fn bind(&self, label: &str, uid: Uid) {
        self.write().insert(
            (LabelKind::Blank, label.to_string()),
            Node::from_subject(Subject::Uid(uid)),
        );
    }

    /// Number of labels tracked (all kinds).
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// True when no label has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn resolve_with(
        &self,
        kind: LabelKind,
        label: &str,
        fresh: impl FnOnce() -> Node,
    ) -> Result<Node, ClientError> {
        check_label(label).map_err(|reason| ClientError::InvalidLabel {
            label: label.to_string(),
            reason,
        })?;
        if let Some(node) = self.read().get(&(kind, label.to_string())) {
            return Ok(node.clone());
        }
        // Double-checked under the write lock so concurrent resolvers of
        // the same label converge on one entry.
        let mut map = self.write();
        Ok(map
            .entry((kind, label.to_string()))
            .or_insert_with(fresh)
            .clone())
    }
}
