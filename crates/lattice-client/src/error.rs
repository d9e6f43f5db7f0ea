// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Client-side error kinds.
//!
//! Label and edge-construction errors are returned synchronously at the
//! offending call. Submission failures on the batch path are *not* thrown
//! back through `enqueue`; they aggregate into
//! [`FlushError`](crate::batch::FlushError).

use crate::transport::TransportError;
use crate::unmarshal::UnmarshalError;

/// Errors surfaced by the client session and its builders.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A symbolic label was empty or contained reserved characters.
    /// The identity map is left untouched.
    #[error("invalid label {label:?}: {reason}")]
    InvalidLabel {
        /// The offending label.
        label: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A typed value setter was called on an edge that already carries a
    /// value. Setters never overwrite; build a fresh edge instead.
    #[error("edge <{predicate}> already carries a {have} value")]
    EdgeAlreadyTyped {
        /// Predicate of the edge.
        predicate: String,
        /// Type tag of the value already present.
        have: &'static str,
    },

    /// An edge without a value was handed to a request or the batch
    /// pipeline. Call a typed setter first.
    #[error("edge <{predicate}> has no value")]
    EdgeUntyped {
        /// Predicate of the edge.
        predicate: String,
    },

    /// Batch options failed validation (size and pending must be ≥ 1).
    #[error("invalid batch options: {0}")]
    Config(&'static str),

    /// The server acknowledged an external-id submission without assigning
    /// a uid for it.
    #[error("server did not assign a uid for external id {0:?}")]
    ExternalIdUnresolved(String),

    /// A one-shot submission exceeded its caller-supplied deadline.
    #[error("submission deadline exceeded")]
    DeadlineExceeded,

    /// The transport collaborator failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Result-tree decoding failed.
    #[error(transparent)]
    Unmarshal(#[from] UnmarshalError),
}
