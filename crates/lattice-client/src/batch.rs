// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Batch mutation pipeline: bounded, backpressured, concurrent submission.
//!
//! Edges accumulate into an open buffer; at `size` edges the buffer is
//! sealed and handed to a submission task. A semaphore caps in-flight
//! submissions at `pending` — a sealed batch takes a slot *before* its
//! network call is issued, so producers block instead of queuing unbounded
//! work. `flush` seals the remainder and drains every outstanding task.
//!
//! Failed batches are never retried here; each failure carries its edges so
//! the caller can inspect or resubmit (blind retry of a partially-applied
//! batch is not safe without server idempotency). Blank labels referenced
//! by a failed batch stay pending in the identity map, so a retry reuses
//! the same labels.
//!
//! Ordering: edges within one batch keep enqueue order; batches overlap and
//! may complete in any order relative to each other.

use crate::error::ClientError;
use crate::ident::IdentityMap;
use crate::transport::{Transport, TransportError};
use lattice_proto::{Mutation, NQuad, Request};
use std::mem;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Pipeline configuration. `size` bounds edge *count* per submission, not
/// wire size; `pending` bounds concurrent in-flight submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Maximum edges per network submission (≥ 1).
    pub size: usize,
    /// Maximum in-flight submissions (≥ 1).
    pub pending: usize,
    /// Log aggregate counters after each completed batch.
    pub print_counters: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            size: 100,
            pending: 100,
            print_counters: false,
        }
    }
}

/// One batch the collaborator reported failed, with its edges intact for
/// caller-side inspection or resubmission.
#[derive(Debug)]
pub struct SubmissionFailure {
    /// The sealed batch exactly as submitted.
    pub edges: Mutation,
    /// What the collaborator reported.
    pub error: TransportError,
}

/// Aggregate counters returned by a fully successful flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Completed submissions since the pipeline was created.
    pub batches: u64,
    /// Edges included in successful submissions.
    pub edges_applied: u64,
}

/// Aggregate error from a flush that saw at least one failed batch.
///
/// Counters are cumulative for the session; `failures` holds only the
/// batches not yet reported by an earlier flush.
#[derive(Debug, thiserror::Error)]
#[error("{} of {batches} batches failed ({edges_applied} edges applied, {edges_failed} failed)", .failures.len())]
pub struct FlushError {
    /// Completed submissions since the pipeline was created.
    pub batches: u64,
    /// Edges included in successful submissions.
    pub edges_applied: u64,
    /// Edges included in failed submissions.
    pub edges_failed: u64,
    /// The failed batches, edges intact.
    pub failures: Vec<SubmissionFailure>,
}

#[derive(Debug, Default)]
struct Outcome {
    batches: u64,
    edges_applied: u64,
    edges_failed: u64,
    failures: Vec<SubmissionFailure>,
}

pub(crate) struct Pipeline {
    size: usize,
    print_counters: bool,
    transport: Arc<dyn Transport>,
    idents: Arc<IdentityMap>,
    buf: Mutex<Mutation>,
    slots: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
    outcome: Arc<Mutex<Outcome>>,
}

impl Pipeline {
    pub(crate) fn new(
        opts: &BatchOptions,
        transport: Arc<dyn Transport>,
        idents: Arc<IdentityMap>,
    ) -> Result<Self, ClientError> {
        if opts.size == 0 {
            return Err(ClientError::Config("size must be at least 1"));
        }
        if opts.pending == 0 {
            return Err(ClientError::Config("pending must be at least 1"));
        }
        Ok(Self {
            size: opts.size,
            print_counters: opts.print_counters,
            transport,
            idents,
            buf: Mutex::new(Mutation::default()),
            slots: Arc::new(Semaphore::new(opts.pending)),
            tasks: Mutex::new(JoinSet::new()),
            outcome: Arc::new(Mutex::new(Outcome::default())),
        })
    }

    pub(crate) async fn enqueue_set(&self, nq: NQuad) {
        self.enqueue(nq, false).await;
    }

    pub(crate) async fn enqueue_delete(&self, nq: NQuad) {
        self.enqueue(nq, true).await;
    }

    /// Push one edge into the open buffer, sealing it at `size` edges.
    /// Blocks only when sealing while every concurrency slot is taken.
    async fn enqueue(&self, nq: NQuad, delete: bool) {
        let sealed = {
            let mut buf = self.buf.lock().await;
            if delete {
                buf.delete.push(nq);
            } else {
                buf.set.push(nq);
            }
            if buf.set.len() + buf.delete.len() >= self.size {
                Some(mem::take(&mut *buf))
            } else {
                None
            }
        };
        if let Some(batch) = sealed {
            self.submit(batch).await;
        }
    }

    /// Seal the open buffer (if non-empty) as a final, possibly under-sized
    /// batch, then wait for every outstanding submission to complete.
    pub(crate) async fn flush(&self) -> Result<FlushSummary, FlushError> {
        let remainder = {
            let mut buf = self.buf.lock().await;
            if buf.is_empty() {
                None
            } else {
                Some(mem::take(&mut *buf))
            }
        };
        if let Some(batch) = remainder {
            self.submit(batch).await;
        }

        let mut tasks = self.tasks.lock().await;
        while tasks.join_next().await.is_some() {}
        drop(tasks);

        let mut outcome = self.outcome.lock().await;
        let failures = mem::take(&mut outcome.failures);
        if failures.is_empty() {
            Ok(FlushSummary {
                batches: outcome.batches,
                edges_applied: outcome.edges_applied,
            })
        } else {
            Err(FlushError {
                batches: outcome.batches,
                edges_applied: outcome.edges_applied,
                edges_failed: outcome.edges_failed,
                failures,
            })
        }
    }

    /// Hand a sealed batch to a submission task, blocking for a slot first.
    async fn submit(&self, batch: Mutation) {
        let permit = match Arc::clone(&self.slots).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return, // the semaphore is never closed
        };
        let transport = Arc::clone(&self.transport);
        let idents = Arc::clone(&self.idents);
        let outcome = Arc::clone(&self.outcome);
        let print_counters = self.print_counters;

        self.tasks.lock().await.spawn(async move {
            let _slot = permit;
            let edge_count = (batch.set.len() + batch.delete.len()) as u64;
            let req = Request {
                mutation: batch.clone(),
                ..Request::default()
            };
            match transport.submit(req).await {
                Ok(resp) => {
                    // Promotion happens only after a confirmed success, so a
                    // reader never sees an id from a failed submission.
                    for (label, uid) in &resp.assigned {
                        idents.bind(label, *uid);
                    }
                    let mut outcome = outcome.lock().await;
                    outcome.batches += 1;
                    outcome.edges_applied += edge_count;
                    if print_counters {
                        info!(
                            batches = outcome.batches,
                            edges_applied = outcome.edges_applied,
                            edges_failed = outcome.edges_failed,
                            "batch applied"
                        );
                    }
                }
                Err(error) => {
                    warn!(%error, edges = edge_count, "batch submission failed");
                    let mut outcome = outcome.lock().await;
                    outcome.batches += 1;
                    outcome.edges_failed += edge_count;
                    outcome.failures.push(SubmissionFailure {
                        edges: batch,
                        error,
                    });
                }
            }
        });
    }
}
