// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! One-shot request builder.
//!
//! A [`Req`] bundles set-edges, delete-edges, verbatim schema text, and a
//! verbatim query (with optional variable substitutions) into a single
//! submission unit. Mutations and a query compose transactionally on the
//! server; the builder performs no parsing, so syntax errors surface only
//! as submission errors from the collaborator.

use crate::edge::Edge;
use crate::error::ClientError;
use lattice_proto::Request;

/// Builder for one unit of work. Building never touches the network.
#[derive(Debug, Clone, Default)]
pub struct Req {
    request: Request,
}

impl Req {
    /// Create an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge to assert. The edge must carry a value.
    pub fn set(&mut self, edge: Edge) -> Result<(), ClientError> {
        self.request.mutation.set.push(edge.into_nquad()?);
        Ok(())
    }

    /// Add an edge to retract. The edge must carry a value.
    pub fn delete(&mut self, edge: Edge) -> Result<(), ClientError> {
        self.request.mutation.delete.push(edge.into_nquad()?);
        Ok(())
    }

    /// Append schema-mutation text, verbatim.
    pub fn add_schema(&mut self, schema: impl Into<String>) {
        let schema = schema.into();
        match &mut self.request.schema {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(&schema);
            }
            None => self.request.schema = Some(schema),
        }
    }

    /// Attach query text, verbatim. Replaces any earlier query.
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.request.query = Some(query.into());
        self.request.vars.clear();
    }

    /// Attach query text with a variable substitution map.
    pub fn set_query_with_vars(
        &mut self,
        query: impl Into<String>,
        vars: impl IntoIterator<Item = (String, String)>,
    ) {
        self.request.query = Some(query.into());
        self.request.vars = vars.into_iter().collect();
    }

    /// True when nothing has been added yet.
    pub fn is_empty(&self) -> bool {
        self.request.is_empty()
    }

    /// Borrow the assembled wire request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Consume the builder into its wire request.
    pub fn into_request(self) -> Request {
        self.request
    }
}
