//! Query, retrieve and store operations bound to one remote node
//!
//! These carry no state of their own beyond the node and query root; every
//! call is one exchange through [`DimseScu::get_responses`] or
//! [`DimseScu::get_response`].

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::config::RemoteNode;
use crate::scu::DimseScu;
use crate::types::{
    DimseRequest, DimseResponse, FindQuery, MoveQuery, QueryRoot, ResponsePayload, StoreObject,
    SubOperations,
};
use crate::Result;

/// C-FIND against one node
pub struct CFinder<'a> {
    scu: &'a DimseScu,
    node: RemoteNode,
    root: QueryRoot,
}

impl<'a> CFinder<'a> {
    pub fn new(scu: &'a DimseScu, node: RemoteNode) -> Self {
        Self {
            scu,
            node,
            root: QueryRoot::Study,
        }
    }

    /// Use another information model root (default: STUDY)
    pub fn with_root(mut self, root: QueryRoot) -> Self {
        self.root = root;
        self
    }

    pub fn node(&self) -> &RemoteNode {
        &self.node
    }

    /// All responses: one pending response per match, then the final status
    pub async fn find(&self, query: FindQuery, message_id: &mut u16) -> Result<Vec<DimseResponse>> {
        info!(
            "Sending C-FIND to {} (level: {}, root: {:?})",
            self.node, query.query_level, self.root
        );
        let request = DimseRequest::find(*message_id, query, self.root);
        self.scu.get_responses(request, &self.node, message_id).await
    }

    /// Identifiers of the matches, capped at the query's `max_results`
    pub async fn find_identifiers(
        &self,
        query: FindQuery,
        message_id: &mut u16,
    ) -> Result<Vec<BTreeMap<String, String>>> {
        let max_results = query.max_results as usize;
        let responses = self.find(query, message_id).await?;

        if let Some(last) = responses.last().filter(|r| !r.is_pending()) {
            if !last.status.is_success() {
                warn!("C-FIND to {} ended with {}", self.node, last.status);
            }
        }

        let mut identifiers: Vec<_> = responses
            .into_iter()
            .filter(|r| r.is_pending())
            .filter_map(|r| match r.payload {
                ResponsePayload::Identifier(identifier) => Some(identifier),
                _ => None,
            })
            .collect();
        if max_results > 0 {
            identifiers.truncate(max_results);
        }
        Ok(identifiers)
    }
}

/// C-MOVE against one node
pub struct CMover<'a> {
    scu: &'a DimseScu,
    node: RemoteNode,
    root: QueryRoot,
}

impl<'a> CMover<'a> {
    pub fn new(scu: &'a DimseScu, node: RemoteNode) -> Self {
        Self {
            scu,
            node,
            root: QueryRoot::Study,
        }
    }

    /// Use another information model root (default: STUDY)
    pub fn with_root(mut self, root: QueryRoot) -> Self {
        self.root = root;
        self
    }

    /// Ask the node to send the matching objects to `query.destination_aet`
    ///
    /// Returns the progress responses followed by the final one.
    pub async fn send_move(&self, query: MoveQuery, message_id: &mut u16) -> Result<Vec<DimseResponse>> {
        info!(
            "Sending C-MOVE to {} (level: {}, dest: {})",
            self.node, query.query_level, query.destination_aet
        );
        let request = DimseRequest::move_request(*message_id, query, self.root);
        self.scu.get_responses(request, &self.node, message_id).await
    }

    /// Final sub-operation counters of a move, if the node reported them
    pub fn outcome(responses: &[DimseResponse]) -> Option<SubOperations> {
        responses
            .iter()
            .rev()
            .find_map(|r| match r.payload {
                ResponsePayload::SubOperations(counts) => Some(counts),
                _ => None,
            })
    }
}

/// C-STORE against one node
pub struct CStorer<'a> {
    scu: &'a DimseScu,
    node: RemoteNode,
}

impl<'a> CStorer<'a> {
    pub fn new(scu: &'a DimseScu, node: RemoteNode) -> Self {
        Self { scu, node }
    }

    /// Store one object; returns the node's response, if it answered
    pub async fn store(&self, object: StoreObject, message_id: &mut u16) -> Result<Option<DimseResponse>> {
        info!(
            "Sending C-STORE of {} to {}",
            object.sop_instance_uid, self.node
        );
        let request = DimseRequest::store(*message_id, object);
        self.scu.get_response(request, &self.node, message_id).await
    }
}
