//! In-process fabric for single-process clusters and tests
//!
//! A [`LoopbackHub`] plays the role of the whole messaging layer for a
//! set of nodes living in one process: each node gets an endpoint via
//! [`LoopbackHub::node`], and `send` routes straight to the target
//! node's subscription table. The hub also carries a settable
//! resource-to-master table so multi-node scenarios need no external
//! election algorithm.

use crate::error::{ProxyError, Result};
use crate::fabric::{ClusterMessaging, MastershipLookup, SubjectHandler};
use crate::node::{NodeId, ResourceId};
use crate::protocol::interface_of;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Shared in-process messaging hub and mastership table.
#[derive(Default)]
pub struct LoopbackHub {
    /// Per-node subscription tables
    subscriptions: DashMap<NodeId, DashMap<String, SubjectHandler>>,
    /// Resource ownership, settable by tests and embedders
    masters: DashMap<ResourceId, NodeId>,
    /// Count of cross-node sends, for observing the local fast path
    messages_sent: AtomicU64,
}

impl LoopbackHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create the messaging endpoint for node `id`.
    pub fn node(self: &Arc<Self>, id: impl Into<NodeId>) -> Arc<LoopbackFabric> {
        Arc::new(LoopbackFabric {
            id: id.into(),
            hub: self.clone(),
        })
    }

    /// Assign mastership of `resource` to `node`.
    pub fn set_master(&self, resource: impl Into<ResourceId>, node: impl Into<NodeId>) {
        self.masters.insert(resource.into(), node.into());
    }

    /// Make mastership of `resource` indeterminate.
    pub fn clear_master(&self, resource: &ResourceId) {
        self.masters.remove(resource);
    }

    /// Number of messages that crossed between nodes.
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::SeqCst)
    }
}

impl MastershipLookup for LoopbackHub {
    fn master_for(&self, resource: &ResourceId) -> Option<NodeId> {
        self.masters.get(resource).map(|e| e.value().clone())
    }
}

/// One node's endpoint on a [`LoopbackHub`].
pub struct LoopbackFabric {
    id: NodeId,
    hub: Arc<LoopbackHub>,
}

#[async_trait]
impl ClusterMessaging for LoopbackFabric {
    async fn send(&self, to: &NodeId, subject: &str, payload: Vec<u8>) -> Result<Vec<u8>> {
        // Subjects are per-interface, so a missing subscription means the
        // target node has nothing registered for that interface.
        let handler = {
            let node_subs =
                self.hub
                    .subscriptions
                    .get(to)
                    .ok_or_else(|| ProxyError::NoSuchImplementation {
                        interface: interface_of(subject).to_string(),
                    })?;
            let handler =
                node_subs
                    .get(subject)
                    .ok_or_else(|| ProxyError::NoSuchImplementation {
                        interface: interface_of(subject).to_string(),
                    })?;
            handler.clone()
        };

        self.hub.messages_sent.fetch_add(1, Ordering::SeqCst);
        debug!(from = %self.id, %to, %subject, bytes = payload.len(), "loopback send");

        Ok(handler(payload).await)
    }

    fn subscribe(&self, subject: &str, handler: SubjectHandler) {
        self.hub
            .subscriptions
            .entry(self.id.clone())
            .or_default()
            .insert(subject.to_string(), handler);
    }

    fn unsubscribe(&self, subject: &str) {
        if let Some(node_subs) = self.hub.subscriptions.get(&self.id) {
            node_subs.remove(subject);
        }
    }

    fn local_node(&self) -> NodeId {
        self.id.clone()
    }
}
