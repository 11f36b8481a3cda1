//! Collaborator seams: mastership lookup and cluster messaging
//!
//! The proxy layer never elects masters, tracks membership, or moves
//! bytes itself. It consumes those capabilities through the traits
//! below, wired in at activation. Any election algorithm and any
//! reliable request/response fabric can sit behind them; an in-process
//! implementation for tests and single-process clusters lives in
//! [`loopback`](crate::loopback).

use crate::error::Result;
use crate::node::{NodeId, ResourceId};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Inbound handler installed per routing subject. Receives the raw
/// invocation payload and produces the raw response payload. Runs on
/// the fabric's delivery tasks and must not block them.
pub type SubjectHandler = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, Vec<u8>> + Send + Sync>;

/// Resolves the current master of a resource.
///
/// Consulted fresh on every dispatch; results are never cached by the
/// proxy layer because mastership may change between calls.
pub trait MastershipLookup: Send + Sync + 'static {
    /// Current master for `resource`, or `None` when indeterminate.
    fn master_for(&self, resource: &ResourceId) -> Option<NodeId>;
}

/// Request/response messaging between cluster nodes.
#[async_trait]
pub trait ClusterMessaging: Send + Sync + 'static {
    /// Send `payload` to `to` on `subject` and await the reply payload.
    /// Resolution of the returned future is the only completion signal;
    /// no timeout is imposed at this layer.
    async fn send(&self, to: &NodeId, subject: &str, payload: Vec<u8>) -> Result<Vec<u8>>;

    /// Install `handler` for inbound requests on `subject`, replacing
    /// any previous handler. Must be effective on return.
    fn subscribe(&self, subject: &str, handler: SubjectHandler);

    /// Remove the handler for `subject`; idempotent.
    fn unsubscribe(&self, subject: &str);

    /// Identity of the local node on this fabric.
    fn local_node(&self) -> NodeId;
}
