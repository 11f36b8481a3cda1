//! Mastership-resolved proxies and the per-call dispatch protocol
//!
//! A [`ProxyFactory`] classifies its contract's methods once and hands
//! out [`MasterProxy`] instances bound to a resource. Every call on a
//! proxy runs the dispatch protocol:
//!
//! 1. Resolve the resource's current master (fresh lookup, no caching,
//!    no retry; indeterminate fails immediately).
//! 2. Master is local: invoke the registered implementation directly,
//!    on the caller, no marshaling, zero messages.
//! 3. Master is remote: marshal an invocation envelope, send it over
//!    the fabric, await the response envelope.
//!
//! Mastership may change between resolution and delivery; the receiving
//! node executes against whatever it currently has registered. No epoch
//! fencing exists at this layer.

use crate::codec::WireFormat;
use crate::completion::CompletionHandle;
use crate::contract::{CallShape, MethodTable, ServiceContract};
use crate::error::{ProxyError, Result};
use crate::fabric::{ClusterMessaging, MastershipLookup};
use crate::node::{NodeId, ResourceId};
use crate::protocol::{
    decode_response, encode_invocation, subject_for, InvocationEnvelope,
};
use crate::registry::ServiceRegistry;
use crate::vtable::AnyBox;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Dependencies shared by every proxy a manager hands out.
pub(crate) struct DispatchContext {
    pub(crate) local: NodeId,
    pub(crate) mastership: Arc<dyn MastershipLookup>,
    pub(crate) messaging: Arc<dyn ClusterMessaging>,
    pub(crate) registry: Arc<ServiceRegistry>,
}

/// Builds resource-bound proxies for one interface.
///
/// Holds the classified method table; classification happens exactly
/// once here and is reused by every proxy and every call.
pub struct ProxyFactory<C: ServiceContract> {
    ctx: Arc<DispatchContext>,
    table: Arc<MethodTable>,
    codec: WireFormat,
    subject: Arc<str>,
    _contract: PhantomData<fn() -> C>,
}

impl<C: ServiceContract> std::fmt::Debug for ProxyFactory<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyFactory")
            .field("interface", &C::NAME)
            .finish_non_exhaustive()
    }
}

impl<C: ServiceContract> ProxyFactory<C> {
    pub(crate) fn new(ctx: Arc<DispatchContext>, codec: WireFormat) -> Result<Self> {
        let table = Arc::new(MethodTable::classify::<C>()?);
        Ok(Self {
            ctx,
            table,
            codec,
            subject: subject_for(C::NAME).into(),
            _contract: PhantomData,
        })
    }

    /// Create a proxy bound to `resource`. Cheap; proxies are stateless
    /// per-call views and cache no mastership.
    pub fn proxy_for(&self, resource: impl Into<ResourceId>) -> MasterProxy<C> {
        MasterProxy {
            resource: resource.into(),
            ctx: self.ctx.clone(),
            table: self.table.clone(),
            codec: self.codec,
            subject: self.subject.clone(),
            _contract: PhantomData,
        }
    }
}

/// A proxy for one (interface, resource) pair. Every invocation
/// re-resolves mastership and routes accordingly.
pub struct MasterProxy<C: ServiceContract> {
    resource: ResourceId,
    ctx: Arc<DispatchContext>,
    table: Arc<MethodTable>,
    codec: WireFormat,
    subject: Arc<str>,
    _contract: PhantomData<fn() -> C>,
}

impl<C: ServiceContract> Clone for MasterProxy<C> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
            ctx: self.ctx.clone(),
            table: self.table.clone(),
            codec: self.codec,
            subject: self.subject.clone(),
            _contract: PhantomData,
        }
    }
}

impl<C: ServiceContract> MasterProxy<C> {
    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    /// Invoke a sync-shaped method. The caller suspends until the value
    /// is available: immediately on the local fast path, on reply
    /// arrival for a remote master. No timeout is imposed.
    pub async fn call<A, R>(&self, method: &str, args: A) -> Result<R>
    where
        A: Serialize + Send + 'static,
        R: DeserializeOwned + Send + 'static,
    {
        self.table.expect_shape(method, CallShape::Sync)?;
        let master = self.master()?;

        if master == self.ctx.local {
            debug!(interface = C::NAME, %method, resource = %self.resource, "local dispatch");
            let service = self.local_service()?;
            let result = service.invoke_direct_sync(method, Box::new(args))?;
            return downcast_result::<R>(method, result);
        }

        debug!(
            interface = C::NAME,
            %method,
            resource = %self.resource,
            %master,
            "remote dispatch"
        );
        let reply = self.round_trip(&master, method, &args).await?;
        self.codec.decode(&reply)
    }

    /// Invoke an async-shaped method. Returns a completion handle
    /// immediately; the handle is fulfilled exactly once, with value or
    /// failure, by whichever task delivers the result. The caller is
    /// never blocked, on either path.
    pub fn call_async<A, R>(&self, method: &str, args: A) -> CompletionHandle<R>
    where
        A: Serialize + Send + Sync + 'static,
        R: DeserializeOwned + Send + 'static,
    {
        if let Err(e) = self.table.expect_shape(method, CallShape::Async) {
            return CompletionHandle::ready(Err(e));
        }
        let master = match self.master() {
            Ok(master) => master,
            Err(e) => return CompletionHandle::ready(Err(e)),
        };

        if master == self.ctx.local {
            debug!(interface = C::NAME, %method, resource = %self.resource, "local dispatch");
            return self.local_async(method, args);
        }

        debug!(
            interface = C::NAME,
            %method,
            resource = %self.resource,
            %master,
            "remote dispatch"
        );
        let (handle, completer) = CompletionHandle::pending();
        let proxy = self.clone();
        let method = method.to_string();
        tokio::spawn(async move {
            let result = match proxy.round_trip(&master, &method, &args).await {
                Ok(reply) => proxy.codec.decode(&reply),
                Err(e) => Err(e),
            };
            completer.fulfill(result);
        });
        handle
    }

    /// Fresh mastership lookup; never cached across calls.
    fn master(&self) -> Result<NodeId> {
        self.ctx
            .mastership
            .master_for(&self.resource)
            .ok_or_else(|| ProxyError::MastershipUnavailable {
                resource: self.resource.clone(),
            })
    }

    fn local_service(&self) -> Result<Arc<dyn crate::registry::ErasedService>> {
        self.ctx
            .registry
            .lookup(C::NAME)
            .ok_or_else(|| ProxyError::NoSuchImplementation {
                interface: C::NAME.to_string(),
            })
    }

    fn local_async<A, R>(&self, method: &str, args: A) -> CompletionHandle<R>
    where
        A: Send + 'static,
        R: Send + 'static,
    {
        let service = match self.local_service() {
            Ok(service) => service,
            Err(e) => return CompletionHandle::ready(Err(e)),
        };

        let (handle, completer) = CompletionHandle::pending();
        let future = service.invoke_direct_async(method, Box::new(args) as AnyBox);
        let method = method.to_string();
        tokio::spawn(async move {
            let result = match future.await {
                Ok(value) => downcast_result::<R>(&method, value),
                Err(e) => Err(e),
            };
            completer.fulfill(result);
        });
        handle
    }

    /// Remote leg: marshal, send, unwrap the response envelope.
    /// Remote-origin failures keep their kind; transport and framing
    /// failures are wrapped as `RemoteInvocationFailed`.
    async fn round_trip<A: Serialize>(
        &self,
        master: &NodeId,
        method: &str,
        args: &A,
    ) -> Result<Vec<u8>> {
        let envelope = InvocationEnvelope {
            interface: C::NAME.to_string(),
            method: method.to_string(),
            args: self.codec.encode(args)?,
        };
        let payload = encode_invocation(&envelope)?;

        let reply = self
            .ctx
            .messaging
            .send(master, &self.subject, payload)
            .await
            .map_err(|e| match e {
                e @ ProxyError::NoSuchImplementation { .. } => e,
                other => ProxyError::RemoteInvocationFailed(other.to_string()),
            })?;

        let response = decode_response(&reply)
            .map_err(|e| ProxyError::RemoteInvocationFailed(e.to_string()))?;
        response.into_result(C::NAME, method)
    }
}

fn downcast_result<R: 'static>(method: &str, value: AnyBox) -> Result<R> {
    value.downcast::<R>().map(|b| *b).map_err(|_| {
        ProxyError::RemoteInvocationFailed(format!(
            "result type mismatch for local call to {method}"
        ))
    })
}
