//! Per-node service registry and inbound call handling
//!
//! At most one implementation per interface per node. The registry is
//! mutated only by register/unregister; concurrent dispatch and handler
//! reads observe either the prior or the fully-applied entry, never an
//! intermediate one.

use crate::codec::WireFormat;
use crate::contract::{CallShape, ServiceContract};
use crate::error::{ProxyError, Result};
use crate::fabric::SubjectHandler;
use crate::protocol::{
    decode_invocation, encode_response, FailureKind, ResponseEnvelope,
};
use crate::vtable::{AnyBox, MethodHandler, ServiceVtable};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{ready, BoxFuture};
use futures::FutureExt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shape-erased view of a registered implementation, used by the remote
/// handler (wire path) and the dispatcher's local fast path (direct
/// path, no marshaling).
pub(crate) trait ErasedService: Send + Sync {
    /// Decode arguments with the registration codec, invoke, encode the
    /// result. Sync methods complete immediately; async methods when
    /// the implementation's future resolves.
    fn invoke_wire(&self, method: &str, args: Vec<u8>) -> BoxFuture<'static, Result<Vec<u8>>>;

    /// Local fast path for a sync-shaped method; runs on the caller.
    fn invoke_direct_sync(&self, method: &str, args: AnyBox) -> Result<AnyBox>;

    /// Local fast path for an async-shaped method.
    fn invoke_direct_async(&self, method: &str, args: AnyBox) -> BoxFuture<'static, Result<AnyBox>>;
}

/// A contract, its implementation, and the registration codec.
pub(crate) struct ServiceBinding<C: ServiceContract, S: Send + Sync + 'static> {
    service: Arc<S>,
    vtable: ServiceVtable<C, S>,
    codec: WireFormat,
}

impl<C: ServiceContract, S: Send + Sync + 'static> ServiceBinding<C, S> {
    pub(crate) fn new(service: Arc<S>, vtable: ServiceVtable<C, S>, codec: WireFormat) -> Self {
        Self {
            service,
            vtable,
            codec,
        }
    }

    fn unknown_method(method: &str) -> ProxyError {
        ProxyError::UnknownMethod {
            interface: C::NAME.to_string(),
            method: method.to_string(),
        }
    }
}

impl<C: ServiceContract, S: Send + Sync + 'static> ErasedService for ServiceBinding<C, S> {
    fn invoke_wire(&self, method: &str, args: Vec<u8>) -> BoxFuture<'static, Result<Vec<u8>>> {
        match self.vtable.handler(method) {
            None => ready(Err(Self::unknown_method(method))).boxed(),
            Some(MethodHandler::Sync { wire, .. }) => {
                ready(wire(&self.service, &args, self.codec)).boxed()
            }
            Some(MethodHandler::Async { wire, .. }) => {
                wire(self.service.clone(), args, self.codec)
            }
        }
    }

    fn invoke_direct_sync(&self, method: &str, args: AnyBox) -> Result<AnyBox> {
        match self.vtable.handler(method) {
            None => Err(Self::unknown_method(method)),
            Some(MethodHandler::Sync { direct, .. }) => direct(&self.service, args),
            Some(MethodHandler::Async { .. }) => Err(ProxyError::ShapeMismatch {
                method: method.to_string(),
                expected: CallShape::Async,
            }),
        }
    }

    fn invoke_direct_async(
        &self,
        method: &str,
        args: AnyBox,
    ) -> BoxFuture<'static, Result<AnyBox>> {
        match self.vtable.handler(method) {
            None => ready(Err(Self::unknown_method(method))).boxed(),
            Some(MethodHandler::Async { direct, .. }) => direct(self.service.clone(), args),
            Some(MethodHandler::Sync { .. }) => ready(Err(ProxyError::ShapeMismatch {
                method: method.to_string(),
                expected: CallShape::Sync,
            }))
            .boxed(),
        }
    }
}

/// One registered interface on this node.
pub(crate) struct Registration {
    pub(crate) subject: String,
    pub(crate) service: Arc<dyn ErasedService>,
}

/// Interface-name-keyed registry of local implementations.
#[derive(Default)]
pub(crate) struct ServiceRegistry {
    entries: DashMap<String, Registration>,
}

impl ServiceRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Atomically install a registration; at most one per interface.
    pub(crate) fn insert(&self, interface: &str, registration: Registration) -> Result<()> {
        match self.entries.entry(interface.to_string()) {
            Entry::Occupied(_) => Err(ProxyError::DuplicateRegistration {
                interface: interface.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(registration);
                Ok(())
            }
        }
    }

    /// Remove a registration; `None` if already absent.
    pub(crate) fn remove(&self, interface: &str) -> Option<Registration> {
        self.entries.remove(interface).map(|(_, r)| r)
    }

    pub(crate) fn lookup(&self, interface: &str) -> Option<Arc<dyn ErasedService>> {
        self.entries.get(interface).map(|e| e.service.clone())
    }

    /// Remove and return every registration, for teardown.
    pub(crate) fn drain(&self) -> Vec<(String, Registration)> {
        let interfaces: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        interfaces
            .into_iter()
            .filter_map(|i| self.entries.remove(&i))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Build the remote handler installed as the subscriber for one
/// interface's subject. Looks the registration up per message, so a
/// registration removed mid-flight yields `NoSuchImplementation`
/// instead of a dropped message.
pub(crate) fn inbound_handler(registry: Arc<ServiceRegistry>) -> SubjectHandler {
    Arc::new(move |payload: Vec<u8>| {
        let registry = registry.clone();
        async move {
            let response = handle_invocation(&registry, &payload).await;
            match encode_response(&response) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "failed to encode response envelope");
                    Vec::new()
                }
            }
        }
        .boxed()
    })
}

async fn handle_invocation(registry: &ServiceRegistry, payload: &[u8]) -> ResponseEnvelope {
    let envelope = match decode_invocation(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "malformed invocation envelope");
            return ResponseEnvelope::failure(FailureKind::Codec, e.to_string());
        }
    };

    let Some(service) = registry.lookup(&envelope.interface) else {
        debug!(interface = %envelope.interface, "no implementation registered");
        return ResponseEnvelope::failure(
            FailureKind::NoSuchImplementation,
            envelope.interface.clone(),
        );
    };

    debug!(
        interface = %envelope.interface,
        method = %envelope.method,
        "handling remote invocation"
    );

    match service.invoke_wire(&envelope.method, envelope.args).await {
        Ok(result) => ResponseEnvelope::Success(result),
        Err(e @ ProxyError::UnknownMethod { .. }) | Err(e @ ProxyError::ShapeMismatch { .. }) => {
            ResponseEnvelope::failure(FailureKind::NoSuchMethod, e.to_string())
        }
        Err(ProxyError::RemoteExecutionFailed(detail)) => {
            ResponseEnvelope::failure(FailureKind::ExecutionFailed, detail)
        }
        Err(e @ ProxyError::Serialization(_)) | Err(e @ ProxyError::Deserialization(_)) => {
            ResponseEnvelope::failure(FailureKind::Codec, e.to_string())
        }
        Err(e) => ResponseEnvelope::failure(FailureKind::ExecutionFailed, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MethodSpec;
    use crate::protocol::{decode_response, encode_invocation, InvocationEnvelope};

    struct Echo;

    impl ServiceContract for Echo {
        const NAME: &'static str = "echo";

        fn methods() -> &'static [MethodSpec] {
            const METHODS: &[MethodSpec] = &[MethodSpec::value("sync"), MethodSpec::future("async")];
            METHODS
        }
    }

    struct EchoImpl;

    fn echo_registration() -> Registration {
        let vtable = ServiceVtable::<Echo, EchoImpl>::builder()
            .sync("sync", |_s: &EchoImpl, arg: String| arg)
            .async_method("async", |_s: Arc<EchoImpl>, arg: String| async move { arg })
            .build()
            .unwrap();
        Registration {
            subject: "mastership-proxy-echo".to_string(),
            service: Arc::new(ServiceBinding::new(
                Arc::new(EchoImpl),
                vtable,
                WireFormat::Postcard,
            )),
        }
    }

    fn invocation(method: &str, arg: &str) -> Vec<u8> {
        let codec = WireFormat::Postcard;
        encode_invocation(&InvocationEnvelope {
            interface: "echo".to_string(),
            method: method.to_string(),
            args: codec.encode(&arg.to_string()).unwrap(),
        })
        .unwrap()
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = ServiceRegistry::new();
        registry.insert("echo", echo_registration()).unwrap();

        let err = registry.insert("echo", echo_registration()).unwrap_err();
        assert!(matches!(err, ProxyError::DuplicateRegistration { .. }));

        // re-registration allowed after removal
        registry.remove("echo").unwrap();
        registry.insert("echo", echo_registration()).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_handler_invokes_registered_service() {
        let registry = Arc::new(ServiceRegistry::new());
        registry.insert("echo", echo_registration()).unwrap();
        let handler = inbound_handler(registry);

        let reply = handler(invocation("sync", "hi")).await;
        let response = decode_response(&reply).unwrap();
        let bytes = response.into_result("echo", "sync").unwrap();
        let out: String = WireFormat::Postcard.decode(&bytes).unwrap();
        assert_eq!(out, "hi");
    }

    #[tokio::test]
    async fn test_handler_replies_no_such_implementation() {
        let registry = Arc::new(ServiceRegistry::new());
        let handler = inbound_handler(registry);

        let reply = handler(invocation("sync", "hi")).await;
        let response = decode_response(&reply).unwrap();
        let err = response.into_result("echo", "sync").unwrap_err();
        assert!(matches!(err, ProxyError::NoSuchImplementation { .. }));
    }

    #[tokio::test]
    async fn test_handler_replies_no_such_method() {
        let registry = Arc::new(ServiceRegistry::new());
        registry.insert("echo", echo_registration()).unwrap();
        let handler = inbound_handler(registry);

        let reply = handler(invocation("vanished", "hi")).await;
        let response = decode_response(&reply).unwrap();
        let err = response.into_result("echo", "vanished").unwrap_err();
        assert!(matches!(err, ProxyError::UnknownMethod { .. }));
    }

    #[tokio::test]
    async fn test_handler_survives_malformed_payload() {
        let registry = Arc::new(ServiceRegistry::new());
        registry.insert("echo", echo_registration()).unwrap();
        let handler = inbound_handler(registry);

        let reply = handler(vec![0xff; 7]).await;
        let response = decode_response(&reply).unwrap();
        let err = response.into_result("echo", "sync").unwrap_err();
        assert!(matches!(err, ProxyError::RemoteInvocationFailed(_)));
    }

    #[test]
    fn test_direct_shape_mismatch() {
        let registration = echo_registration();
        let err = registration
            .service
            .invoke_direct_sync("async", Box::new("x".to_string()))
            .unwrap_err();
        assert!(matches!(err, ProxyError::ShapeMismatch { .. }));
    }
}
