//! Proxy manager: lifecycle, registration, and factory handout
//!
//! One [`ProxyManager`] per node. It captures the local node identity,
//! owns the service registry, and wires the mastership lookup and
//! messaging collaborators into every proxy it hands out. All state is
//! in-memory and rebuilt on activation; there is no on-disk format.

use crate::codec::WireFormat;
use crate::contract::ServiceContract;
use crate::error::{ProxyError, Result};
use crate::fabric::{ClusterMessaging, MastershipLookup};
use crate::node::NodeId;
use crate::protocol::subject_for;
use crate::proxy::{DispatchContext, ProxyFactory};
use crate::registry::{inbound_handler, Registration, ServiceBinding, ServiceRegistry};
use crate::vtable::ServiceVtable;
use std::sync::Arc;
use tracing::{debug, info};

/// Mastership-aware proxy manager for one cluster node.
pub struct ProxyManager {
    ctx: Arc<DispatchContext>,
}

impl std::fmt::Debug for ProxyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyManager")
            .field("local", &self.ctx.local)
            .finish_non_exhaustive()
    }
}

impl ProxyManager {
    /// Wire a manager from its collaborators. Captures the local node
    /// identity and starts with an empty registry.
    pub fn new(mastership: Arc<dyn MastershipLookup>, messaging: Arc<dyn ClusterMessaging>) -> Self {
        let local = messaging.local_node();
        info!(node = %local, "proxy manager activated");
        Self {
            ctx: Arc::new(DispatchContext {
                local,
                mastership,
                messaging,
                registry: Arc::new(ServiceRegistry::new()),
            }),
        }
    }

    pub fn builder() -> ProxyManagerBuilder {
        ProxyManagerBuilder::default()
    }

    /// Identity of this node, as captured at activation.
    pub fn local_node(&self) -> &NodeId {
        &self.ctx.local
    }

    /// Register the local implementation of contract `C`.
    ///
    /// The vtable has already been validated against the contract at
    /// build time. The descriptor is installed atomically (fails with
    /// `DuplicateRegistration` if `C` is already registered on this
    /// node) and the remote handler's subscription is live before this
    /// returns, so no inbound message can observe a half-registered
    /// entry.
    pub fn register_proxy_service<C, S>(
        &self,
        service: Arc<S>,
        vtable: ServiceVtable<C, S>,
        codec: WireFormat,
    ) -> Result<()>
    where
        C: ServiceContract,
        S: Send + Sync + 'static,
    {
        let subject = subject_for(C::NAME);
        let binding = Arc::new(ServiceBinding::new(service, vtable, codec));

        self.ctx.registry.insert(
            C::NAME,
            Registration {
                subject: subject.clone(),
                service: binding,
            },
        )?;
        self.ctx
            .messaging
            .subscribe(&subject, inbound_handler(self.ctx.registry.clone()));

        info!(interface = C::NAME, %subject, "proxy service registered");
        Ok(())
    }

    /// Remove the local implementation of contract `C` and release its
    /// subject. Idempotent if already absent.
    pub fn unregister_proxy_service<C: ServiceContract>(&self) {
        if let Some(registration) = self.ctx.registry.remove(C::NAME) {
            self.ctx.messaging.unsubscribe(&registration.subject);
            info!(interface = C::NAME, "proxy service unregistered");
        }
    }

    /// Build a proxy factory for contract `C` with the given codec.
    ///
    /// Classifies every method of `C` eagerly; a contract with an
    /// unsupported method shape is rejected here, never at call time.
    /// Registration of a local implementation is not required to obtain
    /// a factory.
    pub fn proxy_factory<C: ServiceContract>(&self, codec: WireFormat) -> Result<ProxyFactory<C>> {
        ProxyFactory::new(self.ctx.clone(), codec)
    }

    /// Unregister every interface and release all subscriptions.
    /// Idempotent; safe after a partial activation.
    pub fn deactivate(&self) {
        for (interface, registration) in self.ctx.registry.drain() {
            self.ctx.messaging.unsubscribe(&registration.subject);
            debug!(%interface, "released proxy subject");
        }
        info!(node = %self.ctx.local, "proxy manager deactivated");
    }
}

/// Builder wiring a [`ProxyManager`]'s collaborators.
#[derive(Default)]
pub struct ProxyManagerBuilder {
    mastership: Option<Arc<dyn MastershipLookup>>,
    messaging: Option<Arc<dyn ClusterMessaging>>,
}

impl ProxyManagerBuilder {
    pub fn mastership(mut self, mastership: Arc<dyn MastershipLookup>) -> Self {
        self.mastership = Some(mastership);
        self
    }

    pub fn messaging(mut self, messaging: Arc<dyn ClusterMessaging>) -> Self {
        self.messaging = Some(messaging);
        self
    }

    pub fn build(self) -> Result<ProxyManager> {
        let mastership = self
            .mastership
            .ok_or_else(|| ProxyError::InvalidConfig("mastership lookup not set".into()))?;
        let messaging = self
            .messaging
            .ok_or_else(|| ProxyError::InvalidConfig("cluster messaging not set".into()))?;
        Ok(ProxyManager::new(mastership, messaging))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MethodSpec;
    use crate::loopback::LoopbackHub;

    struct Echo;

    impl ServiceContract for Echo {
        const NAME: &'static str = "echo";

        fn methods() -> &'static [MethodSpec] {
            const METHODS: &[MethodSpec] = &[MethodSpec::value("sync")];
            METHODS
        }
    }

    struct EchoImpl;

    fn echo_vtable() -> ServiceVtable<Echo, EchoImpl> {
        ServiceVtable::builder()
            .sync("sync", |_s: &EchoImpl, arg: String| arg)
            .build()
            .unwrap()
    }

    fn manager(hub: &Arc<LoopbackHub>, node: &str) -> ProxyManager {
        ProxyManager::builder()
            .mastership(hub.clone())
            .messaging(hub.node(node))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let err = ProxyManager::builder().build().unwrap_err();
        assert!(matches!(err, ProxyError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let hub = LoopbackHub::new();
        let mgr = manager(&hub, "a");

        mgr.register_proxy_service(Arc::new(EchoImpl), echo_vtable(), WireFormat::Postcard)
            .unwrap();
        let err = mgr
            .register_proxy_service(Arc::new(EchoImpl), echo_vtable(), WireFormat::Postcard)
            .unwrap_err();
        assert!(matches!(err, ProxyError::DuplicateRegistration { .. }));

        mgr.unregister_proxy_service::<Echo>();
        mgr.register_proxy_service(Arc::new(EchoImpl), echo_vtable(), WireFormat::Postcard)
            .unwrap();
    }

    #[tokio::test]
    async fn test_deactivate_is_idempotent() {
        let hub = LoopbackHub::new();
        let mgr = manager(&hub, "a");
        mgr.register_proxy_service(Arc::new(EchoImpl), echo_vtable(), WireFormat::Postcard)
            .unwrap();

        mgr.deactivate();
        mgr.deactivate();

        // subject released: a remote call now reports no implementation
        hub.set_master("d", "a");
        let peer = manager(&hub, "b");
        let factory = peer.proxy_factory::<Echo>(WireFormat::Postcard).unwrap();
        let err = factory
            .proxy_for("d")
            .call::<String, String>("sync", "hi".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::NoSuchImplementation { .. }));
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let hub = LoopbackHub::new();
        let mgr = manager(&hub, "a");
        mgr.unregister_proxy_service::<Echo>();
        mgr.unregister_proxy_service::<Echo>();
    }
}
