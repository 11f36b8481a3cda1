//! # Mastproxy
//!
//! Mastership-aware proxy dispatch for clustered controllers:
//! - **Capability contracts**: per-interface method tables, classified
//!   once into sync and async call shapes
//! - **Dispatch protocol**: per-call master resolution, local fast path
//!   or marshaled remote round-trip
//! - **Remote handling**: per-interface subjects, envelope codec,
//!   faithful failure propagation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Cluster Node                         │
//! ├──────────────────┬────────────────────┬─────────────────────┤
//! │   ProxyFactory   │     Dispatcher     │    Remote Handler   │
//! │  MethodTable per │  resolve master →  │  per-subject inbound│
//! │  interface, once │  local / remote    │  decode → invoke →  │
//! │                  │                    │  reply              │
//! ├──────────────────┴────────────────────┴─────────────────────┤
//! │  ServiceRegistry: one implementation per interface per node │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Collaborators: MastershipLookup · ClusterMessaging · codec │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Mastership election, membership, and the transport itself are
//! consumed through traits, never implemented here. Mastership is
//! re-resolved on every call and never fenced: a demoted master that
//! still holds a registration will execute stale calls. Callers that
//! need stricter guarantees must layer epoch checks above this crate.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mastproxy::prelude::*;
//! use std::sync::Arc;
//!
//! struct Device;
//!
//! impl ServiceContract for Device {
//!     const NAME: &'static str = "device";
//!     fn methods() -> &'static [MethodSpec] {
//!         const METHODS: &[MethodSpec] =
//!             &[MethodSpec::value("probe"), MethodSpec::future("reboot")];
//!         METHODS
//!     }
//! }
//!
//! let manager = ProxyManager::builder()
//!     .mastership(mastership)
//!     .messaging(messaging)
//!     .build()?;
//!
//! manager.register_proxy_service(Arc::new(driver), vtable, WireFormat::Postcard)?;
//!
//! let factory = manager.proxy_factory::<Device>(WireFormat::Postcard)?;
//! let proxy = factory.proxy_for("of:0000000000000001");
//! let status: String = proxy.call("probe", "port-1".to_string()).await?;
//! let handle = proxy.call_async::<String, String>("reboot", "warm".to_string());
//! ```

pub mod codec;
pub mod completion;
pub mod contract;
pub mod error;
pub mod fabric;
pub mod loopback;
pub mod manager;
pub mod node;
pub mod protocol;
pub mod proxy;
mod registry;
pub mod vtable;

// Re-export main types
pub use codec::WireFormat;
pub use completion::CompletionHandle;
pub use contract::{CallShape, MethodSpec, MethodTable, ReturnShape, ServiceContract};
pub use error::{ProxyError, Result};
pub use fabric::{ClusterMessaging, MastershipLookup, SubjectHandler};
pub use loopback::{LoopbackFabric, LoopbackHub};
pub use manager::{ProxyManager, ProxyManagerBuilder};
pub use node::{NodeId, ResourceId};
pub use protocol::{
    subject_for, FailureKind, InvocationEnvelope, ResponseEnvelope, MAX_ENVELOPE_SIZE,
};
pub use proxy::{MasterProxy, ProxyFactory};
pub use vtable::{ServiceVtable, VtableBuilder};

/// Re-export common types
pub mod prelude {
    pub use crate::codec::WireFormat;
    pub use crate::completion::CompletionHandle;
    pub use crate::contract::{CallShape, MethodSpec, ReturnShape, ServiceContract};
    pub use crate::error::{ProxyError, Result};
    pub use crate::fabric::{ClusterMessaging, MastershipLookup};
    pub use crate::manager::ProxyManager;
    pub use crate::node::{NodeId, ResourceId};
    pub use crate::proxy::{MasterProxy, ProxyFactory};
    pub use crate::vtable::ServiceVtable;
}
