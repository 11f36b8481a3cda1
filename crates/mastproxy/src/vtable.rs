//! Typed method tables for registered implementations
//!
//! A [`ServiceVtable`] binds an implementation type `S` to a contract
//! `C`. Each method is supplied once as a typed closure and wrapped into
//! two forms at build time:
//!
//! - a *wire* form used by the remote handler: decode arguments with the
//!   registration codec, invoke, encode the result;
//! - a *direct* form used by the local fast path: arguments and result
//!   travel as `Box<dyn Any>` with no codec involvement.
//!
//! `build()` validates the table against the contract's classified
//! method table, so a mismatched or unsupported contract is rejected at
//! registration time, never at first call.

use crate::codec::WireFormat;
use crate::contract::{CallShape, MethodTable, ServiceContract};
use crate::error::{ProxyError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Boxed argument or result for the direct (no-marshaling) call path.
pub(crate) type AnyBox = Box<dyn Any + Send>;

type SyncWireFn<S> = Arc<dyn Fn(&S, &[u8], WireFormat) -> Result<Vec<u8>> + Send + Sync>;
type SyncDirectFn<S> = Arc<dyn Fn(&S, AnyBox) -> Result<AnyBox> + Send + Sync>;
type AsyncWireFn<S> =
    Arc<dyn Fn(Arc<S>, Vec<u8>, WireFormat) -> BoxFuture<'static, Result<Vec<u8>>> + Send + Sync>;
type AsyncDirectFn<S> =
    Arc<dyn Fn(Arc<S>, AnyBox) -> BoxFuture<'static, Result<AnyBox>> + Send + Sync>;

/// One registered method, in both wrapped forms.
pub(crate) enum MethodHandler<S> {
    Sync {
        wire: SyncWireFn<S>,
        direct: SyncDirectFn<S>,
    },
    Async {
        wire: AsyncWireFn<S>,
        direct: AsyncDirectFn<S>,
    },
}

impl<S> MethodHandler<S> {
    fn call_shape(&self) -> CallShape {
        match self {
            MethodHandler::Sync { .. } => CallShape::Sync,
            MethodHandler::Async { .. } => CallShape::Async,
        }
    }
}

fn argument_mismatch(method: &str) -> ProxyError {
    ProxyError::RemoteInvocationFailed(format!(
        "argument type mismatch for local call to {method}"
    ))
}

/// Validated method table binding contract `C` to implementation `S`.
pub struct ServiceVtable<C: ServiceContract, S> {
    methods: HashMap<&'static str, MethodHandler<S>>,
    table: MethodTable,
    _contract: PhantomData<fn() -> C>,
}

impl<C: ServiceContract, S> std::fmt::Debug for ServiceVtable<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceVtable")
            .field("interface", &C::NAME)
            .finish_non_exhaustive()
    }
}

impl<C: ServiceContract, S: Send + Sync + 'static> ServiceVtable<C, S> {
    pub fn builder() -> VtableBuilder<C, S> {
        VtableBuilder {
            entries: Vec::new(),
            _contract: PhantomData,
        }
    }

    pub(crate) fn handler(&self, method: &str) -> Option<&MethodHandler<S>> {
        self.methods.get(method)
    }

    pub(crate) fn table(&self) -> &MethodTable {
        &self.table
    }
}

/// Builder collecting typed method closures for `ServiceVtable`.
pub struct VtableBuilder<C: ServiceContract, S> {
    entries: Vec<(&'static str, MethodHandler<S>)>,
    _contract: PhantomData<fn() -> C>,
}

impl<C: ServiceContract, S: Send + Sync + 'static> VtableBuilder<C, S> {
    /// Register an infallible synchronous method.
    pub fn sync<A, R, F>(self, name: &'static str, f: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(&S, A) -> R + Send + Sync + 'static,
    {
        self.try_sync(name, move |service, args| Ok(f(service, args)))
    }

    /// Register a fallible synchronous method. The error string reaches
    /// the caller as `RemoteExecutionFailed`, on both local and remote
    /// paths.
    pub fn try_sync<A, R, F>(mut self, name: &'static str, f: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(&S, A) -> std::result::Result<R, String> + Send + Sync + 'static,
    {
        let f = Arc::new(f);

        let wire: SyncWireFn<S> = {
            let f = f.clone();
            Arc::new(move |service: &S, bytes: &[u8], codec: WireFormat| {
                let args: A = codec.decode(bytes)?;
                let out = f(service, args).map_err(ProxyError::RemoteExecutionFailed)?;
                codec.encode(&out)
            })
        };

        let direct: SyncDirectFn<S> = Arc::new(move |service: &S, args: AnyBox| {
            let args = args.downcast::<A>().map_err(|_| argument_mismatch(name))?;
            let out = f(service, *args).map_err(ProxyError::RemoteExecutionFailed)?;
            Ok(Box::new(out) as AnyBox)
        });

        self.entries.push((name, MethodHandler::Sync { wire, direct }));
        self
    }

    /// Register an infallible asynchronous method.
    pub fn async_method<A, R, F, Fut>(self, name: &'static str, f: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(Arc<S>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        self.try_async(name, move |service, args| {
            f(service, args).map(Ok::<R, String>)
        })
    }

    /// Register a fallible asynchronous method.
    pub fn try_async<A, R, F, Fut>(mut self, name: &'static str, f: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(Arc<S>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, String>> + Send + 'static,
    {
        let f = Arc::new(f);

        let wire: AsyncWireFn<S> = {
            let f = f.clone();
            Arc::new(move |service: Arc<S>, bytes: Vec<u8>, codec: WireFormat| {
                let f = f.clone();
                async move {
                    let args: A = codec.decode(&bytes)?;
                    let out = f(service, args)
                        .await
                        .map_err(ProxyError::RemoteExecutionFailed)?;
                    codec.encode(&out)
                }
                .boxed()
            })
        };

        let direct: AsyncDirectFn<S> = Arc::new(move |service: Arc<S>, args: AnyBox| {
            let f = f.clone();
            async move {
                let args = args.downcast::<A>().map_err(|_| argument_mismatch(name))?;
                let out = f(service, *args)
                    .await
                    .map_err(ProxyError::RemoteExecutionFailed)?;
                Ok(Box::new(out) as AnyBox)
            }
            .boxed()
        });

        self.entries
            .push((name, MethodHandler::Async { wire, direct }));
        self
    }

    /// Validate the collected methods against contract `C` and build the
    /// vtable. Every declared method must be supplied with the shape the
    /// classifier assigned it; extra or repeated methods are rejected.
    pub fn build(self) -> Result<ServiceVtable<C, S>> {
        let table = MethodTable::classify::<C>()?;

        let mut methods = HashMap::with_capacity(self.entries.len());
        for (name, handler) in self.entries {
            match table.shape(name) {
                None => {
                    return Err(ProxyError::UnknownMethod {
                        interface: C::NAME.to_string(),
                        method: name.to_string(),
                    })
                }
                Some(shape) if shape != handler.call_shape() => {
                    return Err(ProxyError::ShapeMismatch {
                        method: name.to_string(),
                        expected: shape,
                    })
                }
                Some(_) => {}
            }
            if methods.insert(name, handler).is_some() {
                return Err(ProxyError::DuplicateMethod {
                    interface: C::NAME.to_string(),
                    method: name.to_string(),
                });
            }
        }

        for spec in C::methods() {
            if !methods.contains_key(spec.name) {
                return Err(ProxyError::MissingMethod {
                    interface: C::NAME.to_string(),
                    method: spec.name.to_string(),
                });
            }
        }

        Ok(ServiceVtable {
            methods,
            table,
            _contract: PhantomData,
        })
    }
}
