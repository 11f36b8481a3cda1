//! Capability contracts and method shape classification
//!
//! An interface is described by a marker type implementing
//! [`ServiceContract`]: a pure capability contract carrying only a name
//! and a list of method signatures. Each declared method has a
//! [`ReturnShape`]; the classifier maps it onto one of two dispatchable
//! [`CallShape`]s exactly once, at factory or registration time, and the
//! resulting [`MethodTable`] is reused by every proxy and every call.

use crate::error::{ProxyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A pure capability contract: a named set of method signatures.
///
/// The implementing type is a stateless marker; it is never instantiated.
pub trait ServiceContract: 'static {
    /// Interface name, unique per node. Doubles as the basis for the
    /// routing subject.
    const NAME: &'static str;

    /// Declared method signatures.
    fn methods() -> &'static [MethodSpec];
}

/// Return shape an interface author declares per method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnShape {
    /// Plain value; the call completes before returning
    Value,
    /// Future of a value; the call returns a completion handle
    Future,
    /// Stream of values; declarable but not dispatchable
    Stream,
}

impl fmt::Display for ReturnShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnShape::Value => f.write_str("value"),
            ReturnShape::Future => f.write_str("future"),
            ReturnShape::Stream => f.write_str("stream"),
        }
    }
}

/// Call shape assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallShape {
    /// Caller awaits the result in place
    Sync,
    /// Caller receives a completion handle immediately
    Async,
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallShape::Sync => f.write_str("sync"),
            CallShape::Async => f.write_str("async"),
        }
    }
}

/// A single declared method: name plus return shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSpec {
    pub name: &'static str,
    pub shape: ReturnShape,
}

impl MethodSpec {
    /// Declare a method returning a plain value.
    pub const fn value(name: &'static str) -> Self {
        Self {
            name,
            shape: ReturnShape::Value,
        }
    }

    /// Declare a method returning a future of a value.
    pub const fn future(name: &'static str) -> Self {
        Self {
            name,
            shape: ReturnShape::Future,
        }
    }

    /// Declare a method returning a stream. Rejected by the classifier;
    /// exists so contracts for richer transports fail eagerly here
    /// instead of at first call.
    pub const fn stream(name: &'static str) -> Self {
        Self {
            name,
            shape: ReturnShape::Stream,
        }
    }
}

/// Classified method table for one interface, built exactly once.
#[derive(Debug, Clone)]
pub struct MethodTable {
    interface: &'static str,
    shapes: HashMap<&'static str, CallShape>,
}

impl MethodTable {
    /// Classify every method of contract `C`.
    ///
    /// Fails with `UnsupportedMethodShape` on any shape other than
    /// value or future, and with `DuplicateMethod` on a repeated name.
    /// Validation is eager: a broken contract is rejected before any
    /// proxy is handed out.
    pub fn classify<C: ServiceContract>() -> Result<Self> {
        let specs = C::methods();
        let mut shapes = HashMap::with_capacity(specs.len());
        for spec in specs {
            let shape = match spec.shape {
                ReturnShape::Value => CallShape::Sync,
                ReturnShape::Future => CallShape::Async,
                other => {
                    return Err(ProxyError::UnsupportedMethodShape {
                        interface: C::NAME.to_string(),
                        method: spec.name.to_string(),
                        shape: other,
                    })
                }
            };
            if shapes.insert(spec.name, shape).is_some() {
                return Err(ProxyError::DuplicateMethod {
                    interface: C::NAME.to_string(),
                    method: spec.name.to_string(),
                });
            }
        }
        Ok(Self {
            interface: C::NAME,
            shapes,
        })
    }

    pub fn interface(&self) -> &'static str {
        self.interface
    }

    pub fn shape(&self, method: &str) -> Option<CallShape> {
        self.shapes.get(method).copied()
    }

    /// Check that `method` exists and carries the wanted call shape.
    pub fn expect_shape(&self, method: &str, want: CallShape) -> Result<()> {
        match self.shape(method) {
            None => Err(ProxyError::UnknownMethod {
                interface: self.interface.to_string(),
                method: method.to_string(),
            }),
            Some(shape) if shape == want => Ok(()),
            Some(shape) => Err(ProxyError::ShapeMismatch {
                method: method.to_string(),
                expected: shape,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl ServiceContract for Echo {
        const NAME: &'static str = "echo";

        fn methods() -> &'static [MethodSpec] {
            const METHODS: &[MethodSpec] = &[MethodSpec::value("sync"), MethodSpec::future("async")];
            METHODS
        }
    }

    struct Tail;

    impl ServiceContract for Tail {
        const NAME: &'static str = "tail";

        fn methods() -> &'static [MethodSpec] {
            const METHODS: &[MethodSpec] = &[MethodSpec::value("head"), MethodSpec::stream("follow")];
            METHODS
        }
    }

    struct Twice;

    impl ServiceContract for Twice {
        const NAME: &'static str = "twice";

        fn methods() -> &'static [MethodSpec] {
            const METHODS: &[MethodSpec] = &[MethodSpec::value("get"), MethodSpec::future("get")];
            METHODS
        }
    }

    #[test]
    fn test_classification() {
        let table = MethodTable::classify::<Echo>().unwrap();
        assert_eq!(table.interface(), "echo");
        assert_eq!(table.shape("sync"), Some(CallShape::Sync));
        assert_eq!(table.shape("async"), Some(CallShape::Async));
        assert_eq!(table.shape("missing"), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_stream_shape_rejected_eagerly() {
        let err = MethodTable::classify::<Tail>().unwrap_err();
        match err {
            ProxyError::UnsupportedMethodShape {
                interface, method, ..
            } => {
                assert_eq!(interface, "tail");
                assert_eq!(method, "follow");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_method_rejected() {
        let err = MethodTable::classify::<Twice>().unwrap_err();
        assert!(matches!(err, ProxyError::DuplicateMethod { .. }));
    }

    #[test]
    fn test_expect_shape() {
        let table = MethodTable::classify::<Echo>().unwrap();
        assert!(table.expect_shape("sync", CallShape::Sync).is_ok());

        let err = table.expect_shape("sync", CallShape::Async).unwrap_err();
        assert!(matches!(
            err,
            ProxyError::ShapeMismatch {
                expected: CallShape::Sync,
                ..
            }
        ));

        let err = table.expect_shape("nope", CallShape::Sync).unwrap_err();
        assert!(matches!(err, ProxyError::UnknownMethod { .. }));
    }
}
