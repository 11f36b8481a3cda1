//! Proxy dispatch error types

use crate::contract::{CallShape, ReturnShape};
use crate::node::ResourceId;
use thiserror::Error;

/// Result type for proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Proxy dispatch errors
#[derive(Debug, Error)]
pub enum ProxyError {
    // ==================== Configuration Errors ====================
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ==================== Registration Errors ====================
    #[error("duplicate registration: {interface}")]
    DuplicateRegistration { interface: String },

    #[error("duplicate method: {interface}::{method}")]
    DuplicateMethod { interface: String, method: String },

    #[error("unsupported method shape: {interface}::{method} declared {shape}")]
    UnsupportedMethodShape {
        interface: String,
        method: String,
        shape: ReturnShape,
    },

    #[error("missing implementation for method: {interface}::{method}")]
    MissingMethod { interface: String, method: String },

    // ==================== Dispatch Errors ====================
    #[error("no master available for resource: {resource}")]
    MastershipUnavailable { resource: ResourceId },

    #[error("unknown method: {interface}::{method}")]
    UnknownMethod { interface: String, method: String },

    #[error("wrong call shape for {method}: declared {expected}")]
    ShapeMismatch { method: String, expected: CallShape },

    // ==================== Remote Round-Trip Errors ====================
    #[error("remote invocation failed: {0}")]
    RemoteInvocationFailed(String),

    #[error("no implementation registered for interface: {interface}")]
    NoSuchImplementation { interface: String },

    #[error("remote execution failed: {0}")]
    RemoteExecutionFailed(String),

    // ==================== Codec Errors ====================
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    // ==================== Internal Errors ====================
    #[error("channel closed")]
    ChannelClosed,
}

impl ProxyError {
    /// Check if this error was raised by registration-time validation,
    /// before any proxy was handed out or any message sent.
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            ProxyError::DuplicateRegistration { .. }
                | ProxyError::DuplicateMethod { .. }
                | ProxyError::UnsupportedMethodShape { .. }
                | ProxyError::MissingMethod { .. }
        )
    }

    /// Check if this error originated on the remote master rather than
    /// in the local dispatch path.
    pub fn is_remote_error(&self) -> bool {
        matches!(
            self,
            ProxyError::NoSuchImplementation { .. } | ProxyError::RemoteExecutionFailed(_)
        )
    }
}

// Conversion from channel errors
impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ProxyError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        ProxyError::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for ProxyError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        ProxyError::ChannelClosed
    }
}

// Conversion from postcard for envelope framing
impl From<postcard::Error> for ProxyError {
    fn from(e: postcard::Error) -> Self {
        ProxyError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_errors() {
        assert!(ProxyError::DuplicateRegistration {
            interface: "echo".into()
        }
        .is_registration_error());
        assert!(ProxyError::UnsupportedMethodShape {
            interface: "echo".into(),
            method: "tail".into(),
            shape: ReturnShape::Stream,
        }
        .is_registration_error());
        assert!(!ProxyError::MastershipUnavailable {
            resource: "d".into()
        }
        .is_registration_error());
    }

    #[test]
    fn test_remote_errors() {
        assert!(ProxyError::RemoteExecutionFailed("boom".into()).is_remote_error());
        assert!(ProxyError::NoSuchImplementation {
            interface: "echo".into()
        }
        .is_remote_error());
        assert!(!ProxyError::RemoteInvocationFailed("send failed".into()).is_remote_error());
    }
}
