//! Wire protocol for proxy invocations
//!
//! Two transient envelopes travel per remote call: an
//! [`InvocationEnvelope`] from caller to master and a
//! [`ResponseEnvelope`] back. The envelopes themselves are framed with
//! postcard cluster-wide; method arguments and results inside them are
//! encoded with the per-registration [`WireFormat`](crate::WireFormat).

use crate::error::{ProxyError, Result};
use serde::{Deserialize, Serialize};

/// Maximum envelope size (16 MB)
pub const MAX_ENVELOPE_SIZE: usize = 16 * 1024 * 1024;

/// Prefix for per-interface routing subjects
pub const SUBJECT_PREFIX: &str = "mastership-proxy-";

/// Derive the routing subject for an interface name.
pub fn subject_for(interface: &str) -> String {
    format!("{SUBJECT_PREFIX}{interface}")
}

/// Recover the interface name from a routing subject.
pub fn interface_of(subject: &str) -> &str {
    subject.strip_prefix(SUBJECT_PREFIX).unwrap_or(subject)
}

/// A single outbound proxy call; constructed fresh per remote call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationEnvelope {
    /// Target interface name
    pub interface: String,
    /// Method identifier within the interface
    pub method: String,
    /// Arguments, pre-encoded with the registration codec
    pub args: Vec<u8>,
}

/// Outcome of a remote invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponseEnvelope {
    /// Result value, encoded with the registration codec
    Success(Vec<u8>),
    /// The call did not produce a value
    Failure { kind: FailureKind, detail: String },
}

/// Failure classification carried back over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// No implementation registered for the interface on the target node
    NoSuchImplementation,
    /// Implementation present but the method identifier did not match
    NoSuchMethod,
    /// The implementation itself raised a failure
    ExecutionFailed,
    /// Argument or result codec error on the target node
    Codec,
}

impl ResponseEnvelope {
    pub fn failure(kind: FailureKind, detail: impl Into<String>) -> Self {
        ResponseEnvelope::Failure {
            kind,
            detail: detail.into(),
        }
    }

    /// Map the envelope back into the caller-side error taxonomy.
    ///
    /// Remote-origin failures keep their original kind; they are never
    /// rewrapped as transport failures.
    pub fn into_result(self, interface: &str, method: &str) -> Result<Vec<u8>> {
        match self {
            ResponseEnvelope::Success(bytes) => Ok(bytes),
            ResponseEnvelope::Failure { kind, detail } => Err(match kind {
                FailureKind::NoSuchImplementation => ProxyError::NoSuchImplementation {
                    interface: interface.to_string(),
                },
                FailureKind::NoSuchMethod => ProxyError::UnknownMethod {
                    interface: interface.to_string(),
                    method: method.to_string(),
                },
                FailureKind::ExecutionFailed => ProxyError::RemoteExecutionFailed(detail),
                FailureKind::Codec => ProxyError::RemoteInvocationFailed(detail),
            }),
        }
    }
}

/// Encode an invocation envelope to bytes
pub fn encode_invocation(envelope: &InvocationEnvelope) -> Result<Vec<u8>> {
    postcard::to_allocvec(envelope).map_err(|e| ProxyError::Serialization(e.to_string()))
}

/// Decode an invocation envelope from bytes
pub fn decode_invocation(bytes: &[u8]) -> Result<InvocationEnvelope> {
    if bytes.len() > MAX_ENVELOPE_SIZE {
        return Err(ProxyError::Deserialization(format!(
            "envelope too large: {} bytes (max {})",
            bytes.len(),
            MAX_ENVELOPE_SIZE
        )));
    }
    postcard::from_bytes(bytes).map_err(|e| ProxyError::Deserialization(e.to_string()))
}

/// Encode a response envelope to bytes
pub fn encode_response(envelope: &ResponseEnvelope) -> Result<Vec<u8>> {
    postcard::to_allocvec(envelope).map_err(|e| ProxyError::Serialization(e.to_string()))
}

/// Decode a response envelope from bytes
pub fn decode_response(bytes: &[u8]) -> Result<ResponseEnvelope> {
    if bytes.len() > MAX_ENVELOPE_SIZE {
        return Err(ProxyError::Deserialization(format!(
            "envelope too large: {} bytes (max {})",
            bytes.len(),
            MAX_ENVELOPE_SIZE
        )));
    }
    postcard::from_bytes(bytes).map_err(|e| ProxyError::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_derivation() {
        let subject = subject_for("echo");
        assert_eq!(subject, "mastership-proxy-echo");
        assert_eq!(interface_of(&subject), "echo");
        assert_eq!(interface_of("bare"), "bare");
    }

    #[test]
    fn test_invocation_roundtrip() {
        let envelope = InvocationEnvelope {
            interface: "echo".into(),
            method: "sync".into(),
            args: vec![1, 2, 3],
        };

        let bytes = encode_invocation(&envelope).unwrap();
        let decoded = decode_invocation(&bytes).unwrap();

        assert_eq!(decoded.interface, "echo");
        assert_eq!(decoded.method, "sync");
        assert_eq!(decoded.args, vec![1, 2, 3]);
    }

    #[test]
    fn test_failure_kinds_map_to_original_errors() {
        let err = ResponseEnvelope::failure(FailureKind::NoSuchImplementation, "")
            .into_result("echo", "sync")
            .unwrap_err();
        assert!(matches!(err, ProxyError::NoSuchImplementation { .. }));

        let err = ResponseEnvelope::failure(FailureKind::ExecutionFailed, "div by zero")
            .into_result("echo", "sync")
            .unwrap_err();
        match err {
            ProxyError::RemoteExecutionFailed(detail) => assert_eq!(detail, "div by zero"),
            other => panic!("unexpected error: {other}"),
        }

        let err = ResponseEnvelope::failure(FailureKind::NoSuchMethod, "")
            .into_result("echo", "gone")
            .unwrap_err();
        assert!(matches!(err, ProxyError::UnknownMethod { .. }));
    }

    #[test]
    fn test_success_passthrough() {
        let bytes = ResponseEnvelope::Success(vec![9, 9])
            .into_result("echo", "sync")
            .unwrap();
        assert_eq!(bytes, vec![9, 9]);
    }
}
