//! Value codecs for proxy call payloads
//!
//! The codec is supplied per registration and must match between the
//! caller's proxy factory and the master's registered implementation.
//! Codec compatibility across the cluster is an assumed precondition,
//! not enforced by this layer.

use crate::error::{ProxyError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Serialization format for method arguments and results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Compact binary encoding (default)
    #[default]
    Postcard,
    /// Self-describing JSON, for interop or debugging
    Json,
}

impl WireFormat {
    /// Encode a value to bytes
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            WireFormat::Postcard => {
                postcard::to_allocvec(value).map_err(|e| ProxyError::Serialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::to_vec(value).map_err(|e| ProxyError::Serialization(e.to_string()))
            }
        }
    }

    /// Decode a value from bytes
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            WireFormat::Postcard => {
                postcard::from_bytes(bytes).map_err(|e| ProxyError::Deserialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::from_slice(bytes).map_err(|e| ProxyError::Deserialization(e.to_string()))
            }
        }
    }
}
