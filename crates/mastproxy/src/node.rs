//! Node and resource identity types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique node identifier (UUID or human-readable string)
pub type NodeId = String;

/// Opaque identifier for a mastership-owned resource.
///
/// Carries no internal structure; it is used only as the mastership
/// lookup key and the routing key for proxy calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_equality() {
        let a = ResourceId::from("switch-7");
        let b = ResourceId::new("switch-7".to_string());
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "switch-7");
        assert_eq!(a.to_string(), "switch-7");
    }
}
