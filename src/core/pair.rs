use crate::core::{RekeyError, Result};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// One `(old, new)` identifier mapping to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityPair {
    old_key: String,
    new_key: String,
}

impl IdentityPair {
    pub fn new(old_key: impl Into<String>, new_key: impl Into<String>) -> Result<Self> {
        let old_key = old_key.into();
        let new_key = new_key.into();

        if old_key.is_empty() {
            return Err(RekeyError::InvalidPair("old key cannot be empty".to_string()));
        }
        if new_key.is_empty() {
            return Err(RekeyError::InvalidPair(format!(
                "new key for '{}' cannot be empty",
                old_key
            )));
        }

        Ok(Self { old_key, new_key })
    }

    pub fn old_key(&self) -> &str {
        &self.old_key
    }

    pub fn new_key(&self) -> &str {
        &self.new_key
    }

    /// Pairs whose keys are already equal need no work.
    pub fn is_noop(&self) -> bool {
        self.old_key == self.new_key
    }

    /// Directory UUIDs are usually RFC 4122 shaped, but some directories hand
    /// out opaque ids. Only used for diagnostics.
    pub fn new_key_is_uuid(&self) -> bool {
        Uuid::parse_str(&self.new_key).is_ok()
    }
}

impl fmt::Display for IdentityPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.old_key, self.new_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_keys() {
        assert!(IdentityPair::new("", "abc").is_err());
        assert!(IdentityPair::new("alice", "").is_err());
    }

    #[test]
    fn test_noop_detection() {
        assert!(IdentityPair::new("same", "same").unwrap().is_noop());
        assert!(!IdentityPair::new("alice", "b1c2").unwrap().is_noop());
    }

    #[test]
    fn test_uuid_shape() {
        let pair = IdentityPair::new("alice", "5f0c5a2e-8d2b-4a4c-9f76-0c1a3e0d9b11").unwrap();
        assert!(pair.new_key_is_uuid());
        assert!(!IdentityPair::new("alice", "opaque-id").unwrap().new_key_is_uuid());
        assert_eq!(pair.to_string(), "alice -> 5f0c5a2e-8d2b-4a4c-9f76-0c1a3e0d9b11");
    }
}
