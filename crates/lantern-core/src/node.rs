//! Stable node identifiers.
//!
//! A `NodeId` is handed out once per object and never reused for the
//! lifetime of the process. It is also the only handle the rest of the
//! system keeps to a node: holding one never keeps the node alive, so
//! callers must ask the graph whether it still exists before using it.

use crate::error::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a host graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocates a fresh identifier.
    pub fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a raw value, e.g. one read back from the wire.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(NodeId)
            .map_err(|_| Error::InvalidArgument(format!("not a node id: {s:?}")))
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = NodeId::next();
        let b = NodeId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_parse_and_display() {
        let id: NodeId = "42".parse().unwrap();
        assert_eq!(id, NodeId::from_raw(42));
        assert_eq!(id.to_string(), "42");
        assert!(matches!(
            "abc".parse::<NodeId>(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_serializes_as_string() {
        let id = NodeId::from_raw(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"7\"");
        let back: NodeId = serde_json::from_str("\"7\"").unwrap();
        assert_eq!(back, id);
    }
}
