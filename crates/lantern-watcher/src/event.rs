//! Events produced by the observers.

use lantern_core::{Query, Value};
use serde::{Deserialize, Serialize};

/// A structural change in the observed graph.
///
/// Every field is the descriptor of the node involved. A node without a
/// tracked parent reports the empty query as its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    Added { object: Query, parent: Query },
    Removed { object: Query },
    Reparented { object: Query, parent: Query },
    Renamed { old_object: Query, new_object: Query },
}

impl ChangeEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Removed { .. } => "removed",
            Self::Reparented { .. } => "reparented",
            Self::Renamed { .. } => "renamed",
        }
    }
}

/// A change in one node's property set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyEvent {
    Added {
        property: String,
        value: Value,
        read_only: bool,
    },
    Removed {
        property: String,
    },
    Updated {
        property: String,
        old_value: Value,
        new_value: Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_change_event_wire_form() {
        let event = ChangeEvent::Renamed {
            old_object: Query::by_type("Label"),
            new_object: Query::by_type("Button"),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "renamed",
                "old_object": "{\"type\":\"Label\"}",
                "new_object": "{\"type\":\"Button\"}",
            })
        );
        assert_eq!(event.kind(), "renamed");
    }

    #[test]
    fn test_property_event_wire_form() {
        let event = PropertyEvent::Updated {
            property: "text".into(),
            old_value: json!("a"),
            new_value: json!("b"),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "updated", "property": "text", "old_value": "a", "new_value": "b"})
        );
    }
}
