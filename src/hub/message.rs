use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A change in the lineage graph, as broadcast to observers.
///
/// The hub itself never looks inside a payload; this type exists for the
/// lineage-processing side, which serializes it once and hands the bytes to
/// `HubHandle::publish`. Node and edge fields mirror the records kept by the
/// graph store.
///
/// # Example
///
/// ```rust
/// use lineage_hub::hub::LineageUpdate;
///
/// let update = LineageUpdate::node_added("t1");
/// let json = serde_json::to_string(&update).unwrap();
/// assert_eq!(json, r#"{"type":"node_added","id":"t1"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LineageUpdate {
    NodeAdded {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        properties: Map<String, Value>,
    },
    NodeUpdated {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        properties: Map<String, Value>,
    },
    NodeRemoved {
        id: String,
    },
    EdgeAdded {
        from: String,
        to: String,
        relation: String,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        properties: Map<String, Value>,
    },
    EdgeRemoved {
        from: String,
        to: String,
        relation: String,
    },
}

impl LineageUpdate {
    pub fn node_added(id: impl Into<String>) -> Self {
        Self::NodeAdded {
            id: id.into(),
            label: None,
            properties: Map::new(),
        }
    }

    pub fn edge_added(
        from: impl Into<String>,
        to: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self::EdgeAdded {
            from: from.into(),
            to: to.into(),
            relation: relation.into(),
            properties: Map::new(),
        }
    }
}
