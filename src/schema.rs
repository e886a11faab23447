//! Node and response types shared by the store, the service and the HTTP layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Smallest accepted subtree depth.
pub const MIN_DEPTH: u32 = 1;
/// Largest accepted subtree depth.
pub const MAX_DEPTH: u32 = 100;

/// Number of levels below a node to load eagerly.
///
/// Only constructible through [`Depth::new`], so a value that reaches the
/// store is always inside `[MIN_DEPTH, MAX_DEPTH]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Depth(u32);

impl Depth {
    pub fn new(value: i64) -> Result<Self, DepthOutOfRange> {
        if value < MIN_DEPTH as i64 || value > MAX_DEPTH as i64 {
            return Err(DepthOutOfRange(value));
        }
        Ok(Self(value as u32))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("depth must be between 1 and 100, got {0}")]
pub struct DepthOutOfRange(pub i64);

/// Flat persisted form of a node: one row of the `node` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
}

/// A node with its descendants loaded down to some depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTree {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub children: Vec<NodeTree>,
}

impl NodeTree {
    pub fn leaf(record: NodeRecord) -> Self {
        Self {
            id: record.id,
            parent_id: record.parent_id,
            name: record.name,
            children: Vec::new(),
        }
    }
}

#[cfg(test)]
impl NodeTree {
    /// Number of levels below this node that are present (0 for a leaf).
    pub fn height(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.height() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Total node count including this one.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(NodeTree::size).sum::<usize>()
    }

    pub fn child(&self, name: &str) -> Option<&NodeTree> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Body of `POST /api/v1/nodes`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNodeRequest {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

// ============================================================================
// Response envelope
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// `{meta: {success}, data?, errors?}` wrapper used by every node endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub meta: Meta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorBody>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            meta: Meta { success: true },
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            meta: Meta { success: false },
            data: None,
            errors: vec![ErrorBody {
                code: code.to_string(),
                message: message.into(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_bounds() {
        assert!(Depth::new(0).is_err());
        assert!(Depth::new(101).is_err());
        assert!(Depth::new(-3).is_err());
        assert_eq!(Depth::new(1).unwrap().get(), 1);
        assert_eq!(Depth::new(100).unwrap().get(), 100);
    }

    #[test]
    fn test_node_tree_serializes_camel_case() {
        let id = Uuid::new_v4();
        let tree = NodeTree {
            id,
            parent_id: None,
            name: "ACME".to_string(),
            children: Vec::new(),
        };
        let value = serde_json::to_value(ApiResponse::ok(tree)).unwrap();
        assert_eq!(value["meta"]["success"], true);
        assert_eq!(value["data"]["name"], "ACME");
        assert_eq!(value["data"]["id"], id.to_string());
        assert!(value["data"]["parentId"].is_null());
        assert!(value.get("errors").is_none());
    }

    #[test]
    fn test_error_envelope_has_no_data() {
        let value = serde_json::to_value(ApiResponse::<NodeTree>::error("NOT_FOUND", "missing")).unwrap();
        assert_eq!(value["meta"]["success"], false);
        assert!(value.get("data").is_none());
        assert_eq!(value["errors"][0]["code"], "NOT_FOUND");
    }

    #[test]
    fn test_create_request_parent_is_optional() {
        let req: CreateNodeRequest = serde_json::from_str(r#"{"name":"Sales"}"#).unwrap();
        assert_eq!(req.name, "Sales");
        assert!(req.parent_id.is_none());

        let id = Uuid::new_v4();
        let body = format!(r#"{{"name":"Team","parentId":"{}"}}"#, id);
        let req: CreateNodeRequest = serde_json::from_str(&body).unwrap();
        assert_eq!(req.parent_id, Some(id));
    }
}
