use crate::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Nodes carrying this tag are laid out as assistants of their parent
pub const ASSISTANT_TAG: &str = "assistant";

/// A caller-supplied node row
///
/// Relationship keys keep the wire names of the original dataset format, so
/// existing chart data loads unchanged: `pid` points at the parent, `ppid`
/// attaches a partner to its base node, `stpid` roots the node inside a
/// host's sub tree. The spelled-out forms `parentId`, `partnerParentId`
/// and `subtreeParentId` are accepted on input; the short keys are what
/// gets written back. Every other key is preserved verbatim in
/// [`fields`](Self::fields) for search, ordering and export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    #[serde(
        default,
        rename = "pid",
        alias = "parentId",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<NodeId>,
    #[serde(
        default,
        rename = "ppid",
        alias = "partnerParentId",
        skip_serializing_if = "Option::is_none"
    )]
    pub partner_parent_id: Option<NodeId>,
    #[serde(
        default,
        rename = "stpid",
        alias = "subtreeParentId",
        skip_serializing_if = "Option::is_none"
    )]
    pub subtree_parent_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl NodeRecord {
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            partner_parent_id: None,
            subtree_parent_id: None,
            tags: Vec::new(),
            fields: Map::new(),
        }
    }

    pub fn parent(mut self, id: impl Into<NodeId>) -> Self {
        self.parent_id = Some(id.into());
        self
    }

    pub fn partner_of(mut self, id: impl Into<NodeId>) -> Self {
        self.partner_parent_id = Some(id.into());
        self
    }

    pub fn in_subtree_of(mut self, id: impl Into<NodeId>) -> Self {
        self.subtree_parent_id = Some(id.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Field value as text, if present and textual
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}
