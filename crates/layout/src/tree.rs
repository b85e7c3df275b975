use crate::tidy::LinkKind;
use serde::{Deserialize, Serialize};
use stemma_data::{NodeId, SubtreeOptions};

/// One visible node with its resolved relationships
///
/// Indices refer into the owning [`VisibleTree`] arena. The projection
/// upstream has already applied collapse state, ordering and tag
/// precedence, so the layout can take the structure at face value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: NodeId,
    /// Depth within the node's own tree, hosted sub trees restart at zero
    pub level: u32,
    /// Extra levels this node is pushed down
    pub sub_levels: u32,
    /// Partners attached to this node, in input order
    pub partners: Vec<usize>,
    /// Regular children grouped by the couple they hang under: group 0 is
    /// the node's own, group `k + 1` belongs to partner `k`. Always
    /// `partners.len() + 1` groups, empty ones included.
    pub child_groups: Vec<Vec<usize>>,
    /// Children laid out on the assistant band instead of the child row
    pub assistants: Vec<usize>,
    /// Roots of the sub trees hosted inside this node's box
    pub subtree_roots: Vec<usize>,
    /// Inset reserved around hosted sub trees, falls back to the chart
    /// padding
    pub padding: Option<f64>,
    /// Sub tree overrides taking effect at this node
    pub overrides: Option<SubtreeOptions>,
}

impl TreeNode {
    pub fn new(id: NodeId, level: u32) -> Self {
        Self {
            id,
            level,
            sub_levels: 0,
            partners: Vec::new(),
            child_groups: vec![Vec::new()],
            assistants: Vec::new(),
            subtree_roots: Vec::new(),
            padding: None,
            overrides: None,
        }
    }

    /// All regular children in display order
    pub fn children(&self) -> impl Iterator<Item = usize> + '_ {
        self.child_groups.iter().flatten().copied()
    }

    /// Whether the node renders as a single box
    pub fn is_leaf(&self) -> bool {
        self.partners.is_empty()
            && self.assistants.is_empty()
            && self.subtree_roots.is_empty()
            && self.children().next().is_none()
    }
}

/// A non-structural link between two visible nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossLink {
    pub from: usize,
    pub to: usize,
    pub kind: LinkKind,
    pub label: Option<String>,
}

/// The visible part of a chart, resolved for layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisibleTree {
    pub nodes: Vec<TreeNode>,
    /// Top level trees in display order
    pub roots: Vec<usize>,
    pub cross_links: Vec<CrossLink>,
}

impl VisibleTree {
    /// Append a node to the arena and return its index
    pub fn push(&mut self, node: TreeNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Indices of `root` and every node reachable below it
    pub fn subtree_indices(&self, root: usize) -> Vec<usize> {
        let mut found = Vec::new();
        let mut pending = vec![root];
        while let Some(idx) = pending.pop() {
            found.push(idx);
            let node = &self.nodes[idx];
            pending.extend(node.partners.iter().copied());
            pending.extend(node.children());
            pending.extend(node.assistants.iter().copied());
            pending.extend(node.subtree_roots.iter().copied());
        }
        found
    }
}
