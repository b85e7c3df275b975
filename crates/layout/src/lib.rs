//! Tree layout algorithms for family trees and org charts
//!
//! This crate is pure geometry: it takes the visible part of a chart as a
//! [`VisibleTree`] plus a [`NodeSizes`] provider and produces node
//! rectangles and link polylines. It never looks at raw records or
//! collapse state, that resolution happens upstream.
//!
//! Layout is always computed in the top-down frame. The configured
//! orientation is applied to the finished coordinates as a rigid
//! transform, so every algorithm only ever reasons about one direction.
//!
//! # Example
//!
//! ```
//! use stemma_data::{NodeId, Options};
//! use stemma_layout::{TreeLayout, TreeNode, Vec2, VisibleTree};
//!
//! let mut tree = VisibleTree::default();
//! let root = tree.push(TreeNode::new(NodeId::from(1), 0));
//! let child = tree.push(TreeNode::new(NodeId::from(2), 1));
//! tree.nodes[root].child_groups[0].push(child);
//! tree.roots.push(root);
//!
//! let options = Options::default();
//! let layout = TreeLayout::new(&options).compute(&tree, &|_: &NodeId| Vec2::new(100.0, 40.0));
//! assert_eq!(layout.nodes.len(), 2);
//! ```

mod geometry;
mod sizes;
mod tree;

pub mod tidy;

pub use geometry::{Point, Rect, Vec2};
pub use sizes::NodeSizes;
pub use tree::{CrossLink, TreeNode, VisibleTree};

pub use tidy::{Layout, LayoutNode, Link, LinkKind, TreeLayout, EMPTY_STATE_SIZE};
