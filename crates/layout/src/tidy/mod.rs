mod columns;
mod links;
mod orient;
mod strips;

use crate::{NodeSizes, Point, Rect, Vec2, VisibleTree};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use stemma_data::{LayoutKind, NodeId, Options, SubtreeOptions};

/// Canvas reserved for a chart with nothing visible in it
pub const EMPTY_STATE_SIZE: Vec2 = Vec2 { x: 250.0, y: 120.0 };

/// What a routed link connects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkKind {
    /// Elbow from a child up to its parent or couple
    Parent,
    /// Tie between a node and the partner at its side
    Partner,
    /// Tie between an assistant and the trunk under its parent
    Assistant,
    /// Stub from a host node down to a hosted sub tree root
    SubtreeHost,
    /// Configured curved link
    Curved,
    /// Configured secondary link
    Secondary,
    /// Configured dotted line
    Dotted,
}

/// A routed link as a polyline in final coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub kind: LinkKind,
    pub from: NodeId,
    pub to: NodeId,
    pub points: Vec<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A placed node in final coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutNode {
    pub id: NodeId,
    #[serde(flatten)]
    pub rect: Rect,
    pub level: u32,
    /// Previous node on the same row, in reading order of the top-down
    /// frame
    pub left_neighbor: Option<NodeId>,
    /// Next node on the same row
    pub right_neighbor: Option<NodeId>,
}

/// A finished chart layout, origin at the top left corner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub nodes: Vec<LayoutNode>,
    pub links: Vec<Link>,
    pub size: Vec2,
}

impl Layout {
    pub fn node(&self, id: &NodeId) -> Option<&LayoutNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// True for the placeholder layout of a chart with nothing visible
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Spacing and algorithm resolved for one sub tree
#[derive(Debug, Clone)]
pub(crate) struct Params {
    pub layout: LayoutKind,
    pub level_separation: f64,
    pub sibling_separation: f64,
    pub subtree_separation: f64,
    pub mixed_separation: f64,
    pub mixed_threshold: usize,
    pub assistant_separation: f64,
    pub min_partner_separation: f64,
    pub partner_split_separation: f64,
    pub partner_separation: f64,
    pub padding: f64,
    pub columns: usize,
    /// Parents sit over the left edge of their children instead of the
    /// middle, used by the offset orientations
    pub align_left: bool,
}

impl Params {
    fn new(options: &Options) -> Self {
        Self {
            layout: options.layout,
            level_separation: options.level_separation,
            sibling_separation: options.sibling_separation,
            subtree_separation: options.subtree_separation,
            mixed_separation: options.mixed_hierarchy_nodes_separation,
            mixed_threshold: options.mixed_layout_threshold,
            assistant_separation: options.assistant_separation,
            min_partner_separation: options.min_partner_separation,
            partner_split_separation: options.partner_children_split_separation,
            partner_separation: options.partner_node_separation,
            padding: options.padding,
            columns: options.columns,
            align_left: options.orientation.is_offset(),
        }
    }

    pub(crate) fn with_overrides(&self, overrides: &SubtreeOptions) -> Self {
        let mut params = self.clone();
        if let Some(v) = overrides.layout {
            params.layout = v;
        }
        if let Some(v) = overrides.columns {
            params.columns = v;
        }
        if let Some(v) = overrides.level_separation {
            params.level_separation = v;
        }
        if let Some(v) = overrides.sibling_separation {
            params.sibling_separation = v;
        }
        if let Some(v) = overrides.subtree_separation {
            params.subtree_separation = v;
        }
        if let Some(v) = overrides.mixed_hierarchy_nodes_separation {
            params.mixed_separation = v;
        }
        if let Some(v) = overrides.orientation {
            params.align_left = v.is_offset();
        }
        params
    }
}

/// Working state shared by the placement and link passes
pub(crate) struct Placer<'a, S> {
    pub tree: &'a VisibleTree,
    pub sizes: &'a S,
    /// Final rectangle per arena index, in the top-down frame
    pub rects: Vec<Rect>,
    /// Routed links tagged with the node whose block owns them, so block
    /// translations can carry them along
    pub links: Vec<(usize, Link)>,
}

impl<'a, S> Placer<'a, S> {
    fn new(tree: &'a VisibleTree, sizes: &'a S) -> Self {
        Self {
            tree,
            sizes,
            rects: vec![Rect::default(); tree.nodes.len()],
            links: Vec::new(),
        }
    }
}

/// Family tree layout over a resolved [`VisibleTree`]
///
/// Stateless apart from the configuration: every call recomputes the whole
/// chart, which keeps the output a pure function of its input.
#[derive(Debug, Clone)]
pub struct TreeLayout<'a> {
    options: &'a Options,
}

impl<'a> TreeLayout<'a> {
    pub fn new(options: &'a Options) -> Self {
        Self { options }
    }

    /// Compute rectangles and links for the visible tree
    pub fn compute<S>(&self, tree: &VisibleTree, sizes: &S) -> Layout
    where
        S: NodeSizes<NodeId>,
    {
        if tree.is_empty() {
            return Layout {
                nodes: Vec::new(),
                links: Vec::new(),
                size: EMPTY_STATE_SIZE,
            };
        }

        let params = Params::new(self.options);
        let mut placer = Placer::new(tree, sizes);

        // Place every root tree as its own block, then tile the blocks
        let blocks: Vec<(usize, Rect)> = tree
            .roots
            .iter()
            .map(|&root| (root, placer.place(root, &params)))
            .collect();
        placer.grid_pack(&blocks, params.columns, params.subtree_separation);

        for &root in &tree.roots {
            placer.emit_links(root, &params);
        }
        placer.emit_cross_links();

        let neighbors = neighbor_map(tree, &placer.rects);
        self.finish(placer, neighbors)
    }

    /// Apply the orientation, shift everything to the positive quadrant
    /// and assemble the output
    fn finish<S>(
        &self,
        placer: Placer<'_, S>,
        neighbors: Vec<(Option<NodeId>, Option<NodeId>)>,
    ) -> Layout {
        let cardinal = orient::cardinal(self.options.orientation);
        let rects: Vec<Rect> = placer
            .rects
            .iter()
            .map(|&r| orient::rect(cardinal, r))
            .collect();
        let mut links: Vec<Link> = placer
            .links
            .into_iter()
            .map(|(_, mut link)| {
                for p in &mut link.points {
                    *p = orient::point(cardinal, *p);
                }
                link
            })
            .collect();

        let mut min = Point::new(f64::INFINITY, f64::INFINITY);
        let mut max = Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for r in &rects {
            min.x = min.x.min(r.left());
            min.y = min.y.min(r.top());
            max.x = max.x.max(r.right());
            max.y = max.y.max(r.bottom());
        }
        for link in &links {
            for p in &link.points {
                min.x = min.x.min(p.x);
                min.y = min.y.min(p.y);
                max.x = max.x.max(p.x);
                max.y = max.y.max(p.y);
            }
        }

        let shift = Vec2::new(-min.x, -min.y);
        for link in &mut links {
            for p in &mut link.points {
                p.x += shift.x;
                p.y += shift.y;
            }
        }
        let nodes = self
            .tree_nodes(&placer.tree.nodes, rects, shift, neighbors);
        Layout {
            nodes,
            links,
            size: Vec2::new(max.x - min.x, max.y - min.y),
        }
    }

    fn tree_nodes(
        &self,
        arena: &[crate::TreeNode],
        rects: Vec<Rect>,
        shift: Vec2,
        neighbors: Vec<(Option<NodeId>, Option<NodeId>)>,
    ) -> Vec<LayoutNode> {
        arena
            .iter()
            .zip(rects)
            .zip(neighbors)
            .map(|((node, mut rect), (left_neighbor, right_neighbor))| {
                rect.translate(shift);
                LayoutNode {
                    id: node.id.clone(),
                    rect,
                    level: node.level + node.sub_levels,
                    left_neighbor,
                    right_neighbor,
                }
            })
            .collect()
    }
}

/// Pair every node with the ones beside it on the same physical row
///
/// Rows are taken in the top-down frame before the orientation transform,
/// so the ordering stays the logical one whatever way the chart faces.
fn neighbor_map(
    tree: &VisibleTree,
    rects: &[Rect],
) -> Vec<(Option<NodeId>, Option<NodeId>)> {
    let mut rows: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (idx, rect) in rects.iter().enumerate() {
        rows.entry((rect.y * 10.0).round() as i64).or_default().push(idx);
    }

    let mut neighbors = vec![(None, None); tree.nodes.len()];
    for row in rows.values_mut() {
        row.sort_by(|&a, &b| {
            rects[a]
                .center()
                .x
                .partial_cmp(&rects[b].center().x)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        for window in row.windows(2) {
            let (left, right) = (window[0], window[1]);
            neighbors[right].0 = Some(tree.nodes[left].id.clone());
            neighbors[left].1 = Some(tree.nodes[right].id.clone());
        }
    }
    neighbors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TreeNode;
    use stemma_data::Orientation;
    use test_log::test;

    fn uniform(_: &NodeId) -> Vec2 {
        Vec2::new(100.0, 40.0)
    }

    fn family(children: usize) -> (VisibleTree, usize, Vec<usize>) {
        let mut tree = VisibleTree::default();
        let root = tree.push(TreeNode::new(NodeId::from(0), 0));
        tree.roots.push(root);
        let kids = (0..children)
            .map(|i| {
                let child = tree.push(TreeNode::new(NodeId::from(i as i64 + 1), 1));
                tree.nodes[root].child_groups[0].push(child);
                child
            })
            .collect();
        (tree, root, kids)
    }

    fn compute(tree: &VisibleTree, options: &Options) -> Layout {
        TreeLayout::new(options).compute(tree, &uniform)
    }

    #[test]
    fn parent_is_centered_over_its_children() {
        let (tree, _, _) = family(2);
        let layout = compute(&tree, &Options::default());

        let root = layout.node(&NodeId::from(0)).unwrap().rect;
        let a = layout.node(&NodeId::from(1)).unwrap().rect;
        let b = layout.node(&NodeId::from(2)).unwrap().rect;
        assert_eq!(root.center().x, (a.center().x + b.center().x) / 2.0);
        assert_eq!(b.left() - a.right(), 20.0);
        assert_eq!(a.top() - root.bottom(), 60.0);
        assert_eq!(layout.size, Vec2::new(220.0, 140.0));
    }

    #[test]
    fn non_leaf_neighbors_get_the_subtree_gap() {
        let (mut tree, _, kids) = family(3);
        let grandchild = tree.push(TreeNode::new(NodeId::from(10), 2));
        tree.nodes[kids[1]].child_groups[0].push(grandchild);
        let layout = compute(&tree, &Options::default());

        let a = layout.node(&NodeId::from(1)).unwrap().rect;
        let b = layout.node(&NodeId::from(2)).unwrap().rect;
        let c = layout.node(&NodeId::from(3)).unwrap().rect;
        assert_eq!(b.left() - a.right(), 40.0);
        assert_eq!(c.left() - b.right(), 40.0);
    }

    #[test]
    fn couple_makes_room_and_children_hang_from_the_midpoint() {
        let mut tree = VisibleTree::default();
        let root = tree.push(TreeNode::new(NodeId::from(1), 0));
        let partner = tree.push(TreeNode::new(NodeId::from(2), 0));
        let child = tree.push(TreeNode::new(NodeId::from(3), 1));
        tree.nodes[root].partners.push(partner);
        tree.nodes[root].child_groups = vec![vec![child], vec![]];
        tree.roots.push(root);
        let layout = compute(&tree, &Options::default());

        let base = layout.node(&NodeId::from(1)).unwrap().rect;
        let p = layout.node(&NodeId::from(2)).unwrap().rect;
        let c = layout.node(&NodeId::from(3)).unwrap().rect;
        assert_eq!(p.left() - base.right(), 50.0);
        assert_eq!(c.center().x, (base.center().x + p.center().x) / 2.0);

        let drop = layout
            .links
            .iter()
            .find(|l| l.kind == LinkKind::Parent)
            .unwrap();
        assert_eq!(drop.points.last().unwrap().x, (base.center().x + p.center().x) / 2.0);
        assert!(layout.links.iter().any(|l| l.kind == LinkKind::Partner));
    }

    #[test]
    fn left_orientation_swaps_the_extent() {
        let (tree, _, _) = family(1);
        let options = Options {
            orientation: Orientation::Left,
            ..Default::default()
        };
        let layout = compute(&tree, &options);

        assert_eq!(layout.size, Vec2::new(140.0, 100.0));
        let root = layout.node(&NodeId::from(0)).unwrap().rect;
        let child = layout.node(&NodeId::from(1)).unwrap().rect;
        assert!(child.left() > root.right());
        assert!(root.left() >= 0.0 && root.top() >= 0.0);
    }

    #[test]
    fn offset_orientation_left_aligns_parents() {
        let (tree, _, _) = family(2);
        let options = Options {
            orientation: Orientation::TopLeft,
            ..Default::default()
        };
        let layout = compute(&tree, &options);

        let root = layout.node(&NodeId::from(0)).unwrap().rect;
        let first = layout.node(&NodeId::from(1)).unwrap().rect;
        assert_eq!(root.left(), first.left());
    }

    #[test]
    fn extra_roots_tile_into_the_grid() {
        let mut tree = VisibleTree::default();
        for i in 0..3 {
            let root = tree.push(TreeNode::new(NodeId::from(i), 0));
            tree.roots.push(root);
        }
        let options = Options {
            columns: 2,
            ..Default::default()
        };
        let layout = compute(&tree, &options);

        let a = layout.node(&NodeId::from(0)).unwrap().rect;
        let b = layout.node(&NodeId::from(1)).unwrap().rect;
        let c = layout.node(&NodeId::from(2)).unwrap().rect;
        assert_eq!((a.left(), a.top()), (0.0, 0.0));
        assert_eq!((b.left(), b.top()), (140.0, 0.0));
        assert_eq!((c.left(), c.top()), (0.0, 80.0));
    }

    #[test]
    fn nothing_visible_yields_the_placeholder() {
        let layout = compute(&VisibleTree::default(), &Options::default());
        assert!(layout.is_empty());
        assert_eq!(layout.size, EMPTY_STATE_SIZE);
        assert!(layout.links.is_empty());
    }

    #[test]
    fn identical_input_yields_identical_output() {
        let (mut tree, _, kids) = family(3);
        let grandchild = tree.push(TreeNode::new(NodeId::from(9), 2));
        tree.nodes[kids[2]].child_groups[0].push(grandchild);
        let options = Options::default();
        assert_eq!(compute(&tree, &options), compute(&tree, &options));
    }

    #[test]
    fn mixed_layout_stacks_wide_leaf_fans() {
        let (tree, _, kids) = family(4);
        let options = Options {
            layout: LayoutKind::Mixed,
            mixed_layout_threshold: 2,
            ..Default::default()
        };
        let layout = compute(&tree, &options);

        let rects: Vec<Rect> = kids
            .iter()
            .map(|&k| layout.nodes[k].rect)
            .collect();
        assert!(rects.windows(2).all(|w| w[0].center().x == w[1].center().x));
        assert!(rects.windows(2).all(|w| w[1].top() - w[0].bottom() == 20.0));
    }

    #[test]
    fn mixed_layout_keeps_narrow_fans_in_a_row() {
        let (tree, _, kids) = family(2);
        let options = Options {
            layout: LayoutKind::Mixed,
            mixed_layout_threshold: 2,
            ..Default::default()
        };
        let layout = compute(&tree, &options);
        let a = layout.nodes[kids[0]].rect;
        let b = layout.nodes[kids[1]].rect;
        assert_eq!(a.top(), b.top());
    }

    #[test]
    fn tree_right_hangs_children_beside_the_trunk() {
        let (tree, root, kids) = family(2);
        let options = Options {
            layout: LayoutKind::TreeRight,
            ..Default::default()
        };
        let layout = compute(&tree, &options);

        let trunk = layout.nodes[root].rect.center().x;
        let a = layout.nodes[kids[0]].rect;
        let b = layout.nodes[kids[1]].rect;
        assert_eq!(a.left(), trunk + 20.0);
        assert_eq!(b.left(), trunk + 20.0);
        assert_eq!(b.top() - a.bottom(), 20.0);
    }

    #[test]
    fn assistants_take_their_own_band() {
        let (mut tree, root, kids) = family(1);
        let assistant = tree.push(TreeNode::new(NodeId::from(7), 1));
        tree.nodes[root].assistants.push(assistant);
        let layout = compute(&tree, &Options::default());

        let parent = layout.nodes[root].rect;
        let helper = layout.nodes[assistant].rect;
        let child = layout.nodes[kids[0]].rect;
        assert_eq!(helper.top() - parent.bottom(), 100.0);
        assert!(helper.left() > parent.center().x);
        assert!(child.top() >= helper.bottom() + 60.0);
        assert!(layout.links.iter().any(|l| l.kind == LinkKind::Assistant));
    }

    #[test]
    fn partner_assistants_hang_under_the_partner() {
        let mut tree = VisibleTree::default();
        let root = tree.push(TreeNode::new(NodeId::from(1), 0));
        let partner = tree.push(TreeNode::new(NodeId::from(2), 0));
        let helper = tree.push(TreeNode::new(NodeId::from(3), 1));
        let child = tree.push(TreeNode::new(NodeId::from(4), 1));
        tree.nodes[root].partners.push(partner);
        tree.nodes[root].child_groups = vec![vec![child], vec![]];
        tree.nodes[partner].assistants.push(helper);
        tree.roots.push(root);
        let layout = compute(&tree, &Options::default());

        let p = layout.nodes[partner].rect;
        let h = layout.nodes[helper].rect;
        let c = layout.nodes[child].rect;
        assert_eq!(h.top() - p.bottom(), 100.0);
        assert_eq!(h.left(), p.center().x + 20.0);
        // The child row clears the assistant band
        assert!(c.top() >= h.bottom() + 60.0);
        assert!(layout
            .links
            .iter()
            .any(|l| l.kind == LinkKind::Assistant && l.from == NodeId::from(2)));
    }

    #[test]
    fn partner_hosted_sub_tree_travels_with_its_box() {
        let mut tree = VisibleTree::default();
        let root = tree.push(TreeNode::new(NodeId::from(1), 0));
        let partner = tree.push(TreeNode::new(NodeId::from(2), 0));
        let hosted = tree.push(TreeNode::new(NodeId::from(3), 0));
        tree.nodes[root].partners.push(partner);
        tree.nodes[root].child_groups = vec![vec![], vec![]];
        tree.nodes[partner].subtree_roots.push(hosted);
        tree.roots.push(root);
        let layout = compute(&tree, &Options::default());

        let p = layout.nodes[partner].rect;
        let inner = layout.nodes[hosted].rect;
        assert_eq!(inner.size(), Vec2::new(100.0, 40.0));
        assert!(inner.left() >= p.left() && inner.right() <= p.right());
        assert!(inner.bottom() <= p.bottom());
        assert!(layout
            .links
            .iter()
            .any(|l| l.kind == LinkKind::SubtreeHost && l.from == NodeId::from(2)));
    }

    #[test]
    fn hosted_sub_tree_grows_the_host_box() {
        let mut tree = VisibleTree::default();
        let host = tree.push(TreeNode::new(NodeId::from(1), 0));
        let hosted = tree.push(TreeNode::new(NodeId::from(2), 0));
        tree.nodes[host].subtree_roots.push(hosted);
        tree.roots.push(host);
        let layout = compute(&tree, &Options::default());

        let host_rect = layout.nodes[host].rect;
        let hosted_rect = layout.nodes[hosted].rect;
        assert_eq!(host_rect.size(), Vec2::new(160.0, 140.0));
        assert!(hosted_rect.left() >= host_rect.left());
        assert!(hosted_rect.bottom() <= host_rect.bottom());
        assert!(layout
            .links
            .iter()
            .any(|l| l.kind == LinkKind::SubtreeHost));
    }

    #[test]
    fn neighbors_follow_the_row_order() {
        let (tree, _, kids) = family(3);
        let layout = compute(&tree, &Options::default());

        let middle = &layout.nodes[kids[1]];
        assert_eq!(middle.left_neighbor, Some(NodeId::from(1)));
        assert_eq!(middle.right_neighbor, Some(NodeId::from(3)));
        let first = &layout.nodes[kids[0]];
        assert_eq!(first.left_neighbor, None);
    }
}
