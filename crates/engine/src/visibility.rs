use crate::{Graph, GraphNode};
use indexmap::IndexSet;
use std::collections::HashMap;
use stemma_data::{CollapseDirective, NodeId, Options};
use tracing::warn;

/// Scope of a minimize or maximize call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    One(NodeId),
    All,
}

/// What a visibility operation did
///
/// `unknown` lists ids the graph does not contain; those are skipped with
/// a warning and never block the rest of the batch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VisibilityDelta {
    pub changed: Vec<NodeId>,
    pub unknown: Vec<NodeId>,
    /// Node to hold stationary in the resulting re-layout
    pub pivot: Option<NodeId>,
}

/// Collapse and minimize flags, keyed by node id
///
/// Fully derived state: it holds nothing the graph and the configuration
/// do not already know, so it can be discarded and rebuilt from
/// [`from_options`](Self::from_options) at any time.
///
/// `collapsed` hides a node's children (and everything under them) while
/// the node itself stays visible; `minimized` additionally hides the
/// node's hosted sub tree container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibilityState {
    collapsed: IndexSet<NodeId>,
    minimized: IndexSet<NodeId>,
}

impl VisibilityState {
    /// Initial state for a freshly loaded graph
    ///
    /// Applied in order: the level directive, sub tree collapse directives
    /// from tag configuration, the per-tag collapsed override
    /// (most-specific-wins), and the expand directive last.
    pub fn from_options(graph: &Graph, options: &Options) -> Self {
        let mut state = Self::default();

        if let Some(directive) = &options.collapse {
            for node in graph.iter() {
                if level_collapsed(node.level, directive) {
                    state.collapsed.insert(node.id().clone());
                }
            }
        }

        // Sub tree collapse directives count levels from the hosted root
        for node in graph.iter() {
            let Some(directive) = options
                .subtree_config_for(&node.record.tags)
                .and_then(|c| c.collapse)
            else {
                continue;
            };
            for root in &node.subtree_children_ids {
                state.apply_subtree_directive(graph, root, &directive);
            }
        }

        for node in graph.iter() {
            match options.collapsed_override_for(&node.record.tags) {
                Some(true) => {
                    state.collapsed.insert(node.id().clone());
                }
                Some(false) => {
                    state.collapsed.shift_remove(node.id());
                }
                None => {}
            }
        }

        if let Some(directive) = &options.expand {
            for id in &directive.nodes {
                state.collapsed.shift_remove(id);
                if directive.all_children {
                    for descendant in graph.descendant_ids(id) {
                        state.collapsed.shift_remove(&descendant);
                    }
                }
            }
        }

        if options.min {
            state.minimized = graph.iter().map(|node| node.id().clone()).collect();
        }
        state
    }

    fn apply_subtree_directive(
        &mut self,
        graph: &Graph,
        root: &NodeId,
        directive: &CollapseDirective,
    ) {
        let mut pending = vec![root.clone()];
        while let Some(id) = pending.pop() {
            if let Some(node) = graph.get(&id) {
                if level_collapsed(node.level, directive) {
                    self.collapsed.insert(id.clone());
                }
                pending.extend(node.children_ids.iter().cloned());
                pending.extend(node.partner_ids.iter().cloned());
            }
        }
    }

    pub fn is_collapsed(&self, id: &NodeId) -> bool {
        self.collapsed.contains(id)
    }

    pub fn is_minimized(&self, id: &NodeId) -> bool {
        self.minimized.contains(id)
    }

    /// Reveal the children of each listed node
    pub fn expand(&mut self, graph: &Graph, pivot: Option<NodeId>, ids: &[NodeId]) -> VisibilityDelta {
        self.apply(graph, pivot, ids, &[])
    }

    /// Hide the children of each listed node
    pub fn collapse(
        &mut self,
        graph: &Graph,
        pivot: Option<NodeId>,
        ids: &[NodeId],
    ) -> VisibilityDelta {
        self.apply(graph, pivot, &[], ids)
    }

    /// Apply both sets atomically; an id listed in both collapses, the
    /// conservative outcome
    pub fn expand_collapse(
        &mut self,
        graph: &Graph,
        pivot: Option<NodeId>,
        expand_ids: &[NodeId],
        collapse_ids: &[NodeId],
    ) -> VisibilityDelta {
        self.apply(graph, pivot, expand_ids, collapse_ids)
    }

    fn apply(
        &mut self,
        graph: &Graph,
        pivot: Option<NodeId>,
        expand_ids: &[NodeId],
        collapse_ids: &[NodeId],
    ) -> VisibilityDelta {
        let mut delta = VisibilityDelta {
            pivot,
            ..Default::default()
        };
        for id in expand_ids {
            if collapse_ids.contains(id) {
                continue;
            }
            if !self.check_known(graph, id, &mut delta) {
                continue;
            }
            if self.collapsed.shift_remove(id) {
                delta.changed.push(id.clone());
            }
        }
        for id in collapse_ids {
            if !self.check_known(graph, id, &mut delta) {
                continue;
            }
            if self.collapsed.insert(id.clone()) {
                delta.changed.push(id.clone());
            }
        }
        delta
    }

    /// Hide the hosted sub tree container of the target node(s)
    pub fn minimize(&mut self, graph: &Graph, target: Target) -> VisibilityDelta {
        self.set_minimized(graph, target, true)
    }

    /// Reveal the hosted sub tree container of the target node(s)
    pub fn maximize(&mut self, graph: &Graph, target: Target) -> VisibilityDelta {
        self.set_minimized(graph, target, false)
    }

    fn set_minimized(&mut self, graph: &Graph, target: Target, minimized: bool) -> VisibilityDelta {
        let mut delta = VisibilityDelta::default();
        let ids: Vec<NodeId> = match target {
            Target::One(id) => vec![id],
            Target::All => graph.iter().map(|node| node.id().clone()).collect(),
        };
        for id in ids {
            if !self.check_known(graph, &id, &mut delta) {
                continue;
            }
            let changed = if minimized {
                self.minimized.insert(id.clone())
            } else {
                self.minimized.shift_remove(&id)
            };
            if changed {
                delta.changed.push(id);
            }
        }
        delta
    }

    fn check_known(&self, graph: &Graph, id: &NodeId, delta: &mut VisibilityDelta) -> bool {
        if graph.get(id).is_some() {
            true
        } else {
            warn!(%id, "visibility operation references an unknown id, skipped");
            delta.unknown.push(id.clone());
            false
        }
    }

    /// The ids currently visible, recomputed from scratch
    ///
    /// A node is visible iff nothing along its attachment chain hides it:
    /// a collapsed ancestor hides children, a minimized host hides its
    /// sub tree roots, and a partner follows its base node.
    pub fn visible_set(&self, graph: &Graph) -> IndexSet<NodeId> {
        let mut memo: HashMap<NodeId, bool> = HashMap::new();
        graph
            .iter()
            .filter(|node| self.visible(graph, node, &mut memo))
            .map(|node| node.id().clone())
            .collect()
    }

    fn visible(&self, graph: &Graph, node: &GraphNode, memo: &mut HashMap<NodeId, bool>) -> bool {
        if let Some(&cached) = memo.get(node.id()) {
            return cached;
        }
        let result = if let Some(base) = &node.partner_of_id {
            graph
                .get(base)
                .is_some_and(|base| self.visible(graph, base, memo))
        } else if let Some(parent) = &node.parent_id {
            graph.get(parent).is_some_and(|parent| {
                // A collapsed couple hides the children of both members
                let couple_collapsed = self.collapsed.contains(parent.id())
                    || parent
                        .partner_of_id
                        .as_ref()
                        .is_some_and(|base| self.collapsed.contains(base));
                !couple_collapsed && self.visible(graph, parent, memo)
            })
        } else if let Some(host) = &node.subtree_parent_id {
            graph.get(host).is_some_and(|host| {
                !self.minimized.contains(host.id()) && self.visible(graph, host, memo)
            })
        } else {
            true
        };
        memo.insert(node.id().clone(), result);
        result
    }

    /// Collapsed ids within the subtree under `id`
    pub fn collapsed_ids_under(&self, graph: &Graph, id: &NodeId) -> Vec<NodeId> {
        graph
            .descendant_ids(id)
            .into_iter()
            .filter(|descendant| self.collapsed.contains(descendant))
            .collect()
    }

    /// Snapshot accessors for view state persistence
    pub fn collapsed_ids(&self) -> Vec<NodeId> {
        self.collapsed.iter().cloned().collect()
    }

    pub fn minimized_ids(&self) -> Vec<NodeId> {
        self.minimized.iter().cloned().collect()
    }

    /// Rebuild from a persisted snapshot
    pub fn restore(collapsed: Vec<NodeId>, minimized: Vec<NodeId>) -> Self {
        Self {
            collapsed: collapsed.into_iter().collect(),
            minimized: minimized.into_iter().collect(),
        }
    }
}

/// The level directive counts rows 1-based, the root row is level 1
fn level_collapsed(level: u32, directive: &CollapseDirective) -> bool {
    let row = level + 1;
    row == directive.level || (directive.all_children && row > directive.level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stemma_data::{ExpandDirective, NodeRecord, TagOptions};
    use test_log::test;

    fn chain(depth: i64) -> Graph {
        let mut graph = Graph::default();
        let records = (1..=depth)
            .map(|n| {
                if n == 1 {
                    NodeRecord::new(n)
                } else {
                    NodeRecord::new(n).parent(n - 1)
                }
            })
            .collect::<Vec<_>>();
        graph.load(records).unwrap();
        graph
    }

    fn ids(set: &IndexSet<NodeId>) -> Vec<i64> {
        set.iter()
            .map(|id| match id {
                NodeId::Int(n) => *n,
                NodeId::Str(_) => panic!("numeric ids only in these tests"),
            })
            .collect()
    }

    #[test]
    fn everything_visible_without_directives() {
        let graph = chain(4);
        let state = VisibilityState::from_options(&graph, &Options::default());
        assert_eq!(ids(&state.visible_set(&graph)), vec![1, 2, 3, 4]);
    }

    #[test]
    fn level_directive_cuts_the_tree_at_that_row() {
        let graph = chain(5);
        let options = Options {
            collapse: Some(CollapseDirective {
                level: 2,
                all_children: false,
            }),
            ..Default::default()
        };
        let state = VisibilityState::from_options(&graph, &options);
        // Row 2 is node 2; its children and everything deeper are hidden
        assert_eq!(ids(&state.visible_set(&graph)), vec![1, 2]);
        assert!(state.is_collapsed(&NodeId::from(2)));
        assert!(!state.is_collapsed(&NodeId::from(3)));
    }

    #[test]
    fn all_children_keeps_deeper_levels_collapsed() {
        let graph = chain(5);
        let options = Options {
            collapse: Some(CollapseDirective {
                level: 2,
                all_children: true,
            }),
            ..Default::default()
        };
        let mut state = VisibilityState::from_options(&graph, &options);
        // Expanding node 2 reveals node 3, which is itself still collapsed
        state.expand(&graph, None, &[NodeId::from(2)]);
        assert_eq!(ids(&state.visible_set(&graph)), vec![1, 2, 3]);
    }

    #[test]
    fn tag_override_beats_the_level_directive() {
        let mut graph = Graph::default();
        graph
            .load(vec![
                NodeRecord::new(1),
                NodeRecord::new(2).parent(1).tag("open"),
                NodeRecord::new(3).parent(2),
            ])
            .unwrap();
        let options = Options {
            collapse: Some(CollapseDirective {
                level: 2,
                all_children: true,
            }),
            tags: [(
                "open".to_string(),
                TagOptions {
                    collapsed: Some(false),
                    ..Default::default()
                },
            )]
            .into(),
            ..Default::default()
        };
        let state = VisibilityState::from_options(&graph, &options);
        assert_eq!(ids(&state.visible_set(&graph)), vec![1, 2, 3]);
    }

    #[test]
    fn expand_directive_wins_last() {
        let graph = chain(4);
        let options = Options {
            collapse: Some(CollapseDirective {
                level: 1,
                all_children: true,
            }),
            expand: Some(ExpandDirective {
                nodes: vec![NodeId::from(1)],
                all_children: true,
            }),
            ..Default::default()
        };
        let state = VisibilityState::from_options(&graph, &options);
        assert_eq!(ids(&state.visible_set(&graph)), vec![1, 2, 3, 4]);
    }

    #[test]
    fn collapse_is_idempotent() {
        let graph = chain(3);
        let mut state = VisibilityState::default();
        let first = state.collapse(&graph, Some(NodeId::from(1)), &[NodeId::from(1)]);
        assert_eq!(first.changed, vec![NodeId::from(1)]);
        assert_eq!(first.pivot, Some(NodeId::from(1)));
        let again = state.collapse(&graph, Some(NodeId::from(1)), &[NodeId::from(1)]);
        assert!(again.changed.is_empty());
        assert_eq!(ids(&state.visible_set(&graph)), vec![1]);
    }

    #[test]
    fn collapse_wins_when_an_id_appears_in_both_lists() {
        let graph = chain(3);
        let mut state = VisibilityState::default();
        state.collapse(&graph, None, &[NodeId::from(2)]);
        let delta = state.expand_collapse(
            &graph,
            None,
            &[NodeId::from(1), NodeId::from(2)],
            &[NodeId::from(2)],
        );
        assert_eq!(delta.changed, Vec::<NodeId>::new());
        assert!(state.is_collapsed(&NodeId::from(2)));
        assert!(!state.is_collapsed(&NodeId::from(1)));
    }

    #[test]
    fn unknown_ids_warn_without_blocking_the_batch() {
        let graph = chain(2);
        let mut state = VisibilityState::default();
        let delta = state.collapse(&graph, None, &[NodeId::from(99), NodeId::from(1)]);
        assert_eq!(delta.unknown, vec![NodeId::from(99)]);
        assert_eq!(delta.changed, vec![NodeId::from(1)]);
    }

    #[test]
    fn partner_follows_its_base_node() {
        let mut graph = Graph::default();
        graph
            .load(vec![
                NodeRecord::new(1),
                NodeRecord::new(2).parent(1),
                NodeRecord::new(3).partner_of(2),
                NodeRecord::new(4).parent(3),
            ])
            .unwrap();
        let mut state = VisibilityState::default();
        state.collapse(&graph, None, &[NodeId::from(1)]);
        // Node 2 is hidden, so its partner and the partner's child go too
        assert_eq!(ids(&state.visible_set(&graph)), vec![1]);
    }

    #[test]
    fn collapsed_base_hides_the_partners_children() {
        let mut graph = Graph::default();
        graph
            .load(vec![
                NodeRecord::new(1),
                NodeRecord::new(2).partner_of(1),
                NodeRecord::new(3).parent(2),
            ])
            .unwrap();
        let mut state = VisibilityState::default();
        state.collapse(&graph, None, &[NodeId::from(1)]);
        assert_eq!(ids(&state.visible_set(&graph)), vec![1, 2]);
    }

    #[test]
    fn minimized_host_hides_its_sub_tree_but_not_its_children() {
        let mut graph = Graph::default();
        graph
            .load(vec![
                NodeRecord::new(1),
                NodeRecord::new(2).parent(1),
                NodeRecord::new(3).in_subtree_of(1),
            ])
            .unwrap();
        let mut state = VisibilityState::default();
        state.minimize(&graph, Target::One(NodeId::from(1)));
        assert_eq!(ids(&state.visible_set(&graph)), vec![1, 2]);
        state.maximize(&graph, Target::All);
        assert_eq!(ids(&state.visible_set(&graph)), vec![1, 2, 3]);
    }

    #[test]
    fn min_option_starts_everything_minimized() {
        let mut graph = Graph::default();
        graph
            .load(vec![NodeRecord::new(1), NodeRecord::new(2).in_subtree_of(1)])
            .unwrap();
        let options = Options {
            min: true,
            ..Default::default()
        };
        let state = VisibilityState::from_options(&graph, &options);
        assert!(state.is_minimized(&NodeId::from(1)));
        assert_eq!(ids(&state.visible_set(&graph)), vec![1]);
    }

    #[test]
    fn snapshot_restores_the_same_visible_set() {
        let graph = chain(4);
        let mut state = VisibilityState::default();
        state.collapse(&graph, None, &[NodeId::from(2)]);
        state.minimize(&graph, Target::One(NodeId::from(1)));
        let restored = VisibilityState::restore(state.collapsed_ids(), state.minimized_ids());
        assert_eq!(restored.visible_set(&graph), state.visible_set(&graph));
    }
}
