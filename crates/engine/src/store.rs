use crate::EngineEvent;
use indexmap::{map::Entry, IndexMap, IndexSet};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use stemma_data::{NodeId, NodeRecord, ASSISTANT_TAG};
use thiserror::Error;
use tracing::{debug, warn};

/// A mutation the graph store refused
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("a record with id {0} already exists")]
    DuplicateId(NodeId),
    #[error("no record with id {0}")]
    NotFound(NodeId),
    #[error("node {id} still anchors {dependents} partner or assistant node(s), detach them first")]
    CannotRemove { id: NodeId, dependents: usize },
    #[error("the attachment chain through {0} is cyclic")]
    CyclicGraph(NodeId),
}

/// A node record with its relationships resolved against the store
///
/// The resolved reference fields mirror the record's own after dangling
/// and conflicting references have been cleared; the list fields are the
/// reverse direction, kept in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub record: NodeRecord,
    pub parent_id: Option<NodeId>,
    pub partner_of_id: Option<NodeId>,
    pub subtree_parent_id: Option<NodeId>,
    pub children_ids: Vec<NodeId>,
    pub subtree_children_ids: Vec<NodeId>,
    pub partner_ids: Vec<NodeId>,
    pub is_assistant: bool,
    /// Depth within the node's own tree; hosted sub tree roots restart at
    /// zero, partners sit on their base node's level
    pub level: u32,
}

impl GraphNode {
    fn new(record: NodeRecord) -> Self {
        Self {
            record,
            parent_id: None,
            partner_of_id: None,
            subtree_parent_id: None,
            children_ids: Vec::new(),
            subtree_children_ids: Vec::new(),
            partner_ids: Vec::new(),
            is_assistant: false,
            level: 0,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.record.id
    }

    pub fn is_partner(&self) -> bool {
        self.partner_of_id.is_some()
    }

    /// Whether the node starts a tree of its own
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none() && self.partner_of_id.is_none() && self.subtree_parent_id.is_none()
    }
}

/// What a successful [`Graph::remove`] did
///
/// `reparented` lists every former child or sub tree child together with
/// its new anchor, `None` meaning it became a root.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovalPlan {
    pub removed: NodeRecord,
    pub reparented: Vec<(NodeId, Option<NodeId>)>,
}

/// The canonical node set, an arena keyed by id
///
/// All relationships are id lookups into the arena, never owning
/// pointers, so removal stays a plain data operation. Insertion order is
/// preserved and doubles as the default sibling and root order.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: IndexMap<NodeId, GraphNode>,
    assistant_tags: Vec<String>,
    generation: u64,
    next_id: i64,
    warnings: Vec<EngineEvent>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Graph {
    /// An empty graph; `assistant_tags` are the tags that put nodes on
    /// the assistant band (the literal `assistant` tag is implied)
    pub fn new(mut assistant_tags: Vec<String>) -> Self {
        if !assistant_tags.iter().any(|t| t == ASSISTANT_TAG) {
            assistant_tags.push(ASSISTANT_TAG.to_string());
        }
        Self {
            nodes: IndexMap::new(),
            assistant_tags,
            generation: 0,
            next_id: 1,
            warnings: Vec::new(),
        }
    }

    /// Replace the entire node set
    ///
    /// Individual dangling references are repaired with a warning; a
    /// duplicate id or a cyclic attachment chain rejects the whole load
    /// and leaves the previous content untouched.
    pub fn load(
        &mut self,
        records: impl IntoIterator<Item = NodeRecord>,
    ) -> Result<(), StoreError> {
        let mut nodes = IndexMap::new();
        for record in records {
            match nodes.entry(record.id.clone()) {
                Entry::Occupied(entry) => {
                    return Err(StoreError::DuplicateId(entry.key().clone()))
                }
                Entry::Vacant(entry) => {
                    entry.insert(GraphNode::new(record));
                }
            }
        }

        let mut warnings = Vec::new();
        resolve(&mut nodes, &self.assistant_tags, &mut warnings)?;
        debug!(nodes = nodes.len(), warnings = warnings.len(), "graph loaded");

        self.nodes = nodes;
        self.warnings.extend(warnings);
        self.bump_generation();
        Ok(())
    }

    /// Insert one node
    pub fn add(&mut self, record: NodeRecord) -> Result<&GraphNode, StoreError> {
        let id = record.id.clone();
        if self.nodes.contains_key(&id) {
            return Err(StoreError::DuplicateId(id));
        }

        let mut node = GraphNode::new(record);
        validate_refs(&mut node, &self.nodes, &mut self.warnings);
        mark_assistant(&mut node, &self.assistant_tags);
        self.nodes.insert(id.clone(), node);
        self.attach(&id);
        self.relevel(&id);

        self.warnings.push(EngineEvent::NodeAdded { id: id.clone() });
        self.bump_generation();
        Ok(&self.nodes[&id])
    }

    /// Replace the fields of an existing node
    ///
    /// A change to a relationship field re-resolves the affected edges
    /// only; everything else is a plain record swap.
    pub fn update(&mut self, record: NodeRecord) -> Result<&GraphNode, StoreError> {
        let id = record.id.clone();
        let Some(existing) = self.nodes.get(&id) else {
            return Err(StoreError::NotFound(id));
        };

        let rel_changed = existing.record.parent_id != record.parent_id
            || existing.record.partner_parent_id != record.partner_parent_id
            || existing.record.subtree_parent_id != record.subtree_parent_id;

        if rel_changed {
            // Moving the node under its own descendant would close a
            // cycle; check against the current graph before touching it
            let descendants: IndexSet<NodeId> = self.descendant_ids(&id).into_iter().collect();
            for target in [
                &record.parent_id,
                &record.partner_parent_id,
                &record.subtree_parent_id,
            ]
            .into_iter()
            .flatten()
            {
                if target == &id || descendants.contains(target) {
                    return Err(StoreError::CyclicGraph(id));
                }
            }
            self.detach(&id);
        }

        self.nodes[&id].record = record;
        if rel_changed {
            let mut node = self.nodes[&id].clone();
            validate_refs(&mut node, &self.nodes, &mut self.warnings);
            mark_assistant(&mut node, &self.assistant_tags);
            self.nodes[&id] = node;
            self.attach(&id);
            self.relevel(&id);
        } else {
            let node = &mut self.nodes[&id];
            mark_assistant(node, &self.assistant_tags);
        }

        self.warnings.push(EngineEvent::NodeUpdated { id: id.clone() });
        self.bump_generation();
        Ok(&self.nodes[&id])
    }

    /// Whether [`remove`](Self::remove) would succeed for this id
    pub fn can_remove(&self, id: &NodeId) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|node| self.dependents_of(node) == 0)
    }

    /// Remove one node, cascading its children to its own anchor
    ///
    /// Partners and assistant children block removal; the caller must
    /// detach them first. On failure the graph is untouched.
    pub fn remove(&mut self, id: &NodeId) -> Result<RemovalPlan, StoreError> {
        let Some(node) = self.nodes.get(id) else {
            return Err(StoreError::NotFound(id.clone()));
        };
        let dependents = self.dependents_of(node);
        if dependents > 0 {
            return Err(StoreError::CannotRemove {
                id: id.clone(),
                dependents,
            });
        }

        // Children fall back to the removed node's own anchor: its parent,
        // or its base node when the removed node was a partner
        let fallback = node.parent_id.clone().or_else(|| node.partner_of_id.clone());
        let children = node.children_ids.clone();
        let subtree_children = node.subtree_children_ids.clone();

        self.detach(id);
        let removed = match self.nodes.shift_remove(id) {
            Some(node) => node.record,
            None => return Err(StoreError::NotFound(id.clone())),
        };

        let mut reparented = Vec::new();
        for child in children {
            if let Some(node) = self.nodes.get_mut(&child) {
                node.parent_id = fallback.clone();
                node.record.parent_id = fallback.clone();
            }
            reparented.push((child.clone(), fallback.clone()));
            self.attach(&child);
            self.relevel(&child);
        }
        for child in subtree_children {
            if let Some(node) = self.nodes.get_mut(&child) {
                node.subtree_parent_id = fallback.clone();
                node.record.subtree_parent_id = fallback.clone();
            }
            reparented.push((child.clone(), fallback.clone()));
            self.attach(&child);
            self.relevel(&child);
        }

        self.warnings.push(EngineEvent::NodeRemoved { id: id.clone() });
        self.bump_generation();
        Ok(RemovalPlan {
            removed,
            reparented,
        })
    }

    pub fn get(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of every tree-starting node, in insertion order
    pub fn root_ids(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|node| node.is_root())
            .map(|node| node.id().clone())
            .collect()
    }

    /// The records as they would be exported, resolved references included
    pub fn records(&self) -> Vec<NodeRecord> {
        self.nodes.values().map(|node| node.record.clone()).collect()
    }

    /// The records of `id` and everything attached beneath it, for
    /// subtree export
    pub fn subtree_records(&self, id: &NodeId) -> Vec<NodeRecord> {
        let mut records = Vec::new();
        if let Some(node) = self.nodes.get(id) {
            records.push(node.record.clone());
            for child in self.descendant_ids(id) {
                if let Some(node) = self.nodes.get(&child) {
                    records.push(node.record.clone());
                }
            }
        }
        records
    }

    /// Every id attached beneath `id`: children, partners, sub trees
    pub fn descendant_ids(&self, id: &NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut pending = vec![id.clone()];
        while let Some(current) = pending.pop() {
            if let Some(node) = self.nodes.get(&current) {
                for next in node
                    .children_ids
                    .iter()
                    .chain(&node.partner_ids)
                    .chain(&node.subtree_children_ids)
                {
                    found.push(next.clone());
                    pending.push(next.clone());
                }
            }
        }
        found
    }

    pub fn children_count(&self, id: &NodeId) -> usize {
        self.nodes.get(id).map_or(0, |node| node.children_ids.len())
    }

    /// Children, grandchildren and so on, partners and sub trees included
    pub fn children_total_count(&self, id: &NodeId) -> usize {
        self.descendant_ids(id).len()
    }

    /// The root of the tree `id` belongs to, following every attachment
    /// kind upward
    pub fn root_of(&self, id: &NodeId) -> Option<NodeId> {
        let mut current = self.nodes.get(id)?;
        loop {
            let up = current
                .parent_id
                .as_ref()
                .or(current.partner_of_id.as_ref())
                .or(current.subtree_parent_id.as_ref());
            match up.and_then(|next| self.nodes.get(next)) {
                Some(next) => current = next,
                None => return Some(current.id().clone()),
            }
        }
    }

    /// An id distinct from every id currently in the store and from every
    /// id this method returned before
    pub fn generate_id(&mut self) -> NodeId {
        loop {
            let candidate = NodeId::Int(self.next_id);
            self.next_id += 1;
            if !self.nodes.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Monotonic change counter; moves on every successful mutation and
    /// keys the search index and layout caches
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Warnings queued since the last drain
    pub fn drain_warnings(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.warnings)
    }

    fn bump_generation(&mut self) {
        self.generation += 1;
        for node in self.nodes.values() {
            if let NodeId::Int(n) = node.id() {
                self.next_id = self.next_id.max(n + 1);
            }
        }
    }

    fn dependents_of(&self, node: &GraphNode) -> usize {
        let assistants = node
            .children_ids
            .iter()
            .filter(|child| self.nodes.get(*child).is_some_and(|c| c.is_assistant))
            .count();
        node.partner_ids.len() + assistants
    }

    /// Register `id` in the reverse lists of its resolved references
    fn attach(&mut self, id: &NodeId) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let (parent, base, host) = (
            node.parent_id.clone(),
            node.partner_of_id.clone(),
            node.subtree_parent_id.clone(),
        );
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            if !parent.children_ids.contains(id) {
                parent.children_ids.push(id.clone());
            }
        }
        if let Some(base) = base.and_then(|b| self.nodes.get_mut(&b)) {
            if !base.partner_ids.contains(id) {
                base.partner_ids.push(id.clone());
            }
        }
        if let Some(host) = host.and_then(|h| self.nodes.get_mut(&h)) {
            if !host.subtree_children_ids.contains(id) {
                host.subtree_children_ids.push(id.clone());
            }
        }
    }

    /// Drop `id` from every reverse list
    fn detach(&mut self, id: &NodeId) {
        for node in self.nodes.values_mut() {
            node.children_ids.retain(|c| c != id);
            node.partner_ids.retain(|c| c != id);
            node.subtree_children_ids.retain(|c| c != id);
        }
    }

    /// Recompute the levels of `id` and its attached subtree
    fn relevel(&mut self, id: &NodeId) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let level = match (&node.parent_id, &node.partner_of_id) {
            (Some(parent), _) => self.nodes.get(parent).map_or(0, |p| p.level + 1),
            (None, Some(base)) => self.nodes.get(base).map_or(0, |b| b.level),
            // Roots and hosted sub tree roots both restart at zero
            (None, None) => 0,
        };
        self.nodes[id].level = level;

        let mut pending = vec![(id.clone(), level)];
        while let Some((current, level)) = pending.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            let children = node.children_ids.clone();
            let partners = node.partner_ids.clone();
            for child in children {
                if let Some(node) = self.nodes.get_mut(&child) {
                    node.level = level + 1;
                }
                pending.push((child, level + 1));
            }
            for partner in partners {
                if let Some(node) = self.nodes.get_mut(&partner) {
                    node.level = level;
                }
                pending.push((partner, level));
            }
            // Hosted sub trees keep their own zero-based levels
        }
    }
}

/// Rebuild every derived field from the records, in place
///
/// Clears dangling and conflicting references (queueing warnings), builds
/// the reverse lists in insertion order, rejects cyclic attachment chains
/// and assigns levels.
fn resolve(
    nodes: &mut IndexMap<NodeId, GraphNode>,
    assistant_tags: &[String],
    warnings: &mut Vec<EngineEvent>,
) -> Result<(), StoreError> {
    let ids: IndexSet<NodeId> = nodes.keys().cloned().collect();

    // Reference validation, one node at a time against the id set
    for node in nodes.values_mut() {
        node.parent_id = node.record.parent_id.clone();
        node.partner_of_id = node.record.partner_parent_id.clone();
        node.subtree_parent_id = node.record.subtree_parent_id.clone();
        node.children_ids.clear();
        node.partner_ids.clear();
        node.subtree_children_ids.clear();
        clear_invalid_refs(node, &ids, warnings);
        mark_assistant(node, assistant_tags);
    }

    // A partner cannot anchor another partner; with the snapshot taken
    // before clearing, chains collapse onto their base in one pass
    let partnered: IndexSet<NodeId> = nodes
        .values()
        .filter(|n| n.partner_of_id.is_some())
        .map(|n| n.id().clone())
        .collect();
    for node in nodes.values_mut() {
        if let Some(base) = &node.partner_of_id {
            if partnered.contains(base) {
                warn!(id = %node.id(), "partner reference targets another partner, cleared");
                warnings.push(EngineEvent::DanglingReference {
                    id: node.id().clone(),
                    field: "ppid",
                });
                node.partner_of_id = None;
                node.record.partner_parent_id = None;
            }
        }
    }

    // Reverse lists, in insertion order
    let refs: Vec<(NodeId, Option<NodeId>, Option<NodeId>, Option<NodeId>)> = nodes
        .values()
        .map(|n| {
            (
                n.id().clone(),
                n.parent_id.clone(),
                n.partner_of_id.clone(),
                n.subtree_parent_id.clone(),
            )
        })
        .collect();
    for (id, parent, base, host) in &refs {
        if let Some(node) = parent.as_ref().and_then(|p| nodes.get_mut(p)) {
            node.children_ids.push(id.clone());
        }
        if let Some(node) = base.as_ref().and_then(|b| nodes.get_mut(b)) {
            node.partner_ids.push(id.clone());
        }
        if let Some(node) = host.as_ref().and_then(|h| nodes.get_mut(h)) {
            node.subtree_children_ids.push(id.clone());
        }
    }

    // Attachment edges must form a forest; cycles are fatal here, never
    // deferred to layout time
    let mut dag = DiGraphMap::<usize, ()>::new();
    for index in 0..nodes.len() {
        dag.add_node(index);
    }
    for (index, (_, parent, base, host)) in refs.iter().enumerate() {
        for anchor in [parent, base, host].into_iter().flatten() {
            if let Some(from) = nodes.get_index_of(anchor) {
                dag.add_edge(from, index, ());
            }
        }
    }
    let order = toposort(&dag, None).map_err(|cycle| {
        let id = nodes
            .get_index(cycle.node_id())
            .map(|(id, _)| id.clone())
            .unwrap_or_else(|| NodeId::Int(-1));
        StoreError::CyclicGraph(id)
    })?;

    // Levels top-down: anchors come before their dependents in the order
    for index in order {
        let Some((_, node)) = nodes.get_index(index) else {
            continue;
        };
        let level = if let Some(parent) = &node.parent_id {
            nodes.get(parent).map_or(0, |p| p.level + 1)
        } else if let Some(base) = &node.partner_of_id {
            nodes.get(base).map_or(0, |b| b.level)
        } else {
            0
        };
        if let Some((_, node)) = nodes.get_index_mut(index) {
            node.level = level;
        }
    }
    Ok(())
}

/// Validate the references of a single node against the live graph
///
/// Used by `add` and `update`, where a full [`resolve`] pass would redo
/// work nothing else needs.
fn validate_refs(
    node: &mut GraphNode,
    nodes: &IndexMap<NodeId, GraphNode>,
    warnings: &mut Vec<EngineEvent>,
) {
    let ids: IndexSet<NodeId> = nodes.keys().cloned().collect();
    node.parent_id = node.record.parent_id.clone();
    node.partner_of_id = node.record.partner_parent_id.clone();
    node.subtree_parent_id = node.record.subtree_parent_id.clone();
    clear_invalid_refs(node, &ids, warnings);

    if let Some(base) = &node.partner_of_id {
        if nodes.get(base).is_some_and(GraphNode::is_partner) {
            warn!(id = %node.id(), "partner reference targets another partner, cleared");
            warnings.push(EngineEvent::DanglingReference {
                id: node.id().clone(),
                field: "ppid",
            });
            node.partner_of_id = None;
            node.record.partner_parent_id = None;
        }
    }
}

/// Clear references that do not resolve, pointing at the node itself, or
/// competing with a stronger attachment
fn clear_invalid_refs(
    node: &mut GraphNode,
    ids: &IndexSet<NodeId>,
    warnings: &mut Vec<EngineEvent>,
) {
    let id = node.record.id.clone();
    let mut dangling = |reference: &mut Option<NodeId>, field: &'static str| {
        if let Some(target) = reference {
            if target == &id || !ids.contains(target) {
                warn!(id = %id, field, "reference does not resolve, node treated as root");
                warnings.push(EngineEvent::DanglingReference {
                    id: id.clone(),
                    field,
                });
                *reference = None;
            }
        }
    };
    dangling(&mut node.parent_id, "pid");
    dangling(&mut node.partner_of_id, "ppid");
    dangling(&mut node.subtree_parent_id, "stpid");

    // A partner hangs off its base alone; otherwise the plain parent wins
    // over the sub tree attachment
    if node.partner_of_id.is_some() && node.parent_id.is_some() {
        warnings.push(EngineEvent::ConflictingParents {
            id: id.clone(),
            dropped: "pid",
        });
        node.parent_id = None;
    }
    if node.partner_of_id.is_some() && node.subtree_parent_id.is_some() {
        warnings.push(EngineEvent::ConflictingParents {
            id: id.clone(),
            dropped: "stpid",
        });
        node.subtree_parent_id = None;
    }
    if node.parent_id.is_some() && node.subtree_parent_id.is_some() {
        warnings.push(EngineEvent::ConflictingParents {
            id: id.clone(),
            dropped: "stpid",
        });
        node.subtree_parent_id = None;
    }

    node.record.parent_id = node.parent_id.clone();
    node.record.partner_parent_id = node.partner_of_id.clone();
    node.record.subtree_parent_id = node.subtree_parent_id.clone();
}

fn mark_assistant(node: &mut GraphNode, assistant_tags: &[String]) {
    node.is_assistant = node.parent_id.is_some()
        && node
            .record
            .tags
            .iter()
            .any(|tag| assistant_tags.iter().any(|a| a == tag));
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn graph(records: Vec<NodeRecord>) -> Graph {
        let mut graph = Graph::default();
        graph.load(records).unwrap();
        graph
    }

    fn family() -> Graph {
        graph(vec![
            NodeRecord::new(1),
            NodeRecord::new(2).parent(1),
            NodeRecord::new(3).parent(1),
            NodeRecord::new(4).parent(3),
        ])
    }

    #[test]
    fn load_rejects_duplicate_ids() {
        let mut graph = Graph::default();
        let result = graph.load(vec![NodeRecord::new(1), NodeRecord::new(1)]);
        assert_eq!(result, Err(StoreError::DuplicateId(NodeId::from(1))));
        assert!(graph.is_empty());
    }

    #[test]
    fn load_builds_children_in_input_order() {
        let graph = family();
        let root = graph.get(&NodeId::from(1)).unwrap();
        assert_eq!(root.children_ids, vec![NodeId::from(2), NodeId::from(3)]);
        assert_eq!(root.level, 0);
        assert_eq!(graph.get(&NodeId::from(4)).unwrap().level, 2);
    }

    #[test]
    fn dangling_parent_becomes_root_with_a_warning() {
        let mut graph = Graph::default();
        graph
            .load(vec![NodeRecord::new(1).parent("ghost")])
            .unwrap();
        let node = graph.get(&NodeId::from(1)).unwrap();
        assert!(node.is_root());
        assert!(node.record.parent_id.is_none());
        assert!(graph
            .drain_warnings()
            .contains(&EngineEvent::DanglingReference {
                id: NodeId::from(1),
                field: "pid",
            }));
    }

    #[test]
    fn cyclic_parent_chain_is_rejected_at_load() {
        let mut graph = Graph::default();
        let result = graph.load(vec![
            NodeRecord::new(1).parent(2),
            NodeRecord::new(2).parent(1),
        ]);
        assert!(matches!(result, Err(StoreError::CyclicGraph(_))));
        assert!(graph.is_empty());
    }

    #[test]
    fn subtree_reference_loses_against_the_parent() {
        let mut graph = Graph::default();
        graph
            .load(vec![
                NodeRecord::new(1),
                NodeRecord::new(2),
                NodeRecord::new(3).parent(1).in_subtree_of(2),
            ])
            .unwrap();
        let node = graph.get(&NodeId::from(3)).unwrap();
        assert_eq!(node.parent_id, Some(NodeId::from(1)));
        assert!(node.subtree_parent_id.is_none());
        assert!(graph
            .drain_warnings()
            .contains(&EngineEvent::ConflictingParents {
                id: NodeId::from(3),
                dropped: "stpid",
            }));
    }

    #[test]
    fn partners_sit_on_their_base_level_and_chains_collapse() {
        let mut graph = Graph::default();
        graph
            .load(vec![
                NodeRecord::new(1),
                NodeRecord::new(2).parent(1),
                NodeRecord::new(3).partner_of(2),
                NodeRecord::new(4).partner_of(3),
            ])
            .unwrap();
        let partner = graph.get(&NodeId::from(3)).unwrap();
        assert!(partner.is_partner());
        assert_eq!(partner.level, 1);
        assert_eq!(
            graph.get(&NodeId::from(2)).unwrap().partner_ids,
            vec![NodeId::from(3)]
        );
        // Partner-of-partner is cleared, node 4 becomes a root
        assert!(graph.get(&NodeId::from(4)).unwrap().is_root());
    }

    #[test]
    fn subtree_roots_restart_levels() {
        let mut graph = Graph::default();
        graph
            .load(vec![
                NodeRecord::new(1),
                NodeRecord::new(2).parent(1),
                NodeRecord::new(3).in_subtree_of(2),
                NodeRecord::new(4).parent(3),
            ])
            .unwrap();
        assert_eq!(graph.get(&NodeId::from(3)).unwrap().level, 0);
        assert_eq!(graph.get(&NodeId::from(4)).unwrap().level, 1);
        assert_eq!(
            graph.get(&NodeId::from(2)).unwrap().subtree_children_ids,
            vec![NodeId::from(3)]
        );
    }

    #[test]
    fn add_rejects_existing_id_and_attaches_new_nodes() {
        let mut graph = family();
        assert_eq!(
            graph.add(NodeRecord::new(2)).unwrap_err(),
            StoreError::DuplicateId(NodeId::from(2))
        );
        graph.add(NodeRecord::new(5).parent(4)).unwrap();
        assert_eq!(graph.get(&NodeId::from(5)).unwrap().level, 3);
        assert_eq!(graph.children_count(&NodeId::from(4)), 1);
    }

    #[test]
    fn update_moves_a_subtree_and_relevels_it() {
        let mut graph = family();
        graph.update(NodeRecord::new(3).parent(2)).unwrap();
        assert_eq!(
            graph.get(&NodeId::from(1)).unwrap().children_ids,
            vec![NodeId::from(2)]
        );
        assert_eq!(graph.get(&NodeId::from(3)).unwrap().level, 2);
        assert_eq!(graph.get(&NodeId::from(4)).unwrap().level, 3);
    }

    #[test]
    fn update_refuses_to_close_a_cycle() {
        let mut graph = family();
        let before = graph.records();
        assert_eq!(
            graph.update(NodeRecord::new(1).parent(4)).unwrap_err(),
            StoreError::CyclicGraph(NodeId::from(1))
        );
        assert_eq!(graph.records(), before);
    }

    #[test]
    fn remove_reparents_children_to_the_grandparent() {
        let mut graph = family();
        let plan = graph.remove(&NodeId::from(3)).unwrap();
        assert_eq!(plan.removed.id, NodeId::from(3));
        assert_eq!(
            plan.reparented,
            vec![(NodeId::from(4), Some(NodeId::from(1)))]
        );
        let moved = graph.get(&NodeId::from(4)).unwrap();
        assert_eq!(moved.parent_id, Some(NodeId::from(1)));
        assert_eq!(moved.record.parent_id, Some(NodeId::from(1)));
        assert_eq!(moved.level, 1);
    }

    #[test]
    fn removing_a_root_makes_its_children_roots() {
        let mut graph = family();
        let plan = graph.remove(&NodeId::from(1)).unwrap();
        assert_eq!(
            plan.reparented,
            vec![(NodeId::from(2), None), (NodeId::from(3), None)]
        );
        assert!(graph.get(&NodeId::from(2)).unwrap().is_root());
        assert_eq!(graph.get(&NodeId::from(4)).unwrap().level, 1);
    }

    #[test]
    fn partnered_nodes_block_removal() {
        let mut graph = graph(vec![
            NodeRecord::new(1),
            NodeRecord::new(2).partner_of(1),
        ]);
        let before = graph.records();
        assert!(!graph.can_remove(&NodeId::from(1)));
        assert!(matches!(
            graph.remove(&NodeId::from(1)),
            Err(StoreError::CannotRemove { dependents: 1, .. })
        ));
        assert_eq!(graph.records(), before);
    }

    #[test]
    fn assistant_children_block_removal() {
        let mut graph = graph(vec![
            NodeRecord::new(1),
            NodeRecord::new(2).parent(1).tag(ASSISTANT_TAG),
        ]);
        assert!(!graph.can_remove(&NodeId::from(1)));
        assert!(graph.can_remove(&NodeId::from(2)));
    }

    #[test]
    fn generated_ids_are_distinct_from_each_other_and_the_store() {
        let mut graph = graph(vec![NodeRecord::new(7), NodeRecord::new("seven")]);
        let mut seen: Vec<NodeId> = graph.records().into_iter().map(|r| r.id).collect();
        for _ in 0..20 {
            let id = graph.generate_id();
            assert!(!seen.contains(&id));
            seen.push(id);
        }
    }

    #[test]
    fn records_round_trip_through_a_reload() {
        let graph = graph(vec![
            NodeRecord::new(1).field("name", "Ada"),
            NodeRecord::new(2).parent(1).field("name", "Ben"),
            NodeRecord::new(3).partner_of(2),
            NodeRecord::new(4).in_subtree_of(1),
        ]);
        let exported = graph.records();
        let mut reloaded = Graph::default();
        reloaded.load(exported.clone()).unwrap();
        assert_eq!(reloaded.records(), exported);
        for record in &exported {
            assert_eq!(
                reloaded.get(&record.id).map(|n| (&n.parent_id, &n.partner_of_id, n.level)),
                graph.get(&record.id).map(|n| (&n.parent_id, &n.partner_of_id, n.level)),
            );
        }
    }

    #[test]
    fn subtree_records_filter_to_the_branch() {
        let graph = family();
        let ids: Vec<NodeId> = graph
            .subtree_records(&NodeId::from(3))
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![NodeId::from(3), NodeId::from(4)]);
    }

    #[test]
    fn root_of_walks_every_attachment_kind() {
        let mut graph = Graph::default();
        graph
            .load(vec![
                NodeRecord::new(1),
                NodeRecord::new(2).parent(1),
                NodeRecord::new(3).partner_of(2),
                NodeRecord::new(4).in_subtree_of(3),
            ])
            .unwrap();
        assert_eq!(graph.root_of(&NodeId::from(4)), Some(NodeId::from(1)));
        assert_eq!(graph.children_total_count(&NodeId::from(1)), 3);
    }
}
