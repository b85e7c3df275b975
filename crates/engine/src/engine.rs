use crate::planner::{self, PlanId, TransitionPlan};
use crate::search::{SearchHit, SearchIndex};
use crate::store::{Graph, GraphNode, RemovalPlan, StoreError};
use crate::visibility::{Target, VisibilityDelta, VisibilityState};
use crate::EngineEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use stemma_data::{ConfigError, LinkSpec, NodeId, NodeRecord, Options, ScaleInitial};
use stemma_layout::{
    CrossLink, Layout, LinkKind, TreeLayout, TreeNode, Vec2, VisibleTree, EMPTY_STATE_SIZE,
};
use tracing::{debug, instrument};

/// Output of one redraw
#[derive(Debug, Clone, PartialEq)]
pub struct DrawResult {
    pub layout: Layout,
    pub plan: TransitionPlan,
    /// The still-unacknowledged plan this draw cancelled, if any
    pub superseded: Option<PlanId>,
}

/// Serializable snapshot of the presentation state
///
/// Holds booleans, ids and the caller-supplied scale and view box only,
/// never node content; consumers handle their own URL or key-value
/// encoding.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewState {
    pub collapsed: Vec<NodeId>,
    pub minimized: Vec<NodeId>,
    pub pivot: Option<NodeId>,
    pub scale: Option<f64>,
    pub view_box: Option<[f64; 4]>,
}

/// The chart engine
///
/// Owns the graph store, the visibility flags derived from it, the search
/// index cache and the previous layout, and turns mutations into layouts
/// plus transition plans. All configuration comes in through the
/// constructor; there is no process-wide state.
///
/// Everything runs synchronously in the caller's context. A transition
/// plan stays "in flight" until [`acknowledge_plan`](Self::acknowledge_plan)
/// or until the next draw supersedes it, last writer wins.
#[derive(Debug, Clone)]
pub struct Stemma {
    options: Options,
    graph: Graph,
    visibility: VisibilityState,
    index: Option<SearchIndex>,
    last_layout: Option<Layout>,
    pivot: Option<NodeId>,
    in_flight: Option<PlanId>,
    next_plan: u64,
    roots: Option<Vec<NodeId>>,
    clinks: Vec<LinkSpec>,
    slinks: Vec<LinkSpec>,
    dotted_lines: Vec<LinkSpec>,
    events: Vec<EngineEvent>,
}

impl Stemma {
    /// Validate the configuration and set up an empty engine
    pub fn new(options: Options) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            graph: Graph::new(options.assistant_tags()),
            visibility: VisibilityState::default(),
            index: None,
            last_layout: None,
            pivot: None,
            in_flight: None,
            next_plan: 1,
            roots: options.roots.clone(),
            clinks: options.clinks.clone(),
            slinks: options.slinks.clone(),
            dotted_lines: options.dotted_lines.clone(),
            events: Vec::new(),
            options,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Replace the node set and re-derive the initial visibility state
    #[instrument(skip_all, fields(records = records.len()))]
    pub fn load(&mut self, records: Vec<NodeRecord>) -> Result<(), StoreError> {
        self.graph.load(records)?;
        self.visibility = VisibilityState::from_options(&self.graph, &self.options);
        self.pivot = None;
        self.sync();
        Ok(())
    }

    pub fn add(&mut self, record: NodeRecord) -> Result<GraphNode, StoreError> {
        let node = self.graph.add(record)?.clone();
        self.sync();
        Ok(node)
    }

    pub fn update(&mut self, record: NodeRecord) -> Result<GraphNode, StoreError> {
        let node = self.graph.update(record)?.clone();
        self.sync();
        Ok(node)
    }

    pub fn remove(&mut self, id: &NodeId) -> Result<RemovalPlan, StoreError> {
        let plan = self.graph.remove(id)?;
        self.sync();
        Ok(plan)
    }

    pub fn can_remove(&self, id: &NodeId) -> bool {
        self.graph.can_remove(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<&GraphNode> {
        self.graph.get(id)
    }

    pub fn generate_id(&mut self) -> NodeId {
        self.graph.generate_id()
    }

    /// Node records for the export adapters; the core only selects, it
    /// never encodes
    pub fn records(&self) -> Vec<NodeRecord> {
        self.graph.records()
    }

    pub fn subtree_records(&self, id: &NodeId) -> Vec<NodeRecord> {
        self.graph.subtree_records(id)
    }

    pub fn expand(&mut self, pivot: Option<NodeId>, ids: &[NodeId]) -> VisibilityDelta {
        let delta = self.visibility.expand(&self.graph, pivot, ids);
        self.apply_delta(&delta);
        delta
    }

    pub fn collapse(&mut self, pivot: Option<NodeId>, ids: &[NodeId]) -> VisibilityDelta {
        let delta = self.visibility.collapse(&self.graph, pivot, ids);
        self.apply_delta(&delta);
        delta
    }

    pub fn expand_collapse(
        &mut self,
        pivot: Option<NodeId>,
        expand_ids: &[NodeId],
        collapse_ids: &[NodeId],
    ) -> VisibilityDelta {
        let delta = self
            .visibility
            .expand_collapse(&self.graph, pivot, expand_ids, collapse_ids);
        self.apply_delta(&delta);
        delta
    }

    pub fn minimize(&mut self, target: Target) -> VisibilityDelta {
        let delta = self.visibility.minimize(&self.graph, target);
        self.apply_delta(&delta);
        delta
    }

    pub fn maximize(&mut self, target: Target) -> VisibilityDelta {
        let delta = self.visibility.maximize(&self.graph, target);
        self.apply_delta(&delta);
        delta
    }

    /// Override which nodes start the root grid, and in what order
    pub fn set_roots(&mut self, pivot: Option<NodeId>, roots: Vec<NodeId>) {
        let mut kept = Vec::new();
        for id in roots {
            if self.graph.get(&id).is_some() {
                kept.push(id);
            } else {
                self.events.push(EngineEvent::UnknownId { id });
            }
        }
        self.roots = Some(kept);
        self.pivot = pivot;
    }

    pub fn add_clink(&mut self, link: LinkSpec) {
        self.clinks.push(link);
    }

    pub fn remove_clink(&mut self, from: &NodeId, to: &NodeId) {
        self.clinks.retain(|l| !(l.from == *from && l.to == *to));
    }

    pub fn add_slink(&mut self, link: LinkSpec) {
        self.slinks.push(link);
    }

    pub fn remove_slink(&mut self, from: &NodeId, to: &NodeId) {
        self.slinks.retain(|l| !(l.from == *from && l.to == *to));
    }

    pub fn add_dotted_line(&mut self, link: LinkSpec) {
        self.dotted_lines.push(link);
    }

    pub fn remove_dotted_line(&mut self, from: &NodeId, to: &NodeId) {
        self.dotted_lines.retain(|l| !(l.from == *from && l.to == *to));
    }

    /// Lay out the visible part of the chart and plan the transition from
    /// the previous draw
    ///
    /// Always a full recomputation. If an earlier plan is still in
    /// flight it is cancelled, the new plan starts from the last computed
    /// positions.
    #[instrument(skip_all)]
    pub fn draw(&mut self) -> DrawResult {
        let tree = self.project();
        let graph = &self.graph;
        let options = &self.options;
        let visibility = &self.visibility;
        let sizes = |id: &NodeId| -> Vec2 {
            let tags = graph.get(id).map(|n| n.record.tags.as_slice()).unwrap_or(&[]);
            let template = options.template_for(tags);
            let [w, h] = if visibility.is_minimized(id) {
                template.min_size()
            } else {
                template.size
            };
            Vec2::new(w, h)
        };
        let layout = TreeLayout::new(options).compute(&tree, &sizes);

        let superseded = self.in_flight.take();
        if let Some(plan) = superseded {
            debug!(plan = plan.0, "in-flight plan superseded");
            self.events.push(EngineEvent::PlanCancelled { plan });
        }

        let previous = self.last_layout.take().unwrap_or(Layout {
            nodes: Vec::new(),
            links: Vec::new(),
            size: EMPTY_STATE_SIZE,
        });
        let pivot = self.pivot.take();
        let plan_id = PlanId(self.next_plan);
        self.next_plan += 1;
        let plan = planner::plan(plan_id, &previous, &layout, pivot.as_ref(), self.options.anim);

        self.in_flight = (!plan.is_noop()).then_some(plan.id);
        self.last_layout = Some(layout.clone());
        DrawResult {
            layout,
            plan,
            superseded,
        }
    }

    /// Report that the renderer finished presenting a plan
    ///
    /// Acknowledging a superseded plan is a no-op.
    pub fn acknowledge_plan(&mut self, id: PlanId) {
        if self.in_flight == Some(id) {
            self.in_flight = None;
        }
    }

    /// Rank nodes against a free-text query, rebuilding the index if the
    /// graph changed since the last call
    pub fn search(
        &mut self,
        text: &str,
        fields_in: Option<&[String]>,
        fields_out: Option<&[String]>,
    ) -> Vec<SearchHit> {
        let stale = self
            .index
            .as_ref()
            .is_none_or(|index| index.generation() != self.graph.generation());
        if stale {
            self.index = Some(SearchIndex::build(&self.graph, &self.options));
        }
        match &self.index {
            Some(index) => index.query(&self.options, text, fields_in, fields_out),
            None => Vec::new(),
        }
    }

    /// Snapshot the presentation state for a persistence adapter
    ///
    /// `scale` and `view_box` are the renderer's pan/zoom inputs, passed
    /// through untouched.
    pub fn capture_state(&self, scale: Option<f64>, view_box: Option<[f64; 4]>) -> ViewState {
        ViewState {
            collapsed: self.visibility.collapsed_ids(),
            minimized: self.visibility.minimized_ids(),
            pivot: self.pivot.clone(),
            scale,
            view_box,
        }
    }

    /// Restore a snapshot; ids the current graph doesn't know are
    /// reported and skipped
    pub fn restore_state(&mut self, state: &ViewState) {
        let known = |ids: &[NodeId], events: &mut Vec<EngineEvent>| {
            ids.iter()
                .filter(|id| {
                    let found = self.graph.get(id).is_some();
                    if !found {
                        events.push(EngineEvent::UnknownId { id: (*id).clone() });
                    }
                    found
                })
                .cloned()
                .collect::<Vec<_>>()
        };
        let mut events = Vec::new();
        let collapsed = known(&state.collapsed, &mut events);
        let minimized = known(&state.minimized, &mut events);
        self.events.extend(events);
        self.visibility = VisibilityState::restore(collapsed, minimized);
        self.pivot = state.pivot.clone();
    }

    /// Scale to open the chart at, given the container size
    pub fn initial_scale(&self, container: Vec2) -> f64 {
        let size = self
            .last_layout
            .as_ref()
            .map(|layout| layout.size)
            .unwrap_or(EMPTY_STATE_SIZE);
        let scale = match self.options.scale_initial {
            ScaleInitial::Factor(factor) => factor,
            ScaleInitial::Fit(mode) => {
                let fit_w = container.x / size.x.max(1.0);
                let fit_h = container.y / size.y.max(1.0);
                match mode {
                    stemma_data::FitMode::Width => fit_w,
                    stemma_data::FitMode::Height => fit_h,
                    stemma_data::FitMode::Boundary => fit_w.min(fit_h),
                }
            }
        };
        scale.clamp(self.options.scale_min, self.options.scale_max)
    }

    /// Events queued since the last drain, oldest first
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.sync();
        std::mem::take(&mut self.events)
    }

    fn sync(&mut self) {
        self.events.extend(self.graph.drain_warnings());
    }

    fn apply_delta(&mut self, delta: &VisibilityDelta) {
        self.pivot = delta.pivot.clone();
        for id in &delta.unknown {
            self.events.push(EngineEvent::UnknownId { id: id.clone() });
        }
    }

    /// Project the visible subgraph into the layout's input model
    ///
    /// Applies the visible set, sibling/root ordering, tag precedence and
    /// partner grouping, so the layout can take the structure at face
    /// value.
    fn project(&self) -> VisibleTree {
        let visible = self.visibility.visible_set(&self.graph);
        let mut tree = VisibleTree::default();
        let mut index_of: HashMap<NodeId, usize> = HashMap::new();

        for id in &visible {
            let Some(node) = self.graph.get(id) else {
                continue;
            };
            let mut entry = TreeNode::new(id.clone(), node.level);
            entry.sub_levels = self.options.sub_levels_for(&node.record.tags);
            entry.padding = self.options.template_for(&node.record.tags).padding;
            entry.overrides = self.options.subtree_config_for(&node.record.tags).cloned();
            index_of.insert(id.clone(), tree.push(entry));
        }

        for id in &visible {
            let Some(node) = self.graph.get(id) else {
                continue;
            };
            let Some(&index) = index_of.get(id) else {
                continue;
            };

            let assistants: Vec<usize> = node
                .children_ids
                .iter()
                .filter(|c| {
                    index_of.contains_key(*c)
                        && self.graph.get(c).is_some_and(|c| c.is_assistant)
                })
                .map(|c| index_of[c])
                .collect();
            let subtree_roots: Vec<usize> = {
                let mut roots = node.subtree_children_ids.clone();
                self.sort_ids(&mut roots);
                roots
                    .iter()
                    .filter_map(|r| index_of.get(r).copied())
                    .collect()
            };

            // A partner keeps its own assistant band and hosted sub
            // trees, but its regular children hang from its base node's
            // groups
            if node.is_partner() {
                let entry = &mut tree.nodes[index];
                entry.assistants = assistants;
                entry.subtree_roots = subtree_roots;
                continue;
            }

            let partners: Vec<&NodeId> = node
                .partner_ids
                .iter()
                .filter(|p| index_of.contains_key(*p))
                .collect();
            let mut groups = vec![self.visible_children(node, &index_of)];
            for &partner in &partners {
                match self.graph.get(partner) {
                    Some(partner) => groups.push(self.visible_children(partner, &index_of)),
                    None => groups.push(Vec::new()),
                }
            }

            let entry = &mut tree.nodes[index];
            entry.partners = partners.iter().map(|p| index_of[*p]).collect();
            entry.child_groups = groups;
            entry.assistants = assistants;
            entry.subtree_roots = subtree_roots;
        }

        let mut root_ids = match &self.roots {
            Some(roots) => roots.clone(),
            None => {
                let mut roots = self.graph.root_ids();
                self.sort_ids(&mut roots);
                roots
            }
        };
        root_ids.retain(|id| index_of.contains_key(id));
        tree.roots = root_ids.iter().map(|id| index_of[id]).collect();

        for (links, kind) in [
            (&self.clinks, LinkKind::Curved),
            (&self.slinks, LinkKind::Secondary),
            (&self.dotted_lines, LinkKind::Dotted),
        ] {
            for link in links.iter() {
                let (Some(&from), Some(&to)) = (index_of.get(&link.from), index_of.get(&link.to))
                else {
                    continue;
                };
                tree.cross_links.push(CrossLink {
                    from,
                    to,
                    kind,
                    label: link.label.clone(),
                });
            }
        }
        tree
    }

    /// Visible non-assistant children of a node, sorted per `order_by`,
    /// as arena indices
    fn visible_children(&self, node: &GraphNode, index_of: &HashMap<NodeId, usize>) -> Vec<usize> {
        let mut children: Vec<NodeId> = node
            .children_ids
            .iter()
            .filter(|c| {
                index_of.contains_key(*c)
                    && self.graph.get(c).is_some_and(|c| !c.is_assistant)
            })
            .cloned()
            .collect();
        self.sort_ids(&mut children);
        children.iter().map(|c| index_of[c]).collect()
    }

    /// Stable sort by the configured order keys; input order on ties
    fn sort_ids(&self, ids: &mut Vec<NodeId>) {
        if self.options.order_by.is_empty() {
            return;
        }
        ids.sort_by(|a, b| {
            for key in &self.options.order_by {
                let left = self
                    .graph
                    .get(a)
                    .and_then(|n| n.record.fields.get(&key.field));
                let right = self
                    .graph
                    .get(b)
                    .and_then(|n| n.record.fields.get(&key.field));
                let mut ordering = cmp_values(left, right);
                if key.desc {
                    ordering = ordering.reverse();
                }
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }
}

/// Order JSON field values: numbers first, then strings, then the rest by
/// their text form; missing values sort last
fn cmp_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Number(_) => 0,
            Value::String(_) => 1,
            _ => 2,
        }
    }
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            _ => rank(a)
                .cmp(&rank(b))
                .then_with(|| a.to_string().cmp(&b.to_string())),
        },
    }
}
