use serde::{Deserialize, Serialize};
use stemma_data::{AnimOptions, NodeId};
use stemma_layout::{Layout, Point};
use tracing::debug;

/// Identity of a transition plan, for supersession bookkeeping
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct PlanId(pub u64);

/// How one node takes part in a transition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Motion {
    /// Fade and scale out at the old position
    Exit { at: Point },
    /// Translate between two positions
    Move { from: Point, to: Point },
    /// Fade and scale in at the new position
    Enter { at: Point },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: NodeId,
    #[serde(flatten)]
    pub motion: Motion,
}

/// A presentation-agnostic transition between two layouts
///
/// Steps are grouped into phases the renderer must play in order: exits
/// never start after entrances. Easing and duration are opaque metadata
/// from the configuration, the plan itself carries no wall-clock timing.
///
/// When a pivot is set, every coordinate is re-based so the pivot's
/// before and after positions coincide; the renderer pans by the pivot's
/// actual displacement, producing local rather than global movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionPlan {
    pub id: PlanId,
    pub pivot: Option<NodeId>,
    pub exits: Vec<Step>,
    pub moves: Vec<Step>,
    pub enters: Vec<Step>,
    pub anim: AnimOptions,
}

impl TransitionPlan {
    /// Whether the plan would present nothing
    pub fn is_noop(&self) -> bool {
        self.exits.is_empty() && self.enters.is_empty() && self.moves.is_empty()
    }
}

/// Diff two layouts into a transition plan
pub(crate) fn plan(
    id: PlanId,
    previous: &Layout,
    next: &Layout,
    pivot: Option<&NodeId>,
    anim: AnimOptions,
) -> TransitionPlan {
    // Re-base `next` so the pivot stays put
    let shift = pivot
        .and_then(|p| Some((previous.node(p)?, next.node(p)?)))
        .map(|(before, after)| {
            Point::new(
                after.rect.x - before.rect.x,
                after.rect.y - before.rect.y,
            )
        })
        .unwrap_or_default();

    let mut exits = Vec::new();
    let mut moves = Vec::new();
    let mut enters = Vec::new();

    for node in &previous.nodes {
        if next.node(&node.id).is_none() {
            exits.push(Step {
                id: node.id.clone(),
                motion: Motion::Exit {
                    at: Point::new(node.rect.x, node.rect.y),
                },
            });
        }
    }
    for node in &next.nodes {
        let to = Point::new(node.rect.x - shift.x, node.rect.y - shift.y);
        match previous.node(&node.id) {
            Some(before) => {
                let from = Point::new(before.rect.x, before.rect.y);
                let is_pivot = pivot == Some(&node.id);
                // Zero-length moves are noise, except the pivot which is
                // reported stationary on purpose
                if from != to || is_pivot {
                    moves.push(Step {
                        id: node.id.clone(),
                        motion: Motion::Move { from, to },
                    });
                }
            }
            None => enters.push(Step {
                id: node.id.clone(),
                motion: Motion::Enter { at: to },
            }),
        }
    }

    debug!(
        plan = id.0,
        exits = exits.len(),
        moves = moves.len(),
        enters = enters.len(),
        "transition planned"
    );
    TransitionPlan {
        id,
        pivot: pivot.cloned(),
        exits,
        moves,
        enters,
        anim,
    }
}
