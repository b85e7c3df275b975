//! Stateful core of the stemma workspace
//!
//! Owns the canonical node graph, the collapse/minimize state derived from
//! it, the search index, and the diff planner that turns two consecutive
//! layouts into a transition plan. The [`Stemma`] facade ties the pieces
//! together and is the one type external callers need.
//!
//! Everything runs synchronously to completion in the caller's thread; the
//! only deferred interaction is plan acknowledgement, see
//! [`Stemma::acknowledge_plan`].

mod engine;
mod events;
mod planner;
mod search;
mod store;
mod visibility;

pub use engine::{DrawResult, Stemma, ViewState};
pub use events::EngineEvent;
pub use planner::{Motion, PlanId, Step, TransitionPlan};
pub use search::{SearchHit, SearchIndex};
pub use store::{Graph, GraphNode, RemovalPlan, StoreError};
pub use visibility::{Target, VisibilityDelta, VisibilityState};
