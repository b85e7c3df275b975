use crate::PlanId;
use serde::Serialize;
use stemma_data::NodeId;

/// Something the engine wants to tell an observer
///
/// Events accumulate in the facade's queue until [`drain_events`] is
/// called; nothing in here ever interrupts subsequent calls, subscribing
/// is strictly optional.
///
/// [`drain_events`]: crate::Stemma::drain_events
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EngineEvent {
    /// A batch operation named an id the graph does not contain; the rest
    /// of the batch was still applied
    UnknownId { id: NodeId },
    /// A record referenced a non-existent node; the reference was cleared
    /// and the node treated as a root (or non-partner)
    DanglingReference { id: NodeId, field: &'static str },
    /// A record carried two competing attachments; the weaker one was
    /// dropped
    ConflictingParents { id: NodeId, dropped: &'static str },
    /// A transition plan was superseded before it was acknowledged
    PlanCancelled { plan: PlanId },
    NodeAdded { id: NodeId },
    NodeUpdated { id: NodeId },
    NodeRemoved { id: NodeId },
}
