//! Data vocabulary for the stemma workspace
//!
//! Node rows as supplied by the caller, node identifiers, and the chart
//! configuration shared by the layout and engine crates. This crate holds
//! plain data only, so both sides can depend on it without pulling in each
//! other.

mod id;
mod options;
mod record;

pub use id::NodeId;
pub use options::{
    AnimOptions, CollapseDirective, ConfigError, Easing, ExpandDirective, FitMode, LayoutKind,
    LinkSpec, Options, OrderKey, Orientation, ScaleInitial, SubtreeOptions, TagOptions, Template,
};
pub use record::{NodeRecord, ASSISTANT_TAG};
