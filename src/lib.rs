//! # weft
//!
//! Incremental, priority-scheduled tree reconciliation for Rust.
//!
//! Components describe desired output as [`Element`] trees; weft diffs those
//! descriptions against a persistent fiber tree and drives an arbitrary host
//! platform (a DOM-like scene graph, a terminal, a test double) through the
//! [`HostAdapter`] trait.
//!
//! ## Architecture
//!
//! Work is split into interruptible render passes and atomic commits:
//! ```text
//! update → schedule (priority) → begin/complete walk → effect list → commit
//! ```
//! Each mounted position keeps up to two fibers (committed and
//! work-in-progress); renders build the second buffer and commit swaps it
//! in. Less urgent work yields to host deadlines and is abandoned wholesale
//! when something more urgent arrives.
//!
//! ## Modules
//!
//! - [`types`] - priorities, prop/state maps
//! - [`element`] - immutable output descriptions
//! - [`component`] - the stateful component contract
//! - [`host`] - the host adapter boundary
//! - [`errors`] - typed failures and error-boundary capture payloads

pub mod component;
pub mod element;
pub mod errors;
pub mod host;
pub mod types;

mod begin;
mod commit;
mod complete;
mod fiber;
mod queue;
mod reconcile;
mod root;
mod scheduler;

#[cfg(test)]
mod test_host;
#[cfg(test)]
mod tests;

pub use component::{Capabilities, ClassDescriptor, Component, Instance, StateUpdates};
pub use element::{CoroutineHandler, Element, RefCallback, RenderFn, YieldValue};
pub use errors::{CapturedError, ComponentError, ErrorPhase, HostError, ReconcileError};
pub use fiber::{FiberId, RootId};
pub use host::{
    ContainerId, Deadline, HostAdapter, HostParent, InstanceId, PropDiff, TimeLimit,
};
pub use queue::{StateChange, UpdateCallback};
pub use scheduler::Reconciler;
pub use types::{Context, Priority, PropValue, Props, State, empty_props, merge_state, props_from};
