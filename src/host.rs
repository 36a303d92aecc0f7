//! Host adapter boundary.
//!
//! The reconciler is host-agnostic: everything platform-specific happens
//! behind [`HostAdapter`]. The adapter owns the real nodes and hands back
//! opaque [`InstanceId`]s; the reconciler only threads those ids (and the
//! adapter's own host-context values) through the tree.
//!
//! Timing is request-style: the reconciler asks the host to schedule an
//! animation or deferred callback, and the host later re-enters through
//! `perform_animation_work` / `perform_deferred_work` on the scheduler.

use std::time::{Duration, Instant};

use crate::errors::HostError;
use crate::types::{PropValue, Props};

// =============================================================================
// Handles
// =============================================================================

/// Opaque handle to a host node (element or text), allocated by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub usize);

/// Opaque handle to a host container (mount point or portal target).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(pub usize);

/// Where a host node gets attached: a container at the top of a tree or
/// portal, an instance everywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostParent {
    Container(ContainerId),
    Instance(InstanceId),
}

/// Prop diff computed by `prepare_update` and applied by `commit_update`.
/// `None` values are removals.
pub type PropDiff = Vec<(String, Option<PropValue>)>;

// =============================================================================
// Adapter trait
// =============================================================================

/// Primitive operations the reconciler requires from a host platform.
///
/// Mutating operations are only invoked during the commit phase (and
/// instance creation during completion); the host tree is never touched
/// while a render pass can still be abandoned.
pub trait HostAdapter {
    /// Host-propagated context (e.g. a namespace); pushed at containers and
    /// refined per host type on the way down.
    type HostContext: Clone + PartialEq + Default;

    fn get_root_host_context(&mut self, container: ContainerId) -> Self::HostContext;

    fn get_child_host_context(
        &mut self,
        parent: &Self::HostContext,
        ty: &str,
    ) -> Self::HostContext;

    /// Whether text directly under a `ty` instance should be set as content
    /// on the instance itself (via the `children` prop) instead of getting a
    /// text node of its own.
    fn should_set_text_content(&mut self, _ty: &str, _props: &Props) -> bool {
        false
    }

    fn create_instance(
        &mut self,
        ty: &str,
        props: &Props,
        container: ContainerId,
        context: &Self::HostContext,
    ) -> Result<InstanceId, HostError>;

    fn create_text_instance(
        &mut self,
        text: &str,
        container: ContainerId,
        context: &Self::HostContext,
    ) -> Result<InstanceId, HostError>;

    /// Attach `child` to a parent that has not been inserted into the tree
    /// yet (initial subtree assembly during completion).
    fn append_initial_child(
        &mut self,
        parent: InstanceId,
        child: InstanceId,
    ) -> Result<(), HostError>;

    /// Final setup after initial children are attached. Returns true when
    /// the instance wants a `commit_mount` call after insertion (e.g.
    /// autofocus).
    fn finalize_initial_children(
        &mut self,
        instance: InstanceId,
        ty: &str,
        props: &Props,
        container: ContainerId,
    ) -> Result<bool, HostError>;

    /// Diff old props against new. `None` means nothing to apply at commit.
    fn prepare_update(
        &mut self,
        instance: InstanceId,
        ty: &str,
        old_props: &Props,
        new_props: &Props,
        container: ContainerId,
        context: &Self::HostContext,
    ) -> Result<Option<PropDiff>, HostError>;

    fn commit_update(
        &mut self,
        instance: InstanceId,
        payload: &PropDiff,
        ty: &str,
        old_props: &Props,
        new_props: &Props,
    ) -> Result<(), HostError>;

    fn commit_text_update(
        &mut self,
        instance: InstanceId,
        old_text: &str,
        new_text: &str,
    ) -> Result<(), HostError>;

    /// Post-insertion hook, fired only when `finalize_initial_children`
    /// asked for it.
    fn commit_mount(
        &mut self,
        _instance: InstanceId,
        _ty: &str,
        _props: &Props,
    ) -> Result<(), HostError> {
        Ok(())
    }

    /// Clear direct text content before new children are inserted.
    fn reset_text_content(&mut self, instance: InstanceId) -> Result<(), HostError>;

    fn append_child(&mut self, parent: HostParent, child: InstanceId) -> Result<(), HostError>;

    fn insert_before(
        &mut self,
        parent: HostParent,
        child: InstanceId,
        before: InstanceId,
    ) -> Result<(), HostError>;

    fn remove_child(&mut self, parent: HostParent, child: InstanceId) -> Result<(), HostError>;

    /// Ask the host to call back on the next animation tick. The host
    /// re-enters via [`crate::Reconciler::perform_animation_work`].
    fn schedule_animation_callback(&mut self);

    /// Ask the host to call back when idle. The host re-enters via
    /// [`crate::Reconciler::perform_deferred_work`].
    fn schedule_deferred_callback(&mut self);
}

// =============================================================================
// Deadlines
// =============================================================================

/// Cooperative time budget supplied by the host for deferred work.
pub trait Deadline {
    /// Time left before the reconciler should yield back to the host.
    fn time_remaining(&self) -> Duration;
}

/// Wall-clock deadline ending at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct TimeLimit {
    end: Instant,
}

impl TimeLimit {
    pub fn ending_at(end: Instant) -> Self {
        TimeLimit { end }
    }

    pub fn from_now(budget: Duration) -> Self {
        TimeLimit {
            end: Instant::now() + budget,
        }
    }
}

impl Deadline for TimeLimit {
    fn time_remaining(&self) -> Duration {
        self.end.saturating_duration_since(Instant::now())
    }
}

/// Minimum remaining budget worth starting another fiber for. Below this the
/// loop yields instead of risking an overrun.
pub(crate) const UNIT_OF_WORK_BUDGET: Duration = Duration::from_millis(1);
