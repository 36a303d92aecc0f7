//! Container API - the embedder-facing entry points.
//!
//! A container is a host-owned mount point. `create_container` registers a
//! root for it; `update_container` renders an element tree into it (or
//! nothing, which unmounts). Rendering is an update like any other: it is
//! enqueued on the root fiber at the current priority and flushed by the
//! scheduler's normal rules.

use crate::element::Element;
use crate::errors::ReconcileError;
use crate::fiber::{Fiber, FiberTag, RootId, StateNode};
use crate::host::{ContainerId, HostAdapter, InstanceId};
use crate::queue::{Update, UpdateCallback};
use crate::scheduler::{FiberRoot, Reconciler};
use crate::types::Context;

impl<H: HostAdapter> Reconciler<H> {
    /// Register a root for `container`. The container itself is host-owned;
    /// the reconciler only ever attaches and detaches children inside it.
    pub fn create_container(&mut self, container: ContainerId) -> RootId {
        let fiber = self.arena.insert(Fiber::new(FiberTag::HostRoot, None));
        let root_id = self.roots.insert(FiberRoot {
            current: fiber,
            container,
            next_scheduled_root: None,
            is_scheduled: false,
            context: None,
            pending_context: None,
        });
        self.arena[fiber].state_node = StateNode::Root(root_id);
        root_id
    }

    /// Render `element` into the root, `None` to render nothing (top-level
    /// unmount). Scheduled at the current priority; with default synchronous
    /// scheduling the tree is committed before this returns.
    pub fn update_container(
        &mut self,
        element: Option<Element>,
        root: RootId,
        context: Option<Context>,
        callback: Option<UpdateCallback>,
    ) -> Result<(), ReconcileError> {
        if context.is_some() {
            self.roots[root].pending_context = context;
        }
        let priority = self.update_priority();
        let mut update = Update::root_render(priority, element);
        update.callback = callback;
        let fiber = self.roots[root].current;
        self.enqueue(fiber, update);
        self.schedule_update(fiber, priority)
    }

    /// Shorthand for [`Reconciler::update_container`] with no context or
    /// callback.
    pub fn render(&mut self, element: Element, root: RootId) -> Result<(), ReconcileError> {
        self.update_container(Some(element), root, None, None)
    }

    /// Delete everything rendered into the root's container. The root stays
    /// registered and can render again.
    pub fn unmount_container(&mut self, root: RootId) -> Result<(), ReconcileError> {
        self.update_container(None, root, None, None)
    }

    /// Host instance of the committed tree's outermost host node, when the
    /// top of the tree is one.
    pub fn get_public_root_instance(&self, root: RootId) -> Option<InstanceId> {
        let fiber = self.roots.get(root)?.current;
        let child = self.arena.get(fiber)?.child?;
        self.arena.get(child)?.state_node.instance_id()
    }
}
