//! Commit phase - applying a finished tree's effect list.
//!
//! Two passes over the effect list, in list order. Pass one performs every
//! host mutation (insertions, prop diffs, text updates, removals); the
//! current pointer swaps to the finished tree strictly between the passes;
//! pass two runs lifecycles, refs, queue callbacks, and error-boundary
//! deliveries against the now-committed tree. Each effect is trapped
//! individually so one failure cannot abort the rest of the commit.

use log::trace;

use crate::component::{Capabilities, StateUpdates};
use crate::errors::{ComponentError, WorkFailure};
use crate::fiber::{EffectTag, ElementType, FiberId, FiberProps, FiberTag, StateNode};
use crate::host::{HostAdapter, HostParent, InstanceId};
use crate::queue::Update;
use crate::scheduler::Reconciler;
use crate::types::Priority;

impl<H: HostAdapter> Reconciler<H> {
    pub(crate) fn commit_all_work(&mut self, finished: FiberId) {
        let StateNode::Root(root_id) = self.arena[finished].state_node else {
            return;
        };
        trace!("committing root {:?}", root_id);
        self.sched.is_committing = true;
        let saved_priority = self.sched.priority_context;
        // Lifecycle-triggered updates join the end of this batch.
        self.sched.priority_context = Priority::Task;

        // The root's own effects (top-level callbacks) close the list.
        let first = {
            let list_first = self.arena[finished].first_effect;
            if self.arena[finished].effect_tag.is_empty() {
                list_first
            } else {
                self.arena[finished].next_effect = None;
                match self.arena[finished].last_effect {
                    Some(last) => {
                        self.arena[last].next_effect = Some(finished);
                        list_first
                    }
                    None => Some(finished),
                }
            }
        };

        // Pass 1: host mutations. Deleted subtrees are unmounted here but
        // only freed after pass 2, so the list stays traversable.
        let mut doomed: Vec<FiberId> = Vec::new();
        let mut effect = first;
        while let Some(id) = effect {
            let next = self.arena[id].next_effect;
            if let Err(failure) = self.commit_host_effect(id, &mut doomed) {
                self.capture_error(failure);
            }
            effect = next;
        }

        self.roots[root_id].current = finished;

        // Pass 2: lifecycles and callbacks, against the committed tree.
        let mut effect = first;
        while let Some(id) = effect {
            let next = self.arena.get(id).and_then(|f| f.next_effect);
            self.commit_lifecycle_effect(id);
            effect = next;
        }

        for id in doomed {
            self.arena.free_subtree(id);
        }

        // Commit-phase failures deliver to their boundaries only now, once
        // the tree is consistent again.
        let boundaries: Vec<FiberId> = self.sched.commit_phase_boundaries.drain(..).collect();
        for boundary in boundaries {
            self.deliver_captured(boundary);
        }

        self.sched.priority_context = saved_priority;
        self.sched.is_committing = false;
    }

    // =========================================================================
    // Pass 1: host mutations
    // =========================================================================

    fn commit_host_effect(
        &mut self,
        id: FiberId,
        doomed: &mut Vec<FiberId>,
    ) -> Result<(), WorkFailure> {
        let tag = self.arena[id].effect_tag;

        if tag.contains(EffectTag::CONTENT_RESET) {
            if let Some(instance) = self.arena[id].state_node.instance_id() {
                self.host
                    .reset_text_content(instance)
                    .map_err(|e| WorkFailure::commit(id, e.into()))?;
            }
        }
        if tag.contains(EffectTag::REF) {
            // Detach the previous ref before any re-attach in pass 2.
            if let Some(current) = self.arena[id].alternate {
                if let Some(callback) = self.arena[current].host_ref.clone() {
                    callback(None);
                }
            }
        }

        if tag.contains(EffectTag::PLACEMENT) {
            self.commit_placement(id)?;
        }
        if tag.contains(EffectTag::UPDATE) {
            self.commit_host_update(id)?;
        }
        if tag.contains(EffectTag::DELETION) {
            self.commit_deletion(id)?;
            doomed.push(id);
        }
        Ok(())
    }

    fn commit_placement(&mut self, id: FiberId) -> Result<(), WorkFailure> {
        let parent = self.host_parent_of(id)?;
        let before = self.host_sibling_of(id);
        self.insert_or_append(id, parent, before)
    }

    /// Nearest host ancestor a fiber's nodes attach under.
    fn host_parent_of(&self, id: FiberId) -> Result<HostParent, WorkFailure> {
        let mut node = self.arena[id].return_;
        while let Some(parent) = node {
            let fiber = &self.arena[parent];
            match (fiber.tag, &fiber.state_node, &fiber.element_type) {
                (FiberTag::HostComponent, StateNode::Host(instance), _) => {
                    return Ok(HostParent::Instance(*instance));
                }
                (FiberTag::HostRoot, StateNode::Root(root_id), _) => {
                    return Ok(HostParent::Container(self.roots[*root_id].container));
                }
                (FiberTag::HostPortal, _, ElementType::Portal(container)) => {
                    return Ok(HostParent::Container(*container));
                }
                _ => node = fiber.return_,
            }
        }
        Err(WorkFailure::commit(
            id,
            ComponentError("placed fiber has no host parent".into()),
        ))
    }

    /// The host node a placement inserts before: the first host descendant
    /// of a following sibling that is itself stable (not also being placed).
    /// `None` means append at the end.
    fn host_sibling_of(&self, id: FiberId) -> Option<InstanceId> {
        let mut node = id;
        'siblings: loop {
            node = loop {
                if let Some(sibling) = self.arena[node].sibling {
                    break sibling;
                }
                let parent = self.arena[node].return_?;
                if self.is_host_parent(parent) {
                    return None;
                }
                node = parent;
            };

            while !matches!(
                self.arena[node].tag,
                FiberTag::HostComponent | FiberTag::HostText
            ) {
                // A subtree that is itself moving cannot anchor us, and a
                // portal's nodes live elsewhere.
                if self.arena[node].effect_tag.contains(EffectTag::PLACEMENT)
                    || self.arena[node].tag == FiberTag::HostPortal
                {
                    continue 'siblings;
                }
                match self.arena[node].child {
                    Some(child) => node = child,
                    None => continue 'siblings,
                }
            }

            if !self.arena[node].effect_tag.contains(EffectTag::PLACEMENT) {
                return self.arena[node].state_node.instance_id();
            }
        }
    }

    fn is_host_parent(&self, id: FiberId) -> bool {
        matches!(
            self.arena[id].tag,
            FiberTag::HostComponent | FiberTag::HostRoot | FiberTag::HostPortal
        )
    }

    /// Insert every nearest host descendant of `id` under `parent`. Portals
    /// are skipped: their nodes belong to their own containers.
    fn insert_or_append(
        &mut self,
        id: FiberId,
        parent: HostParent,
        before: Option<InstanceId>,
    ) -> Result<(), WorkFailure> {
        match self.arena[id].tag {
            FiberTag::HostComponent | FiberTag::HostText => {
                let Some(instance) = self.arena[id].state_node.instance_id() else {
                    return Ok(());
                };
                match before {
                    Some(before) => self.host.insert_before(parent, instance, before),
                    None => self.host.append_child(parent, instance),
                }
                .map_err(|e| WorkFailure::commit(id, e.into()))
            }
            FiberTag::HostPortal => Ok(()),
            _ => {
                let mut child = self.arena[id].child;
                while let Some(c) = child {
                    self.insert_or_append(c, parent, before)?;
                    child = self.arena[c].sibling;
                }
                Ok(())
            }
        }
    }

    fn commit_host_update(&mut self, id: FiberId) -> Result<(), WorkFailure> {
        match self.arena[id].tag {
            FiberTag::HostComponent => {
                let Some(diff) = self.arena[id].diff_payload.take() else {
                    return Ok(());
                };
                let Some(instance) = self.arena[id].state_node.instance_id() else {
                    return Ok(());
                };
                let ElementType::Host(ty) = self.arena[id].element_type.clone() else {
                    return Ok(());
                };
                // Same text-folded shape the diff was prepared against.
                let new_props = match self.arena[id].memoized_props.clone() {
                    FiberProps::Host { props, children } => {
                        self.effective_host_props(&ty, &props, &children)
                    }
                    other => other.props(),
                };
                let old_props = match self.arena[id]
                    .alternate
                    .map(|current| self.arena[current].memoized_props.clone())
                {
                    Some(FiberProps::Host { props, children }) => {
                        self.effective_host_props(&ty, &props, &children)
                    }
                    _ => crate::types::empty_props(),
                };
                self.host
                    .commit_update(instance, &diff, &ty, &old_props, &new_props)
                    .map_err(|e| WorkFailure::commit(id, e.into()))
            }
            FiberTag::HostText => {
                let Some(instance) = self.arena[id].state_node.instance_id() else {
                    return Ok(());
                };
                let new_text = match &self.arena[id].memoized_props {
                    FiberProps::Text(text) => text.clone(),
                    _ => String::new(),
                };
                let old_text = self.arena[id]
                    .alternate
                    .map(|current| match &self.arena[current].memoized_props {
                        FiberProps::Text(text) => text.clone(),
                        _ => String::new(),
                    })
                    .unwrap_or_default();
                self.host
                    .commit_text_update(instance, &old_text, &new_text)
                    .map_err(|e| WorkFailure::commit(id, e.into()))
            }
            // Class lifecycle updates run in pass 2.
            _ => Ok(()),
        }
    }

    /// Unmount a deleted subtree: refs detach, `will_unmount` runs on every
    /// class fiber, and the top-level host nodes (per container) are removed.
    /// Per-node failures are captured; the removal always finishes.
    fn commit_deletion(&mut self, id: FiberId) -> Result<(), WorkFailure> {
        trace!("deleting {}", self.arena[id].name());
        let parent = self.host_parent_of(id)?;
        self.unmount_subtree(id, parent, true);
        Ok(())
    }

    fn unmount_subtree(&mut self, node: FiberId, parent: HostParent, remove_top: bool) {
        match self.arena[node].tag {
            FiberTag::HostComponent | FiberTag::HostText => {
                if let Some(callback) = self.arena[node].host_ref.clone() {
                    callback(None);
                }
                // Descendants unmount while still attached; removing the top
                // host node takes the whole host subtree with it.
                self.unmount_children(node, parent, false);
                if remove_top {
                    if let Some(instance) = self.arena[node].state_node.instance_id() {
                        if let Err(error) = self.host.remove_child(parent, instance) {
                            self.capture_error(WorkFailure::commit(node, error.into()));
                        }
                    }
                }
            }
            FiberTag::HostPortal => {
                let target = match self.arena[node].element_type {
                    ElementType::Portal(container) => HostParent::Container(container),
                    _ => parent,
                };
                self.unmount_children(node, target, true);
            }
            FiberTag::ClassComponent => {
                if let Some(instance) = self.arena[node].instance() {
                    let wants_hook = instance
                        .borrow()
                        .capabilities()
                        .contains(Capabilities::WILL_UNMOUNT);
                    if wants_hook {
                        if let Err(error) = instance.borrow_mut().will_unmount() {
                            self.capture_error(WorkFailure::commit(node, error));
                        }
                    }
                }
                self.unmount_children(node, parent, remove_top);
            }
            _ => self.unmount_children(node, parent, remove_top),
        }
    }

    fn unmount_children(&mut self, node: FiberId, parent: HostParent, remove_top: bool) {
        let mut child = self.arena[node].child;
        while let Some(c) = child {
            self.unmount_subtree(c, parent, remove_top);
            child = self.arena[c].sibling;
        }
    }

    // =========================================================================
    // Pass 2: lifecycles
    // =========================================================================

    fn commit_lifecycle_effect(&mut self, id: FiberId) {
        let Some(fiber) = self.arena.get(id) else {
            return;
        };
        let tag = fiber.effect_tag;
        if tag.contains(EffectTag::DELETION) {
            return;
        }

        if tag.contains(EffectTag::UPDATE) {
            match fiber.tag {
                FiberTag::ClassComponent => self.commit_class_lifecycle(id),
                FiberTag::HostComponent => self.commit_mount_if_new(id),
                _ => {}
            }
        }
        if tag.contains(EffectTag::CALLBACK) {
            let callbacks = self.arena[id]
                .update_queue
                .as_mut()
                .map(|q| q.take_callbacks())
                .unwrap_or_default();
            for callback in callbacks {
                callback();
            }
            self.drop_exhausted_queue(id);
        }
        if tag.contains(EffectTag::ERR) {
            self.deliver_captured(id);
        }
        if tag.contains(EffectTag::REF) {
            if let Some(callback) = self.arena[id].host_ref.clone() {
                if let Some(instance) = self.arena[id].state_node.instance_id() {
                    callback(Some(instance));
                }
            }
        }
    }

    fn commit_class_lifecycle(&mut self, id: FiberId) {
        let Some(instance) = self.arena[id].instance() else {
            return;
        };
        let capabilities = instance.borrow().capabilities();
        let current = self.arena[id].alternate;
        let mut updates = StateUpdates::new(id);
        let result = match current {
            // No alternate yet: this position just mounted.
            None => {
                if !capabilities.contains(Capabilities::DID_MOUNT) {
                    return;
                }
                trace!("did_mount {}", self.arena[id].name());
                instance.borrow_mut().did_mount(&mut updates)
            }
            Some(current) => {
                if !capabilities.contains(Capabilities::DID_UPDATE) {
                    return;
                }
                let prev_props = self.arena[current].memoized_props.props();
                let prev_state = self.arena[current].memoized_state.class_state();
                instance
                    .borrow_mut()
                    .did_update(&prev_props, &prev_state, &mut updates)
            }
        };
        if let Err(error) = result {
            self.capture_error(WorkFailure::commit(id, error));
            return;
        }
        self.drain_state_updates(updates, Priority::Task);
    }

    fn commit_mount_if_new(&mut self, id: FiberId) {
        // Update on a brand-new host instance is the commit_mount marker
        // from finalize_initial_children.
        if self.arena[id].alternate.is_some() {
            return;
        }
        let Some(instance) = self.arena[id].state_node.instance_id() else {
            return;
        };
        let ElementType::Host(ty) = self.arena[id].element_type.clone() else {
            return;
        };
        let props = self.arena[id].memoized_props.props();
        if let Err(error) = self.host.commit_mount(instance, &ty, &props) {
            self.capture_error(WorkFailure::commit(id, error.into()));
        }
    }

    // =========================================================================
    // Boundary delivery
    // =========================================================================

    /// Hand a captured error to its boundary's `catch` and schedule a
    /// Task-priority recovery render. The recovery is forced: the boundary's
    /// children were unmounted, so an input-equality bail-out would leave it
    /// empty forever.
    pub(crate) fn deliver_captured(&mut self, boundary: FiberId) {
        let captured = self
            .sched
            .captured_errors
            .remove(&boundary)
            .or_else(|| {
                let alternate = self.arena.get(boundary).and_then(|f| f.alternate)?;
                self.sched.captured_errors.remove(&alternate)
            });
        let Some(captured) = captured else {
            return;
        };
        let Some(instance) = self.arena.get(boundary).and_then(|f| f.instance()) else {
            return;
        };
        trace!(
            "delivering {:?} error to boundary {}",
            captured.phase,
            self.arena[boundary].name()
        );
        let mut updates = StateUpdates::new(boundary);
        if let Err(error) = instance.borrow_mut().catch(&captured, &mut updates) {
            self.capture_error(WorkFailure::commit(boundary, error));
            return;
        }
        self.drain_state_updates(updates, Priority::Task);
        self.enqueue(boundary, Update::force(Priority::Task));
        if let Err(error) = self.schedule_update(boundary, Priority::Task) {
            trace!("boundary recovery not schedulable: {error}");
        }
    }
}
