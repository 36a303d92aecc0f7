//! Begin phase - top-down half of the walk.
//!
//! `begin_work` renders one fiber's children and returns the first child to
//! descend into, or `None` when the fiber is a leaf or bailed out. Bail-outs
//! come in two flavors: the whole subtree is below the pass priority (skip
//! everything), or this fiber's inputs are unchanged (clone children and let
//! each decide for itself).

use std::cell::RefCell;
use std::rc::Rc;

use log::trace;

use crate::component::{Capabilities, Instance, StateUpdates};
use crate::element::{Element, ref_eq, single_text_child};
use crate::errors::WorkFailure;
use crate::fiber::{
    CoroutinePhase, EffectTag, ElementType, FiberId, FiberProps, FiberState, FiberTag, StateNode,
};
use crate::host::HostAdapter;
use crate::queue::{StateChange, Update};
use crate::reconcile::{
    clone_child_fibers, mount_children, reconcile_children, reconcile_children_in_place,
};
use crate::scheduler::Reconciler;
use crate::types::{Context, Props, State, merge_state};

impl<H: HostAdapter> Reconciler<H> {
    pub(crate) fn begin_work(&mut self, wip: FiberId) -> Result<Option<FiberId>, WorkFailure> {
        let ceiling = self.sched.next_priority_level;
        if !self.arena[wip]
            .pending_work_priority
            .at_least_as_urgent_as(ceiling)
        {
            trace!("skipping {} below {:?}", self.arena[wip].name(), ceiling);
            return Ok(None);
        }

        match self.arena[wip].tag {
            FiberTag::HostRoot => self.begin_host_root(wip),
            FiberTag::ClassComponent => self.begin_class(wip),
            FiberTag::FunctionComponent | FiberTag::IndeterminateComponent => {
                self.begin_function(wip)
            }
            FiberTag::HostComponent => self.begin_host(wip),
            FiberTag::HostText => Ok(None),
            FiberTag::Fragment => self.begin_fragment(wip),
            FiberTag::HostPortal => self.begin_portal(wip),
            FiberTag::Coroutine => Ok(self.begin_coroutine(wip)),
            FiberTag::Yield => {
                let pending = self.arena[wip].pending_props.clone();
                self.arena[wip].memoized_props = pending;
                Ok(None)
            }
        }
    }

    /// Re-begin a boundary whose subtree failed: render nothing, delete the
    /// committed children, and mark the boundary for error delivery at
    /// commit. Memoized props are left stale so the recovery pass renders.
    pub(crate) fn begin_failed_work(&mut self, wip: FiberId) -> Option<FiberId> {
        trace!("rendering failed boundary {} as empty", self.arena[wip].name());
        self.arena[wip].effect_tag |= EffectTag::ERR;
        let priority = self.sched.next_priority_level;
        let current_first = self.arena[wip]
            .alternate
            .and_then(|current| self.arena[current].child);
        let first = reconcile_children(&mut self.arena, wip, current_first, &[], priority);
        self.arena[wip].child = first;
        None
    }

    // =========================================================================
    // Per-tag begin
    // =========================================================================

    fn begin_host_root(&mut self, wip: FiberId) -> Result<Option<FiberId>, WorkFailure> {
        let StateNode::Root(root_id) = self.arena[wip].state_node else {
            return Ok(None);
        };
        let container = self.roots[root_id].container;
        let host_context = self.host.get_root_host_context(container);
        self.host_context_stack.push((wip, host_context));
        self.container_stack.push((wip, container));
        let top_context = self.roots[root_id]
            .pending_context
            .clone()
            .or_else(|| self.roots[root_id].context.clone())
            .unwrap_or_default();
        self.context_stack.push((wip, top_context));

        let ceiling = self.sched.next_priority_level;
        let (applied, has_callbacks) = match self.arena[wip].update_queue.as_mut() {
            Some(queue) => {
                let applied = queue.apply_root(ceiling);
                (applied, queue.has_callbacks())
            }
            None => (None, false),
        };
        if has_callbacks {
            self.arena[wip].effect_tag |= EffectTag::CALLBACK;
        }

        let Some(next_element) = applied else {
            return Ok(self.bailout_already_finished(wip));
        };
        let previous = match &self.arena[wip].memoized_state {
            FiberState::Root(element) => element.clone(),
            _ => None,
        };
        if next_element == previous {
            self.drop_exhausted_queue(wip);
            return Ok(self.bailout_already_finished(wip));
        }

        self.arena[wip].memoized_state = FiberState::Root(next_element.clone());
        self.drop_exhausted_queue(wip);
        let children: &[Element] = match &next_element {
            Some(element) => std::slice::from_ref(element),
            None => &[],
        };
        self.reconcile_into(wip, children);
        Ok(self.arena[wip].child)
    }

    fn begin_function(&mut self, wip: FiberId) -> Result<Option<FiberId>, WorkFailure> {
        if self.arena[wip].tag == FiberTag::IndeterminateComponent {
            self.arena[wip].tag = FiberTag::FunctionComponent;
        } else if self.arena[wip].alternate.is_some()
            && self.arena[wip].pending_props == self.arena[wip].memoized_props
        {
            trace!("bailing out on unchanged {}", self.arena[wip].name());
            return Ok(self.bailout_already_finished(wip));
        }

        let ElementType::Function { render, .. } = self.arena[wip].element_type.clone() else {
            return Ok(None);
        };
        let props = self.arena[wip].pending_props.props();
        let context = self.top_context();
        let element = render(&props, &context);

        let pending = self.arena[wip].pending_props.clone();
        self.arena[wip].memoized_props = pending;
        self.reconcile_into(wip, std::slice::from_ref(&element));
        Ok(self.arena[wip].child)
    }

    fn begin_class(&mut self, wip: FiberId) -> Result<Option<FiberId>, WorkFailure> {
        match self.arena[wip].instance() {
            None => self.mount_class(wip),
            Some(instance) => self.update_class(wip, instance),
        }
    }

    fn mount_class(&mut self, wip: FiberId) -> Result<Option<FiberId>, WorkFailure> {
        let ceiling = self.sched.next_priority_level;
        let context = self.top_context();
        let new_props = self.arena[wip].pending_props.props();
        let ElementType::Class(descriptor) = self.arena[wip].element_type.clone() else {
            return Ok(None);
        };

        let instance: Instance = Rc::new(RefCell::new(descriptor.construct()));
        let capabilities = instance.borrow().capabilities();
        let mut state = instance.borrow_mut().initial_state(&new_props);

        if capabilities.contains(Capabilities::WILL_MOUNT) {
            let mut updates = StateUpdates::new(wip);
            instance
                .borrow_mut()
                .will_mount(&new_props, &state, &mut updates)
                .map_err(|e| WorkFailure::render(wip, e))?;
            // Pre-mount requests fold straight into the first-render state.
            state = fold_state_changes(state, updates.requests, &new_props);
        }
        if let Some(queue) = self.arena[wip].update_queue.as_mut() {
            state = queue.apply(ceiling, &state, &new_props);
            queue.take_force_update();
        }

        self.arena[wip].state_node = StateNode::Class(instance.clone());
        let element = instance
            .borrow_mut()
            .render(&new_props, &state, &context)
            .map_err(|e| WorkFailure::render(wip, e))?;
        self.arena[wip].memoized_state = FiberState::Class(state.clone());
        self.finish_class(wip, &instance, capabilities, new_props, state, element, context)
    }

    fn update_class(
        &mut self,
        wip: FiberId,
        instance: Instance,
    ) -> Result<Option<FiberId>, WorkFailure> {
        let ceiling = self.sched.next_priority_level;
        let context = self.top_context();
        let capabilities = instance.borrow().capabilities();
        let new_props = self.arena[wip].pending_props.props();
        let old_props = self.arena[wip].memoized_props.props();
        let props_changed = self.arena[wip].pending_props != self.arena[wip].memoized_props;

        if props_changed && capabilities.contains(Capabilities::WILL_RECEIVE_PROPS) {
            let mut updates = StateUpdates::new(wip);
            instance
                .borrow_mut()
                .will_receive_props(&new_props, &context, &mut updates)
                .map_err(|e| WorkFailure::render(wip, e))?;
            // Queue them at the pass priority so they apply just below.
            for change in updates.requests {
                self.arena[wip]
                    .queue_mut()
                    .insert(Update::from_state_change(ceiling, change));
            }
            if updates.force_update {
                self.arena[wip].queue_mut().insert(Update::force(ceiling));
            }
        }

        let old_state = self.arena[wip].memoized_state.class_state();
        let (new_state, forced, has_callbacks) = match self.arena[wip].update_queue.as_mut() {
            Some(queue) => {
                let state = queue.apply(ceiling, &old_state, &new_props);
                (state, queue.take_force_update(), queue.has_callbacks())
            }
            None => (old_state.clone(), false, false),
        };
        let state_changed = new_state != old_state;
        if has_callbacks {
            self.arena[wip].effect_tag |= EffectTag::CALLBACK;
        }

        let should_render = if forced {
            true
        } else if !props_changed && !state_changed {
            false
        } else if capabilities.contains(Capabilities::PURE) {
            props_changed || state_changed
        } else {
            instance
                .borrow_mut()
                .should_update(&old_props, &new_props, &old_state, &new_state)
        };

        if !should_render {
            trace!("bailing out on {}", self.arena[wip].name());
            // The bail-out still adopts the new inputs.
            let pending = self.arena[wip].pending_props.clone();
            self.arena[wip].memoized_props = pending;
            self.arena[wip].memoized_state = FiberState::Class(new_state.clone());
            self.drop_exhausted_queue(wip);
            if capabilities.contains(Capabilities::CHILD_CONTEXT) {
                if let Some(extra) = instance.borrow().child_context(&new_props, &new_state) {
                    let merged = merge_state(&context, &extra);
                    self.context_stack.push((wip, merged));
                }
            }
            return Ok(self.bailout_already_finished(wip));
        }

        let element = instance
            .borrow_mut()
            .render(&new_props, &new_state, &context)
            .map_err(|e| WorkFailure::render(wip, e))?;
        self.arena[wip].memoized_state = FiberState::Class(new_state.clone());
        self.finish_class(wip, &instance, capabilities, new_props, new_state, element, context)
    }

    fn finish_class(
        &mut self,
        wip: FiberId,
        instance: &Instance,
        capabilities: Capabilities,
        props: Props,
        state: State,
        element: Element,
        inherited_context: Context,
    ) -> Result<Option<FiberId>, WorkFailure> {
        if capabilities.intersects(Capabilities::COMMIT_LIFECYCLES) {
            self.arena[wip].effect_tag |= EffectTag::UPDATE;
        }
        if capabilities.contains(Capabilities::CHILD_CONTEXT) {
            if let Some(extra) = instance.borrow().child_context(&props, &state) {
                let merged = merge_state(&inherited_context, &extra);
                self.context_stack.push((wip, merged));
            }
        }
        let pending = self.arena[wip].pending_props.clone();
        self.arena[wip].memoized_props = pending;
        self.drop_exhausted_queue(wip);
        self.reconcile_into(wip, std::slice::from_ref(&element));
        Ok(self.arena[wip].child)
    }

    fn begin_host(&mut self, wip: FiberId) -> Result<Option<FiberId>, WorkFailure> {
        let ElementType::Host(ty) = self.arena[wip].element_type.clone() else {
            return Ok(None);
        };
        let parent_context = self.top_host_context();
        let child_context = self.host.get_child_host_context(&parent_context, &ty);
        self.host_context_stack.push((wip, child_context));

        let current = self.arena[wip].alternate;
        let ref_changed = match current {
            None => self.arena[wip].host_ref.is_some(),
            Some(current) => !ref_eq(
                &self.arena[current].host_ref,
                &self.arena[wip].host_ref,
            ),
        };
        if ref_changed {
            self.arena[wip].effect_tag |= EffectTag::REF;
        }

        if current.is_some() && self.arena[wip].pending_props == self.arena[wip].memoized_props {
            return Ok(self.bailout_already_finished(wip));
        }

        let FiberProps::Host { props, children } = self.arena[wip].pending_props.clone() else {
            return Ok(None);
        };
        let direct_text =
            self.host.should_set_text_content(&ty, &props) && single_text_child(&children).is_some();
        if let Some(current) = current {
            if let FiberProps::Host {
                props: old_props,
                children: old_children,
            } = self.arena[current].memoized_props.clone()
            {
                let old_direct = self.host.should_set_text_content(&ty, &old_props)
                    && single_text_child(&old_children).is_some();
                if old_direct && !direct_text {
                    self.arena[wip].effect_tag |= EffectTag::CONTENT_RESET;
                }
            }
        }

        let child_elements: &[Element] = if direct_text { &[] } else { &children };
        self.reconcile_into(wip, child_elements);
        Ok(self.arena[wip].child)
    }

    fn begin_fragment(&mut self, wip: FiberId) -> Result<Option<FiberId>, WorkFailure> {
        if self.arena[wip].alternate.is_some()
            && self.arena[wip].pending_props == self.arena[wip].memoized_props
        {
            return Ok(self.bailout_already_finished(wip));
        }
        let FiberProps::Children(children) = self.arena[wip].pending_props.clone() else {
            return Ok(None);
        };
        let pending = self.arena[wip].pending_props.clone();
        self.arena[wip].memoized_props = pending;
        self.reconcile_into(wip, &children);
        Ok(self.arena[wip].child)
    }

    fn begin_portal(&mut self, wip: FiberId) -> Result<Option<FiberId>, WorkFailure> {
        let ElementType::Portal(container) = self.arena[wip].element_type else {
            return Ok(None);
        };
        self.container_stack.push((wip, container));
        let host_context = self.host.get_root_host_context(container);
        self.host_context_stack.push((wip, host_context));

        let current = self.arena[wip].alternate;
        if current.is_some() && self.arena[wip].pending_props == self.arena[wip].memoized_props {
            return Ok(self.bailout_already_finished(wip));
        }
        let FiberProps::Children(children) = self.arena[wip].pending_props.clone() else {
            return Ok(None);
        };
        let pending = self.arena[wip].pending_props.clone();
        self.arena[wip].memoized_props = pending;
        let priority = self.sched.next_priority_level;
        let first = if current.is_none() {
            // Portal children insert into a foreign container; the portal's
            // own placement never carries them, so even a fresh mount tracks
            // per-child placements.
            reconcile_children(&mut self.arena, wip, None, &children, priority)
        } else {
            let current_first = current.and_then(|c| self.arena[c].child);
            reconcile_children(&mut self.arena, wip, current_first, &children, priority)
        };
        self.arena[wip].child = first;
        Ok(first)
    }

    /// Coroutines render their own children first purely to collect yields.
    /// That list is reconciled in place and stashed off-tree in the state
    /// node; completion swaps in the handler output as the real child list.
    fn begin_coroutine(&mut self, wip: FiberId) -> Option<FiberId> {
        let FiberProps::Coroutine { children, .. } = self.arena[wip].pending_props.clone() else {
            return None;
        };
        let previous_list = match self.arena[wip].state_node {
            StateNode::CoroutineChild(first) => first,
            _ => None,
        };
        self.arena[wip].coroutine_phase = CoroutinePhase::Collecting;
        let priority = self.sched.next_priority_level;
        let first =
            reconcile_children_in_place(&mut self.arena, wip, previous_list, &children, priority);
        self.arena[wip].state_node = StateNode::CoroutineChild(first);
        first
    }

    // =========================================================================
    // Shared paths
    // =========================================================================

    /// Reconcile `children` under `wip`: fresh subtrees mount without effect
    /// tracking, existing ones diff against the committed children.
    pub(crate) fn reconcile_into(&mut self, wip: FiberId, children: &[Element]) {
        let current = self.arena[wip].alternate;
        let priority = self.sched.next_priority_level;
        let first = match current {
            None => mount_children(&mut self.arena, wip, None, children, priority),
            Some(current) => {
                let current_first = self.arena[current].child;
                reconcile_children(&mut self.arena, wip, current_first, children, priority)
            }
        };
        self.arena[wip].child = first;
    }

    /// Inputs unchanged: reuse the finished output. Children with pending
    /// work of their own are cloned and revisited; otherwise the whole
    /// subtree is skipped.
    pub(crate) fn bailout_already_finished(&mut self, wip: FiberId) -> Option<FiberId> {
        let ceiling = self.sched.next_priority_level;
        let mut child = self.arena[wip].child;
        let mut has_child_work = false;
        while let Some(id) = child {
            if self.arena[id]
                .pending_work_priority
                .at_least_as_urgent_as(ceiling)
            {
                has_child_work = true;
                break;
            }
            child = self.arena[id].sibling;
        }
        if !has_child_work {
            return None;
        }
        clone_child_fibers(&mut self.arena, wip);
        self.arena[wip].child
    }

    pub(crate) fn drop_exhausted_queue(&mut self, wip: FiberId) {
        if self.arena[wip]
            .update_queue
            .as_ref()
            .is_some_and(|q| q.is_exhausted())
        {
            self.arena[wip].update_queue = None;
        }
    }
}

/// Fold lifecycle state-change requests directly into `state`, outside the
/// queue. Used before the first render, where no queue exists yet.
fn fold_state_changes(
    mut state: State,
    changes: Vec<StateChange>,
    props: &Props,
) -> State {
    for change in changes {
        state = match change {
            StateChange::Partial(partial) => merge_state(&state, &partial),
            StateChange::Updater(updater) => {
                let partial = updater(&state, props);
                merge_state(&state, &partial)
            }
            StateChange::Replace(next) => next,
        };
    }
    state
}
