//! Complete phase - bottom-up half of the walk.
//!
//! Completion finalizes one fiber after its subtree: host fibers create or
//! diff their instances, context pushed at begin is popped, the fiber's
//! effect list splices into its parent, and pending priority is recomputed
//! from what survived. Coroutines take their second pass here: yields
//! collected, handler invoked, handler output walked as the real children.

use log::trace;
use smallvec::SmallVec;

use crate::element::{YieldValue, fold_text_content, single_text_child};
use crate::errors::{ComponentError, WorkFailure};
use crate::fiber::{
    CoroutinePhase, EffectTag, ElementType, FiberId, FiberProps, FiberTag, StateNode,
};
use crate::host::{HostAdapter, InstanceId};
use crate::queue::UpdateQueue;
use crate::reconcile::reconcile_children;
use crate::scheduler::Reconciler;
use crate::types::{Priority, Props};

impl<H: HostAdapter> Reconciler<H> {
    /// Complete `wip` and walk toward the root: siblings are returned for
    /// their own begin, parents complete in turn. Returns the next unit of
    /// work, or `None` once the whole tree is complete (parked for commit).
    pub(crate) fn complete_unit_of_work(
        &mut self,
        mut wip: FiberId,
    ) -> Result<Option<FiberId>, WorkFailure> {
        loop {
            if let Some(next) = self.complete_work(wip)? {
                // Coroutine handler output: descend before finishing.
                return Ok(Some(next));
            }
            self.reset_pending_priority(wip);
            let return_ = self.arena[wip].return_;
            let sibling = self.arena[wip].sibling;
            if let Some(parent) = return_ {
                self.splice_effects(parent, wip);
            }
            if let Some(sibling) = sibling {
                return Ok(Some(sibling));
            }
            match return_ {
                Some(parent) => wip = parent,
                None => {
                    trace!("tree complete, ready to commit");
                    self.sched.pending_commit = Some(wip);
                    return Ok(None);
                }
            }
        }
    }

    fn complete_work(&mut self, wip: FiberId) -> Result<Option<FiberId>, WorkFailure> {
        match self.arena[wip].tag {
            FiberTag::FunctionComponent
            | FiberTag::IndeterminateComponent
            | FiberTag::ClassComponent
            | FiberTag::Fragment
            | FiberTag::Yield => {
                self.pop_contexts_for(wip);
                Ok(None)
            }
            FiberTag::HostRoot => {
                self.pop_contexts_for(wip);
                if let StateNode::Root(root_id) = self.arena[wip].state_node {
                    if let Some(context) = self.roots[root_id].pending_context.take() {
                        self.roots[root_id].context = Some(context);
                    }
                }
                Ok(None)
            }
            FiberTag::HostPortal => {
                self.pop_contexts_for(wip);
                Ok(None)
            }
            FiberTag::HostText => self.complete_text(wip),
            FiberTag::HostComponent => self.complete_host(wip),
            FiberTag::Coroutine => self.complete_coroutine(wip),
        }
    }

    // =========================================================================
    // Host fibers
    // =========================================================================

    fn complete_text(&mut self, wip: FiberId) -> Result<Option<FiberId>, WorkFailure> {
        let FiberProps::Text(new_text) = self.arena[wip].pending_props.clone() else {
            return Ok(None);
        };
        let current = self.arena[wip].alternate;
        match (current, self.arena[wip].state_node.instance_id()) {
            (Some(current), Some(_)) => {
                let old_text = match &self.arena[current].memoized_props {
                    FiberProps::Text(text) => text.clone(),
                    _ => String::new(),
                };
                if old_text != new_text {
                    self.arena[wip].effect_tag |= EffectTag::UPDATE;
                }
            }
            _ => {
                let container = self.current_container(wip)?;
                let context = self.top_host_context();
                let instance = self
                    .host
                    .create_text_instance(&new_text, container, &context)
                    .map_err(|e| WorkFailure::render(wip, e.into()))?;
                self.arena[wip].state_node = StateNode::Text(instance);
            }
        }
        self.arena[wip].memoized_props = FiberProps::Text(new_text);
        Ok(None)
    }

    fn complete_host(&mut self, wip: FiberId) -> Result<Option<FiberId>, WorkFailure> {
        // Pop this fiber's own context first; instance creation happens in
        // the parent's host context.
        self.pop_contexts_for(wip);

        let ElementType::Host(ty) = self.arena[wip].element_type.clone() else {
            return Ok(None);
        };
        let FiberProps::Host { props, children } = self.arena[wip].pending_props.clone() else {
            return Ok(None);
        };
        let effective = self.effective_host_props(&ty, &props, &children);
        let container = self.current_container(wip)?;
        let context = self.top_host_context();

        let current = self.arena[wip].alternate;
        match (current, self.arena[wip].state_node.instance_id()) {
            (Some(current), Some(instance)) => {
                let old_effective = match self.arena[current].memoized_props.clone() {
                    FiberProps::Host {
                        props: old_props,
                        children: old_children,
                    } => self.effective_host_props(&ty, &old_props, &old_children),
                    _ => crate::types::empty_props(),
                };
                let diff = self
                    .host
                    .prepare_update(instance, &ty, &old_effective, &effective, container, &context)
                    .map_err(|e| WorkFailure::render(wip, e.into()))?;
                if let Some(diff) = diff {
                    self.arena[wip].diff_payload = Some(diff);
                    self.arena[wip].effect_tag |= EffectTag::UPDATE;
                }
            }
            _ => {
                let instance = self
                    .host
                    .create_instance(&ty, &effective, container, &context)
                    .map_err(|e| WorkFailure::render(wip, e.into()))?;
                self.append_all_children(instance, wip)?;
                self.arena[wip].state_node = StateNode::Host(instance);
                let wants_commit_mount = self
                    .host
                    .finalize_initial_children(instance, &ty, &effective, container)
                    .map_err(|e| WorkFailure::render(wip, e.into()))?;
                if wants_commit_mount {
                    // New instance plus Update reads as commit_mount in the
                    // lifecycle pass.
                    self.arena[wip].effect_tag |= EffectTag::UPDATE;
                }
            }
        }
        self.arena[wip].memoized_props = FiberProps::Host { props, children };
        Ok(None)
    }

    /// Props as the host adapter sees them, with a lone text child folded in
    /// when the host keeps such content on the instance itself. Prepared
    /// diffs are computed against this shape, so the commit hooks receive it
    /// too.
    pub(crate) fn effective_host_props(
        &mut self,
        ty: &str,
        props: &Props,
        children: &[crate::element::Element],
    ) -> Props {
        if self.host.should_set_text_content(ty, props) {
            if let Some(text) = single_text_child(children) {
                return fold_text_content(props, text);
            }
        }
        props.clone()
    }

    /// Attach every nearest host descendant to a freshly created instance.
    /// Portal subtrees belong to other containers and are skipped.
    fn append_all_children(
        &mut self,
        parent: InstanceId,
        wip: FiberId,
    ) -> Result<(), WorkFailure> {
        let mut node = self.arena[wip].child;
        while let Some(id) = node {
            let descend = match self.arena[id].tag {
                FiberTag::HostComponent | FiberTag::HostText => {
                    if let Some(instance) = self.arena[id].state_node.instance_id() {
                        self.host
                            .append_initial_child(parent, instance)
                            .map_err(|e| WorkFailure::render(wip, e.into()))?;
                    }
                    false
                }
                FiberTag::HostPortal => false,
                _ => true,
            };
            if descend {
                if let Some(child) = self.arena[id].child {
                    node = Some(child);
                    continue;
                }
            }
            node = self.next_within(id, wip);
        }
        Ok(())
    }

    /// Next node in a bounded subtree walk: sibling, else climb until one
    /// appears, stopping at `boundary`.
    fn next_within(&self, from: FiberId, boundary: FiberId) -> Option<FiberId> {
        let mut cursor = from;
        loop {
            if let Some(sibling) = self.arena[cursor].sibling {
                return Some(sibling);
            }
            match self.arena[cursor].return_ {
                Some(parent) if parent != boundary => cursor = parent,
                _ => return None,
            }
        }
    }

    fn current_container(&self, wip: FiberId) -> Result<crate::host::ContainerId, WorkFailure> {
        self.top_container().ok_or_else(|| {
            WorkFailure::render(
                wip,
                ComponentError("host fiber completed outside any container".into()),
            )
        })
    }

    // =========================================================================
    // Coroutines
    // =========================================================================

    fn complete_coroutine(&mut self, wip: FiberId) -> Result<Option<FiberId>, WorkFailure> {
        match self.arena[wip].coroutine_phase {
            CoroutinePhase::Collecting => {
                let yields = self.collect_yields(wip);
                let ElementType::Coroutine { handler, .. } =
                    self.arena[wip].element_type.clone()
                else {
                    return Ok(None);
                };
                let FiberProps::Coroutine { props, .. } = self.arena[wip].pending_props.clone()
                else {
                    return Ok(None);
                };
                trace!(
                    "coroutine {} handling {} yields",
                    self.arena[wip].name(),
                    yields.len()
                );
                let output = handler(&props, &yields);
                self.arena[wip].coroutine_phase = CoroutinePhase::Handling;

                let priority = self.sched.next_priority_level;
                let current_first = self.arena[wip]
                    .alternate
                    .and_then(|current| self.arena[current].child);
                let first =
                    reconcile_children(&mut self.arena, wip, current_first, &output, priority);
                self.arena[wip].child = first;
                match first {
                    Some(next) => Ok(Some(next)),
                    None => {
                        self.finish_coroutine(wip);
                        Ok(None)
                    }
                }
            }
            CoroutinePhase::Handling => {
                self.finish_coroutine(wip);
                Ok(None)
            }
        }
    }

    fn finish_coroutine(&mut self, wip: FiberId) {
        let pending = self.arena[wip].pending_props.clone();
        self.arena[wip].memoized_props = pending;
    }

    /// Yields surfaced anywhere in the collecting work list, in walk order.
    fn collect_yields(&self, wip: FiberId) -> SmallVec<[YieldValue; 4]> {
        let mut yields = SmallVec::new();
        let StateNode::CoroutineChild(first) = self.arena[wip].state_node else {
            return yields;
        };
        let mut node = first;
        while let Some(id) = node {
            let fiber = &self.arena[id];
            if fiber.tag == FiberTag::Yield {
                if let FiberProps::Yield(value) = &fiber.memoized_props {
                    yields.push(value.clone());
                }
            } else if fiber.child.is_some() {
                node = fiber.child;
                continue;
            }
            node = self.next_within(id, wip);
        }
        yields
    }

    // =========================================================================
    // Bookkeeping shared with the scheduler
    // =========================================================================

    /// After completion the fiber's remaining priority is whatever its own
    /// queue still holds, joined with its children's. Keeps the invariant
    /// that a fiber's pending priority bounds its whole subtree.
    fn reset_pending_priority(&mut self, wip: FiberId) {
        let mut priority = self.arena[wip]
            .update_queue
            .as_ref()
            .map(UpdateQueue::pending_priority)
            .unwrap_or(Priority::NoWork);
        let mut child = self.arena[wip].child;
        while let Some(id) = child {
            priority = Priority::more_urgent_of(priority, self.arena[id].pending_work_priority);
            child = self.arena[id].sibling;
        }
        self.arena[wip].pending_work_priority = priority;
    }

    /// Move the completed fiber's effect list onto its parent, appending the
    /// fiber itself when it carries effects of its own. Deletions recorded
    /// during reconciliation are already on the list and ride along.
    fn splice_effects(&mut self, parent: FiberId, wip: FiberId) {
        let child_first = self.arena[wip].first_effect;
        let child_last = self.arena[wip].last_effect;
        if let Some(first) = child_first {
            match self.arena[parent].last_effect {
                Some(last) => self.arena[last].next_effect = Some(first),
                None => self.arena[parent].first_effect = Some(first),
            }
        }
        if let Some(last) = child_last {
            self.arena[parent].last_effect = Some(last);
        }
        if !self.arena[wip].effect_tag.is_empty() {
            self.arena[wip].next_effect = None;
            match self.arena[parent].last_effect {
                Some(last) => self.arena[last].next_effect = Some(wip),
                None => self.arena[parent].first_effect = Some(wip),
            }
            self.arena[parent].last_effect = Some(wip);
        }
    }
}
