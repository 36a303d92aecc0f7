//! Scheduler and work loop.
//!
//! - updates bubble their priority to the root, which joins a scheduled list
//! - the loop always works on the most urgent scheduled root, cloning a
//!   work-in-progress tree from its committed tree
//! - synchronous work flushes before the triggering call returns; everything
//!   else waits for the batch end or a host callback
//! - a more urgent update invalidates the in-flight unit of work, discarding
//!   partial lower-priority progress
//!
//! All transient state lives in [`SchedulerState`]; `perform_work` restores
//! it on the way out whether the batch succeeded or failed.

use std::collections::{HashMap, HashSet};

use log::trace;
use slotmap::SlotMap;

use crate::component::{Capabilities, StateUpdates};
use crate::errors::{CapturedError, ErrorPhase, ReconcileError, WorkFailure};
use crate::fiber::{FiberArena, FiberId, FiberTag, RootId, StateNode};
use crate::host::{ContainerId, Deadline, HostAdapter, UNIT_OF_WORK_BUDGET};
use crate::queue::{StateChange, Update, UpdateCallback};
use crate::types::{Context, Priority};

/// One mounted tree: its committed root fiber and host container, plus its
/// place in the scheduled-roots list.
pub(crate) struct FiberRoot {
    pub current: FiberId,
    pub container: ContainerId,
    pub next_scheduled_root: Option<RootId>,
    pub is_scheduled: bool,
    /// Committed top-level context.
    pub context: Option<Context>,
    /// Context for the next render, promoted to `context` at completion.
    pub pending_context: Option<Context>,
}

/// Transient scheduling state. Everything here resets between batches; only
/// the fiber trees and roots persist.
#[derive(Default)]
pub(crate) struct SchedulerState {
    /// Priority applied to new updates; `NoWork` means use the default
    /// (synchronous) scheduling.
    pub priority_context: Priority,
    pub is_performing_work: bool,
    pub is_committing: bool,
    pub is_batching_updates: bool,

    pub next_unit_of_work: Option<FiberId>,
    pub next_priority_level: Priority,
    /// A fully completed tree waiting for commit time.
    pub pending_commit: Option<FiberId>,
    pub deadline_has_expired: bool,

    pub scheduled_root_head: Option<RootId>,
    pub scheduled_root_tail: Option<RootId>,

    /// Errors captured for a boundary, keyed by the boundary fiber.
    pub captured_errors: HashMap<FiberId, CapturedError>,
    /// Boundaries that already failed this batch; skipped by the search.
    pub failed_boundaries: HashSet<FiberId>,
    /// Boundaries owed a delivery after the current commit finishes.
    pub commit_phase_boundaries: Vec<FiberId>,
    pub first_uncaught_error: Option<ReconcileError>,

    pub is_animation_callback_scheduled: bool,
    pub is_deferred_callback_scheduled: bool,
}

/// The reconciler: fiber trees, scheduling state, and the host adapter they
/// drive.
pub struct Reconciler<H: HostAdapter> {
    pub(crate) host: H,
    pub(crate) arena: FiberArena,
    pub(crate) roots: SlotMap<RootId, FiberRoot>,
    pub(crate) sched: SchedulerState,

    // Context stacks for the walk in progress, each entry tagged with the
    // fiber that pushed it.
    pub(crate) host_context_stack: Vec<(FiberId, H::HostContext)>,
    pub(crate) container_stack: Vec<(FiberId, ContainerId)>,
    pub(crate) context_stack: Vec<(FiberId, Context)>,
}

impl<H: HostAdapter> Reconciler<H> {
    pub fn new(host: H) -> Self {
        Reconciler {
            host,
            arena: FiberArena::default(),
            roots: SlotMap::with_key(),
            sched: SchedulerState::default(),
            host_context_stack: Vec::new(),
            container_stack: Vec::new(),
            context_stack: Vec::new(),
        }
    }

    /// The host adapter, for embedders that need to reach their platform.
    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    // =========================================================================
    // Priorities
    // =========================================================================

    /// Priority assigned to updates made right now.
    pub(crate) fn update_priority(&self) -> Priority {
        if self.sched.priority_context.is_no_work() {
            Priority::Synchronous
        } else {
            self.sched.priority_context
        }
    }

    /// Run `f` with the update priority overridden, restoring it after.
    pub fn perform_with_priority<T>(
        &mut self,
        priority: Priority,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let previous = self.sched.priority_context;
        self.sched.priority_context = priority;
        let result = f(self);
        self.sched.priority_context = previous;
        result
    }

    /// Defer synchronous flushing while `f` runs; flush once at the end.
    pub fn batched_updates<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> T,
    ) -> Result<T, ReconcileError> {
        let previous = self.sched.is_batching_updates;
        self.sched.is_batching_updates = true;
        let result = f(self);
        self.sched.is_batching_updates = previous;
        if !previous && !self.sched.is_performing_work {
            self.perform_work(Priority::Task, None)?;
        }
        Ok(result)
    }

    // =========================================================================
    // Update plumbing
    // =========================================================================

    /// Insert an update into a fiber's queue and its alternate's, so both
    /// buffers see it regardless of which one renders next.
    pub(crate) fn enqueue(&mut self, fiber: FiberId, update: Update) {
        let alternate = self.arena[fiber].alternate;
        self.arena[fiber].queue_mut().insert(update.clone());
        if let Some(alt) = alternate {
            self.arena[alt].queue_mut().insert(update);
        }
    }

    /// Drain lifecycle-requested state changes into the owning fiber's queue
    /// and schedule the work. Failures here mean the fiber is gone; the
    /// requests are dropped with a trace.
    pub(crate) fn drain_state_updates(&mut self, updates: StateUpdates, priority: Priority) {
        if updates.is_empty() {
            return;
        }
        let fiber = updates.fiber();
        if !self.arena.contains(fiber) {
            trace!("dropping state updates for unmounted fiber");
            return;
        }
        for change in updates.requests {
            self.enqueue(fiber, Update::from_state_change(priority, change));
        }
        if updates.force_update {
            self.enqueue(fiber, Update::force(priority));
        }
        if let Err(error) = self.schedule_update(fiber, priority) {
            trace!("state update not schedulable: {error}");
        }
    }

    /// External entry: request a state change on a mounted class fiber.
    pub fn set_state(&mut self, fiber: FiberId, change: StateChange) -> Result<(), ReconcileError> {
        self.set_state_with_callback(fiber, change, None)
    }

    /// As [`Reconciler::set_state`], with a callback invoked after the commit
    /// that applies the change.
    pub fn set_state_with_callback(
        &mut self,
        fiber: FiberId,
        change: StateChange,
        callback: Option<UpdateCallback>,
    ) -> Result<(), ReconcileError> {
        if !self.arena.contains(fiber) {
            return Err(ReconcileError::Unmounted);
        }
        let priority = self.update_priority();
        let mut update = Update::from_state_change(priority, change);
        update.callback = callback;
        self.enqueue(fiber, update);
        self.schedule_update(fiber, priority)
    }

    /// Request a re-render that skips `should_update`.
    pub fn force_update(&mut self, fiber: FiberId) -> Result<(), ReconcileError> {
        if !self.arena.contains(fiber) {
            return Err(ReconcileError::Unmounted);
        }
        let priority = self.update_priority();
        self.enqueue(fiber, Update::force(priority));
        self.schedule_update(fiber, priority)
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Bubble `priority` from `fiber` to its root across both buffers, then
    /// register and dispatch the root.
    ///
    /// Stops early when an ancestor (and its alternate) already carry work at
    /// least as urgent: the root was registered when that work was scheduled.
    pub(crate) fn schedule_update(
        &mut self,
        fiber: FiberId,
        priority: Priority,
    ) -> Result<(), ReconcileError> {
        if priority.is_no_work() {
            return Ok(());
        }
        // Preemption: in-flight less urgent work is abandoned and restarted
        // from the committed tree on the next loop iteration.
        if self.sched.next_unit_of_work.is_some()
            && priority.more_urgent_than(self.sched.next_priority_level)
        {
            trace!(
                "preempting {:?} work for {:?} update",
                self.sched.next_priority_level, priority
            );
            self.sched.next_unit_of_work = None;
        }

        let mut node = fiber;
        loop {
            let fiber_ref = &mut self.arena[node];
            let already_urgent = fiber_ref
                .pending_work_priority
                .at_least_as_urgent_as(priority);
            fiber_ref.raise_pending_priority(priority);
            let alternate = fiber_ref.alternate;
            let return_ = fiber_ref.return_;
            let is_root = fiber_ref.tag == FiberTag::HostRoot;
            let root_state = match &fiber_ref.state_node {
                StateNode::Root(root_id) => Some(*root_id),
                _ => None,
            };

            let mut alternate_already_urgent = true;
            if let Some(alt) = alternate {
                let alt_ref = &mut self.arena[alt];
                alternate_already_urgent = alt_ref
                    .pending_work_priority
                    .at_least_as_urgent_as(priority);
                alt_ref.raise_pending_priority(priority);
            }

            match return_ {
                Some(parent) => {
                    if already_urgent && alternate_already_urgent {
                        // Ancestors and root already know about this level.
                        return Ok(());
                    }
                    node = parent;
                }
                None => {
                    if !is_root {
                        return Err(ReconcileError::Unmounted);
                    }
                    let root_id = root_state.ok_or(ReconcileError::Unmounted)?;
                    return self.schedule_root(root_id, priority);
                }
            }
        }
    }

    fn schedule_root(&mut self, root_id: RootId, priority: Priority) -> Result<(), ReconcileError> {
        if !self.roots[root_id].is_scheduled {
            self.roots[root_id].is_scheduled = true;
            self.roots[root_id].next_scheduled_root = None;
            match self.sched.scheduled_root_tail {
                Some(tail) => self.roots[tail].next_scheduled_root = Some(root_id),
                None => self.sched.scheduled_root_head = Some(root_id),
            }
            self.sched.scheduled_root_tail = Some(root_id);
        }

        match priority {
            Priority::NoWork => Ok(()),
            Priority::Synchronous | Priority::Task => {
                // Task joins the current batch when one is open; otherwise it
                // flushes now, together with any synchronous work.
                if self.sched.is_performing_work || self.sched.is_batching_updates {
                    Ok(())
                } else {
                    self.perform_work(Priority::Task, None)
                }
            }
            Priority::Animation => {
                if !self.sched.is_animation_callback_scheduled {
                    self.sched.is_animation_callback_scheduled = true;
                    self.host.schedule_animation_callback();
                }
                Ok(())
            }
            Priority::High | Priority::Low | Priority::Offscreen => {
                if !self.sched.is_deferred_callback_scheduled {
                    self.sched.is_deferred_callback_scheduled = true;
                    self.host.schedule_deferred_callback();
                }
                Ok(())
            }
        }
    }

    /// Host re-entry for a previously requested animation callback.
    pub fn perform_animation_work(&mut self) -> Result<(), ReconcileError> {
        self.sched.is_animation_callback_scheduled = false;
        self.perform_work(Priority::Animation, None)
    }

    /// Host re-entry for a previously requested deferred callback, with the
    /// host's idle budget.
    pub fn perform_deferred_work(&mut self, deadline: &dyn Deadline) -> Result<(), ReconcileError> {
        self.sched.is_deferred_callback_scheduled = false;
        self.perform_work(Priority::Offscreen, Some(deadline))
    }

    // =========================================================================
    // Work loop
    // =========================================================================

    /// Flush all scheduled work at least as urgent as `ceiling` (under the
    /// scheduling comparator, so a Task ceiling flushes Synchronous too).
    ///
    /// Transient state is restored on the way out regardless of outcome; an
    /// error with no boundary to absorb it surfaces here.
    pub(crate) fn perform_work(
        &mut self,
        ceiling: Priority,
        deadline: Option<&dyn Deadline>,
    ) -> Result<(), ReconcileError> {
        if self.sched.is_performing_work {
            return Err(ReconcileError::NestedWork);
        }
        self.sched.is_performing_work = true;
        self.sched.deadline_has_expired = false;

        self.work_loop(ceiling, deadline);

        // Work the loop could not reach (deadline expired, or above the
        // ceiling after a re-entry cleared the request flag) needs another
        // host callback; no new update will arrive to ask for one.
        self.request_callback_for_pending_work();

        // Batch cleanup contract: error or not, the next batch starts clean.
        self.sched.is_performing_work = false;
        self.sched.failed_boundaries.clear();
        self.sched.captured_errors.clear();
        self.sched.commit_phase_boundaries.clear();

        match self.sched.first_uncaught_error.take() {
            Some(error) => {
                self.sched.next_unit_of_work = None;
                self.sched.pending_commit = None;
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn work_loop(&mut self, ceiling: Priority, deadline: Option<&dyn Deadline>) {
        loop {
            // A parked commit goes first: it is finished work and nothing
            // may start over it.
            if let Some(finished) = self.sched.pending_commit {
                let urgent = self
                    .sched
                    .next_priority_level
                    .at_least_as_urgent_as(Priority::High);
                let has_time =
                    deadline.is_none_or(|d| d.time_remaining() > UNIT_OF_WORK_BUDGET);
                if urgent || has_time {
                    self.sched.pending_commit = None;
                    self.commit_all_work(finished);
                } else {
                    self.sched.deadline_has_expired = true;
                    break;
                }
            }

            if self.sched.next_unit_of_work.is_none() {
                self.find_next_unit_of_work();
            }
            let Some(wip) = self.sched.next_unit_of_work else {
                break;
            };
            if !self.sched.next_priority_level.within_batch_ceiling(ceiling) {
                break;
            }
            // Only below-Task work is cooperative; urgent levels run to
            // completion regardless of the deadline.
            if !self
                .sched
                .next_priority_level
                .at_least_as_urgent_as(Priority::Task)
            {
                if let Some(d) = deadline {
                    if d.time_remaining() <= UNIT_OF_WORK_BUDGET {
                        self.sched.deadline_has_expired = true;
                        break;
                    }
                }
            }

            match self.perform_unit_of_work(wip) {
                Ok(next) => self.sched.next_unit_of_work = next,
                Err(failure) => {
                    self.sched.next_unit_of_work = None;
                    self.capture_error(failure);
                    // No boundary left to restart from: the batch is over.
                    if self.sched.next_unit_of_work.is_none() {
                        break;
                    }
                }
            }
        }
    }

    /// Re-request a host callback for work still scheduled once a batch ends.
    /// The dedup flags keep this to at most one outstanding request per kind.
    fn request_callback_for_pending_work(&mut self) {
        let mut pending = if self.sched.pending_commit.is_some() {
            self.sched.next_priority_level
        } else {
            Priority::NoWork
        };
        let mut cursor = self.sched.scheduled_root_head;
        while let Some(root_id) = cursor {
            let root_priority = self.arena[self.roots[root_id].current].pending_work_priority;
            pending = Priority::more_urgent_of(pending, root_priority);
            cursor = self.roots[root_id].next_scheduled_root;
        }
        match pending {
            Priority::Animation => {
                if !self.sched.is_animation_callback_scheduled {
                    self.sched.is_animation_callback_scheduled = true;
                    self.host.schedule_animation_callback();
                }
            }
            Priority::High | Priority::Low | Priority::Offscreen => {
                if !self.sched.is_deferred_callback_scheduled {
                    self.sched.is_deferred_callback_scheduled = true;
                    self.host.schedule_deferred_callback();
                }
            }
            _ => {}
        }
    }

    fn perform_unit_of_work(
        &mut self,
        wip: FiberId,
    ) -> Result<Option<FiberId>, WorkFailure> {
        let next = if self.sched.captured_errors.contains_key(&wip) {
            self.begin_failed_work(wip)
        } else {
            self.begin_work(wip)?
        };
        match next {
            Some(child) => Ok(Some(child)),
            None => self.complete_unit_of_work(wip),
        }
    }

    /// Pick the most urgent scheduled root, pruning roots with nothing left,
    /// and clone a fresh work-in-progress from its committed tree.
    fn find_next_unit_of_work(&mut self) {
        let mut keep: Vec<(RootId, Priority)> = Vec::new();
        let mut cursor = self.sched.scheduled_root_head.take();
        self.sched.scheduled_root_tail = None;
        while let Some(root_id) = cursor {
            cursor = self.roots[root_id].next_scheduled_root.take();
            let priority = self.arena[self.roots[root_id].current].pending_work_priority;
            if priority.is_no_work() {
                self.roots[root_id].is_scheduled = false;
            } else {
                keep.push((root_id, priority));
            }
        }
        // Relink survivors in arrival order.
        for &(root_id, _) in &keep {
            match self.sched.scheduled_root_tail {
                Some(tail) => self.roots[tail].next_scheduled_root = Some(root_id),
                None => self.sched.scheduled_root_head = Some(root_id),
            }
            self.sched.scheduled_root_tail = Some(root_id);
        }

        let best = keep
            .iter()
            .copied()
            .reduce(|best, candidate| {
                if candidate.1.more_urgent_than(best.1) {
                    candidate
                } else {
                    best
                }
            });

        match best {
            None => {
                self.sched.next_unit_of_work = None;
                self.sched.next_priority_level = Priority::NoWork;
            }
            Some((root_id, priority)) => {
                trace!("starting {:?} work on root {:?}", priority, root_id);
                self.sched.next_priority_level = priority;
                let current = self.roots[root_id].current;
                let props = self.arena[current].pending_props.clone();
                let wip = self.arena.create_work_in_progress(current, props, priority);
                self.host_context_stack.clear();
                self.container_stack.clear();
                self.context_stack.clear();
                self.sched.next_unit_of_work = Some(wip);
            }
        }
    }

    // =========================================================================
    // Error capture
    // =========================================================================

    /// Route a failure to the nearest error boundary above it, or record it
    /// as uncaught.
    pub(crate) fn capture_error(&mut self, failure: WorkFailure) {
        let component = self
            .arena
            .get(failure.fiber)
            .map(|f| f.name())
            .unwrap_or_else(|| "#unknown".to_string());
        let captured = CapturedError {
            message: failure.error.0.clone(),
            component,
            phase: failure.phase,
        };

        let boundary = self.find_boundary_above(failure.fiber);
        match boundary {
            Some(boundary) => {
                trace!(
                    "captured {:?} error from {} at boundary {}",
                    failure.phase,
                    captured.component,
                    self.arena[boundary].name()
                );
                if self.arena[boundary].tag == FiberTag::HostRoot
                    && self.sched.first_uncaught_error.is_none()
                {
                    // The root absorbs the failure only structurally, by
                    // rendering nothing; the error still surfaces.
                    self.sched.first_uncaught_error =
                        Some(Self::uncaught(&failure, captured.component.clone()));
                }
                self.sched.failed_boundaries.insert(boundary);
                if let Some(alt) = self.arena[boundary].alternate {
                    self.sched.failed_boundaries.insert(alt);
                }
                self.sched.captured_errors.insert(boundary, captured);
                match failure.phase {
                    ErrorPhase::Render => {
                        self.unwind_contexts(failure.fiber, boundary);
                        self.sched.next_unit_of_work = Some(boundary);
                    }
                    ErrorPhase::Commit => {
                        self.sched.commit_phase_boundaries.push(boundary);
                    }
                }
            }
            None => {
                // Even the root has failed this batch. Abandon everything.
                if self.sched.first_uncaught_error.is_none() {
                    self.sched.first_uncaught_error =
                        Some(Self::uncaught(&failure, captured.component));
                }
                if failure.phase == ErrorPhase::Render {
                    self.sched.next_unit_of_work = None;
                    self.sched.pending_commit = None;
                }
            }
        }
    }

    fn uncaught(failure: &WorkFailure, component: String) -> ReconcileError {
        match failure.phase {
            ErrorPhase::Render => ReconcileError::UncaughtRender {
                component,
                source: failure.error.clone(),
            },
            ErrorPhase::Commit => ReconcileError::UncaughtCommit {
                component,
                source: failure.error.clone(),
            },
        }
    }

    /// Nearest boundary above `fiber` that has not already failed this
    /// batch: a class fiber declaring `CATCHES_ERRORS` with a live instance,
    /// or the root as the boundary of last resort.
    fn find_boundary_above(&self, fiber: FiberId) -> Option<FiberId> {
        let mut node = self.arena.get(fiber).and_then(|f| f.return_);
        while let Some(id) = node {
            let candidate = self.arena.get(id)?;
            let eligible = match candidate.tag {
                FiberTag::ClassComponent => candidate.instance().is_some_and(|instance| {
                    instance
                        .borrow()
                        .capabilities()
                        .contains(Capabilities::CATCHES_ERRORS)
                }),
                FiberTag::HostRoot => true,
                _ => false,
            };
            if eligible && !self.sched.failed_boundaries.contains(&id) {
                return Some(id);
            }
            node = candidate.return_;
        }
        None
    }

    /// Pop context-stack entries pushed by fibers between `from` and the
    /// boundary (exclusive), keeping the stacks consistent with restarting
    /// the walk at the boundary.
    fn unwind_contexts(&mut self, from: FiberId, boundary: FiberId) {
        let mut node = Some(from);
        while let Some(id) = node {
            if id == boundary {
                break;
            }
            while matches!(self.host_context_stack.last(), Some((owner, _)) if *owner == id) {
                self.host_context_stack.pop();
            }
            while matches!(self.container_stack.last(), Some((owner, _)) if *owner == id) {
                self.container_stack.pop();
            }
            while matches!(self.context_stack.last(), Some((owner, _)) if *owner == id) {
                self.context_stack.pop();
            }
            node = self.arena.get(id).and_then(|f| f.return_);
        }
    }

    // =========================================================================
    // Context stack helpers
    // =========================================================================

    pub(crate) fn top_host_context(&mut self) -> H::HostContext {
        match self.host_context_stack.last() {
            Some((_, context)) => context.clone(),
            None => H::HostContext::default(),
        }
    }

    pub(crate) fn top_container(&self) -> Option<ContainerId> {
        self.container_stack.last().map(|(_, c)| *c)
    }

    pub(crate) fn top_context(&self) -> Context {
        self.context_stack
            .last()
            .map(|(_, c)| c.clone())
            .unwrap_or_default()
    }

    pub(crate) fn pop_contexts_for(&mut self, fiber: FiberId) {
        while matches!(self.host_context_stack.last(), Some((owner, _)) if *owner == fiber) {
            self.host_context_stack.pop();
        }
        while matches!(self.container_stack.last(), Some((owner, _)) if *owner == fiber) {
            self.container_stack.pop();
        }
        while matches!(self.context_stack.last(), Some((owner, _)) if *owner == fiber) {
            self.context_stack.pop();
        }
    }
}
