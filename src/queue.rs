//! Update queue - priority-ordered pending state transitions.
//!
//! Each fiber owns at most one queue; the two buffers of a tree position
//! each hold their own copy so either side stays independently walkable when
//! the buffers' roles flip between renders. Entries survive interrupted
//! renders: an update is only removed once a pass at sufficient priority
//! actually applies it.

use std::collections::VecDeque;
use std::rc::Rc;

use crate::element::Element;
use crate::types::{Priority, Props, State, merge_state};

/// Callback attached to an update, invoked after the commit that applied it.
pub type UpdateCallback = Rc<dyn Fn()>;

/// A state change requested through [`crate::StateUpdates`] or
/// [`crate::Reconciler::set_state`].
#[derive(Clone)]
pub enum StateChange {
    /// Shallow-merge this map over the previous state.
    Partial(State),
    /// Compute the merged-in map from previous state and props.
    Updater(Rc<dyn Fn(&State, &Props) -> State>),
    /// Discard previous state entirely.
    Replace(State),
}

/// Payload of one queued update.
#[derive(Clone)]
pub(crate) enum UpdatePayload {
    /// Class component state transition.
    State(StateChange),
    /// Next top-level element for a host root. `None` renders nothing.
    Element(Option<Element>),
}

/// One pending update.
#[derive(Clone)]
pub(crate) struct Update {
    pub priority: Priority,
    pub payload: Option<UpdatePayload>,
    pub callback: Option<UpdateCallback>,
    pub is_forced: bool,
    pub is_top_level_unmount: bool,
}

impl Update {
    pub fn from_state_change(priority: Priority, change: StateChange) -> Self {
        Update {
            priority,
            payload: Some(UpdatePayload::State(change)),
            callback: None,
            is_forced: false,
            is_top_level_unmount: false,
        }
    }

    pub fn force(priority: Priority) -> Self {
        Update {
            priority,
            payload: None,
            callback: None,
            is_forced: true,
            is_top_level_unmount: false,
        }
    }

    pub fn root_render(priority: Priority, element: Option<Element>) -> Self {
        let unmount = element.is_none();
        Update {
            priority,
            payload: Some(UpdatePayload::Element(element)),
            callback: None,
            is_forced: false,
            is_top_level_unmount: unmount,
        }
    }
}

// =============================================================================
// Queue
// =============================================================================

/// Priority-ordered list of pending updates for one fiber.
#[derive(Clone, Default)]
pub(crate) struct UpdateQueue {
    updates: VecDeque<Update>,
    callbacks: Vec<UpdateCallback>,
    has_force_update: bool,
}

impl UpdateQueue {
    /// Insert keeping non-decreasing priority order; equal priorities stay
    /// first-in-first-out. Returns the insertion index.
    pub fn insert(&mut self, update: Update) -> usize {
        let index = self
            .updates
            .iter()
            .position(|existing| update.priority.more_urgent_than(existing.priority))
            .unwrap_or(self.updates.len());
        self.updates.insert(index, update);
        index
    }

    /// Most urgent pending priority, `NoWork` when drained.
    pub fn pending_priority(&self) -> Priority {
        self.updates
            .front()
            .map(|u| u.priority)
            .unwrap_or(Priority::NoWork)
    }

    /// Apply every update at least as urgent as `ceiling` to a class
    /// fiber's state, removing each as it is applied so that updates
    /// enqueued *during* application order correctly after the survivors.
    pub fn apply(&mut self, ceiling: Priority, prev_state: &State, props: &Props) -> State {
        let mut state = prev_state.clone();
        while let Some(update) = self.updates.pop_front() {
            if !update.priority.at_least_as_urgent_as(ceiling) {
                self.updates.push_front(update);
                break;
            }
            if update.is_forced {
                self.has_force_update = true;
            }
            if let Some(UpdatePayload::State(change)) = update.payload {
                state = match change {
                    StateChange::Partial(partial) => merge_state(&state, &partial),
                    StateChange::Updater(updater) => {
                        let partial = updater(&state, props);
                        merge_state(&state, &partial)
                    }
                    StateChange::Replace(next) => next,
                };
            }
            if let Some(callback) = update.callback {
                self.callbacks.push(callback);
            }
        }
        state
    }

    /// Apply root updates at least as urgent as `ceiling`. Returns the new
    /// top-level element (`Some(None)` = unmount requested), or `None` when
    /// nothing applied.
    pub fn apply_root(&mut self, ceiling: Priority) -> Option<Option<Element>> {
        let mut applied = None;
        while let Some(update) = self.updates.pop_front() {
            if !update.priority.at_least_as_urgent_as(ceiling) {
                self.updates.push_front(update);
                break;
            }
            match update.payload {
                Some(UpdatePayload::Element(element)) => applied = Some(element),
                _ if update.is_top_level_unmount => applied = Some(None),
                _ => {}
            }
            if let Some(callback) = update.callback {
                self.callbacks.push(callback);
            }
        }
        applied
    }

    /// Consume the folded force-update flag.
    pub fn take_force_update(&mut self) -> bool {
        std::mem::take(&mut self.has_force_update)
    }

    /// Whether any commit-phase callbacks are waiting.
    pub fn has_callbacks(&self) -> bool {
        !self.callbacks.is_empty()
    }

    /// Drain the pending callback list for the commit phase.
    pub fn take_callbacks(&mut self) -> Vec<UpdateCallback> {
        std::mem::take(&mut self.callbacks)
    }

    /// True once updates, callbacks and the force flag are all drained; the
    /// owning fiber then drops its queue entirely.
    pub fn is_exhausted(&self) -> bool {
        self.updates.is_empty() && self.callbacks.is_empty() && !self.has_force_update
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.updates.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
