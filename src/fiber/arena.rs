//! Slotmap-backed fiber storage.
//!
//! Fibers refer to each other by [`FiberId`]; freeing a subtree invalidates
//! its ids, so stale links degrade to "not found" instead of dangling.

use slotmap::{SlotMap, new_key_type};

use crate::fiber::{EffectTag, Fiber, FiberProps};
use crate::types::Priority;

new_key_type! {
    /// Handle to a fiber in the arena.
    pub struct FiberId;
}

new_key_type! {
    /// Handle to a registered root.
    pub struct RootId;
}

/// Owns every live fiber of every tree managed by one reconciler.
#[derive(Default)]
pub(crate) struct FiberArena {
    fibers: SlotMap<FiberId, Fiber>,
}

impl FiberArena {
    pub fn insert(&mut self, fiber: Fiber) -> FiberId {
        self.fibers.insert(fiber)
    }

    pub fn get(&self, id: FiberId) -> Option<&Fiber> {
        self.fibers.get(id)
    }

    pub fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber> {
        self.fibers.get_mut(id)
    }

    pub fn contains(&self, id: FiberId) -> bool {
        self.fibers.contains_key(id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.fibers.len()
    }

    /// The work-in-progress twin of `current`, reusing the existing
    /// alternate when there is one.
    ///
    /// A reused alternate keeps its identity (ids held elsewhere stay valid)
    /// but is refreshed from `current`: effect bookkeeping cleared, committed
    /// fields copied over, the update queue deep-cloned so each buffer drains
    /// independently.
    pub fn create_work_in_progress(
        &mut self,
        current: FiberId,
        pending_props: FiberProps,
        priority: Priority,
    ) -> FiberId {
        match self.fibers[current].alternate {
            Some(wip) => {
                let snapshot = self.fibers[current].clone();
                let fiber = &mut self.fibers[wip];
                fiber.tag = snapshot.tag;
                fiber.key = snapshot.key;
                fiber.element_type = snapshot.element_type;
                fiber.state_node = snapshot.state_node;
                fiber.memoized_props = snapshot.memoized_props;
                fiber.memoized_state = snapshot.memoized_state;
                fiber.update_queue = snapshot.update_queue;
                fiber.child = snapshot.child;
                fiber.sibling = snapshot.sibling;
                fiber.index = snapshot.index;
                fiber.host_ref = snapshot.host_ref;
                fiber.coroutine_phase = snapshot.coroutine_phase;
                fiber.pending_props = pending_props;
                fiber.pending_work_priority = priority;
                fiber.effect_tag = EffectTag::empty();
                fiber.first_effect = None;
                fiber.last_effect = None;
                fiber.next_effect = None;
                fiber.diff_payload = None;
                wip
            }
            None => {
                let mut fiber = self.fibers[current].clone();
                fiber.pending_props = pending_props;
                fiber.pending_work_priority = priority;
                fiber.effect_tag = EffectTag::empty();
                fiber.first_effect = None;
                fiber.last_effect = None;
                fiber.next_effect = None;
                fiber.diff_payload = None;
                fiber.alternate = Some(current);
                let wip = self.fibers.insert(fiber);
                self.fibers[current].alternate = Some(wip);
                wip
            }
        }
    }

    /// Remove `root` and every descendant, along with each node's alternate.
    /// Sibling fibers of `root` itself are untouched.
    pub fn free_subtree(&mut self, root: FiberId) {
        let mut doomed = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(fiber) = self.fibers.get(id) else {
                continue;
            };
            let mut child = fiber.child;
            while let Some(child_id) = child {
                stack.push(child_id);
                child = self.fibers.get(child_id).and_then(|f| f.sibling);
            }
            doomed.push(id);
        }
        for id in doomed {
            if let Some(fiber) = self.fibers.remove(id) {
                if let Some(alternate) = fiber.alternate {
                    self.fibers.remove(alternate);
                }
            }
        }
    }
}

impl std::ops::Index<FiberId> for FiberArena {
    type Output = Fiber;

    fn index(&self, id: FiberId) -> &Fiber {
        &self.fibers[id]
    }
}

impl std::ops::IndexMut<FiberId> for FiberArena {
    fn index_mut(&mut self, id: FiberId) -> &mut Fiber {
        &mut self.fibers[id]
    }
}

// =============================================================================
// Tests
// =============================================================================
