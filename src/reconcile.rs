//! Child reconciliation - diffing an element list against existing fibers.
//!
//! Three modes share one algorithm:
//! - mount: no existing children, side effects not tracked
//! - reconcile: clone reused fibers into the work-in-progress buffer and
//!   record placement/deletion effects
//! - reconcile in place: mutate the existing fibers (no clone) but still
//!   track effects
//!
//! The list pass is two-phase. First walk old and new lockstep while keys
//! line up; on the first key mismatch, fall back to a map of the remaining
//! old children keyed by key-or-index. Moves are minimized with a placement
//! watermark: a reused child whose old index is at or past the highest old
//! index seen so far stays put, anything behind it is re-placed.

use std::collections::HashMap;
use std::rc::Rc;

use log::trace;

use crate::element::Element;
use crate::fiber::{
    EffectTag, ElementType, Fiber, FiberArena, FiberId, FiberProps, FiberTag,
};
use crate::types::Priority;

/// First fiber of the reconciled child list.
pub(crate) type FirstChild = Option<FiberId>;

/// Mount a fresh child list. No effects are recorded; the subtree is placed
/// wholesale when its nearest inserted ancestor commits.
pub(crate) fn mount_children(
    arena: &mut FiberArena,
    return_fiber: FiberId,
    current_first_child: Option<FiberId>,
    new_children: &[Element],
    priority: Priority,
) -> FirstChild {
    ChildReconciler {
        should_clone: true,
        should_track_effects: false,
        priority,
    }
    .reconcile(arena, return_fiber, current_first_child, new_children)
}

/// Reconcile against the current children, cloning reused fibers into the
/// work-in-progress buffer and tracking effects.
pub(crate) fn reconcile_children(
    arena: &mut FiberArena,
    return_fiber: FiberId,
    current_first_child: Option<FiberId>,
    new_children: &[Element],
    priority: Priority,
) -> FirstChild {
    ChildReconciler {
        should_clone: true,
        should_track_effects: true,
        priority,
    }
    .reconcile(arena, return_fiber, current_first_child, new_children)
}

/// Reconcile mutating the existing fibers directly. Used where the walk
/// revisits children it already owns in this pass (coroutine handler output,
/// unwinding a failed subtree to nothing).
pub(crate) fn reconcile_children_in_place(
    arena: &mut FiberArena,
    return_fiber: FiberId,
    current_first_child: Option<FiberId>,
    new_children: &[Element],
    priority: Priority,
) -> FirstChild {
    ChildReconciler {
        should_clone: false,
        should_track_effects: true,
        priority,
    }
    .reconcile(arena, return_fiber, current_first_child, new_children)
}

/// Bail-out path: clone the current children under `wip` untouched, keeping
/// their own pending props and priorities.
pub(crate) fn clone_child_fibers(arena: &mut FiberArena, wip: FiberId) {
    let Some(first) = arena[wip].child else {
        return;
    };

    let mut current_child = first;
    let props = arena[current_child].pending_props.clone();
    let child_priority = arena[current_child].pending_work_priority;
    let mut new_child = arena.create_work_in_progress(current_child, props, child_priority);
    arena[wip].child = Some(new_child);
    arena[new_child].return_ = Some(wip);

    while let Some(sibling) = arena[current_child].sibling {
        let props = arena[sibling].pending_props.clone();
        let sibling_priority = arena[sibling].pending_work_priority;
        let cloned = arena.create_work_in_progress(sibling, props, sibling_priority);
        arena[cloned].index = arena[sibling].index;
        arena[cloned].return_ = Some(wip);
        arena[new_child].sibling = Some(cloned);
        new_child = cloned;
        current_child = sibling;
    }
    arena[new_child].sibling = None;
}

// =============================================================================
// Implementation
// =============================================================================

/// Outcome of matching one new element against the old list.
enum Slot {
    /// An existing fiber was reused; `old_index` feeds the watermark.
    Reused { id: FiberId, old_index: u32 },
    /// A brand new fiber.
    Fresh(FiberId),
}

impl Slot {
    fn id(&self) -> FiberId {
        match self {
            Slot::Reused { id, .. } | Slot::Fresh(id) => *id,
        }
    }
}

/// Map key for the fallback phase: explicit key, or old position.
#[derive(PartialEq, Eq, Hash)]
enum MapKey {
    Key(String),
    Index(u32),
}

struct ChildReconciler {
    should_clone: bool,
    should_track_effects: bool,
    priority: Priority,
}

impl ChildReconciler {
    fn reconcile(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        new_children: &[Element],
    ) -> FirstChild {
        let mut first: FirstChild = None;
        let mut previous: Option<FiberId> = None;
        let mut old_fiber = current_first_child;
        let mut last_placed_index = 0u32;
        let mut new_index = 0usize;

        // Phase 1: walk both lists lockstep while keys line up.
        while let (Some(old), true) = (old_fiber, new_index < new_children.len()) {
            let next_old = arena[old].sibling;
            let element = &new_children[new_index];
            if arena[old].key.as_deref() != element.key() {
                break;
            }
            let slot = if can_reuse(&arena[old], element) {
                let (id, old_index) = self.use_fiber(arena, old, element);
                Slot::Reused { id, old_index }
            } else {
                self.delete_child(arena, return_fiber, old);
                Slot::Fresh(self.create_child(arena, element))
            };
            last_placed_index =
                self.place_child(arena, &slot, last_placed_index, new_index as u32);
            self.link(arena, return_fiber, &mut first, &mut previous, slot.id());
            old_fiber = next_old;
            new_index += 1;
        }

        // New list exhausted: anything left in the old list goes away.
        if new_index == new_children.len() {
            self.delete_remaining(arena, return_fiber, old_fiber);
            return first;
        }

        // Old list exhausted: the rest of the new list is all insertions.
        if old_fiber.is_none() {
            for element in &new_children[new_index..] {
                let slot = Slot::Fresh(self.create_child(arena, element));
                last_placed_index =
                    self.place_child(arena, &slot, last_placed_index, new_index as u32);
                self.link(arena, return_fiber, &mut first, &mut previous, slot.id());
                new_index += 1;
            }
            return first;
        }

        // Phase 2: keys diverged. Index the remaining old children and match
        // the rest of the new list out of order.
        let mut existing: HashMap<MapKey, FiberId> = HashMap::new();
        {
            let mut cursor = old_fiber;
            while let Some(id) = cursor {
                let fiber = &arena[id];
                let map_key = match &fiber.key {
                    Some(key) => MapKey::Key(key.clone()),
                    None => MapKey::Index(fiber.index),
                };
                existing.insert(map_key, id);
                cursor = fiber.sibling;
            }
        }

        for element in &new_children[new_index..] {
            let map_key = match element.key() {
                Some(key) => MapKey::Key(key.to_string()),
                None => MapKey::Index(new_index as u32),
            };
            let slot = match existing.get(&map_key) {
                Some(&old) if can_reuse(&arena[old], element) => {
                    existing.remove(&map_key);
                    let (id, old_index) = self.use_fiber(arena, old, element);
                    Slot::Reused { id, old_index }
                }
                _ => Slot::Fresh(self.create_child(arena, element)),
            };
            last_placed_index =
                self.place_child(arena, &slot, last_placed_index, new_index as u32);
            self.link(arena, return_fiber, &mut first, &mut previous, slot.id());
            new_index += 1;
        }

        if self.should_track_effects {
            for (_, unused) in existing.drain() {
                self.delete_child(arena, return_fiber, unused);
            }
        }

        first
    }

    /// Reuse `fiber` for `element`, cloning into the other buffer or
    /// mutating in place per mode. Returns the fiber to link plus the old
    /// index for the watermark.
    fn use_fiber(
        &self,
        arena: &mut FiberArena,
        fiber: FiberId,
        element: &Element,
    ) -> (FiberId, u32) {
        let old_index = arena[fiber].index;
        let props = FiberProps::of(element);
        let id = if self.should_clone {
            arena.create_work_in_progress(fiber, props, self.priority)
        } else {
            let f = &mut arena[fiber];
            f.pending_props = props;
            f.pending_work_priority = self.priority;
            f.effect_tag = EffectTag::empty();
            fiber
        };
        let f = &mut arena[id];
        f.sibling = None;
        f.index = 0;
        if let Element::Host { host_ref, .. } = element {
            f.host_ref = host_ref.clone();
        }
        (id, old_index)
    }

    fn create_child(&self, arena: &mut FiberArena, element: &Element) -> FiberId {
        arena.insert(Fiber::from_element(element, self.priority))
    }

    /// Decide whether a reused child keeps its spot or moves, and record the
    /// new index either way.
    fn place_child(
        &self,
        arena: &mut FiberArena,
        slot: &Slot,
        last_placed_index: u32,
        new_index: u32,
    ) -> u32 {
        arena[slot.id()].index = new_index;
        if !self.should_track_effects {
            return last_placed_index;
        }
        match *slot {
            Slot::Reused { id, old_index } => {
                if old_index < last_placed_index {
                    trace!("move child {:?} to index {}", arena[id].name(), new_index);
                    arena[id].effect_tag |= EffectTag::PLACEMENT;
                    last_placed_index
                } else {
                    old_index
                }
            }
            Slot::Fresh(id) => {
                arena[id].effect_tag |= EffectTag::PLACEMENT;
                last_placed_index
            }
        }
    }

    fn link(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        first: &mut FirstChild,
        previous: &mut Option<FiberId>,
        id: FiberId,
    ) {
        arena[id].return_ = Some(return_fiber);
        match previous {
            Some(prev) => arena[*prev].sibling = Some(id),
            None => *first = Some(id),
        }
        *previous = Some(id);
    }

    /// Mark `child` deleted and append it straight onto the return fiber's
    /// effect list, so completion's effect splice carries it up even though
    /// it is no longer linked as a child.
    fn delete_child(&self, arena: &mut FiberArena, return_fiber: FiberId, child: FiberId) {
        if !self.should_track_effects {
            return;
        }
        trace!("delete child {:?}", arena[child].name());
        arena[child].effect_tag = EffectTag::DELETION;
        arena[child].next_effect = None;
        match arena[return_fiber].last_effect {
            Some(last) => arena[last].next_effect = Some(child),
            None => arena[return_fiber].first_effect = Some(child),
        }
        arena[return_fiber].last_effect = Some(child);
    }

    fn delete_remaining(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        first: Option<FiberId>,
    ) {
        if !self.should_track_effects {
            return;
        }
        let mut cursor = first;
        while let Some(id) = cursor {
            cursor = arena[id].sibling;
            self.delete_child(arena, return_fiber, id);
        }
    }
}

/// Whether an existing fiber can host `element`: same kind, same type
/// identity. Keys are compared by the caller.
fn can_reuse(fiber: &Fiber, element: &Element) -> bool {
    match (element, fiber.tag) {
        (Element::Text(_), FiberTag::HostText) => true,
        (Element::Host { ty, .. }, FiberTag::HostComponent) => {
            matches!(&fiber.element_type, ElementType::Host(old) if old == ty)
        }
        (
            Element::Function { render, .. },
            FiberTag::FunctionComponent | FiberTag::IndeterminateComponent,
        ) => matches!(
            &fiber.element_type,
            ElementType::Function { render: old, .. } if Rc::ptr_eq(old, render)
        ),
        (Element::Class { descriptor, .. }, FiberTag::ClassComponent) => {
            matches!(&fiber.element_type, ElementType::Class(old) if old == descriptor)
        }
        (Element::Fragment { .. }, FiberTag::Fragment) => true,
        (Element::Portal { container, .. }, FiberTag::HostPortal) => {
            matches!(&fiber.element_type, ElementType::Portal(old) if old == container)
        }
        (Element::Coroutine { handler, .. }, FiberTag::Coroutine) => matches!(
            &fiber.element_type,
            ElementType::Coroutine { handler: old, .. } if Rc::ptr_eq(old, handler)
        ),
        (Element::Yield { .. }, FiberTag::Yield) => true,
        _ => false,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parent(arena: &mut FiberArena) -> FiberId {
        arena.insert(Fiber::new(FiberTag::HostRoot, None))
    }

    fn keyed_hosts(keys: &[&str]) -> Vec<Element> {
        keys.iter()
            .map(|k| Element::host("item", vec![]).keyed(*k))
            .collect()
    }

    fn child_keys(arena: &FiberArena, first: FirstChild) -> Vec<String> {
        let mut keys = Vec::new();
        let mut cursor = first;
        while let Some(id) = cursor {
            keys.push(arena[id].key.clone().unwrap_or_default());
            cursor = arena[id].sibling;
        }
        keys
    }

    fn placements(arena: &FiberArena, first: FirstChild) -> Vec<String> {
        let mut moved = Vec::new();
        let mut cursor = first;
        while let Some(id) = cursor {
            if arena[id].effect_tag.contains(EffectTag::PLACEMENT) {
                moved.push(arena[id].key.clone().unwrap_or_default());
            }
            cursor = arena[id].sibling;
        }
        moved
    }

    #[test]
    fn test_mount_links_children_in_order() {
        let mut arena = FiberArena::default();
        let p = parent(&mut arena);
        let first = mount_children(
            &mut arena,
            p,
            None,
            &keyed_hosts(&["a", "b", "c"]),
            Priority::Synchronous,
        );

        assert_eq!(child_keys(&arena, first), vec!["a", "b", "c"]);
        let mut cursor = first;
        let mut expected_index = 0;
        while let Some(id) = cursor {
            assert_eq!(arena[id].index, expected_index);
            assert_eq!(arena[id].return_, Some(p));
            // Mount tracks nothing; the parent's insertion places the lot.
            assert_eq!(arena[id].effect_tag, EffectTag::empty());
            cursor = arena[id].sibling;
            expected_index += 1;
        }
    }

    #[test]
    fn test_swap_marks_exactly_one_placement() {
        let mut arena = FiberArena::default();
        let p = parent(&mut arena);
        let old_first = mount_children(
            &mut arena,
            p,
            None,
            &keyed_hosts(&["1", "2", "3"]),
            Priority::Synchronous,
        );

        let wip = parent(&mut arena);
        let new_first = reconcile_children(
            &mut arena,
            wip,
            old_first,
            &keyed_hosts(&["2", "1", "3"]),
            Priority::Synchronous,
        );

        assert_eq!(child_keys(&arena, new_first), vec!["2", "1", "3"]);
        // "2" and "3" keep their spots; only "1" moves behind the watermark.
        assert_eq!(placements(&arena, new_first), vec!["1"]);
        // No deletions were recorded on the parent.
        assert_eq!(arena[wip].first_effect, None);
    }

    #[test]
    fn test_rotation_places_children_behind_watermark() {
        let mut arena = FiberArena::default();
        let p = parent(&mut arena);
        let old_first = mount_children(
            &mut arena,
            p,
            None,
            &keyed_hosts(&["1", "2", "3"]),
            Priority::Synchronous,
        );

        let wip = parent(&mut arena);
        let new_first = reconcile_children(
            &mut arena,
            wip,
            old_first,
            &keyed_hosts(&["3", "1", "2"]),
            Priority::Synchronous,
        );

        assert_eq!(child_keys(&arena, new_first), vec!["3", "1", "2"]);
        // "3" advances the watermark to its old index; "1" and "2" now sit
        // behind it and both move.
        assert_eq!(placements(&arena, new_first), vec!["1", "2"]);
    }

    #[test]
    fn test_type_change_deletes_old_and_creates_fresh() {
        let mut arena = FiberArena::default();
        let p = parent(&mut arena);
        let old_first = mount_children(
            &mut arena,
            p,
            None,
            &[Element::host("box", vec![])],
            Priority::Synchronous,
        );
        let old_child = old_first.unwrap();

        let wip = parent(&mut arena);
        let new_first = reconcile_children(
            &mut arena,
            wip,
            old_first,
            &[Element::host("row", vec![])],
            Priority::Synchronous,
        );
        let new_child = new_first.unwrap();

        assert_ne!(new_child, old_child);
        assert!(arena[new_child].effect_tag.contains(EffectTag::PLACEMENT));
        assert!(arena[old_child].effect_tag.contains(EffectTag::DELETION));
        // The deletion rides the return fiber's effect list.
        assert_eq!(arena[wip].first_effect, Some(old_child));
        assert_eq!(arena[wip].last_effect, Some(old_child));
    }

    #[test]
    fn test_shrinking_list_deletes_tail() {
        let mut arena = FiberArena::default();
        let p = parent(&mut arena);
        let old_first = mount_children(
            &mut arena,
            p,
            None,
            &keyed_hosts(&["a", "b", "c"]),
            Priority::Synchronous,
        );
        let old_c = {
            let b = arena[old_first.unwrap()].sibling.unwrap();
            arena[b].sibling.unwrap()
        };

        let wip = parent(&mut arena);
        let new_first = reconcile_children(
            &mut arena,
            wip,
            old_first,
            &keyed_hosts(&["a", "b"]),
            Priority::Synchronous,
        );

        assert_eq!(child_keys(&arena, new_first), vec!["a", "b"]);
        assert!(arena[old_c].effect_tag.contains(EffectTag::DELETION));
        assert_eq!(arena[wip].first_effect, Some(old_c));
    }

    #[test]
    fn test_reuse_keeps_state_node_across_buffers() {
        let mut arena = FiberArena::default();
        let p = parent(&mut arena);
        let old_first = mount_children(
            &mut arena,
            p,
            None,
            &keyed_hosts(&["a"]),
            Priority::Synchronous,
        );
        let old_child = old_first.unwrap();
        arena[old_child].state_node =
            crate::fiber::StateNode::Host(crate::host::InstanceId(7));

        let wip = parent(&mut arena);
        let new_first = reconcile_children(
            &mut arena,
            wip,
            old_first,
            &keyed_hosts(&["a"]),
            Priority::Synchronous,
        );
        let new_child = new_first.unwrap();

        assert_eq!(arena[new_child].alternate, Some(old_child));
        assert_eq!(
            arena[new_child].state_node.instance_id(),
            Some(crate::host::InstanceId(7))
        );
    }

    #[test]
    fn test_clone_child_fibers_preserves_pending_priority() {
        let mut arena = FiberArena::default();
        let p = parent(&mut arena);
        let first = mount_children(
            &mut arena,
            p,
            None,
            &keyed_hosts(&["a", "b"]),
            Priority::Synchronous,
        );
        let a = first.unwrap();
        let b = arena[a].sibling.unwrap();
        arena[a].pending_work_priority = Priority::Low;
        arena[b].pending_work_priority = Priority::NoWork;

        let wip = parent(&mut arena);
        arena[wip].child = first;
        clone_child_fibers(&mut arena, wip);

        let cloned_a = arena[wip].child.unwrap();
        let cloned_b = arena[cloned_a].sibling.unwrap();
        assert_ne!(cloned_a, a);
        assert_eq!(arena[cloned_a].pending_work_priority, Priority::Low);
        assert_eq!(arena[cloned_b].pending_work_priority, Priority::NoWork);
        assert_eq!(arena[cloned_b].sibling, None);
        assert_eq!(arena[cloned_a].return_, Some(wip));
    }
}
