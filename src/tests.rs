//! End-to-end scenarios against the recording host.
//!
//! Each test drives the public API (render, set_state, host callbacks) and
//! asserts on [`TestHost`]'s op log and final tree shape rather than on
//! reconciler internals.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use crate::component::{Capabilities, ClassDescriptor, Component, StateUpdates};
use crate::element::{CoroutineHandler, Element, RefCallback, RenderFn};
use crate::errors::{CapturedError, ComponentError, ReconcileError};
use crate::fiber::{FiberId, RootId};
use crate::host::{ContainerId, HostParent, InstanceId, TimeLimit};
use crate::queue::{StateChange, UpdateCallback};
use crate::scheduler::Reconciler;
use crate::test_host::{HostOp, TestHost};
use crate::types::{Context, Priority, PropValue, Props, State, empty_props, props_from};

const CONTAINER: ContainerId = ContainerId(0);

fn setup() -> (Reconciler<TestHost>, RootId) {
    let mut reconciler = Reconciler::new(TestHost::new());
    let root = reconciler.create_container(CONTAINER);
    (reconciler, root)
}

fn texts(reconciler: &Reconciler<TestHost>) -> Vec<String> {
    reconciler.host().texts_in(CONTAINER)
}

fn int_of(map: &State, key: &str) -> i64 {
    match map.get(key) {
        Some(PropValue::Int(n)) => *n,
        _ => 0,
    }
}

fn str_of(map: &State, key: &str) -> String {
    match map.get(key) {
        Some(PropValue::Str(s)) => s.clone(),
        _ => String::new(),
    }
}

// =============================================================================
// Test components
// =============================================================================

/// Renders its `n` state as text and publishes its fiber id on mount, so the
/// test can drive `set_state` from outside.
struct Counter {
    slot: Rc<Cell<Option<FiberId>>>,
}

impl Component for Counter {
    fn render(
        &mut self,
        _props: &Props,
        state: &State,
        _context: &Context,
    ) -> Result<Element, ComponentError> {
        Ok(Element::text(int_of(state, "n").to_string()))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::DID_MOUNT
    }

    fn did_mount(&mut self, updates: &mut StateUpdates) -> Result<(), ComponentError> {
        self.slot.set(Some(updates.fiber()));
        Ok(())
    }
}

fn counter_descriptor(slot: Rc<Cell<Option<FiberId>>>) -> ClassDescriptor {
    ClassDescriptor::new("Counter", move || {
        Box::new(Counter { slot: slot.clone() })
    })
}

/// Copies its `label` prop into state through `will_receive_props`.
#[derive(Default)]
struct Mirror;

impl Component for Mirror {
    fn render(
        &mut self,
        _props: &Props,
        state: &State,
        _context: &Context,
    ) -> Result<Element, ComponentError> {
        Ok(Element::text(str_of(state, "label")))
    }

    fn initial_state(&mut self, props: &Props) -> State {
        props_from([("label", str_of(props, "label"))])
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::WILL_RECEIVE_PROPS
    }

    fn will_receive_props(
        &mut self,
        next_props: &Props,
        _context: &Context,
        updates: &mut StateUpdates,
    ) -> Result<(), ComponentError> {
        updates.set_state(props_from([("label", str_of(next_props, "label"))]));
        Ok(())
    }
}

/// Records which commit lifecycles fired, in order.
struct Probe {
    log: Rc<RefCell<Vec<&'static str>>>,
}

impl Component for Probe {
    fn render(
        &mut self,
        props: &Props,
        _state: &State,
        _context: &Context,
    ) -> Result<Element, ComponentError> {
        Ok(Element::text(str_of(props, "label")))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::DID_MOUNT | Capabilities::DID_UPDATE
    }

    fn did_mount(&mut self, _updates: &mut StateUpdates) -> Result<(), ComponentError> {
        self.log.borrow_mut().push("mount");
        Ok(())
    }

    fn did_update(
        &mut self,
        _prev_props: &Props,
        _prev_state: &State,
        _updates: &mut StateUpdates,
    ) -> Result<(), ComponentError> {
        self.log.borrow_mut().push("update");
        Ok(())
    }
}

struct Leaf {
    unmounted: Rc<Cell<bool>>,
}

impl Component for Leaf {
    fn render(
        &mut self,
        _props: &Props,
        _state: &State,
        _context: &Context,
    ) -> Result<Element, ComponentError> {
        Ok(Element::host("div", vec![Element::text("leaf")]))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::WILL_UNMOUNT
    }

    fn will_unmount(&mut self) -> Result<(), ComponentError> {
        self.unmounted.set(true);
        Ok(())
    }
}

/// Always fails to render.
#[derive(Default)]
struct Bomb;

impl Component for Bomb {
    fn render(
        &mut self,
        _props: &Props,
        _state: &State,
        _context: &Context,
    ) -> Result<Element, ComponentError> {
        Err("boom".into())
    }
}

/// Error boundary: renders a [`Bomb`] until `catch` records the failure into
/// state, then renders a fallback describing it.
struct Boundary {
    bomb: ClassDescriptor,
}

impl Component for Boundary {
    fn render(
        &mut self,
        _props: &Props,
        state: &State,
        _context: &Context,
    ) -> Result<Element, ComponentError> {
        let message = str_of(state, "message");
        if message.is_empty() {
            Ok(Element::class(&self.bomb, empty_props()))
        } else {
            Ok(Element::text(format!(
                "{}:{}",
                str_of(state, "component"),
                message
            )))
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::CATCHES_ERRORS
    }

    fn catch(
        &mut self,
        error: &CapturedError,
        updates: &mut StateUpdates,
    ) -> Result<(), ComponentError> {
        updates.set_state(props_from([
            ("component", error.component.clone()),
            ("message", error.message.clone()),
        ]));
        Ok(())
    }
}

fn boundary_descriptor() -> ClassDescriptor {
    ClassDescriptor::new("Boundary", || {
        Box::new(Boundary {
            bomb: ClassDescriptor::of::<Bomb>("Bomb"),
        })
    })
}

// =============================================================================
// Mounting
// =============================================================================

#[test]
fn test_mount_creates_bottom_up_and_attaches_once() {
    let (mut reconciler, root) = setup();
    reconciler
        .render(
            Element::host(
                "div",
                vec![Element::text("hello"), Element::host("span", vec![])],
            ),
            root,
        )
        .unwrap();

    // Instances assemble off-tree during completion; the container sees a
    // single attach at commit.
    assert_eq!(
        reconciler.host().ops,
        vec![
            HostOp::CreateText {
                id: InstanceId(0),
                text: "hello".into()
            },
            HostOp::CreateInstance {
                id: InstanceId(1),
                ty: "span".into()
            },
            HostOp::CreateInstance {
                id: InstanceId(2),
                ty: "div".into()
            },
            HostOp::AppendInitial {
                parent: InstanceId(2),
                child: InstanceId(0)
            },
            HostOp::AppendInitial {
                parent: InstanceId(2),
                child: InstanceId(1)
            },
            HostOp::AppendChild {
                parent: HostParent::Container(CONTAINER),
                child: InstanceId(2)
            },
        ]
    );
    assert_eq!(
        reconciler.host().container_children(CONTAINER),
        vec![InstanceId(2)]
    );
    assert_eq!(
        reconciler.get_public_root_instance(root),
        Some(InstanceId(2))
    );
}

#[test]
fn test_commit_mount_fires_when_finalize_requests_it() {
    let (mut reconciler, root) = setup();
    reconciler
        .render(
            Element::host_with_props("input", props_from([("autofocus", true)]), vec![]),
            root,
        )
        .unwrap();

    let ops = &reconciler.host().ops;
    let attach = ops
        .iter()
        .position(|op| matches!(op, HostOp::AppendChild { .. }))
        .unwrap();
    let mounted = ops
        .iter()
        .position(|op| matches!(op, HostOp::CommitMount { id: InstanceId(0) }))
        .unwrap();
    assert!(mounted > attach, "commit_mount runs after insertion");
}

#[test]
fn test_rerender_same_element_commits_nothing() {
    let (mut reconciler, root) = setup();
    let element = Element::host("div", vec![Element::text("same")]);
    reconciler.render(element.clone(), root).unwrap();
    let mark = reconciler.host().ops.len();

    reconciler.render(element, root).unwrap();
    assert_eq!(reconciler.host().ops.len(), mark);
    assert_eq!(texts(&reconciler), ["same"]);
}

// =============================================================================
// Updates
// =============================================================================

#[test]
fn test_text_update_commits_minimal_change() {
    let (mut reconciler, root) = setup();
    reconciler
        .render(Element::host("div", vec![Element::text("a")]), root)
        .unwrap();
    let mark = reconciler.host().ops.len();

    reconciler
        .render(Element::host("div", vec![Element::text("b")]), root)
        .unwrap();

    assert_eq!(
        reconciler.host().ops_since(mark),
        [HostOp::CommitTextUpdate {
            id: InstanceId(0),
            old: "a".into(),
            new: "b".into()
        }]
    );
    assert_eq!(texts(&reconciler), ["b"]);
}

#[test]
fn test_folded_text_updates_through_instance_props() {
    let (mut reconciler, root) = setup();
    reconciler.host_mut().fold_text = true;
    reconciler
        .render(Element::host("label", vec![Element::text("a")]), root)
        .unwrap();

    // The content rides the instance's `children` prop; no text node exists.
    assert!(
        reconciler
            .host()
            .ops
            .iter()
            .all(|op| !matches!(op, HostOp::CreateText { .. }))
    );
    let label = reconciler.get_public_root_instance(root).unwrap();
    assert_eq!(
        reconciler.host().nodes[&label].props.get("children"),
        Some(&PropValue::Str("a".into()))
    );
    let mark = reconciler.host().ops.len();

    reconciler
        .render(Element::host("label", vec![Element::text("b")]), root)
        .unwrap();
    assert_eq!(
        reconciler.host().ops_since(mark),
        [HostOp::CommitUpdate {
            id: label,
            diff: vec![("children".to_string(), Some(PropValue::Str("b".into())))]
        }]
    );
    assert_eq!(
        reconciler.host().nodes[&label].props.get("children"),
        Some(&PropValue::Str("b".into()))
    );
}

#[test]
fn test_prop_update_commits_prepared_diff() {
    let (mut reconciler, root) = setup();
    reconciler
        .render(
            Element::host_with_props("div", props_from([("w", 1i64)]), vec![]),
            root,
        )
        .unwrap();
    let div = reconciler.get_public_root_instance(root).unwrap();
    let mark = reconciler.host().ops.len();

    reconciler
        .render(
            Element::host_with_props("div", props_from([("w", 2i64)]), vec![]),
            root,
        )
        .unwrap();

    assert_eq!(
        reconciler.host().ops_since(mark),
        [HostOp::CommitUpdate {
            id: div,
            diff: vec![("w".to_string(), Some(PropValue::Int(2)))]
        }]
    );
    assert_eq!(
        reconciler.host().nodes[&div].props.get("w"),
        Some(&PropValue::Int(2))
    );
}

#[test]
fn test_keyed_reorder_moves_exactly_one_node() {
    let li = |key: &str| Element::host("li", vec![]).keyed(key);
    let (mut reconciler, root) = setup();
    reconciler
        .render(Element::host("ul", vec![li("1"), li("2"), li("3")]), root)
        .unwrap();
    let ul = reconciler.get_public_root_instance(root).unwrap();
    let mark = reconciler.host().ops.len();

    reconciler
        .render(Element::host("ul", vec![li("2"), li("1"), li("3")]), root)
        .unwrap();

    // "2" and "3" hold their positions; "1" alone moves, anchored on "3".
    assert_eq!(
        reconciler.host().ops_since(mark),
        [HostOp::InsertBefore {
            parent: HostParent::Instance(ul),
            child: InstanceId(0),
            before: InstanceId(2)
        }]
    );
    assert_eq!(
        reconciler.host().nodes[&ul].children,
        vec![InstanceId(1), InstanceId(0), InstanceId(2)]
    );
}

#[test]
fn test_function_component_bails_out_on_equal_props() {
    let renders = Rc::new(Cell::new(0usize));
    let render: RenderFn = {
        let renders = renders.clone();
        Rc::new(move |_, _| {
            renders.set(renders.get() + 1);
            Element::text("label")
        })
    };

    let tree = |n: i64, render: &RenderFn| {
        Element::host(
            "div",
            vec![
                Element::function("Label", render.clone(), empty_props()),
                Element::text(n.to_string()),
            ],
        )
    };

    let (mut reconciler, root) = setup();
    reconciler.render(tree(1, &render), root).unwrap();
    assert_eq!(renders.get(), 1);

    reconciler.render(tree(2, &render), root).unwrap();
    // The sibling text changed but the function's inputs did not.
    assert_eq!(renders.get(), 1);
    assert_eq!(texts(&reconciler), ["label", "2"]);
}

// =============================================================================
// Component state and lifecycles
// =============================================================================

#[test]
fn test_set_state_rerenders_through_fiber_handle() {
    let slot = Rc::new(Cell::new(None));
    let descriptor = counter_descriptor(slot.clone());
    let (mut reconciler, root) = setup();
    reconciler
        .render(Element::class(&descriptor, empty_props()), root)
        .unwrap();
    assert_eq!(texts(&reconciler), ["0"]);

    let fiber = slot.get().expect("did_mount published the fiber");
    reconciler
        .set_state(fiber, StateChange::Partial(props_from([("n", 5i64)])))
        .unwrap();
    assert_eq!(texts(&reconciler), ["5"]);
}

#[test]
fn test_batched_updates_render_once() {
    let slot = Rc::new(Cell::new(None));
    let descriptor = counter_descriptor(slot.clone());
    let (mut reconciler, root) = setup();
    reconciler
        .render(Element::class(&descriptor, empty_props()), root)
        .unwrap();
    let fiber = slot.get().unwrap();
    let mark = reconciler.host().ops.len();

    reconciler
        .batched_updates(|r| {
            r.set_state(fiber, StateChange::Partial(props_from([("n", 1i64)])))
                .unwrap();
            r.set_state(
                fiber,
                StateChange::Updater(Rc::new(|prev, _| {
                    props_from([("n", int_of(prev, "n") + 1)])
                })),
            )
            .unwrap();
            // Nothing flushes inside the batch.
            assert_eq!(texts(r), ["0"]);
        })
        .unwrap();

    assert_eq!(texts(&reconciler), ["2"]);
    let updates = reconciler
        .host()
        .ops_since(mark)
        .iter()
        .filter(|op| matches!(op, HostOp::CommitTextUpdate { .. }))
        .count();
    assert_eq!(updates, 1);
}

#[test]
fn test_will_receive_props_applies_in_same_pass() {
    let descriptor = ClassDescriptor::of::<Mirror>("Mirror");
    let (mut reconciler, root) = setup();
    reconciler
        .render(
            Element::class(&descriptor, props_from([("label", "a")])),
            root,
        )
        .unwrap();
    assert_eq!(texts(&reconciler), ["a"]);

    reconciler
        .render(
            Element::class(&descriptor, props_from([("label", "b")])),
            root,
        )
        .unwrap();
    assert_eq!(texts(&reconciler), ["b"]);
}

#[test]
fn test_did_mount_then_did_update() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let descriptor = {
        let log = log.clone();
        ClassDescriptor::new("Probe", move || Box::new(Probe { log: log.clone() }))
    };
    let (mut reconciler, root) = setup();

    reconciler
        .render(
            Element::class(&descriptor, props_from([("label", "a")])),
            root,
        )
        .unwrap();
    assert_eq!(*log.borrow(), ["mount"]);

    reconciler
        .render(
            Element::class(&descriptor, props_from([("label", "b")])),
            root,
        )
        .unwrap();
    assert_eq!(*log.borrow(), ["mount", "update"]);
}

#[test]
fn test_unmount_runs_will_unmount_and_clears_container() {
    let unmounted = Rc::new(Cell::new(false));
    let descriptor = {
        let unmounted = unmounted.clone();
        ClassDescriptor::new("Leaf", move || {
            Box::new(Leaf {
                unmounted: unmounted.clone(),
            })
        })
    };
    let (mut reconciler, root) = setup();
    reconciler
        .render(Element::class(&descriptor, empty_props()), root)
        .unwrap();
    assert_eq!(texts(&reconciler), ["leaf"]);

    reconciler.unmount_container(root).unwrap();
    assert!(unmounted.get());
    assert!(reconciler.host().container_children(CONTAINER).is_empty());
    assert!(
        reconciler
            .host()
            .ops
            .iter()
            .any(|op| matches!(op, HostOp::RemoveChild { .. }))
    );
    assert_eq!(reconciler.get_public_root_instance(root), None);
}

#[test]
fn test_root_callback_runs_after_commit() {
    let calls = Rc::new(Cell::new(0usize));
    let callback: UpdateCallback = {
        let calls = calls.clone();
        Rc::new(move || calls.set(calls.get() + 1))
    };
    let (mut reconciler, root) = setup();
    reconciler
        .update_container(Some(Element::text("x")), root, None, Some(callback))
        .unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(texts(&reconciler), ["x"]);
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn test_error_boundary_recovers_with_fallback() {
    let (mut reconciler, root) = setup();
    reconciler
        .render(Element::class(&boundary_descriptor(), empty_props()), root)
        .unwrap();

    // The failure was absorbed, delivered to `catch`, and the boundary
    // re-rendered its fallback within the same flush.
    assert_eq!(texts(&reconciler), ["Bomb:boom"]);
}

#[test]
fn test_uncaught_error_renders_root_empty_and_surfaces() {
    let (mut reconciler, root) = setup();
    reconciler.render(Element::text("ok"), root).unwrap();

    let bomb = ClassDescriptor::of::<Bomb>("Bomb");
    let error = reconciler
        .render(Element::class(&bomb, empty_props()), root)
        .unwrap_err();
    assert!(matches!(
        error,
        ReconcileError::UncaughtRender { ref component, .. } if component == "Bomb"
    ));
    // With no boundary to absorb it, the root itself falls back to
    // rendering nothing before the error surfaces.
    assert_eq!(texts(&reconciler), Vec::<String>::new());
    assert!(reconciler.host().container_children(CONTAINER).is_empty());
    assert!(
        reconciler
            .host()
            .ops
            .iter()
            .any(|op| matches!(op, HostOp::RemoveChild { .. }))
    );

    // The root stays usable.
    reconciler.render(Element::text("ok2"), root).unwrap();
    assert_eq!(texts(&reconciler), ["ok2"]);
}

// =============================================================================
// Scheduling
// =============================================================================

#[test]
fn test_low_priority_render_waits_for_deferred_callback() {
    let (mut reconciler, root) = setup();
    reconciler.render(Element::text("a"), root).unwrap();
    assert_eq!(reconciler.host().deferred_requests, 0);

    reconciler
        .perform_with_priority(Priority::Low, |r| r.render(Element::text("b"), root))
        .unwrap();
    assert_eq!(reconciler.host().deferred_requests, 1);
    assert_eq!(texts(&reconciler), ["a"]);

    // An exhausted budget makes no progress.
    let mark = reconciler.host().ops.len();
    reconciler
        .perform_deferred_work(&TimeLimit::from_now(Duration::ZERO))
        .unwrap();
    assert_eq!(reconciler.host().ops.len(), mark);
    assert_eq!(texts(&reconciler), ["a"]);

    reconciler
        .perform_deferred_work(&TimeLimit::from_now(Duration::from_secs(60)))
        .unwrap();
    assert_eq!(texts(&reconciler), ["b"]);
}

#[test]
fn test_expired_deadline_rerequests_deferred_callback() {
    let (mut reconciler, root) = setup();
    reconciler.render(Element::text("a"), root).unwrap();
    reconciler
        .perform_with_priority(Priority::Low, |r| r.render(Element::text("b"), root))
        .unwrap();
    assert_eq!(reconciler.host().deferred_requests, 1);

    // The budget runs out before any fiber completes; the host must be
    // asked to come back or the pending work would wait forever.
    reconciler
        .perform_deferred_work(&TimeLimit::from_now(Duration::ZERO))
        .unwrap();
    assert_eq!(texts(&reconciler), ["a"]);
    assert_eq!(reconciler.host().deferred_requests, 2);

    reconciler
        .perform_deferred_work(&TimeLimit::from_now(Duration::from_secs(60)))
        .unwrap();
    assert_eq!(texts(&reconciler), ["b"]);
    // Nothing pending, nothing re-requested.
    assert_eq!(reconciler.host().deferred_requests, 2);
}

#[test]
fn test_completed_pass_keeps_less_urgent_queued_priority() {
    let slot = Rc::new(Cell::new(None));
    let descriptor = counter_descriptor(slot.clone());
    let (mut reconciler, root) = setup();
    reconciler
        .render(
            Element::host("div", vec![Element::class(&descriptor, empty_props())]),
            root,
        )
        .unwrap();
    let fiber = slot.get().unwrap();

    reconciler
        .perform_with_priority(Priority::Low, |r| {
            r.set_state(fiber, StateChange::Partial(props_from([("n", 7i64)])))
        })
        .unwrap();
    // A synchronous flush passes over the whole tree but only applies work
    // at its own level; the queued low update must survive it.
    reconciler
        .set_state(fiber, StateChange::Partial(props_from([("other", 1i64)])))
        .unwrap();
    assert_eq!(texts(&reconciler), ["0"]);

    // Every ancestor of the queued update reports it; none report empty.
    let root_fiber = reconciler.roots[root].current;
    assert_eq!(
        reconciler.arena[root_fiber].pending_work_priority,
        Priority::Low
    );
    let div = reconciler.arena[root_fiber].child.unwrap();
    assert_eq!(reconciler.arena[div].pending_work_priority, Priority::Low);
    let counter = reconciler.arena[div].child.unwrap();
    assert_eq!(
        reconciler.arena[counter].pending_work_priority,
        Priority::Low
    );

    reconciler
        .perform_deferred_work(&TimeLimit::from_now(Duration::from_secs(60)))
        .unwrap();
    assert_eq!(texts(&reconciler), ["7"]);
    let root_fiber = reconciler.roots[root].current;
    assert_eq!(
        reconciler.arena[root_fiber].pending_work_priority,
        Priority::NoWork
    );
}

#[test]
fn test_sync_render_flushes_ahead_of_pending_low_priority() {
    let (mut reconciler, root) = setup();
    reconciler.render(Element::text("a"), root).unwrap();

    reconciler
        .perform_with_priority(Priority::Low, |r| r.render(Element::text("b"), root))
        .unwrap();
    reconciler.render(Element::text("c"), root).unwrap();
    // The synchronous update jumped the queue; the low one is still pending.
    assert_eq!(texts(&reconciler), ["c"]);

    reconciler
        .perform_deferred_work(&TimeLimit::from_now(Duration::from_secs(60)))
        .unwrap();
    assert_eq!(texts(&reconciler), ["b"]);
}

#[test]
fn test_animation_priority_requests_animation_callback() {
    let (mut reconciler, root) = setup();
    reconciler.render(Element::text("a"), root).unwrap();

    reconciler
        .perform_with_priority(Priority::Animation, |r| {
            r.render(Element::text("b"), root)
        })
        .unwrap();
    assert_eq!(reconciler.host().animation_requests, 1);
    assert_eq!(texts(&reconciler), ["a"]);

    reconciler.perform_animation_work().unwrap();
    assert_eq!(texts(&reconciler), ["b"]);
}

// =============================================================================
// Structural kinds
// =============================================================================

#[test]
fn test_coroutine_renders_handler_output_from_yields() {
    let handler: CoroutineHandler = Rc::new(|_props, yields| {
        yields
            .iter()
            .map(|value| {
                let n = value.downcast_ref::<i64>().copied().unwrap_or(0);
                Element::text(format!("y{n}"))
            })
            .collect()
    });
    let (mut reconciler, root) = setup();
    reconciler
        .render(
            Element::coroutine(
                "Pairs",
                handler,
                empty_props(),
                vec![Element::yield_value(1i64), Element::yield_value(2i64)],
            ),
            root,
        )
        .unwrap();

    assert_eq!(texts(&reconciler), ["y1", "y2"]);
}

#[test]
fn test_portal_renders_into_foreign_container() {
    let target = ContainerId(9);
    let (mut reconciler, root) = setup();
    reconciler
        .render(
            Element::host(
                "div",
                vec![
                    Element::portal(target, vec![Element::text("p")]),
                    Element::text("main"),
                ],
            ),
            root,
        )
        .unwrap();

    assert_eq!(texts(&reconciler), ["main"]);
    assert_eq!(reconciler.host().texts_in(target), ["p"]);
}

#[test]
fn test_host_ref_attaches_and_detaches() {
    let events: Rc<RefCell<Vec<Option<InstanceId>>>> = Rc::new(RefCell::new(Vec::new()));
    let callback: RefCallback = {
        let events = events.clone();
        Rc::new(move |id| events.borrow_mut().push(id))
    };
    let (mut reconciler, root) = setup();
    reconciler
        .render(Element::host("div", vec![]).with_ref(callback), root)
        .unwrap();
    assert_eq!(*events.borrow(), [Some(InstanceId(0))]);

    reconciler.unmount_container(root).unwrap();
    assert_eq!(*events.borrow(), [Some(InstanceId(0)), None]);
}
