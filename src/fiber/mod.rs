//! Fiber nodes - the mutable work units of the reconciler.
//!
//! A fiber records one tree position: what kind of thing lives there, its
//! last committed inputs/outputs, any pending inputs, and the bookkeeping
//! the scheduler needs (pending priority, effect tags, effect list links).
//! Each position has up to two fibers, the committed one and its alternate;
//! the pair trade roles at commit.

mod arena;

pub use arena::{FiberId, RootId};
pub(crate) use arena::FiberArena;

use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use crate::component::{ClassDescriptor, Instance};
use crate::element::{CoroutineHandler, Element, RefCallback, RenderFn, YieldValue};
use crate::host::{ContainerId, InstanceId, PropDiff};
use crate::queue::UpdateQueue;
use crate::types::{Priority, Props, State};

/// What kind of thing a fiber represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberTag {
    /// Root of a mounted tree; pairs with a host container.
    HostRoot,
    /// A host primitive instance.
    HostComponent,
    /// A host text node.
    HostText,
    /// Children rendered into another container.
    HostPortal,
    /// A stateless component.
    FunctionComponent,
    /// A stateful component.
    ClassComponent,
    /// A function component that has not rendered yet. Resolves to
    /// `FunctionComponent` after its first begin.
    IndeterminateComponent,
    /// A coroutine: collects yields from its children, then renders its
    /// handler's output in their place.
    Coroutine,
    /// A yielded value inside a coroutine. Never renders anything itself.
    Yield,
    /// A keyed grouping with no output of its own.
    Fragment,
}

/// Which pass of its two-phase render a coroutine fiber is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoroutinePhase {
    /// Rendering the coroutine's own children to collect yields.
    #[default]
    Collecting,
    /// Rendering the handler's output produced from those yields.
    Handling,
}

bitflags! {
    /// Side effects a fiber has accumulated during the render phase, applied
    /// in commit order by the committer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EffectTag: u8 {
        /// Insert (or move) the fiber's host nodes.
        const PLACEMENT = 1 << 0;
        /// Apply a prepared host diff or run commit lifecycles.
        const UPDATE = 1 << 1;
        /// Remove the subtree and run unmount lifecycles.
        const DELETION = 1 << 2;
        /// Clear direct text content before inserting children.
        const CONTENT_RESET = 1 << 3;
        /// Update-queue callbacks to invoke after commit.
        const CALLBACK = 1 << 4;
        /// A captured failure to deliver to this boundary.
        const ERR = 1 << 5;
        /// Detach and re-attach the host ref.
        const REF = 1 << 6;

        const PLACEMENT_AND_UPDATE = Self::PLACEMENT.bits() | Self::UPDATE.bits();
    }
}

// =============================================================================
// Per-kind payloads
// =============================================================================

/// Type identity of the element occupying a fiber. Function-valued variants
/// compare by pointer.
#[derive(Clone, Default)]
pub enum ElementType {
    #[default]
    None,
    Host(Rc<str>),
    Text,
    Function {
        name: Rc<str>,
        render: RenderFn,
    },
    Class(ClassDescriptor),
    Fragment,
    Portal(ContainerId),
    Coroutine {
        name: Rc<str>,
        handler: CoroutineHandler,
    },
    Yield,
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::None => f.write_str("None"),
            ElementType::Host(ty) => f.debug_tuple("Host").field(ty).finish(),
            ElementType::Text => f.write_str("Text"),
            ElementType::Function { name, .. } => {
                f.debug_struct("Function").field("name", name).finish()
            }
            ElementType::Class(descriptor) => {
                f.debug_tuple("Class").field(&descriptor.name()).finish()
            }
            ElementType::Fragment => f.write_str("Fragment"),
            ElementType::Portal(container) => f.debug_tuple("Portal").field(container).finish(),
            ElementType::Coroutine { name, .. } => {
                f.debug_struct("Coroutine").field("name", name).finish()
            }
            ElementType::Yield => f.write_str("Yield"),
        }
    }
}

impl PartialEq for ElementType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ElementType::None, ElementType::None) => true,
            (ElementType::Host(a), ElementType::Host(b)) => a == b,
            (ElementType::Text, ElementType::Text) => true,
            (ElementType::Function { render: a, .. }, ElementType::Function { render: b, .. }) => {
                Rc::ptr_eq(a, b)
            }
            (ElementType::Class(a), ElementType::Class(b)) => a == b,
            (ElementType::Fragment, ElementType::Fragment) => true,
            (ElementType::Portal(a), ElementType::Portal(b)) => a == b,
            (
                ElementType::Coroutine { handler: a, .. },
                ElementType::Coroutine { handler: b, .. },
            ) => Rc::ptr_eq(a, b),
            (ElementType::Yield, ElementType::Yield) => true,
            _ => false,
        }
    }
}

/// Props as a fiber carries them, shaped per kind.
#[derive(Clone, Default)]
pub enum FiberProps {
    #[default]
    None,
    /// Host primitive: its prop map plus the element children to reconcile.
    Host { props: Props, children: Vec<Element> },
    /// Text content.
    Text(String),
    /// Component props.
    Component(Props),
    /// Bare child list (fragments, portals, roots mid-reconcile).
    Children(Vec<Element>),
    /// Coroutine props plus the children whose yields it collects.
    Coroutine { props: Props, children: Vec<Element> },
    /// The value a yield surfaces.
    Yield(YieldValue),
}

impl FiberProps {
    /// The pending props an element contributes to its fiber.
    pub(crate) fn of(element: &Element) -> FiberProps {
        match element {
            Element::Text(text) => FiberProps::Text(text.clone()),
            Element::Host {
                props, children, ..
            } => FiberProps::Host {
                props: props.clone(),
                children: children.clone(),
            },
            Element::Function { props, .. } | Element::Class { props, .. } => {
                FiberProps::Component(props.clone())
            }
            Element::Fragment { children, .. } | Element::Portal { children, .. } => {
                FiberProps::Children(children.clone())
            }
            Element::Coroutine {
                props, children, ..
            } => FiberProps::Coroutine {
                props: props.clone(),
                children: children.clone(),
            },
            Element::Yield { value, .. } => FiberProps::Yield(value.clone()),
        }
    }

    /// The component-style prop map, empty for kinds that have none.
    pub fn props(&self) -> Props {
        match self {
            FiberProps::Host { props, .. }
            | FiberProps::Component(props)
            | FiberProps::Coroutine { props, .. } => props.clone(),
            _ => crate::types::empty_props(),
        }
    }
}

impl PartialEq for FiberProps {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FiberProps::None, FiberProps::None) => true,
            (
                FiberProps::Host {
                    props: ap,
                    children: ac,
                },
                FiberProps::Host {
                    props: bp,
                    children: bc,
                },
            ) => ap == bp && ac == bc,
            (FiberProps::Text(a), FiberProps::Text(b)) => a == b,
            (FiberProps::Component(a), FiberProps::Component(b)) => a == b,
            (FiberProps::Children(a), FiberProps::Children(b)) => a == b,
            (
                FiberProps::Coroutine {
                    props: ap,
                    children: ac,
                },
                FiberProps::Coroutine {
                    props: bp,
                    children: bc,
                },
            ) => ap == bp && ac == bc,
            (FiberProps::Yield(a), FiberProps::Yield(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Last committed output state, shaped per kind.
#[derive(Clone, Default)]
pub enum FiberState {
    #[default]
    None,
    /// Class component state map.
    Class(State),
    /// The element a root last rendered (`None` before first render or
    /// after unmount).
    Root(Option<Element>),
}

impl FiberState {
    pub fn class_state(&self) -> State {
        match self {
            FiberState::Class(state) => state.clone(),
            _ => State::default(),
        }
    }
}

/// The durable artifact a fiber owns outside the fiber tree.
#[derive(Clone, Default)]
pub enum StateNode {
    #[default]
    None,
    /// Host instance handle.
    Host(InstanceId),
    /// Host text instance handle.
    Text(InstanceId),
    /// Back-reference from a root fiber to its registered root.
    Root(RootId),
    /// Shared component instance, one per mounted position.
    Class(Instance),
    /// Portal target container.
    Portal(ContainerId),
    /// Coroutine bookkeeping: first child of the collecting pass, kept so
    /// the handler pass can be distinguished from a fresh begin.
    CoroutineChild(Option<FiberId>),
}

impl StateNode {
    pub fn instance_id(&self) -> Option<InstanceId> {
        match self {
            StateNode::Host(id) | StateNode::Text(id) => Some(*id),
            _ => None,
        }
    }
}

// =============================================================================
// Fiber
// =============================================================================

/// One node of the work tree. See the module docs for the double-buffer
/// relationship between a fiber and its `alternate`.
#[derive(Clone, Default)]
pub struct Fiber {
    pub tag: FiberTag,
    pub key: Option<String>,
    pub element_type: ElementType,

    /// Inputs for the render in progress.
    pub pending_props: FiberProps,
    /// Inputs of the last completed render.
    pub memoized_props: FiberProps,
    /// Output state of the last completed render.
    pub memoized_state: FiberState,
    /// Pending updates, present only while something is queued.
    pub update_queue: Option<UpdateQueue>,

    /// Most urgent pending work in this fiber or its subtree.
    pub pending_work_priority: Priority,

    // Tree links. `return_` is the parent in the walk.
    pub return_: Option<FiberId>,
    pub child: Option<FiberId>,
    pub sibling: Option<FiberId>,
    pub index: u32,
    /// The other buffer's fiber for this position.
    pub alternate: Option<FiberId>,

    // Effect bookkeeping.
    pub effect_tag: EffectTag,
    pub first_effect: Option<FiberId>,
    pub last_effect: Option<FiberId>,
    pub next_effect: Option<FiberId>,

    pub state_node: StateNode,
    /// Host prop diff computed during completion, consumed at commit.
    pub diff_payload: Option<PropDiff>,
    pub host_ref: Option<RefCallback>,
    pub coroutine_phase: CoroutinePhase,
}

impl Default for FiberTag {
    fn default() -> Self {
        FiberTag::HostRoot
    }
}

impl Fiber {
    pub(crate) fn new(tag: FiberTag, key: Option<String>) -> Fiber {
        Fiber {
            tag,
            key,
            ..Fiber::default()
        }
    }

    /// Fresh mount fiber for `element`, with `priority` as its pending work.
    pub(crate) fn from_element(element: &Element, priority: Priority) -> Fiber {
        let key = element.key().map(str::to_string);
        let mut fiber = match element {
            Element::Text(_) => {
                let mut f = Fiber::new(FiberTag::HostText, None);
                f.element_type = ElementType::Text;
                f
            }
            Element::Host { ty, host_ref, .. } => {
                let mut f = Fiber::new(FiberTag::HostComponent, key);
                f.element_type = ElementType::Host(ty.clone());
                f.host_ref = host_ref.clone();
                f
            }
            Element::Function { name, render, .. } => {
                let mut f = Fiber::new(FiberTag::IndeterminateComponent, key);
                f.element_type = ElementType::Function {
                    name: name.clone(),
                    render: render.clone(),
                };
                f
            }
            Element::Class { descriptor, .. } => {
                let mut f = Fiber::new(FiberTag::ClassComponent, key);
                f.element_type = ElementType::Class(descriptor.clone());
                f
            }
            Element::Fragment { .. } => {
                let mut f = Fiber::new(FiberTag::Fragment, key);
                f.element_type = ElementType::Fragment;
                f
            }
            Element::Portal { container, .. } => {
                let mut f = Fiber::new(FiberTag::HostPortal, key);
                f.element_type = ElementType::Portal(*container);
                f.state_node = StateNode::Portal(*container);
                f
            }
            Element::Coroutine { name, handler, .. } => {
                let mut f = Fiber::new(FiberTag::Coroutine, key);
                f.element_type = ElementType::Coroutine {
                    name: name.clone(),
                    handler: handler.clone(),
                };
                f
            }
            Element::Yield { .. } => {
                let mut f = Fiber::new(FiberTag::Yield, key);
                f.element_type = ElementType::Yield;
                f
            }
        };
        fiber.pending_props = FiberProps::of(element);
        fiber.pending_work_priority = priority;
        fiber
    }

    /// Short human-readable name for diagnostics and error reports.
    pub fn name(&self) -> String {
        match (&self.element_type, self.tag) {
            (ElementType::Host(ty), _) => ty.to_string(),
            (ElementType::Function { name, .. }, _) => name.to_string(),
            (ElementType::Class(descriptor), _) => descriptor.name().to_string(),
            (ElementType::Coroutine { name, .. }, _) => name.to_string(),
            (_, FiberTag::HostRoot) => "#root".to_string(),
            (_, FiberTag::HostText) => "#text".to_string(),
            (_, FiberTag::HostPortal) => "#portal".to_string(),
            (_, FiberTag::Fragment) => "#fragment".to_string(),
            (_, FiberTag::Yield) => "#yield".to_string(),
            _ => "#unknown".to_string(),
        }
    }

    /// The shared class instance, if this is a mounted class fiber.
    pub(crate) fn instance(&self) -> Option<Instance> {
        match &self.state_node {
            StateNode::Class(instance) => Some(instance.clone()),
            _ => None,
        }
    }

    /// Raise pending work to at least `priority`.
    pub(crate) fn raise_pending_priority(&mut self, priority: Priority) {
        self.pending_work_priority =
            Priority::more_urgent_of(self.pending_work_priority, priority);
    }

    /// Queue for this fiber, created on first use.
    pub(crate) fn queue_mut(&mut self) -> &mut UpdateQueue {
        self.update_queue.get_or_insert_with(UpdateQueue::default)
    }
}

// =============================================================================
// Tests
// =============================================================================
