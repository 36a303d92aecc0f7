//! Class component contract.
//!
//! Stateful components implement [`Component`]. Optional lifecycle hooks are
//! declared through [`Capabilities`] rather than probed at runtime: the
//! reconciler only schedules commit-phase work for hooks a component says it
//! has, and only considers components with `CATCHES_ERRORS` when searching
//! for an error boundary.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use crate::element::Element;
use crate::errors::{CapturedError, ComponentError};
use crate::fiber::FiberId;
use crate::queue::StateChange;
use crate::types::{Context, Props, State};

bitflags! {
    /// Which optional hooks a [`Component`] implements.
    ///
    /// Render, `initial_state` and `should_update` are always consulted;
    /// everything else fires only when its flag is set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Capabilities: u16 {
        /// `will_mount` runs before the first render.
        const WILL_MOUNT = 1 << 0;
        /// `did_mount` runs after the first commit.
        const DID_MOUNT = 1 << 1;
        /// `will_receive_props` runs when new props arrive.
        const WILL_RECEIVE_PROPS = 1 << 2;
        /// `did_update` runs after every non-initial commit.
        const DID_UPDATE = 1 << 3;
        /// `will_unmount` runs during deletion.
        const WILL_UNMOUNT = 1 << 4;
        /// `catch` absorbs descendant failures (error boundary).
        const CATCHES_ERRORS = 1 << 5;
        /// `child_context` provides context to the subtree.
        const CHILD_CONTEXT = 1 << 6;
        /// Skip re-render when props and state are shallow-equal
        /// (overrides `should_update`).
        const PURE = 1 << 7;

        /// Hooks that require an Update effect at commit time.
        const COMMIT_LIFECYCLES = Self::DID_MOUNT.bits() | Self::DID_UPDATE.bits();
    }
}

// =============================================================================
// State updates requested from lifecycles
// =============================================================================

/// Buffer through which lifecycle hooks request state changes.
///
/// Hooks cannot reach back into the scheduler directly (it is mid-walk when
/// they run), so requests are recorded here and drained into the owning
/// fiber's update queue by the reconciler.
pub struct StateUpdates {
    fiber: FiberId,
    pub(crate) requests: Vec<StateChange>,
    pub(crate) force_update: bool,
}

impl StateUpdates {
    pub(crate) fn new(fiber: FiberId) -> Self {
        StateUpdates {
            fiber,
            requests: Vec::new(),
            force_update: false,
        }
    }

    /// The fiber this component instance currently occupies. Stable across
    /// renders (modulo the double buffer); usable with
    /// [`crate::Reconciler::set_state`] after mount.
    pub fn fiber(&self) -> FiberId {
        self.fiber
    }

    /// Request a shallow-merged partial state update.
    pub fn set_state(&mut self, partial: State) {
        self.requests.push(StateChange::Partial(partial));
    }

    /// Request a state update computed from the previous state and props.
    pub fn set_state_with(&mut self, updater: impl Fn(&State, &Props) -> State + 'static) {
        self.requests.push(StateChange::Updater(Rc::new(updater)));
    }

    /// Request a whole-state replacement.
    pub fn replace_state(&mut self, next: State) {
        self.requests.push(StateChange::Replace(next));
    }

    /// Request a re-render that skips `should_update`.
    pub fn force_update(&mut self) {
        self.force_update = true;
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.requests.is_empty() && !self.force_update
    }
}

// =============================================================================
// Component trait
// =============================================================================

/// A stateful ("class") component.
///
/// One instance exists per mounted tree position and is shared between the
/// current and work-in-progress fibers for that position.
pub trait Component {
    /// Produce the children for the current props and state.
    fn render(
        &mut self,
        props: &Props,
        state: &State,
        context: &Context,
    ) -> Result<Element, ComponentError>;

    /// State before the first render.
    fn initial_state(&mut self, _props: &Props) -> State {
        State::default()
    }

    /// Declared optional hooks. See [`Capabilities`].
    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    /// Whether a re-render is needed for the given transition. Ignored when
    /// an update was forced; replaced by shallow equality for `PURE`
    /// components.
    fn should_update(
        &mut self,
        _old_props: &Props,
        _new_props: &Props,
        _old_state: &State,
        _new_state: &State,
    ) -> bool {
        true
    }

    fn will_mount(
        &mut self,
        _props: &Props,
        _state: &State,
        _updates: &mut StateUpdates,
    ) -> Result<(), ComponentError> {
        Ok(())
    }

    fn did_mount(&mut self, _updates: &mut StateUpdates) -> Result<(), ComponentError> {
        Ok(())
    }

    fn will_receive_props(
        &mut self,
        _next_props: &Props,
        _context: &Context,
        _updates: &mut StateUpdates,
    ) -> Result<(), ComponentError> {
        Ok(())
    }

    fn did_update(
        &mut self,
        _prev_props: &Props,
        _prev_state: &State,
        _updates: &mut StateUpdates,
    ) -> Result<(), ComponentError> {
        Ok(())
    }

    fn will_unmount(&mut self) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Absorb a descendant failure. Only called when `CATCHES_ERRORS` is
    /// set; typically records the error into state for a fallback render.
    fn catch(
        &mut self,
        _error: &CapturedError,
        _updates: &mut StateUpdates,
    ) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Context entries to merge over the inherited context for descendants.
    /// Only called when `CHILD_CONTEXT` is set.
    fn child_context(&self, _props: &Props, _state: &State) -> Option<Context> {
        None
    }
}

/// Shared, mutable handle to a mounted component instance.
pub type Instance = Rc<RefCell<Box<dyn Component>>>;

// =============================================================================
// Class descriptors
// =============================================================================

struct ClassDescriptorInner {
    name: String,
    construct: Box<dyn Fn() -> Box<dyn Component>>,
}

/// Type identity plus constructor for a class component.
///
/// Two class elements describe the same component kind iff they hold the
/// same descriptor (pointer identity); build one descriptor per component
/// type, not per element.
#[derive(Clone)]
pub struct ClassDescriptor(Rc<ClassDescriptorInner>);

impl ClassDescriptor {
    /// Create a descriptor for a component type with the given constructor.
    pub fn new(
        name: impl Into<String>,
        construct: impl Fn() -> Box<dyn Component> + 'static,
    ) -> Self {
        ClassDescriptor(Rc::new(ClassDescriptorInner {
            name: name.into(),
            construct: Box::new(construct),
        }))
    }

    /// Descriptor for a `Default`-constructible component type.
    pub fn of<C: Component + Default + 'static>(name: impl Into<String>) -> Self {
        Self::new(name, || Box::new(C::default()) as Box<dyn Component>)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub(crate) fn construct(&self) -> Box<dyn Component> {
        (self.0.construct)()
    }

    pub(crate) fn same_type(&self, other: &ClassDescriptor) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for ClassDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.same_type(other)
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClassDescriptor").field(&self.0.name).finish()
    }
}
