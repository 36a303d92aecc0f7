//! Element trees - the immutable descriptions components render.
//!
//! An [`Element`] describes one node of desired output: a host primitive, a
//! piece of text, a component invocation, or one of the structural kinds
//! (fragment, portal, coroutine, yield). Elements are cheap to clone; the
//! reconciler diffs them against the fiber tree, it never mutates them.
//!
//! Kinds form a closed set. "What sort of child is this" is a plain `match`;
//! there is no invalid-child case for the reconciler to handle at runtime.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::component::ClassDescriptor;
use crate::host::{ContainerId, InstanceId};
use crate::types::{Context, PropValue, Props, empty_props};

/// Body of a function component.
pub type RenderFn = Rc<dyn Fn(&Props, &Context) -> Element>;

/// Coroutine handler: consumes the values yielded by the coroutine's
/// children and produces the elements actually rendered in their place.
pub type CoroutineHandler = Rc<dyn Fn(&Props, &[YieldValue]) -> Vec<Element>>;

/// Opaque value carried by a yield element to its enclosing coroutine.
pub type YieldValue = Rc<dyn Any>;

/// Callback invoked with the host instance on attach, `None` on detach.
pub type RefCallback = Rc<dyn Fn(Option<InstanceId>)>;

/// One node of desired output.
#[derive(Clone)]
pub enum Element {
    /// Literal text.
    Text(String),
    /// A host primitive, e.g. a DOM tag or a terminal box.
    Host {
        ty: Rc<str>,
        key: Option<String>,
        props: Props,
        host_ref: Option<RefCallback>,
        children: Vec<Element>,
    },
    /// A stateless component: props and context in, element out.
    Function {
        name: Rc<str>,
        key: Option<String>,
        render: RenderFn,
        props: Props,
    },
    /// A stateful component instance position.
    Class {
        descriptor: ClassDescriptor,
        key: Option<String>,
        props: Props,
    },
    /// A keyed grouping with no host node of its own.
    Fragment {
        key: Option<String>,
        children: Vec<Element>,
    },
    /// Children rendered into a different host container.
    Portal {
        container: ContainerId,
        key: Option<String>,
        children: Vec<Element>,
    },
    /// Children whose yields are collected and fed to `handler`.
    Coroutine {
        name: Rc<str>,
        key: Option<String>,
        handler: CoroutineHandler,
        props: Props,
        children: Vec<Element>,
    },
    /// A value surfaced to the nearest enclosing coroutine.
    Yield {
        key: Option<String>,
        value: YieldValue,
    },
}

impl Element {
    /// Text element from anything string-like. Numbers render as text too;
    /// format them before constructing the element.
    pub fn text(content: impl Into<String>) -> Element {
        Element::Text(content.into())
    }

    /// Host element with no props.
    pub fn host(ty: impl Into<Rc<str>>, children: Vec<Element>) -> Element {
        Element::host_with_props(ty, empty_props(), children)
    }

    /// Host element with props.
    pub fn host_with_props(
        ty: impl Into<Rc<str>>,
        props: Props,
        children: Vec<Element>,
    ) -> Element {
        Element::Host {
            ty: ty.into(),
            key: None,
            props,
            host_ref: None,
            children,
        }
    }

    /// Function component element.
    pub fn function(
        name: impl Into<Rc<str>>,
        render: RenderFn,
        props: Props,
    ) -> Element {
        Element::Function {
            name: name.into(),
            key: None,
            render,
            props,
        }
    }

    /// Class component element.
    pub fn class(descriptor: &ClassDescriptor, props: Props) -> Element {
        Element::Class {
            descriptor: descriptor.clone(),
            key: None,
            props,
        }
    }

    /// Fragment element.
    pub fn fragment(children: Vec<Element>) -> Element {
        Element::Fragment {
            key: None,
            children,
        }
    }

    /// Portal element targeting `container`.
    pub fn portal(container: ContainerId, children: Vec<Element>) -> Element {
        Element::Portal {
            container,
            key: None,
            children,
        }
    }

    /// Coroutine element.
    pub fn coroutine(
        name: impl Into<Rc<str>>,
        handler: CoroutineHandler,
        props: Props,
        children: Vec<Element>,
    ) -> Element {
        Element::Coroutine {
            name: name.into(),
            key: None,
            handler,
            props,
            children,
        }
    }

    /// Yield element carrying `value`.
    pub fn yield_value(value: impl Any + 'static) -> Element {
        Element::Yield {
            key: None,
            value: Rc::new(value),
        }
    }

    /// Attach a reconciliation key (builder style).
    pub fn keyed(mut self, new_key: impl Into<String>) -> Element {
        let key = new_key.into();
        match &mut self {
            Element::Text(_) => {}
            Element::Host { key: slot, .. }
            | Element::Function { key: slot, .. }
            | Element::Class { key: slot, .. }
            | Element::Fragment { key: slot, .. }
            | Element::Portal { key: slot, .. }
            | Element::Coroutine { key: slot, .. }
            | Element::Yield { key: slot, .. } => *slot = Some(key),
        }
        self
    }

    /// Attach a host ref callback. Only meaningful on host elements.
    pub fn with_ref(mut self, callback: RefCallback) -> Element {
        if let Element::Host { host_ref, .. } = &mut self {
            *host_ref = Some(callback);
        }
        self
    }

    /// The element's reconciliation key, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Element::Text(_) => None,
            Element::Host { key, .. }
            | Element::Function { key, .. }
            | Element::Class { key, .. }
            | Element::Fragment { key, .. }
            | Element::Portal { key, .. }
            | Element::Coroutine { key, .. }
            | Element::Yield { key, .. } => key.as_deref(),
        }
    }

    /// Short human-readable name for diagnostics.
    pub fn name(&self) -> String {
        match self {
            Element::Text(_) => "#text".to_string(),
            Element::Host { ty, .. } => ty.to_string(),
            Element::Function { name, .. } => name.to_string(),
            Element::Class { descriptor, .. } => descriptor.name().to_string(),
            Element::Fragment { .. } => "#fragment".to_string(),
            Element::Portal { .. } => "#portal".to_string(),
            Element::Coroutine { name, .. } => name.to_string(),
            Element::Yield { .. } => "#yield".to_string(),
        }
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Text(text) => f.debug_tuple("Text").field(text).finish(),
            _ => f
                .debug_struct(&self.name())
                .field("key", &self.key())
                .finish(),
        }
    }
}

/// Structural equality, with function identities compared by pointer.
///
/// Bail-out decisions ("did the input change") rely on this; cloned element
/// trees with identical content compare equal, matching the reference
/// identity the original design got from immutable descriptions.
impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Element::Text(a), Element::Text(b)) => a == b,
            (
                Element::Host {
                    ty: at,
                    key: ak,
                    props: ap,
                    host_ref: ar,
                    children: ac,
                },
                Element::Host {
                    ty: bt,
                    key: bk,
                    props: bp,
                    host_ref: br,
                    children: bc,
                },
            ) => {
                at == bt
                    && ak == bk
                    && ap == bp
                    && ac == bc
                    && ref_eq(ar, br)
            }
            (
                Element::Function {
                    render: ar,
                    key: ak,
                    props: ap,
                    ..
                },
                Element::Function {
                    render: br,
                    key: bk,
                    props: bp,
                    ..
                },
            ) => Rc::ptr_eq(ar, br) && ak == bk && ap == bp,
            (
                Element::Class {
                    descriptor: ad,
                    key: ak,
                    props: ap,
                },
                Element::Class {
                    descriptor: bd,
                    key: bk,
                    props: bp,
                },
            ) => ad.same_type(bd) && ak == bk && ap == bp,
            (
                Element::Fragment {
                    key: ak,
                    children: ac,
                },
                Element::Fragment {
                    key: bk,
                    children: bc,
                },
            ) => ak == bk && ac == bc,
            (
                Element::Portal {
                    container: acn,
                    key: ak,
                    children: ac,
                },
                Element::Portal {
                    container: bcn,
                    key: bk,
                    children: bc,
                },
            ) => acn == bcn && ak == bk && ac == bc,
            (
                Element::Coroutine {
                    handler: ah,
                    key: ak,
                    props: ap,
                    children: ac,
                    ..
                },
                Element::Coroutine {
                    handler: bh,
                    key: bk,
                    props: bp,
                    children: bc,
                    ..
                },
            ) => Rc::ptr_eq(ah, bh) && ak == bk && ap == bp && ac == bc,
            (Element::Yield { key: ak, value: av }, Element::Yield { key: bk, value: bv }) => {
                ak == bk && Rc::ptr_eq(av, bv)
            }
            _ => false,
        }
    }
}

pub(crate) fn ref_eq(a: &Option<RefCallback>, b: &Option<RefCallback>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

// =============================================================================
// Host text content
// =============================================================================

/// The text of a lone string child, if that is all `children` holds.
///
/// Hosts that opt in via `should_set_text_content` get such content applied
/// directly on the instance (through the `children` prop entry) with no text
/// fiber allocated for it.
pub(crate) fn single_text_child(children: &[Element]) -> Option<&str> {
    match children {
        [Element::Text(text)] => Some(text),
        _ => None,
    }
}

/// Fold direct text content into a host element's props under `children`,
/// the shape host adapters diff and apply.
pub(crate) fn fold_text_content(props: &Props, text: &str) -> Props {
    let mut folded = (**props).clone();
    folded.insert("children".to_string(), PropValue::Str(text.to_string()));
    Rc::new(folded)
}

// =============================================================================
// Tests
// =============================================================================
