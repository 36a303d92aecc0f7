//! Error types for the reconciler.
//!
//! Component hooks and host adapter calls return `Result` rather than
//! panicking; failures are classified by the phase they occurred in so the
//! scheduler can route them to the nearest error boundary (or surface them
//! from the triggering call when no boundary exists).

use thiserror::Error;

use crate::fiber::FiberId;

/// Failure raised by a component hook (render or lifecycle).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ComponentError(pub String);

impl From<&str> for ComponentError {
    fn from(message: &str) -> Self {
        ComponentError(message.to_string())
    }
}

impl From<String> for ComponentError {
    fn from(message: String) -> Self {
        ComponentError(message)
    }
}

/// Failure raised by a host adapter operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("host adapter failure: {0}")]
pub struct HostError(pub String);

/// The phase of work a failure was observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPhase {
    /// Thrown from a component body or lifecycle during begin/complete.
    Render,
    /// Thrown from a host call or commit lifecycle while applying effects.
    Commit,
}

/// Top-level error surfaced by the public API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// A render-phase failure with no boundary left to absorb it.
    #[error("uncaught render error in `{component}`: {source}")]
    UncaughtRender {
        component: String,
        source: ComponentError,
    },

    /// A commit-phase failure with no boundary left to absorb it.
    #[error("uncaught commit error in `{component}`: {source}")]
    UncaughtCommit {
        component: String,
        source: ComponentError,
    },

    /// A host adapter call failed outside any component's blame.
    #[error(transparent)]
    Host(#[from] HostError),

    /// An update was scheduled against a fiber no longer in any tree.
    #[error("update scheduled on an unmounted component")]
    Unmounted,

    /// The scheduler was re-entered while already performing work.
    #[error("cannot perform work while work is already in progress")]
    NestedWork,
}

/// Error delivered to an error boundary's `catch` hook.
///
/// Carries enough to render a fallback and report the failure; the failed
/// subtree itself has already been unmounted by the time this is seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedError {
    /// Message of the underlying failure.
    pub message: String,
    /// Name of the component that failed.
    pub component: String,
    /// Phase the failure occurred in.
    pub phase: ErrorPhase,
}

/// Internal: a unit of work that failed, with the fiber to blame.
#[derive(Debug, Clone)]
pub(crate) struct WorkFailure {
    pub fiber: FiberId,
    pub error: ComponentError,
    pub phase: ErrorPhase,
}

impl WorkFailure {
    pub(crate) fn render(fiber: FiberId, error: ComponentError) -> Self {
        WorkFailure {
            fiber,
            error,
            phase: ErrorPhase::Render,
        }
    }

    pub(crate) fn commit(fiber: FiberId, error: ComponentError) -> Self {
        WorkFailure {
            fiber,
            error,
            phase: ErrorPhase::Commit,
        }
    }
}

impl From<HostError> for ComponentError {
    fn from(error: HostError) -> Self {
        ComponentError(error.to_string())
    }
}
