//! Core types shared across the reconciler.
//!
//! - [`Priority`] - urgency classes driving preemption and scheduling
//! - [`PropValue`] / [`Props`] / [`State`] / [`Context`] - component inputs
//! - Shallow-merge helpers used by the update queue

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;

// =============================================================================
// Priority
// =============================================================================

/// Urgency class for a unit of pending work, most to least urgent.
///
/// `NoWork` is the sentinel empty state: it never wins a comparison and a
/// fiber reporting it has nothing queued at or below itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Priority {
    /// Sentinel: no pending work.
    #[default]
    NoWork = 0,
    /// Performed immediately, before control returns to the caller.
    Synchronous = 1,
    /// Completed at the end of the current batch of work.
    Task = 2,
    /// Performed on the next animation callback from the host.
    Animation = 3,
    /// Deferred work that should complete soon.
    High = 4,
    /// Deferred work that can wait for idle time.
    Low = 5,
    /// Work on hidden content, performed last.
    Offscreen = 6,
}

impl Priority {
    /// All real priority levels, most urgent first.
    pub const LEVELS: [Priority; 6] = [
        Priority::Synchronous,
        Priority::Task,
        Priority::Animation,
        Priority::High,
        Priority::Low,
        Priority::Offscreen,
    ];

    /// Whether this is the empty sentinel.
    pub fn is_no_work(self) -> bool {
        self == Priority::NoWork
    }

    /// True when `self` names real work at least as urgent as `ceiling`.
    ///
    /// `NoWork` on either side is never "urgent enough".
    pub fn at_least_as_urgent_as(self, ceiling: Priority) -> bool {
        !self.is_no_work() && !ceiling.is_no_work() && (self as u8) <= (ceiling as u8)
    }

    /// Strictly more urgent than `other`. `NoWork` loses to everything real.
    pub fn more_urgent_than(self, other: Priority) -> bool {
        if self.is_no_work() {
            return false;
        }
        other.is_no_work() || (self as u8) < (other as u8)
    }

    /// The more urgent of two levels, treating `NoWork` as absence.
    pub fn more_urgent_of(a: Priority, b: Priority) -> Priority {
        match (a.is_no_work(), b.is_no_work()) {
            (true, _) => b,
            (_, true) => a,
            _ if (a as u8) <= (b as u8) => a,
            _ => b,
        }
    }

    /// Scheduling comparator used when deciding whether in-flight work
    /// satisfies a batch ceiling.
    ///
    /// `Synchronous` and `Task` compare equal here, and only here: a batch
    /// flushing task work must also flush synchronous updates scheduled
    /// mid-batch, and vice versa. Everywhere else the two levels keep their
    /// strict order, so this must not be collapsed into a total `Ord` impl.
    pub fn scheduling_cmp(self, other: Priority) -> Ordering {
        match (self, other) {
            (Priority::Synchronous, Priority::Task) | (Priority::Task, Priority::Synchronous) => {
                Ordering::Equal
            }
            _ => (self as u8).cmp(&(other as u8)),
        }
    }

    /// Batch-ceiling test built on [`Priority::scheduling_cmp`].
    pub fn within_batch_ceiling(self, ceiling: Priority) -> bool {
        !self.is_no_work()
            && !ceiling.is_no_work()
            && self.scheduling_cmp(ceiling) != Ordering::Greater
    }
}

// =============================================================================
// Prop values
// =============================================================================

/// A single property value on a host or component element.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

/// Immutable string-keyed property map. Cheap to clone and share across the
/// double buffer.
pub type Props = Rc<BTreeMap<String, PropValue>>;

/// Component-local state. Same representation as props; merged shallowly.
pub type State = Rc<BTreeMap<String, PropValue>>;

/// Inherited context provided by ancestor components.
pub type Context = Rc<BTreeMap<String, PropValue>>;

/// An empty property map.
pub fn empty_props() -> Props {
    Rc::new(BTreeMap::new())
}

/// Build a property map from key/value pairs.
pub fn props_from<I, K, V>(entries: I) -> Props
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<PropValue>,
{
    Rc::new(
        entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
    )
}

/// Shallow-merge `partial` over `base`, returning a new map.
pub fn merge_state(base: &State, partial: &State) -> State {
    if base.is_empty() {
        return partial.clone();
    }
    let mut merged = (**base).clone();
    for (k, v) in partial.iter() {
        merged.insert(k.clone(), v.clone());
    }
    Rc::new(merged)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_urgency() {
        assert!(Priority::Synchronous.more_urgent_than(Priority::Task));
        assert!(Priority::Task.more_urgent_than(Priority::Low));
        assert!(!Priority::NoWork.more_urgent_than(Priority::Offscreen));
        assert!(Priority::Offscreen.more_urgent_than(Priority::NoWork));

        assert_eq!(
            Priority::more_urgent_of(Priority::NoWork, Priority::Low),
            Priority::Low
        );
        assert_eq!(
            Priority::more_urgent_of(Priority::Animation, Priority::Synchronous),
            Priority::Synchronous
        );
    }

    #[test]
    fn test_priority_ceiling() {
        assert!(Priority::Synchronous.at_least_as_urgent_as(Priority::Low));
        assert!(Priority::Low.at_least_as_urgent_as(Priority::Low));
        assert!(!Priority::Offscreen.at_least_as_urgent_as(Priority::Task));
        assert!(!Priority::NoWork.at_least_as_urgent_as(Priority::Offscreen));
    }

    #[test]
    fn test_sync_task_compare_equal_only_to_each_other() {
        assert_eq!(
            Priority::Synchronous.scheduling_cmp(Priority::Task),
            Ordering::Equal
        );
        assert_eq!(
            Priority::Task.scheduling_cmp(Priority::Synchronous),
            Ordering::Equal
        );
        // The equality does not leak into the rest of the order.
        assert_eq!(
            Priority::Synchronous.scheduling_cmp(Priority::Animation),
            Ordering::Less
        );
        assert_eq!(
            Priority::Task.scheduling_cmp(Priority::Task),
            Ordering::Equal
        );
        assert!(Priority::Synchronous.within_batch_ceiling(Priority::Task));
        assert!(Priority::Task.within_batch_ceiling(Priority::Synchronous));
        assert!(!Priority::Animation.within_batch_ceiling(Priority::Task));
    }

    #[test]
    fn test_merge_state() {
        let base = props_from([("a", 1i64), ("b", 2i64)]);
        let partial = props_from([("b", 9i64), ("c", 3i64)]);
        let merged = merge_state(&base, &partial);

        assert_eq!(merged.get("a"), Some(&PropValue::Int(1)));
        assert_eq!(merged.get("b"), Some(&PropValue::Int(9)));
        assert_eq!(merged.get("c"), Some(&PropValue::Int(3)));
    }
}
