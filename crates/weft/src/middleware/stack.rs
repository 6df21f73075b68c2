//! Ordered middleware registrations for one (method, scope) pair
//!
//! Stack edits resolve an anchor either by numeric index or by the identity
//! of a stored entry (middleware type, or full factory equality including
//! bound arguments). Unrelated entries are never reordered; duplicates are
//! allowed, unlike the concern registry.

use std::any::{type_name, TypeId};
use std::fmt;

use crate::errors::{Result, WeftError};
use crate::middleware::factory::MiddlewareFactory;
use crate::middleware::observe::ObservationLog;
use crate::middleware::Middleware;

/// Position reference for stack edits.
#[derive(Clone, Debug)]
pub enum Anchor {
    /// Entry at a numeric position
    Index(usize),
    /// First entry whose middleware type matches
    Kind {
        /// Type identity of the middleware
        id: TypeId,
        /// Type name, for diagnostics
        name: &'static str,
    },
    /// First entry equal to this factory (type and bound arguments)
    Entry(MiddlewareFactory),
}

impl Anchor {
    /// Anchor on a numeric position
    pub fn index(index: usize) -> Self {
        Self::Index(index)
    }

    /// Anchor on the first entry of middleware type `M`
    pub fn of<M: Middleware>() -> Self {
        Self::Kind {
            id: TypeId::of::<M>(),
            name: type_name::<M>(),
        }
    }

    /// Anchor on the first entry equal to `factory`
    pub fn entry(factory: MiddlewareFactory) -> Self {
        Self::Entry(factory)
    }

    fn resolve(&self, entries: &[MiddlewareFactory]) -> Option<usize> {
        match self {
            Self::Index(index) if *index < entries.len() => Some(*index),
            Self::Index(_) => None,
            Self::Kind { id, .. } => entries.iter().position(|entry| entry.kind() == *id),
            Self::Entry(factory) => entries.iter().position(|entry| entry == factory),
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "index {index}"),
            Self::Kind { name, .. } => write!(f, "middleware `{name}`"),
            Self::Entry(factory) => {
                write!(f, "entry `{}` with bound arguments", factory.kind_name())
            }
        }
    }
}

/// Ordered, mutable collection of middleware registrations.
///
/// Equality is structural: two stacks are equal when their entries are equal
/// in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MiddlewareStack {
    entries: Vec<MiddlewareFactory>,
}

impl MiddlewareStack {
    /// Empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry at the end
    pub fn push(&mut self, entry: MiddlewareFactory) {
        self.entries.push(entry);
    }

    /// Insert `entry` immediately before the entry matching `anchor`
    pub fn insert_before(&mut self, anchor: &Anchor, entry: MiddlewareFactory) -> Result<()> {
        let position = self.position(anchor)?;
        self.entries.insert(position, entry);
        Ok(())
    }

    /// Insert `entry` immediately after the entry matching `anchor`
    pub fn insert_after(&mut self, anchor: &Anchor, entry: MiddlewareFactory) -> Result<()> {
        let position = self.position(anchor)?;
        self.entries.insert(position + 1, entry);
        Ok(())
    }

    /// Substitute the entry matching `anchor` in place, preserving position
    pub fn replace(&mut self, anchor: &Anchor, entry: MiddlewareFactory) -> Result<()> {
        let position = self.position(anchor)?;
        self.entries[position] = entry;
        Ok(())
    }

    /// Remove and return the entry matching `anchor`
    pub fn remove(&mut self, anchor: &Anchor) -> Result<MiddlewareFactory> {
        let position = self.position(anchor)?;
        Ok(self.entries.remove(position))
    }

    /// Read-only view of the entries in invocation order
    pub fn entries(&self) -> &[MiddlewareFactory] {
        &self.entries
    }

    /// Cloned snapshot of the entries in invocation order
    pub fn snapshot(&self) -> Vec<MiddlewareFactory> {
        self.entries.clone()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the stack has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Swap the entry matching `anchor` for an instrumented variant that
    /// forwards to the original while recording invocation metadata.
    ///
    /// Test instrumentation only: this mutates the registered entry rather
    /// than wrapping transparently, and it is deliberately exempt from the
    /// post-commit freeze. Do not use in production code.
    pub fn observe(&mut self, anchor: &Anchor) -> Result<ObservationLog> {
        let position = self.position(anchor)?;
        let log = ObservationLog::new();
        self.entries[position] = self.entries[position].instrumented(log.clone());
        Ok(log)
    }

    fn position(&self, anchor: &Anchor) -> Result<usize> {
        anchor
            .resolve(&self.entries)
            .ok_or_else(|| WeftError::anchor_not_found(anchor.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::factory::BoundArgs;
    use crate::middleware::Chain;
    use crate::Result;
    use proptest::prelude::*;
    use serde_json::Value;

    macro_rules! marker_middleware {
        ($name:ident) => {
            #[derive(Default)]
            struct $name;

            impl Middleware for $name {
                fn call(&self, chain: &mut Chain<'_>) -> Result<Value> {
                    chain.forward()
                }

                fn name(&self) -> &str {
                    stringify!($name)
                }
            }
        };
    }

    marker_middleware!(First);
    marker_middleware!(Second);
    marker_middleware!(Third);

    fn stack_of_three() -> MiddlewareStack {
        let mut stack = MiddlewareStack::new();
        stack.push(MiddlewareFactory::of::<First>());
        stack.push(MiddlewareFactory::of::<Second>());
        stack.push(MiddlewareFactory::of::<Third>());
        stack
    }

    fn kinds(stack: &MiddlewareStack) -> Vec<&'static str> {
        stack.entries().iter().map(|e| e.kind_name()).collect()
    }

    #[test]
    fn insert_before_and_after_anchor_by_kind() {
        let mut stack = stack_of_three();

        stack
            .insert_before(&Anchor::of::<Second>(), MiddlewareFactory::of::<Third>())
            .unwrap();
        stack
            .insert_after(&Anchor::of::<Third>(), MiddlewareFactory::of::<First>())
            .unwrap();

        // insert_after matched the first Third, the one just inserted.
        assert_eq!(
            kinds(&stack),
            vec![
                std::any::type_name::<First>(),
                std::any::type_name::<Third>(),
                std::any::type_name::<First>(),
                std::any::type_name::<Second>(),
                std::any::type_name::<Third>(),
            ]
        );
    }

    #[test]
    fn replace_preserves_position() {
        let mut stack = stack_of_three();
        stack
            .replace(&Anchor::index(1), MiddlewareFactory::of::<First>())
            .unwrap();

        assert_eq!(
            kinds(&stack),
            vec![
                std::any::type_name::<First>(),
                std::any::type_name::<First>(),
                std::any::type_name::<Third>(),
            ]
        );
    }

    #[test]
    fn remove_returns_the_matched_entry() {
        let mut stack = stack_of_three();
        let removed = stack.remove(&Anchor::of::<Second>()).unwrap();

        assert_eq!(removed, MiddlewareFactory::of::<Second>());
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn missing_anchor_is_a_configuration_error() {
        let mut stack = stack_of_three();
        stack.remove(&Anchor::of::<Second>()).unwrap();

        let err = stack
            .insert_before(&Anchor::of::<Second>(), MiddlewareFactory::of::<First>())
            .unwrap_err();
        assert!(matches!(err, WeftError::AnchorNotFound { .. }));
        assert!(err.is_configuration());

        let err = stack.remove(&Anchor::index(9)).unwrap_err();
        assert!(matches!(err, WeftError::AnchorNotFound { .. }));
    }

    #[test]
    fn anchor_by_entry_distinguishes_bound_arguments() {
        #[derive(Default)]
        struct Configured {
            limit: i64,
        }

        impl Middleware for Configured {
            fn call(&self, chain: &mut Chain<'_>) -> Result<Value> {
                let _ = self.limit;
                chain.forward()
            }

            fn name(&self) -> &str {
                "configured"
            }
        }

        let with_limit = |limit: i64| {
            MiddlewareFactory::with(BoundArgs::new().kwarg("limit", limit), |bound| Configured {
                limit: bound.kwargs().get("limit").and_then(Value::as_i64).unwrap_or(0),
            })
        };

        let mut stack = MiddlewareStack::new();
        stack.push(with_limit(1));
        stack.push(with_limit(2));

        stack
            .replace(&Anchor::entry(with_limit(2)), with_limit(3))
            .unwrap();

        assert_eq!(stack.entries()[0], with_limit(1));
        assert_eq!(stack.entries()[1], with_limit(3));

        let err = stack
            .remove(&Anchor::entry(with_limit(2)))
            .unwrap_err();
        assert!(matches!(err, WeftError::AnchorNotFound { .. }));
    }

    #[test]
    fn structural_equality_is_ordered() {
        let mut a = MiddlewareStack::new();
        a.push(MiddlewareFactory::of::<First>());
        a.push(MiddlewareFactory::of::<Second>());

        let mut b = MiddlewareStack::new();
        b.push(MiddlewareFactory::of::<Second>());
        b.push(MiddlewareFactory::of::<First>());

        assert_ne!(a, b);
        b.entries.swap(0, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn observe_keeps_identity_and_position() {
        let mut stack = stack_of_three();
        let _log = stack.observe(&Anchor::of::<Second>()).unwrap();

        // The instrumented entry still matches its original identity.
        assert_eq!(stack.entries()[1], MiddlewareFactory::of::<Second>());
        assert_eq!(stack.len(), 3);
    }

    #[test]
    fn duplicates_are_allowed() {
        let mut stack = MiddlewareStack::new();
        stack.push(MiddlewareFactory::of::<First>());
        stack.push(MiddlewareFactory::of::<First>());
        assert_eq!(stack.len(), 2);
    }

    proptest! {
        // Inserting at a random position then removing the inserted entry
        // restores the original order, and edits never reorder the rest.
        #[test]
        fn insert_then_remove_round_trips(position in 0usize..3) {
            let mut stack = stack_of_three();
            let before = kinds(&stack);

            #[derive(Default)]
            struct Probe;

            impl Middleware for Probe {
                fn call(&self, chain: &mut Chain<'_>) -> Result<Value> {
                    chain.forward()
                }

                fn name(&self) -> &str {
                    "probe"
                }
            }

            stack
                .insert_before(&Anchor::index(position), MiddlewareFactory::of::<Probe>())
                .unwrap();
            stack.remove(&Anchor::of::<Probe>()).unwrap();

            prop_assert_eq!(kinds(&stack), before);
        }
    }
}
