//! Per-scope method table: stacks, slots, and wrapper synthesis
//!
//! Each entity type owns one table per scope. A table maps method names to
//! their middleware stacks and to their dispatch slots, and guards wrapper
//! synthesis so it happens at most once per method for the table's
//! lifetime, even when several threads race the first use.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::debug;

use crate::context::CallContext;
use crate::entity::Scope;
use crate::errors::{Result, WeftError};
use crate::middleware::{Middleware, MiddlewareFactory, MiddlewareStack, ObservationLog};
use crate::middleware::stack::Anchor;

/// Stored implementation of one method.
pub(crate) type MethodFn = Arc<dyn Fn(&mut CallContext) -> Result<Value> + Send + Sync>;

/// Public dispatch state of one method slot.
///
/// `Direct` is the raw implementation as defined; `Synthesized` means the
/// public entry resolves the current stack at call time and executes it
/// with the original slot as the innermost step. Synthesis moves a direct
/// implementation into the original slot; the move and the state change
/// happen under one write lock so concurrent first uses cannot stack a
/// wrapper on top of another thread's wrapper.
#[derive(Clone)]
pub(crate) enum PublicSlot {
    Direct(MethodFn),
    Synthesized,
}

struct MethodSlot {
    public: PublicSlot,
    original: Option<MethodFn>,
}

pub(crate) struct MethodTable {
    scope: Scope,
    stacks: RwLock<HashMap<Arc<str>, MiddlewareStack>>,
    slots: RwLock<HashMap<Arc<str>, MethodSlot>>,
    synthesized: RwLock<HashSet<Arc<str>>>,
    synthesis_lock: Mutex<()>,
}

impl MethodTable {
    pub(crate) fn new(scope: Scope) -> Self {
        Self {
            scope,
            stacks: RwLock::new(HashMap::new()),
            slots: RwLock::new(HashMap::new()),
            synthesized: RwLock::new(HashSet::new()),
            synthesis_lock: Mutex::new(()),
        }
    }

    /// Install (or replace, pre-synthesis) the direct implementation.
    pub(crate) fn define(&self, name: Arc<str>, implementation: MethodFn) {
        self.slots.write().insert(
            name,
            MethodSlot {
                public: PublicSlot::Direct(implementation),
                original: None,
            },
        );
    }

    /// Edit the stack for `name`, creating it on first reference.
    pub(crate) fn edit_stack(
        &self,
        name: Arc<str>,
        edit: impl FnOnce(&mut MiddlewareStack) -> Result<()>,
    ) -> Result<()> {
        let mut stacks = self.stacks.write();
        edit(stacks.entry(name).or_default())
    }

    /// Swap one registered entry for its instrumented variant (debug hook).
    pub(crate) fn observe(&self, name: &str, anchor: &Anchor) -> Result<ObservationLog> {
        let mut stacks = self.stacks.write();
        match stacks.get_mut(name) {
            Some(stack) => stack.observe(anchor),
            None => Err(WeftError::anchor_not_found(anchor.to_string())),
        }
    }

    /// Instantiate the current stack contents for `name`, in order.
    ///
    /// Resolved at call time: registrations appended after synthesis (by
    /// later concern materialization, or by edits up to commit) are picked
    /// up by the next call.
    pub(crate) fn instantiate_stack(&self, name: &str) -> Vec<Arc<dyn Middleware>> {
        let factories = {
            let stacks = self.stacks.read();
            stacks.get(name).map(MiddlewareStack::snapshot).unwrap_or_default()
        };
        factories
            .iter()
            .map(|factory| factory.instantiate(None))
            .collect()
    }

    pub(crate) fn stack_entry_names(&self, name: &str) -> Vec<&'static str> {
        let stacks = self.stacks.read();
        stacks
            .get(name)
            .map(|stack| stack.entries().iter().map(MiddlewareFactory::kind_name).collect())
            .unwrap_or_default()
    }

    pub(crate) fn public_slot(&self, name: &str) -> Option<PublicSlot> {
        self.slots.read().get(name).map(|slot| slot.public.clone())
    }

    pub(crate) fn original_fn(&self, name: &str) -> Option<MethodFn> {
        self.slots.read().get(name).and_then(|slot| slot.original.clone())
    }

    pub(crate) fn is_synthesized(&self, name: &str) -> bool {
        self.synthesized.read().contains(name)
    }

    /// Every method with a registered stack or an implementation.
    pub(crate) fn method_names(&self) -> Vec<Arc<str>> {
        let mut names: HashSet<Arc<str>> = self.stacks.read().keys().cloned().collect();
        names.extend(self.slots.read().keys().cloned());
        let mut names: Vec<Arc<str>> = names.into_iter().collect();
        names.sort();
        names
    }

    /// Synthesize the wrapper pair for `name`, at most once per table
    /// lifetime.
    ///
    /// Fast path reads the marker set without taking the synthesis lock;
    /// the slow path re-checks under the lock because two threads may race
    /// to it. The original-slot move and the public-state change are one
    /// atomic step under a single write lock: doing them as separate steps
    /// would let a second thread capture an already-wrapped implementation
    /// as the "original".
    pub(crate) fn ensure_wrapper(&self, entity: &str, name: &Arc<str>) {
        if self.is_synthesized(name) {
            return;
        }

        let _guard = self.synthesis_lock.lock();
        if self.is_synthesized(name) {
            return;
        }

        {
            let mut slots = self.slots.write();
            match slots.get_mut(name) {
                Some(slot) => {
                    let previous = std::mem::replace(&mut slot.public, PublicSlot::Synthesized);
                    if let PublicSlot::Direct(implementation) = previous {
                        slot.original = Some(implementation);
                    }
                }
                None => {
                    // Stack-only method: the chain has no terminal step, and
                    // executing it with no entries fails as unresolved.
                    slots.insert(
                        name.clone(),
                        MethodSlot {
                            public: PublicSlot::Synthesized,
                            original: None,
                        },
                    );
                }
            }
        }
        self.synthesized.write().insert(name.clone());

        debug!(
            entity,
            method = name.as_ref(),
            scope = %self.scope,
            "synthesized wrapper operation"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn direct(value: i64) -> MethodFn {
        Arc::new(move |_ctx| Ok(json!(value)))
    }

    #[test]
    fn ensure_wrapper_moves_the_direct_implementation_once() {
        let table = MethodTable::new(Scope::Instance);
        let name: Arc<str> = Arc::from("compute");
        table.define(name.clone(), direct(1));

        table.ensure_wrapper("test", &name);
        assert!(table.is_synthesized(&name));
        assert!(matches!(table.public_slot(&name), Some(PublicSlot::Synthesized)));
        assert!(table.original_fn(&name).is_some());

        // Idempotent: a second synthesis keeps the original slot intact.
        table.ensure_wrapper("test", &name);
        assert!(table.original_fn(&name).is_some());
    }

    #[test]
    fn stack_only_methods_synthesize_with_no_original() {
        let table = MethodTable::new(Scope::Type);
        let name: Arc<str> = Arc::from("augmented");
        table
            .edit_stack(name.clone(), |_stack| Ok(()))
            .unwrap();

        table.ensure_wrapper("test", &name);
        assert!(table.original_fn(&name).is_none());
        assert!(matches!(table.public_slot(&name), Some(PublicSlot::Synthesized)));
    }

    #[test]
    fn method_names_cover_stacks_and_slots() {
        let table = MethodTable::new(Scope::Instance);
        table.define(Arc::from("a"), direct(0));
        table.edit_stack(Arc::from("b"), |_stack| Ok(())).unwrap();

        let names = table.method_names();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].as_ref(), "a");
        assert_eq!(names[1].as_ref(), "b");
    }
}
