//! Entity types: the composition target for concerns and middleware
//!
//! An [`EntityType`] is declared once, accumulates concerns and middleware
//! stacks while uncommitted, and commits exactly once. After that its
//! structure is frozen and every registered method executes through its
//! synthesized wrapper. Calls on an uncommitted type trigger the commit
//! automatically (see [`commit`]).

pub mod commit;
pub(crate) mod methods;

pub use commit::CommitTrigger;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::concerns::{Concern, ConcernRegistry};
use crate::context::{CallContext, CallTarget, Callable, Kwargs};
use crate::errors::{Result, WeftError};
use crate::middleware::stack::Anchor;
use crate::middleware::{chain, MiddlewareFactory, MiddlewareStack, ObservationLog};
use commit::FALLBACK_ATTEMPT_LIMIT;
use methods::{MethodFn, MethodTable, PublicSlot};
use std::any::TypeId;

/// Whether an operation resolves per instance or per type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Operation on one entity instance
    Instance,
    /// Operation on the entity type itself
    Type,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance => f.write_str("instance"),
            Self::Type => f.write_str("type"),
        }
    }
}

pub(crate) struct TypeState {
    name: Arc<str>,
    committed: AtomicBool,
    commit_lock: Mutex<()>,
    trigger: RwLock<Option<CommitTrigger>>,
    fallback_attempts: AtomicU32,
    concerns: Mutex<ConcernRegistry>,
    instance_methods: MethodTable,
    type_methods: MethodTable,
}

/// Handle to one entity type. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct EntityType {
    state: Arc<TypeState>,
}

impl EntityType {
    /// Declare a new, uncommitted entity type.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            state: Arc::new(TypeState {
                name: name.into(),
                committed: AtomicBool::new(false),
                commit_lock: Mutex::new(()),
                trigger: RwLock::new(None),
                fallback_attempts: AtomicU32::new(0),
                concerns: Mutex::new(ConcernRegistry::default()),
                instance_methods: MethodTable::new(Scope::Instance),
                type_methods: MethodTable::new(Scope::Type),
            }),
        }
    }

    /// Name of this entity type
    pub fn name(&self) -> &str {
        &self.state.name
    }

    // --- configuration (pre-commit) ---------------------------------------

    /// Register a capability unit.
    ///
    /// Duplicate registrations of the same concern type are a no-op that
    /// preserves the original position. Rejected once committed.
    pub fn register_concern<C: Concern>(&self, concern: C) -> Result<()> {
        self.reject_if_committed("registering a concern")?;
        let added = self
            .state
            .concerns
            .lock()
            .register(TypeId::of::<C>(), Arc::new(concern));
        if added {
            debug!(entity = self.name(), "concern registered");
        }
        Ok(())
    }

    /// Define (or replace) the direct implementation of a method.
    pub fn define_method(
        &self,
        scope: Scope,
        name: &str,
        implementation: impl Fn(&mut CallContext) -> Result<Value> + Send + Sync + 'static,
    ) -> Result<()> {
        self.reject_if_committed("defining a method")?;
        let implementation: MethodFn = Arc::new(implementation);
        self.table(scope).define(Arc::from(name), implementation);
        trace!(entity = self.name(), method = name, %scope, "method defined");
        Ok(())
    }

    /// Append a middleware registration to the stack for `(scope, name)`.
    pub fn register_middleware(
        &self,
        scope: Scope,
        name: &str,
        factory: MiddlewareFactory,
    ) -> Result<()> {
        self.configure_stack(scope, name, |stack| {
            stack.push(factory);
            Ok(())
        })
    }

    /// Edit the middleware stack for `(scope, name)`, creating it on first
    /// reference. Rejected once committed.
    pub fn configure_stack(
        &self,
        scope: Scope,
        name: &str,
        edit: impl FnOnce(&mut MiddlewareStack) -> Result<()>,
    ) -> Result<()> {
        self.reject_if_committed("editing a middleware stack")?;
        self.table(scope).edit_stack(Arc::from(name), edit)
    }

    /// Swap a registered stack entry for an instrumented variant recording
    /// invocation metadata.
    ///
    /// Test instrumentation only. Unlike every other structural mutation,
    /// this hook stays available after commit.
    pub fn observe_stack(&self, scope: Scope, name: &str, anchor: &Anchor) -> Result<ObservationLog> {
        self.table(scope).observe(name, anchor)
    }

    // --- inspection -------------------------------------------------------

    /// Whether this type has committed
    pub fn is_committed(&self) -> bool {
        self.state.committed.load(Ordering::Acquire)
    }

    /// The trigger recorded by the commit, if committed
    pub fn commit_trigger(&self) -> Option<CommitTrigger> {
        *self.state.trigger.read()
    }

    /// Names of registered concerns, in registration order
    pub fn concern_names(&self) -> Vec<String> {
        self.state.concerns.lock().names()
    }

    /// Names of methods with a stack or an implementation in `scope`
    pub fn method_names(&self, scope: Scope) -> Vec<String> {
        self.table(scope)
            .method_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    /// Type names of the middleware registered for `(scope, name)`, in order
    pub fn middleware_names(&self, scope: Scope, name: &str) -> Vec<&'static str> {
        self.table(scope).stack_entry_names(name)
    }

    // --- runtime ----------------------------------------------------------

    /// Create an instance of this type with an empty attribute map.
    pub fn instantiate(&self) -> Entity {
        self.instantiate_with(IndexMap::new())
    }

    /// Create an instance of this type carrying `attrs`.
    pub fn instantiate_with(&self, attrs: IndexMap<String, Value>) -> Entity {
        Entity {
            inner: Arc::new(InstanceState {
                class: self.clone(),
                attrs: RwLock::new(attrs),
            }),
        }
    }

    /// Call a type-scope method with positional arguments only.
    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.call_with(method, args, Kwargs::new(), None)
    }

    /// Call a type-scope method with the full argument set.
    pub fn call_with(
        &self,
        method: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
        block: Option<Callable>,
    ) -> Result<Value> {
        let mut ctx = CallContext::new(CallTarget::Type(self.clone()), method, args, kwargs, block);
        self.dispatch(Scope::Type, method, &mut ctx)
    }

    // --- internals --------------------------------------------------------

    pub(crate) fn table(&self, scope: Scope) -> &MethodTable {
        match scope {
            Scope::Instance => &self.state.instance_methods,
            Scope::Type => &self.state.type_methods,
        }
    }

    pub(crate) fn state(&self) -> &TypeState {
        &self.state
    }

    fn reject_if_committed(&self, attempted: &'static str) -> Result<()> {
        if self.is_committed() {
            return Err(WeftError::already_committed(self.name(), attempted));
        }
        Ok(())
    }

    /// Resolve and execute `method`. Calls are the sole runtime entry
    /// point: the first call on an uncommitted type commits it before
    /// anything executes, so concerns materialize and middleware applies
    /// even when the method already has a direct implementation.
    ///
    /// The fallback loop is bounded over the type's whole lifetime: a
    /// method no concern ever defines exhausts the ceiling instead of
    /// looping forever.
    pub(crate) fn dispatch(
        &self,
        scope: Scope,
        method: &str,
        ctx: &mut CallContext,
    ) -> Result<Value> {
        loop {
            if !self.is_committed() {
                debug!(
                    entity = self.name(),
                    method,
                    %scope,
                    "first use of uncommitted type, committing"
                );
                let trigger = match scope {
                    Scope::Instance => CommitTrigger::InstanceFallback,
                    Scope::Type => CommitTrigger::TypeFallback,
                };
                // Blocks behind a racing commit; a concurrent first use
                // then resolves against the committed state.
                self.commit_with(trigger)?;
            }

            if let Some(slot) = self.table(scope).public_slot(method) {
                return match slot {
                    PublicSlot::Direct(implementation) => implementation(ctx),
                    PublicSlot::Synthesized => self.run_chain(scope, method, ctx),
                };
            }

            // Committed and still unresolved: no later registration can
            // supply the method, so burn an attempt instead of re-entering
            // commit. The counter spans the type's lifetime.
            let attempts = self.state.fallback_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempts > FALLBACK_ATTEMPT_LIMIT {
                return Err(WeftError::retries_exhausted(
                    self.name(),
                    scope,
                    method,
                    FALLBACK_ATTEMPT_LIMIT,
                ));
            }
        }
    }

    /// Execute the synthesized wrapper: resolve the current stack, build a
    /// chain over it, and run it with the original implementation as the
    /// innermost step.
    fn run_chain(&self, scope: Scope, method: &str, ctx: &mut CallContext) -> Result<Value> {
        let table = self.table(scope);
        let links = table.instantiate_stack(method);
        let original = table.original_fn(method);

        if links.is_empty() && original.is_none() {
            return Err(WeftError::unresolved(self.name(), scope, method));
        }

        trace!(
            entity = self.name(),
            method,
            %scope,
            links = links.len(),
            "executing middleware chain"
        );
        chain::execute(&links, ctx, original.as_ref())
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("name", &self.state.name)
            .field("committed", &self.is_committed())
            .finish()
    }
}

struct InstanceState {
    class: EntityType,
    attrs: RwLock<IndexMap<String, Value>>,
}

/// One instance of an entity type. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Entity {
    inner: Arc<InstanceState>,
}

impl Entity {
    /// The entity type this instance belongs to
    pub fn entity_type(&self) -> &EntityType {
        &self.inner.class
    }

    /// Attribute by name, if set
    pub fn attr(&self, name: &str) -> Option<Value> {
        self.inner.attrs.read().get(name).cloned()
    }

    /// Set an attribute
    pub fn set_attr(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.inner.attrs.write().insert(name.into(), value.into());
    }

    /// Snapshot of all attributes
    pub fn attrs(&self) -> IndexMap<String, Value> {
        self.inner.attrs.read().clone()
    }

    /// Call an instance-scope method with positional arguments only.
    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.call_with(method, args, Kwargs::new(), None)
    }

    /// Call an instance-scope method with the full argument set.
    pub fn call_with(
        &self,
        method: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
        block: Option<Callable>,
    ) -> Result<Value> {
        let mut ctx = CallContext::new(
            CallTarget::Instance(self.clone()),
            method,
            args,
            kwargs,
            block,
        );
        self.inner.class.dispatch(Scope::Instance, method, &mut ctx)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("type", &self.inner.class.name())
            .field("attrs", &*self.inner.attrs.read())
            .finish()
    }
}
