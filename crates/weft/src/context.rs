//! Call environment threaded through a middleware chain
//!
//! A [`CallContext`] is created once per external call and carries the
//! positional arguments, keyword arguments, optional trailing callable,
//! target entity, and method name. The chain mutates it in place when a
//! link forwards with replacement arguments; it is never copied mid-chain.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::entity::{Entity, EntityType, Scope};

/// Trailing callable passed alongside a call, invoked with positional values.
pub type Callable = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// Keyword arguments, in declaration order.
pub type Kwargs = IndexMap<String, Value>;

/// The entity a call is dispatched against.
///
/// Instance-scope calls carry the instance; type-scope calls carry the
/// entity type itself.
#[derive(Clone)]
pub enum CallTarget {
    /// Type-scope call on the entity type itself
    Type(EntityType),
    /// Instance-scope call on one entity
    Instance(Entity),
}

impl CallTarget {
    /// The entity type behind this target, regardless of scope
    pub fn entity_type(&self) -> &EntityType {
        match self {
            Self::Type(class) => class,
            Self::Instance(entity) => entity.entity_type(),
        }
    }

    /// The instance, when this is an instance-scope target
    pub fn instance(&self) -> Option<&Entity> {
        match self {
            Self::Type(_) => None,
            Self::Instance(entity) => Some(entity),
        }
    }

    /// The call scope implied by this target
    pub fn scope(&self) -> Scope {
        match self {
            Self::Type(_) => Scope::Type,
            Self::Instance(_) => Scope::Instance,
        }
    }

    /// Name of the entity type behind this target
    pub fn type_name(&self) -> &str {
        self.entity_type().name()
    }
}

impl fmt::Debug for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(class) => write!(f, "CallTarget::Type({})", class.name()),
            Self::Instance(entity) => {
                write!(f, "CallTarget::Instance({})", entity.entity_type().name())
            }
        }
    }
}

/// Mutable call environment for one logical call.
pub struct CallContext {
    args: Vec<Value>,
    kwargs: Kwargs,
    block: Option<Callable>,
    target: CallTarget,
    method: Arc<str>,
    // Incremented on every forwarding call; lets the observation hook tell
    // whether a given link advanced without wrapping the chain itself.
    advances: u64,
}

impl CallContext {
    pub(crate) fn new(
        target: CallTarget,
        method: impl Into<Arc<str>>,
        args: Vec<Value>,
        kwargs: Kwargs,
        block: Option<Callable>,
    ) -> Self {
        Self {
            args,
            kwargs,
            block,
            target,
            method: method.into(),
            advances: 0,
        }
    }

    /// Positional arguments for the current link
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Positional argument at `index`, if present
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Keyword arguments for the current link
    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    /// Keyword argument by name, if present
    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }

    /// The trailing callable, if one was supplied
    pub fn block(&self) -> Option<&Callable> {
        self.block.as_ref()
    }

    /// Invoke the trailing callable with `args`, if one was supplied
    pub fn yield_block(&self, args: &[Value]) -> Option<Value> {
        self.block.as_ref().map(|block| block(args))
    }

    /// The entity this call targets
    pub fn target(&self) -> &CallTarget {
        &self.target
    }

    /// Name of the method being executed
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Replace the forwarded arguments in place; target and method are kept.
    pub(crate) fn rebind(&mut self, args: Vec<Value>, kwargs: Kwargs, block: Option<Callable>) {
        self.args = args;
        self.kwargs = kwargs;
        self.block = block;
        self.mark_advance();
    }

    pub(crate) fn mark_advance(&mut self) {
        self.advances += 1;
    }

    pub(crate) fn advance_count(&self) -> u64 {
        self.advances
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("target", &self.target)
            .field("method", &self.method)
            .field("args", &self.args)
            .field("kwargs", &self.kwargs)
            .field("block", &self.block.as_ref().map(|_| "<callable>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context_for(class: &EntityType) -> CallContext {
        CallContext::new(
            CallTarget::Type(class.clone()),
            "compute",
            vec![json!(1), json!(2)],
            Kwargs::new(),
            None,
        )
    }

    #[test]
    fn rebind_replaces_arguments_but_keeps_target_and_method() {
        let class = EntityType::new("rebind_test");
        let mut ctx = context_for(&class);

        let mut kwargs = Kwargs::new();
        kwargs.insert("mode".to_string(), json!("fast"));
        ctx.rebind(vec![json!(9)], kwargs, None);

        assert_eq!(ctx.args(), &[json!(9)]);
        assert_eq!(ctx.kwarg("mode"), Some(&json!("fast")));
        assert_eq!(ctx.method(), "compute");
        assert_eq!(ctx.target().type_name(), "rebind_test");
        assert_eq!(ctx.advance_count(), 1);
    }

    #[test]
    fn yield_block_invokes_the_trailing_callable() {
        let class = EntityType::new("block_test");
        let block: Callable = Arc::new(|args| json!(args.len()));
        let ctx = CallContext::new(
            CallTarget::Type(class),
            "compute",
            Vec::new(),
            Kwargs::new(),
            Some(block),
        );

        assert_eq!(ctx.yield_block(&[json!(1), json!(2)]), Some(json!(2)));
    }

    #[test]
    fn target_scope_follows_the_variant() {
        let class = EntityType::new("scope_test");
        let entity = class.instantiate();

        assert_eq!(CallTarget::Type(class).scope(), Scope::Type);
        assert_eq!(CallTarget::Instance(entity).scope(), Scope::Instance);
    }
}
