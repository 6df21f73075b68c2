//! Deferred middleware construction
//!
//! A [`MiddlewareFactory`] binds a concrete middleware type to a set of
//! construction arguments, so the same type can be registered several times
//! with different configuration. Instantiation happens per call, when the
//! wrapper resolves the current stack.

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::context::{Callable, Kwargs};
use crate::middleware::observe::{ObservationLog, Observed};
use crate::middleware::Middleware;

/// Pre-bound constructor arguments: positional, keyword, and an optional
/// trailing callable.
#[derive(Clone, Default)]
pub struct BoundArgs {
    args: Vec<Value>,
    kwargs: Kwargs,
    block: Option<Callable>,
}

impl BoundArgs {
    /// Empty argument set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Add a keyword argument
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Attach a trailing callable
    pub fn block(mut self, block: Callable) -> Self {
        self.block = Some(block);
        self
    }

    /// Bound positional arguments
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Bound keyword arguments
    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    /// Bound trailing callable, if any
    pub fn block_fn(&self) -> Option<&Callable> {
        self.block.as_ref()
    }
}

impl PartialEq for BoundArgs {
    fn eq(&self, other: &Self) -> bool {
        // Callables have no structural equality; compare by identity.
        let blocks_equal = match (&self.block, &other.block) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        self.args == other.args && self.kwargs == other.kwargs && blocks_equal
    }
}

impl fmt::Debug for BoundArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundArgs")
            .field("args", &self.args)
            .field("kwargs", &self.kwargs)
            .field("block", &self.block.as_ref().map(|_| "<callable>"))
            .finish()
    }
}

type ConstructFn = Arc<dyn Fn(&BoundArgs) -> Arc<dyn Middleware> + Send + Sync>;

/// Deferred binding of a middleware type plus fixed construction arguments.
///
/// Two factories are equal iff both the middleware type and the bound
/// arguments are equal; stack anchors resolve against the same identity.
#[derive(Clone)]
pub struct MiddlewareFactory {
    kind: TypeId,
    kind_name: &'static str,
    bound: BoundArgs,
    construct: ConstructFn,
}

impl MiddlewareFactory {
    /// Factory for a middleware type with no construction arguments.
    pub fn of<M>() -> Self
    where
        M: Middleware + Default,
    {
        Self {
            kind: TypeId::of::<M>(),
            kind_name: type_name::<M>(),
            bound: BoundArgs::default(),
            construct: Arc::new(|_| Arc::new(M::default())),
        }
    }

    /// Factory for a middleware type built from bound arguments.
    ///
    /// `build` runs once per instantiation, receiving the bound arguments or
    /// the per-call overrides when supplied.
    pub fn with<M, F>(bound: BoundArgs, build: F) -> Self
    where
        M: Middleware,
        F: Fn(&BoundArgs) -> M + Send + Sync + 'static,
    {
        Self {
            kind: TypeId::of::<M>(),
            kind_name: type_name::<M>(),
            bound,
            construct: Arc::new(move |args| Arc::new(build(args))),
        }
    }

    /// Construct the middleware, falling back to the bound arguments when no
    /// override is supplied.
    pub fn instantiate(&self, overrides: Option<&BoundArgs>) -> Arc<dyn Middleware> {
        (self.construct)(overrides.unwrap_or(&self.bound))
    }

    /// Type identity of the middleware this factory builds
    pub fn kind(&self) -> TypeId {
        self.kind
    }

    /// Type name of the middleware this factory builds
    pub fn kind_name(&self) -> &'static str {
        self.kind_name
    }

    /// The bound construction arguments
    pub fn bound_args(&self) -> &BoundArgs {
        &self.bound
    }

    /// Same factory, but every instantiation is wrapped to record invocation
    /// metadata into `log`. Type identity and bound arguments are kept, so
    /// anchors and equality still resolve against the original entry.
    pub(crate) fn instrumented(&self, log: ObservationLog) -> Self {
        let inner = self.construct.clone();
        Self {
            kind: self.kind,
            kind_name: self.kind_name,
            bound: self.bound.clone(),
            construct: Arc::new(move |args| Arc::new(Observed::new(inner(args), log.clone()))),
        }
    }
}

impl PartialEq for MiddlewareFactory {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.bound == other.bound
    }
}

impl fmt::Debug for MiddlewareFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareFactory")
            .field("kind", &self.kind_name)
            .field("bound", &self.bound)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Chain;
    use crate::Result;
    use serde_json::json;

    #[derive(Default)]
    struct Tagging {
        tag: String,
    }

    impl Middleware for Tagging {
        fn call(&self, chain: &mut Chain<'_>) -> Result<Value> {
            let _ = chain;
            Ok(json!(self.tag))
        }

        fn name(&self) -> &str {
            "tagging"
        }
    }

    #[derive(Default)]
    struct OtherKind;

    impl Middleware for OtherKind {
        fn call(&self, chain: &mut Chain<'_>) -> Result<Value> {
            chain.forward()
        }

        fn name(&self) -> &str {
            "other"
        }
    }

    fn tagging_factory(tag: &str) -> MiddlewareFactory {
        MiddlewareFactory::with(BoundArgs::new().arg(tag), |bound| Tagging {
            tag: bound
                .args()
                .first()
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }

    #[test]
    fn equality_requires_type_and_bound_arguments() {
        assert_eq!(tagging_factory("a"), tagging_factory("a"));
        assert_ne!(tagging_factory("a"), tagging_factory("b"));
        assert_ne!(
            MiddlewareFactory::of::<OtherKind>(),
            MiddlewareFactory::of::<Tagging>()
        );
        assert_eq!(
            MiddlewareFactory::of::<OtherKind>(),
            MiddlewareFactory::of::<OtherKind>()
        );
    }

    #[test]
    fn instantiate_prefers_overrides_over_bound_arguments() {
        let factory = tagging_factory("bound");

        let built = factory.instantiate(None);
        assert_eq!(built.name(), "tagging");

        let overrides = BoundArgs::new().arg("override");
        let built = factory.instantiate(Some(&overrides));
        // The override reached the constructor; verify through a throwaway run.
        let class = crate::EntityType::new("factory_test");
        let mut ctx = crate::context::CallContext::new(
            crate::context::CallTarget::Type(class),
            "m",
            Vec::new(),
            Kwargs::new(),
            None,
        );
        let out = crate::middleware::chain::execute(&[built], &mut ctx, None);
        assert_eq!(out.ok(), Some(json!("override")));
    }

    #[test]
    fn bound_args_block_compares_by_identity() {
        let block: Callable = Arc::new(|_| Value::Null);
        let a = BoundArgs::new().block(block.clone());
        let b = BoundArgs::new().block(block);
        let c = BoundArgs::new().block(Arc::new(|_| Value::Null));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
