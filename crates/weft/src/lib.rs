//! Weft: method interception and capability composition
//!
//! An entity type acquires behavior from two independent mechanisms:
//!
//! - **Concerns**: reusable capability units mixed into the type's
//!   definition, applied in registration order, de-duplicated by identity.
//! - **Middleware**: per-method interceptor chains that wrap operations
//!   with pre/post logic, argument and result transformation, and
//!   short-circuiting, resolved per method name and per call scope
//!   (instance vs type).
//!
//! Configuration is deferred: concerns and stacks are registered against an
//! uncommitted type, and become immutable and active once the type
//! *commits*, either explicitly or automatically on its first call.
//! Wrapper synthesis is thread safe and happens at most once per
//! (method, scope), even when multiple threads race first use.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use weft::{Chain, EntityType, Middleware, MiddlewareFactory, Result, Scope, Value};
//!
//! #[derive(Default)]
//! struct Doubler;
//!
//! impl Middleware for Doubler {
//!     fn call(&self, chain: &mut Chain<'_>) -> Result<Value> {
//!         let value = chain.forward()?;
//!         Ok(json!(value.as_i64().unwrap_or_default() * 2))
//!     }
//!
//!     fn name(&self) -> &str {
//!         "doubler"
//!     }
//! }
//!
//! let class = EntityType::new("calculator");
//! class.define_method(Scope::Type, "add_one", |ctx| {
//!     let n = ctx.arg(0).and_then(Value::as_i64).unwrap_or_default();
//!     Ok(json!(n + 1))
//! })?;
//! class.register_middleware(Scope::Type, "add_one", MiddlewareFactory::of::<Doubler>())?;
//!
//! // First use commits the type and activates interception.
//! assert_eq!(class.call("add_one", vec![json!(20)])?, json!(42));
//! assert!(class.is_committed());
//! # Ok::<(), weft::WeftError>(())
//! ```

#![forbid(unsafe_code)]

pub mod concerns;
pub mod context;
pub mod entity;
pub mod errors;
pub mod middleware;

pub use concerns::Concern;
pub use context::{CallContext, CallTarget, Callable, Kwargs};
pub use entity::{CommitTrigger, Entity, EntityType, Scope};
pub use errors::{BoxError, Result, WeftError};
pub use middleware::{
    Anchor, BoundArgs, Chain, Middleware, MiddlewareFactory, MiddlewareStack, ObservationLog,
    ObservedCall,
};

/// Dynamic value used for call arguments and results.
pub use serde_json::Value;
