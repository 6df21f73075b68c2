//! Middleware runtime: interception units, deferred creators, ordered
//! stacks, and the single-call execution chain.
//!
//! A middleware author implements exactly one operation, [`Middleware::call`],
//! which receives the live [`Chain`] and decides whether to forward, to
//! transform arguments or results, or to short-circuit by returning without
//! advancing.

pub mod chain;
pub mod factory;
pub mod observe;
pub mod stack;

pub use chain::Chain;
pub use factory::{BoundArgs, MiddlewareFactory};
pub use observe::{ObservationLog, ObservedCall};
pub use stack::{Anchor, MiddlewareStack};

use serde_json::Value;

use crate::errors::Result;

/// A unit of interception bound to one stack position.
///
/// `call` may invoke [`Chain::advance`] (or [`Chain::forward`]) zero or one
/// times. Zero invocations short-circuit the rest of the stack and the
/// original implementation; the middleware's return value is what the caller
/// observes. The chain is single-pass: a second advance from the same link
/// is unsupported.
pub trait Middleware: Send + Sync + 'static {
    /// Continue processing the current call.
    fn call(&self, chain: &mut Chain<'_>) -> Result<Value>;

    /// Middleware name for diagnostics and trace events.
    fn name(&self) -> &str;
}
