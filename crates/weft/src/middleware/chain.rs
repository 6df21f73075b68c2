//! Single-call execution cursor over a middleware stack
//!
//! A [`Chain`] is ephemeral: one is built per link per call, holding the
//! remaining links and the shared call environment. The innermost step is
//! the original (unwrapped) implementation of the method; a chain that
//! bottoms out without one fails with the unresolved-method error.

use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::context::{CallContext, CallTarget, Callable, Kwargs};
use crate::entity::methods::MethodFn;
use crate::errors::{Result, WeftError};
use crate::middleware::Middleware;

/// Live execution cursor handed to a middleware's `call`.
pub struct Chain<'a> {
    links: &'a [Arc<dyn Middleware>],
    ctx: &'a mut CallContext,
    terminal: Option<&'a MethodFn>,
}

impl<'a> Chain<'a> {
    /// The entity this call targets.
    pub fn target(&self) -> &CallTarget {
        self.ctx.target()
    }

    /// Name of the method being executed.
    pub fn method(&self) -> &str {
        self.ctx.method()
    }

    /// Current positional arguments.
    pub fn args(&self) -> &[Value] {
        self.ctx.args()
    }

    /// Current keyword arguments.
    pub fn kwargs(&self) -> &Kwargs {
        self.ctx.kwargs()
    }

    /// Current trailing callable, if any.
    pub fn block(&self) -> Option<&Callable> {
        self.ctx.block()
    }

    /// Number of forwarding calls the whole chain has performed so far.
    ///
    /// Instrumentation helper; the observation hook compares this before and
    /// after a link runs to tell whether the link advanced.
    pub fn advance_count(&self) -> u64 {
        self.ctx.advance_count()
    }

    /// Invoke the remainder of the stack with replacement arguments.
    ///
    /// Target entity and method name are kept; args, kwargs, and the
    /// trailing callable are rebound for every later link and the original
    /// implementation. Returns whatever the remainder returns. Single-pass:
    /// calling this a second time from the same link is unsupported.
    pub fn advance(
        &mut self,
        args: Vec<Value>,
        kwargs: Kwargs,
        block: Option<Callable>,
    ) -> Result<Value> {
        self.ctx.rebind(args, kwargs, block);
        execute(self.links, self.ctx, self.terminal)
    }

    /// Invoke the remainder of the stack with the environment unchanged.
    pub fn forward(&mut self) -> Result<Value> {
        self.ctx.mark_advance();
        execute(self.links, self.ctx, self.terminal)
    }
}

/// Run `links` over `ctx`, bottoming out in the original implementation.
pub(crate) fn execute(
    links: &[Arc<dyn Middleware>],
    ctx: &mut CallContext,
    terminal: Option<&MethodFn>,
) -> Result<Value> {
    match links.split_first() {
        Some((head, rest)) => {
            trace!(
                middleware = head.name(),
                method = ctx.method(),
                remaining = rest.len(),
                "entering middleware"
            );
            head.call(&mut Chain {
                links: rest,
                ctx,
                terminal,
            })
        }
        None => match terminal {
            Some(original) => original(ctx),
            None => Err(WeftError::unresolved(
                ctx.target().type_name(),
                ctx.target().scope(),
                ctx.method(),
            )),
        },
    }
}
