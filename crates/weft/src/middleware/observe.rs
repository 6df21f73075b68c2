//! Debug-only stack observation
//!
//! [`MiddlewareStack::observe`](crate::middleware::MiddlewareStack::observe)
//! swaps a registered entry for an instrumented variant built here. The
//! wrapper forwards every call to the original middleware and records what
//! happened into a shared [`ObservationLog`]. Test instrumentation only.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::errors::Result;
use crate::middleware::{Chain, Middleware};

/// One recorded invocation of an observed middleware.
#[derive(Clone, Debug)]
pub struct ObservedCall {
    /// Method the chain was executing
    pub method: String,
    /// Whether the middleware forwarded to the remainder of the stack
    pub advanced: bool,
    /// Whether the middleware returned Ok
    pub succeeded: bool,
}

/// Shared record of invocations of one observed stack entry.
#[derive(Clone, Default)]
pub struct ObservationLog {
    calls: Arc<Mutex<Vec<ObservedCall>>>,
}

impl ObservationLog {
    /// Empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded invocations
    pub fn invocations(&self) -> usize {
        self.calls.lock().len()
    }

    /// Snapshot of all recorded invocations, in order
    pub fn calls(&self) -> Vec<ObservedCall> {
        self.calls.lock().clone()
    }

    /// Whether the `index`-th invocation forwarded down the chain
    pub fn advanced_on(&self, index: usize) -> Option<bool> {
        self.calls.lock().get(index).map(|call| call.advanced)
    }

    fn record(&self, call: ObservedCall) {
        self.calls.lock().push(call);
    }
}

/// Instrumented middleware that forwards to the original while recording.
pub(crate) struct Observed {
    inner: Arc<dyn Middleware>,
    log: ObservationLog,
}

impl Observed {
    pub(crate) fn new(inner: Arc<dyn Middleware>, log: ObservationLog) -> Self {
        Self { inner, log }
    }
}

impl Middleware for Observed {
    fn call(&self, chain: &mut Chain<'_>) -> Result<Value> {
        let advances_before = chain.advance_count();
        let method = chain.method().to_string();

        let outcome = self.inner.call(chain);

        // Any growth in the chain-wide counter means this link forwarded:
        // downstream links cannot run unless this one advanced first.
        self.log.record(ObservedCall {
            method,
            advanced: chain.advance_count() > advances_before,
            succeeded: outcome.is_ok(),
        });
        outcome
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
