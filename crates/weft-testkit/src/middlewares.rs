//! Reusable test middlewares
//!
//! Middleware instances are constructed per call by their factories, so
//! anything that must survive across calls (the event log, the cache) is
//! shared through the factory closure.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;
use weft::{BoundArgs, Chain, Middleware, MiddlewareFactory, Result};

use crate::log::EventLog;

/// Records `<label>:before` / `<label>:after` around forwarding.
pub struct RecordingMiddleware {
    label: String,
    log: EventLog,
}

impl Middleware for RecordingMiddleware {
    fn call(&self, chain: &mut Chain<'_>) -> Result<Value> {
        self.log.record(format!("{}:before", self.label));
        let outcome = chain.forward();
        self.log.record(format!("{}:after", self.label));
        outcome
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Factory for a [`RecordingMiddleware`] writing into `log`.
pub fn recording(label: impl Into<String>, log: EventLog) -> MiddlewareFactory {
    let label = label.into();
    MiddlewareFactory::with(BoundArgs::new(), move |_bound| RecordingMiddleware {
        label: label.clone(),
        log: log.clone(),
    })
}

/// Never forwards; the caller observes `value` directly.
pub struct ShortCircuitMiddleware {
    value: Value,
}

impl Middleware for ShortCircuitMiddleware {
    fn call(&self, _chain: &mut Chain<'_>) -> Result<Value> {
        Ok(self.value.clone())
    }

    fn name(&self) -> &str {
        "short_circuit"
    }
}

/// Factory for a [`ShortCircuitMiddleware`] returning `value`.
pub fn short_circuit(value: Value) -> MiddlewareFactory {
    MiddlewareFactory::with(BoundArgs::new(), move |_bound| ShortCircuitMiddleware {
        value: value.clone(),
    })
}

/// Shared cache keyed by the serialized positional arguments.
pub type SharedCache = Arc<Mutex<HashMap<String, Value>>>;

/// Returns the cached result for the current arguments when present;
/// forwards and stores the result otherwise.
pub struct CachingMiddleware {
    cache: SharedCache,
}

impl Middleware for CachingMiddleware {
    fn call(&self, chain: &mut Chain<'_>) -> Result<Value> {
        let key = Value::Array(chain.args().to_vec()).to_string();
        if let Some(hit) = self.cache.lock().get(&key).cloned() {
            return Ok(hit);
        }
        let outcome = chain.forward()?;
        self.cache.lock().insert(key, outcome.clone());
        Ok(outcome)
    }

    fn name(&self) -> &str {
        "caching"
    }
}

/// Factory for a [`CachingMiddleware`] with its own fresh cache.
pub fn caching() -> MiddlewareFactory {
    caching_with(SharedCache::default())
}

/// Factory for a [`CachingMiddleware`] backed by `cache`.
pub fn caching_with(cache: SharedCache) -> MiddlewareFactory {
    MiddlewareFactory::with(BoundArgs::new(), move |_bound| CachingMiddleware {
        cache: cache.clone(),
    })
}

/// Emits debug events around forwarding.
#[derive(Default)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn call(&self, chain: &mut Chain<'_>) -> Result<Value> {
        debug!(
            entity = chain.target().type_name(),
            method = chain.method(),
            args = ?chain.args(),
            "call started"
        );
        let outcome = chain.forward();
        debug!(
            entity = chain.target().type_name(),
            method = chain.method(),
            succeeded = outcome.is_ok(),
            "call finished"
        );
        outcome
    }

    fn name(&self) -> &str {
        "logging"
    }
}
