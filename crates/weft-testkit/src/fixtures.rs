//! Prebuilt entity types

use serde_json::json;
use weft::{EntityType, Scope, Value};

/// Uncommitted entity type with a `compute(n) -> n * 2` method in both
/// scopes, ready for middleware registration.
pub fn arithmetic_type(name: &str) -> EntityType {
    let class = EntityType::new(name);
    for scope in [Scope::Instance, Scope::Type] {
        class
            .define_method(scope, "compute", |ctx| {
                let n = ctx.arg(0).and_then(Value::as_i64).unwrap_or_default();
                Ok(json!(n * 2))
            })
            .expect("type is uncommitted");
    }
    class
}
