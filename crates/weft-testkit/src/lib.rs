//! Shared test fixtures for the weft interception engine
//!
//! Provides the common middlewares and fixtures the engine's tests need:
//! an event log for asserting chain ordering, recording/short-circuit/
//! caching middlewares, and a prebuilt arithmetic entity type.
//!
//! Add this to your crate's `Cargo.toml` dev-dependencies:
//! ```toml
//! [dev-dependencies]
//! weft-testkit = { path = "../weft-testkit" }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod fixtures;
pub mod log;
pub mod middlewares;

pub use fixtures::*;
pub use log::EventLog;
pub use middlewares::*;

/// Install a fmt subscriber honoring `RUST_LOG`, once per process.
///
/// Safe to call from every test; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
