//! Unified error type for the interception engine
//!
//! Configuration mistakes (mutating a committed type, unresolvable stack
//! anchors) and runtime failures (missing operations, exhausted fallback
//! commits) share one enum. Domain errors raised by concerns or middleware
//! are carried verbatim through the transparent variant, never wrapped.

use crate::entity::Scope;

/// Boxed error used for verbatim passthrough of concern/middleware failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for all engine operations
#[derive(Debug, thiserror::Error)]
pub enum WeftError {
    /// Structural mutation attempted after the entity type was committed
    #[error("`{entity}` is already committed; {attempted} is no longer allowed")]
    AlreadyCommitted {
        /// Entity type whose configuration is frozen
        entity: String,
        /// The rejected operation, for diagnostics
        attempted: &'static str,
    },

    /// A stack edit named an anchor that matches no entry
    #[error("no stack entry matches {anchor}")]
    AnchorNotFound {
        /// Human-readable description of the anchor
        anchor: String,
    },

    /// No implementation and no middleware stack exist for the requested method
    #[error("`{entity}` has no implementation or middleware stack for {scope} method `{method}`")]
    UnresolvedMethod {
        /// Entity type the call targeted
        entity: String,
        /// Call scope the resolution ran under
        scope: Scope,
        /// Requested method name
        method: String,
    },

    /// Fallback dispatch committed repeatedly without producing the method
    #[error("committing `{entity}` did not produce {scope} method `{method}` after {attempts} attempts")]
    CommitRetriesExhausted {
        /// Entity type that was committed
        entity: String,
        /// Call scope of the unresolvable method
        scope: Scope,
        /// Method that never appeared
        method: String,
        /// Number of fallback attempts consumed over the type's lifetime
        attempts: u32,
    },

    /// Failure reported by a middleware or original implementation
    #[error("{message}")]
    Execution {
        /// Description of the failure
        message: String,
    },

    /// Domain error from a concern or middleware, propagated verbatim
    #[error(transparent)]
    Other(#[from] BoxError),
}

impl WeftError {
    /// Create an already-committed configuration error
    pub fn already_committed(entity: impl Into<String>, attempted: &'static str) -> Self {
        Self::AlreadyCommitted {
            entity: entity.into(),
            attempted,
        }
    }

    /// Create an anchor-not-found configuration error
    pub fn anchor_not_found(anchor: impl Into<String>) -> Self {
        Self::AnchorNotFound {
            anchor: anchor.into(),
        }
    }

    /// Create an unresolved-method error
    pub fn unresolved(entity: impl Into<String>, scope: Scope, method: impl Into<String>) -> Self {
        Self::UnresolvedMethod {
            entity: entity.into(),
            scope,
            method: method.into(),
        }
    }

    /// Create a retry-exhaustion error for fallback dispatch
    pub fn retries_exhausted(
        entity: impl Into<String>,
        scope: Scope,
        method: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self::CommitRetriesExhausted {
            entity: entity.into(),
            scope,
            method: method.into(),
            attempts,
        }
    }

    /// Create an execution error from a message
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Wrap an arbitrary domain error for verbatim propagation
    pub fn other(source: impl Into<BoxError>) -> Self {
        Self::Other(source.into())
    }

    /// Whether this is a configuration error, surfaced synchronously and never retried
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::AlreadyCommitted { .. } | Self::AnchorNotFound { .. }
        )
    }
}

/// Standard Result type for engine operations
pub type Result<T> = std::result::Result<T, WeftError>;
