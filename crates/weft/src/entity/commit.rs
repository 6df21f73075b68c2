//! Commit lifecycle: the one-way transition from configuring to committed
//!
//! Committing materializes every registered concern in registration order,
//! synthesizes the wrapper pair for every (method, scope) with a stack or
//! an implementation, then marks the type committed. The transition is
//! idempotent and double-checked under the per-type commit lock, so a
//! thread racing an in-flight commit blocks until it finishes instead of
//! partially materializing.

use std::sync::atomic::Ordering;

use serde::Serialize;
use tracing::debug;

use crate::entity::{EntityType, Scope};
use crate::errors::Result;

/// Ceiling on fallback-dispatch commit attempts over a type's lifetime.
///
/// A capability unit that never defines the requested operation would
/// otherwise re-enter the fallback hook indefinitely.
pub(crate) const FALLBACK_ATTEMPT_LIMIT: u32 = 10;

/// Why a commit ran. Recorded for diagnostics; does not affect behavior
/// beyond bounding fallback retries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitTrigger {
    /// Explicit `commit()` call
    Explicit,
    /// First unresolved instance-scope call
    InstanceFallback,
    /// First unresolved type-scope call
    TypeFallback,
    /// Caller-forced commit with a recorded reason of its own
    Forced,
}

impl EntityType {
    /// Commit this entity type. Idempotent: committing a committed type is
    /// a no-op, with no re-materialization and no re-synthesis.
    pub fn commit(&self) -> Result<()> {
        self.commit_with(CommitTrigger::Explicit)
    }

    /// Commit, recording `trigger` as the reason.
    pub fn commit_with(&self, trigger: CommitTrigger) -> Result<()> {
        if self.is_committed() {
            return Ok(());
        }

        let state = self.state();
        let _guard = state.commit_lock.lock();
        if self.is_committed() {
            return Ok(());
        }

        debug!(entity = self.name(), ?trigger, "committing entity type");

        self.materialize_concerns()?;
        self.synthesize_wrappers();

        *state.trigger.write() = Some(trigger);
        state.committed.store(true, Ordering::Release);

        debug!(
            entity = self.name(),
            concerns = state.concerns.lock().len(),
            "entity type committed"
        );
        Ok(())
    }

    /// Apply every registered concern not yet applied, in registration
    /// order.
    ///
    /// A unit is marked applied only after it succeeds: the first failure
    /// propagates verbatim and aborts the rest, leaving earlier units
    /// applied (no rollback) and the failed one eligible for the next
    /// attempt. Units registered *during* materialization land at the end
    /// of the registry and are applied in the same pass.
    fn materialize_concerns(&self) -> Result<()> {
        let state = self.state();
        loop {
            let next = state.concerns.lock().next_unapplied();
            let Some((index, concern)) = next else {
                return Ok(());
            };

            debug!(
                entity = self.name(),
                concern = concern.name(),
                "materializing concern"
            );
            concern.materialize(self)?;
            state.concerns.lock().mark_applied(index);
        }
    }

    /// Synthesize the wrapper pair for every registered (method, scope).
    fn synthesize_wrappers(&self) {
        for scope in [Scope::Instance, Scope::Type] {
            let table = self.table(scope);
            for name in table.method_names() {
                table.ensure_wrapper(self.name(), &name);
            }
        }
    }
}
