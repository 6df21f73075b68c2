//! Capability units and their ordered, de-duplicated registry
//!
//! A concern contributes behavior to an entity type: method definitions,
//! middleware registrations, or both. Registration is staged (append-only,
//! de-duplicated by concrete type); materialization is the explicit step
//! that applies every registered unit in registration order.

use std::any::TypeId;
use std::sync::Arc;

use tracing::debug;

use crate::entity::EntityType;
use crate::errors::Result;

/// A reusable capability unit mixed into an entity type.
///
/// `materialize` runs once per entity type, during commit, and uses the
/// normal configuration API (`define_method`, `register_middleware`,
/// `configure_stack`) to contribute behavior. Failures propagate verbatim
/// and abort materialization of the remaining units; units already applied
/// are not rolled back.
pub trait Concern: Send + Sync + 'static {
    /// Concern name for diagnostics
    fn name(&self) -> &str;

    /// Apply this unit's behavior to the entity type.
    fn materialize(&self, class: &EntityType) -> Result<()>;
}

struct ConcernEntry {
    id: TypeId,
    concern: Arc<dyn Concern>,
    applied: bool,
}

/// Ordered list of capability units attached to one entity type.
///
/// De-duplicates by the concern's concrete type: re-registering is a no-op
/// that preserves the original position.
#[derive(Default)]
pub(crate) struct ConcernRegistry {
    entries: Vec<ConcernEntry>,
}

impl ConcernRegistry {
    /// Append a unit unless one of the same concrete type is registered.
    /// Returns whether the unit was actually added.
    pub(crate) fn register(&mut self, id: TypeId, concern: Arc<dyn Concern>) -> bool {
        if self.entries.iter().any(|entry| entry.id == id) {
            debug!(concern = concern.name(), "duplicate concern ignored");
            return false;
        }
        self.entries.push(ConcernEntry {
            id,
            concern,
            applied: false,
        });
        true
    }

    /// First registered unit not yet applied, with its position.
    pub(crate) fn next_unapplied(&self) -> Option<(usize, Arc<dyn Concern>)> {
        self.entries
            .iter()
            .position(|entry| !entry.applied)
            .map(|index| (index, self.entries[index].concern.clone()))
    }

    /// Mark the unit at `index` as applied. Positions are stable because the
    /// registry is append-only.
    pub(crate) fn mark_applied(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.applied = true;
        }
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.concern.name().to_string())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
