//! Deferred, batched entity loading.
//!
//! Operations may reference entities by identifier only. Instead of loading
//! each one as it is needed, type plans register pending identifiers here
//! and receive an ordinal ticket; one batch load per type runs when the
//! plan is processed, and entities are then retrieved by ticket.

use crate::error::PlanError;
use indexmap::IndexMap;
use plan_types::{EntityHandle, EntityId, EntityTypeId};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Batch loader for entities referenced only by identifier.
pub trait EntityLoader: Send + Sync {
    /// Load the given identifiers in one round trip.
    ///
    /// The result must hold exactly one slot per identifier, in the same
    /// order, with `None` for entities that no longer exist. The optional
    /// deadline bounds how long the call may block; with no deadline it may
    /// block indefinitely.
    fn load_blocking(
        &self,
        ids: &[EntityId],
        deadline: Option<Instant>,
    ) -> anyhow::Result<Vec<Option<EntityHandle>>>;
}

/// Pending and completed loads for one entity type.
struct TypeLoading {
    loader: Arc<dyn EntityLoader>,
    ids: Vec<EntityId>,
    loaded: Vec<Option<EntityHandle>>,
}

/// Collects identifiers to load across all types of a plan.
pub(crate) struct LoadingPlan {
    types: IndexMap<EntityTypeId, TypeLoading>,
}

impl LoadingPlan {
    pub(crate) fn new() -> Self {
        Self {
            types: IndexMap::new(),
        }
    }

    /// Register one identifier for loading; the returned ordinal retrieves
    /// the entity after [`LoadingPlan::load_blocking`] ran.
    pub(crate) fn plan(
        &mut self,
        type_id: EntityTypeId,
        loader: &Arc<dyn EntityLoader>,
        id: EntityId,
    ) -> usize {
        let pending = self.types.entry(type_id).or_insert_with(|| TypeLoading {
            loader: Arc::clone(loader),
            ids: Vec::new(),
            loaded: Vec::new(),
        });
        pending.ids.push(id);
        pending.ids.len() - 1
    }

    /// Execute one batch load per type with pending identifiers.
    pub(crate) fn load_blocking(&mut self, deadline: Option<Instant>) -> Result<(), PlanError> {
        for (type_id, pending) in self.types.iter_mut() {
            if pending.ids.is_empty() || pending.loaded.len() == pending.ids.len() {
                continue;
            }
            debug!(type_id = %type_id, count = pending.ids.len(), "loading entities");
            let loaded = pending
                .loader
                .load_blocking(&pending.ids, deadline)
                .map_err(|source| PlanError::Load {
                    type_id: *type_id,
                    source,
                })?;
            if loaded.len() != pending.ids.len() {
                return Err(PlanError::LoaderMismatch {
                    type_id: *type_id,
                    expected: pending.ids.len(),
                    actual: loaded.len(),
                });
            }
            pending.loaded = loaded;
        }
        Ok(())
    }

    /// The entity loaded for the given ticket, if the load found one.
    pub(crate) fn retrieve(&self, type_id: EntityTypeId, ordinal: usize) -> Option<EntityHandle> {
        self.types
            .get(&type_id)
            .and_then(|pending| pending.loaded.get(ordinal))
            .and_then(|slot| slot.clone())
    }

    /// Drop every pending and loaded entry.
    pub(crate) fn clear(&mut self) {
        self.types.clear();
    }
}
