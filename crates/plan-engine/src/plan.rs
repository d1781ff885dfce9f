//! The indexing plan: one unit of work's buffered operations.
//!
//! An [`IndexingPlan`] aggregates per-type plans, created on demand from
//! the registered bindings. Operations coalesce per identity until
//! [`IndexingPlan::process`] turns them into staged backend work, and
//! [`IndexingPlan::execute_and_report`] flushes that work and merges the
//! per-type outcomes into one report.

use crate::backend::ExecutionReport;
use crate::binding::TypeBindings;
use crate::error::PlanError;
use crate::loading::LoadingPlan;
use crate::resolve::ReindexQueue;
use crate::type_plan::TypePlan;
use indexmap::IndexMap;
use plan_types::{EntityHandle, EntityId, EntityTypeId, PathSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Buffers, coalesces, and flushes indexing operations for one unit of work.
///
/// Not safe for concurrent mutation: a plan belongs to exactly one logical
/// thread of control, mirroring the session or transaction it serves.
pub struct IndexingPlan {
    bindings: Arc<TypeBindings>,
    types: IndexMap<EntityTypeId, TypePlan>,
    loading: LoadingPlan,
    deadline: Option<Instant>,
}

impl IndexingPlan {
    pub fn new(bindings: Arc<TypeBindings>) -> Self {
        Self {
            bindings,
            types: IndexMap::new(),
            loading: LoadingPlan::new(),
            deadline: None,
        }
    }

    /// Bound how long batched entity loads may block during processing.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Buffer an add for an entity expected to be absent from the index.
    ///
    /// Either `id` or `entity` must be given; with both, `id` wins and the
    /// instance is used for routing and document building.
    pub fn add(
        &mut self,
        type_id: EntityTypeId,
        id: Option<EntityId>,
        routing_key: Option<String>,
        entity: Option<EntityHandle>,
    ) -> Result<(), PlanError> {
        let (plan, id) = self.type_plan_and_id(type_id, id, entity.as_ref())?;
        plan.add(id, routing_key, entity);
        Ok(())
    }

    /// Buffer an add-or-update.
    ///
    /// `dirty_paths` of `None` means no field-level information, which is
    /// treated conservatively as everything-dirty; an explicitly empty set
    /// means the change is known not to touch any indexed field.
    pub fn add_or_update(
        &mut self,
        type_id: EntityTypeId,
        id: Option<EntityId>,
        routing_key: Option<String>,
        entity: Option<EntityHandle>,
        dirty_paths: Option<&PathSet>,
    ) -> Result<(), PlanError> {
        let (plan, id) = self.type_plan_and_id(type_id, id, entity.as_ref())?;
        plan.add_or_update(id, routing_key, entity, dirty_paths);
        Ok(())
    }

    /// Buffer a delete. With no entity instance available anywhere, the
    /// eventual delete degrades to a purge by identifier and provided
    /// routing key.
    pub fn delete(
        &mut self,
        type_id: EntityTypeId,
        id: Option<EntityId>,
        routing_key: Option<String>,
        entity: Option<EntityHandle>,
    ) -> Result<(), PlanError> {
        let (plan, id) = self.type_plan_and_id(type_id, id, entity.as_ref())?;
        plan.delete(id, routing_key, entity);
        Ok(())
    }

    /// Load missing entities, resolve reindexing dependencies, and stage
    /// every buffered operation on its type's backend.
    ///
    /// Buffered states are consumed: calling this twice in a row stages
    /// nothing new the second time.
    pub fn process(&mut self) -> Result<(), PlanError> {
        for plan in self.types.values_mut() {
            plan.plan_loading(&mut self.loading)?;
        }
        self.loading.load_blocking(self.deadline)?;
        self.resolve_all()?;
        for plan in self.types.values_mut() {
            plan.send_to_backend(&self.loading);
        }
        self.loading.clear();
        debug!(types = self.types.len(), "processed indexing plan");
        Ok(())
    }

    /// Process remaining operations, then execute every backend's staged
    /// work, merging per-type outcomes into one report.
    ///
    /// The plan is empty afterwards and can buffer a new round of
    /// operations; backends are created anew when a type is next touched.
    pub async fn execute_and_report(&mut self) -> Result<ExecutionReport, PlanError> {
        self.process()?;
        let mut futures = Vec::with_capacity(self.types.len());
        for (_, plan) in self.types.drain(..) {
            futures.push(plan.execute_and_report());
        }
        info!(backends = futures.len(), "executing indexing plan");
        Ok(ExecutionReport::all_of(futures).await)
    }

    /// Drop every buffered operation and any staged backend work.
    pub fn discard(&mut self) {
        for (_, plan) in self.types.drain(..) {
            plan.discard();
        }
        self.loading.clear();
    }

    /// Drop buffered operations that were not processed yet, keeping
    /// backend work staged by earlier [`IndexingPlan::process`] calls.
    pub fn discard_not_processed(&mut self) {
        for plan in self.types.values_mut() {
            plan.discard_not_processed();
        }
        self.loading.clear();
    }

    /// Resolve dirty states type by type. Resolvers report related
    /// entities into a queue, which is applied to the target type plans
    /// between passes; types discovered this way are appended to the table
    /// and get their own pass, so nothing reported mid-resolution is lost.
    fn resolve_all(&mut self) -> Result<(), PlanError> {
        let mut queue = ReindexQueue::new();
        let mut index = 0;
        while let Some((_, plan)) = self.types.get_index_mut(index) {
            plan.resolve_dirty(&self.loading, &mut queue)?;
            index += 1;
            self.apply_reindex_marks(&mut queue)?;
        }
        Ok(())
    }

    fn apply_reindex_marks(&mut self, queue: &mut ReindexQueue) -> Result<(), PlanError> {
        for (type_id, entity) in queue.take() {
            debug!(type_id = %type_id, "applying reindex mark from resolver");
            let plan = self.type_plan(type_id)?;
            plan.update_because_of_contained(entity)?;
        }
        Ok(())
    }

    fn type_plan(&mut self, type_id: EntityTypeId) -> Result<&mut TypePlan, PlanError> {
        let binding = self
            .bindings
            .get(type_id)
            .ok_or(PlanError::UnregisteredType { type_id })?;
        Ok(self
            .types
            .entry(type_id)
            .or_insert_with(|| TypePlan::new(Arc::clone(binding))))
    }

    fn type_plan_and_id(
        &mut self,
        type_id: EntityTypeId,
        provided: Option<EntityId>,
        entity: Option<&EntityHandle>,
    ) -> Result<(&mut TypePlan, EntityId), PlanError> {
        let binding = self
            .bindings
            .get(type_id)
            .ok_or(PlanError::UnregisteredType { type_id })?;
        let id = binding.identifier(provided, entity)?;
        let plan = self
            .types
            .entry(type_id)
            .or_insert_with(|| TypePlan::new(Arc::clone(binding)));
        Ok((plan, id))
    }
}
