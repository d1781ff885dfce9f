//! Per-type operation buffering and emission.
//!
//! A [`TypePlan`] owns the identifier-to-state map for one entity type and
//! turns coalesced states into backend calls. Emission is decided from the
//! (initial, current) status pair recorded on each state, never from the
//! order or number of operations that produced it.

use crate::backend::{IndexBackend, ReportFuture};
use crate::binding::TypeBinding;
use crate::error::PlanError;
use crate::loading::LoadingPlan;
use crate::resolve::{DirtySignal, ReindexQueue};
use crate::routing::{current_route, plan_routes};
use crate::state::{EntityState, EntityStatus};
use indexmap::IndexMap;
use plan_types::{
    DocumentReference, DocumentRoute, EntityHandle, EntityId, EntityReference, EntityTypeId,
    PathSet,
};
use std::sync::Arc;
use tracing::debug;

/// Buffered operations for one entity type within a unit of work.
pub(crate) struct TypePlan {
    binding: Arc<TypeBinding>,
    backend: Box<dyn IndexBackend>,
    states: IndexMap<EntityId, EntityState>,
}

impl TypePlan {
    pub(crate) fn new(binding: Arc<TypeBinding>) -> Self {
        let backend = binding.new_backend();
        Self {
            binding,
            backend,
            states: IndexMap::new(),
        }
    }

    pub(crate) fn add(
        &mut self,
        id: EntityId,
        routing_key: Option<String>,
        entity: Option<EntityHandle>,
    ) {
        debug!(type_id = %self.binding.type_id(), id = %id, "buffering add");
        self.state_mut(id).add(entity, routing_key);
    }

    pub(crate) fn add_or_update(
        &mut self,
        id: EntityId,
        routing_key: Option<String>,
        entity: Option<EntityHandle>,
        dirty_paths: Option<&PathSet>,
    ) {
        debug!(type_id = %self.binding.type_id(), id = %id, "buffering add-or-update");
        self.state_mut(id).add_or_update(entity, routing_key, dirty_paths);
    }

    pub(crate) fn delete(
        &mut self,
        id: EntityId,
        routing_key: Option<String>,
        entity: Option<EntityHandle>,
    ) {
        debug!(type_id = %self.binding.type_id(), id = %id, "buffering delete");
        self.state_mut(id).delete(entity, routing_key);
    }

    /// Implicit update driven by reindexing resolution of a related entity.
    pub(crate) fn update_because_of_contained(
        &mut self,
        entity: EntityHandle,
    ) -> Result<(), PlanError> {
        let id = self.binding.mapping().entity_id(&entity)?;
        debug!(type_id = %self.binding.type_id(), id = %id, "buffering contained-entity update");
        self.state_mut(id).update_because_of_contained(entity);
        Ok(())
    }

    /// Register every state that still needs an entity instance.
    pub(crate) fn plan_loading(&mut self, loading: &mut LoadingPlan) -> Result<(), PlanError> {
        let type_id = self.binding.type_id();
        for (id, state) in self.states.iter_mut() {
            if !state.needs_loading() {
                continue;
            }
            let loader = self
                .binding
                .loader()
                .ok_or(PlanError::MissingLoader { type_id })?;
            state.loading_ordinal = Some(loading.plan(type_id, loader, id.clone()));
        }
        Ok(())
    }

    /// Run reindexing resolution over every state flagged by an explicit
    /// add or add-or-update. Marks reported by resolvers land in `queue`;
    /// the root plan applies them between type passes.
    pub(crate) fn resolve_dirty(
        &mut self,
        loading: &LoadingPlan,
        queue: &mut ReindexQueue,
    ) -> Result<(), PlanError> {
        let type_id = self.binding.type_id();
        for (id, state) in self.states.iter_mut() {
            if !state.should_resolve {
                continue;
            }
            // Consumed before the resolver runs: feeding this identity back
            // into the plan must not resolve it a second time.
            state.should_resolve = false;
            let Some(entity) = state.entity_or_load(loading, type_id) else {
                debug!(type_id = %type_id, id = %id, "entity not loadable, skipping reindex resolution");
                continue;
            };
            let dirtiness = match (&state.dirty_paths, state.all_dirty) {
                (Some(paths), false) => DirtySignal::Paths(paths),
                _ => DirtySignal::All,
            };
            self.binding
                .resolver()
                .resolve(id, &entity, dirtiness, queue)
                .map_err(|source| PlanError::Resolve { type_id, source })?;
        }
        Ok(())
    }

    /// Drain every buffered state into backend calls, then let the backend
    /// process the staged batch. States are consumed exactly once.
    pub(crate) fn send_to_backend(&mut self, loading: &LoadingPlan) {
        for (id, state) in self.states.drain(..) {
            send_state(&self.binding, self.backend.as_mut(), loading, id, state);
        }
        self.backend.process();
    }

    /// Hand the staged backend work off for execution.
    pub(crate) fn execute_and_report(mut self) -> ReportFuture {
        self.backend.execute_and_report()
    }

    /// Drop buffered states and any staged backend work.
    pub(crate) fn discard(mut self) {
        self.backend.discard();
    }

    /// Drop buffered states, keeping staged backend work.
    pub(crate) fn discard_not_processed(&mut self) {
        self.states.clear();
    }

    fn state_mut(&mut self, id: EntityId) -> &mut EntityState {
        self.states.entry(id).or_default()
    }
}

/// Emit the net backend operation for one identity.
fn send_state(
    binding: &TypeBinding,
    backend: &mut dyn IndexBackend,
    loading: &LoadingPlan,
    id: EntityId,
    mut state: EntityState,
) {
    let type_id = binding.type_id();
    match (state.initial_status, state.current_status) {
        (_, EntityStatus::Unknown) => {
            // No operation ever touched this identity.
        }
        (EntityStatus::Absent, EntityStatus::Present) => {
            emit_add(binding, backend, loading, type_id, &id, &mut state);
        }
        (EntityStatus::Present | EntityStatus::Unknown, EntityStatus::Present) => {
            let affects_document = state.all_dirty
                || state.updated_because_of_contained
                || state
                    .dirty_paths
                    .as_ref()
                    .is_some_and(|paths| binding.mapping().affects_own_document(paths));
            if affects_document {
                emit_add_or_update(binding, backend, loading, type_id, &id, &mut state);
            } else {
                debug!(type_id = %type_id, id = %id, "no dirty path affects the document, skipping");
            }
        }
        (EntityStatus::Absent, EntityStatus::Absent) => {
            // Added and deleted within the same unit of work.
        }
        (EntityStatus::Present | EntityStatus::Unknown, EntityStatus::Absent) => {
            emit_delete(binding, backend, loading, type_id, &id, &mut state);
        }
    }
}

fn emit_add(
    binding: &TypeBinding,
    backend: &mut dyn IndexBackend,
    loading: &LoadingPlan,
    type_id: EntityTypeId,
    id: &EntityId,
    state: &mut EntityState,
) {
    let Some(entity) = state.entity_or_load(loading, type_id) else {
        debug!(type_id = %type_id, id = %id, "entity vanished before indexing, skipping add");
        return;
    };
    // Adds expect the document to be absent; previous routes do not apply.
    let route = current_route(
        binding.routes(),
        state.provided_routing_key.as_deref(),
        id,
        &entity,
    );
    let Some(route) = route else {
        debug!(type_id = %type_id, id = %id, "route provider keeps entity out of the index");
        return;
    };
    backend.add(document_reference(binding, type_id, id, route), entity);
}

fn emit_add_or_update(
    binding: &TypeBinding,
    backend: &mut dyn IndexBackend,
    loading: &LoadingPlan,
    type_id: EntityTypeId,
    id: &EntityId,
    state: &mut EntityState,
) {
    let Some(entity) = state.entity_or_load(loading, type_id) else {
        debug!(type_id = %type_id, id = %id, "entity vanished before indexing, skipping update");
        return;
    };
    let decision = plan_routes(
        binding.routes(),
        state.provided_routing_key.as_deref(),
        id,
        &entity,
    );
    delete_previous_routes(binding, backend, type_id, id, decision.previous);
    let Some(route) = decision.current else {
        debug!(type_id = %type_id, id = %id, "route provider keeps entity out of the index");
        return;
    };
    backend.add_or_update(document_reference(binding, type_id, id, route), entity);
}

fn emit_delete(
    binding: &TypeBinding,
    backend: &mut dyn IndexBackend,
    loading: &LoadingPlan,
    type_id: EntityTypeId,
    id: &EntityId,
    state: &mut EntityState,
) {
    let Some(entity) = state.entity_or_load(loading, type_id) else {
        // Identifier-only purge: no instance to route by, so only the
        // caller-provided routing key applies.
        let route = match state.provided_routing_key.take() {
            Some(key) => DocumentRoute::new(key),
            None => DocumentRoute::unrouted(),
        };
        debug!(type_id = %type_id, id = %id, "purging document by identifier");
        backend.delete(document_reference(binding, type_id, id, route));
        return;
    };
    let decision = plan_routes(
        binding.routes(),
        state.provided_routing_key.as_deref(),
        id,
        &entity,
    );
    delete_previous_routes(binding, backend, type_id, id, decision.previous);
    let Some(route) = decision.current else {
        return;
    };
    backend.delete(document_reference(binding, type_id, id, route));
}

fn delete_previous_routes(
    binding: &TypeBinding,
    backend: &mut dyn IndexBackend,
    type_id: EntityTypeId,
    id: &EntityId,
    previous: Vec<DocumentRoute>,
) {
    for route in previous {
        debug!(type_id = %type_id, id = %id, routing_key = ?route.routing_key, "purging previous route");
        backend.delete(document_reference(binding, type_id, id, route));
    }
}

fn document_reference(
    binding: &TypeBinding,
    type_id: EntityTypeId,
    id: &EntityId,
    route: DocumentRoute,
) -> DocumentReference {
    DocumentReference::new(
        binding.mapping().document_id(id),
        route.routing_key,
        EntityReference::new(type_id, id.clone()),
    )
}
