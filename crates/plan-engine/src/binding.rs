//! Per-type capability bindings.
//!
//! A binding bundles everything the engine needs to index one entity type:
//! identifier/document mapping, routing, reindexing resolution, optional
//! batch loading, and a factory for the type's backend adapter. Bindings
//! are assembled at configuration time and registered in [`TypeBindings`].

use crate::backend::IndexBackend;
use crate::error::PlanError;
use crate::loading::EntityLoader;
use crate::resolve::{NoOpReindexResolver, ReindexResolver};
use crate::routing::{DefaultRouteProvider, RouteProvider};
use indexmap::IndexMap;
use plan_types::{EntityHandle, EntityId, EntityTypeId, PathSet};
use std::sync::Arc;
use tracing::warn;

/// Identifier and document mapping for one entity type.
pub trait EntityMapping: Send + Sync {
    /// Extract the identifier from an entity instance.
    fn entity_id(&self, entity: &EntityHandle) -> Result<EntityId, PlanError>;

    /// Derive the backend document id for an identifier.
    ///
    /// Defaults to the identifier's display form.
    fn document_id(&self, id: &EntityId) -> String {
        id.to_string()
    }

    /// Whether a change to the given paths can alter this type's own
    /// document. Defaults to `true` for any non-empty set: every change
    /// triggers reindexing, but an empty set is no change at all.
    fn affects_own_document(&self, dirty_paths: &PathSet) -> bool {
        !dirty_paths.is_empty()
    }
}

type BackendFactory = Box<dyn Fn() -> Box<dyn IndexBackend> + Send + Sync>;

/// Capability set for one registered entity type.
pub struct TypeBinding {
    type_id: EntityTypeId,
    mapping: Box<dyn EntityMapping>,
    routes: Box<dyn RouteProvider>,
    resolver: Box<dyn ReindexResolver>,
    loader: Option<Arc<dyn EntityLoader>>,
    backend_factory: BackendFactory,
}

impl TypeBinding {
    /// Start building a binding from its mandatory pieces.
    pub fn builder<M, F>(type_id: EntityTypeId, mapping: M, backend_factory: F) -> TypeBindingBuilder
    where
        M: EntityMapping + 'static,
        F: Fn() -> Box<dyn IndexBackend> + Send + Sync + 'static,
    {
        TypeBindingBuilder {
            type_id,
            mapping: Box::new(mapping),
            routes: Box::new(DefaultRouteProvider),
            resolver: Box::new(NoOpReindexResolver),
            loader: None,
            backend_factory: Box::new(backend_factory),
        }
    }

    pub fn type_id(&self) -> EntityTypeId {
        self.type_id
    }

    pub fn mapping(&self) -> &dyn EntityMapping {
        self.mapping.as_ref()
    }

    pub fn routes(&self) -> &dyn RouteProvider {
        self.routes.as_ref()
    }

    pub fn resolver(&self) -> &dyn ReindexResolver {
        self.resolver.as_ref()
    }

    pub fn loader(&self) -> Option<&Arc<dyn EntityLoader>> {
        self.loader.as_ref()
    }

    /// Create a fresh backend adapter for one unit of work.
    pub fn new_backend(&self) -> Box<dyn IndexBackend> {
        (self.backend_factory)()
    }

    /// Resolve the identifier for an operation: an explicitly provided id
    /// wins; otherwise it is extracted from the entity instance.
    pub(crate) fn identifier(
        &self,
        provided: Option<EntityId>,
        entity: Option<&EntityHandle>,
    ) -> Result<EntityId, PlanError> {
        if let Some(id) = provided {
            return Ok(id);
        }
        match entity {
            Some(entity) => self.mapping.entity_id(entity),
            None => Err(PlanError::MissingIdentifier {
                type_id: self.type_id,
            }),
        }
    }
}

/// Builder for [`TypeBinding`]; optional collaborators default to
/// unrouted documents, no reindexing dependencies, and no loader.
pub struct TypeBindingBuilder {
    type_id: EntityTypeId,
    mapping: Box<dyn EntityMapping>,
    routes: Box<dyn RouteProvider>,
    resolver: Box<dyn ReindexResolver>,
    loader: Option<Arc<dyn EntityLoader>>,
    backend_factory: BackendFactory,
}

impl TypeBindingBuilder {
    /// Use a custom route provider.
    pub fn with_routes(mut self, routes: impl RouteProvider + 'static) -> Self {
        self.routes = Box::new(routes);
        self
    }

    /// Use a reindexing resolver for types other entities embed.
    pub fn with_resolver(mut self, resolver: impl ReindexResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Register a batch loader for identifier-only operations.
    pub fn with_loader(mut self, loader: impl EntityLoader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    pub fn build(self) -> TypeBinding {
        TypeBinding {
            type_id: self.type_id,
            mapping: self.mapping,
            routes: self.routes,
            resolver: self.resolver,
            loader: self.loader,
            backend_factory: self.backend_factory,
        }
    }
}

/// Registry of type bindings, built once at configuration time.
#[derive(Default)]
pub struct TypeBindings {
    bindings: IndexMap<EntityTypeId, Arc<TypeBinding>>,
}

impl TypeBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a binding, replacing any previous binding for the type.
    pub fn register(&mut self, binding: TypeBinding) {
        let type_id = binding.type_id();
        if self.bindings.insert(type_id, Arc::new(binding)).is_some() {
            warn!(type_id = %type_id, "replaced existing binding for entity type");
        }
    }

    /// Look up the binding for a type.
    pub fn get(&self, type_id: EntityTypeId) -> Option<&Arc<TypeBinding>> {
        self.bindings.get(&type_id)
    }

    /// Registered type ids, in registration order.
    pub fn type_ids(&self) -> impl Iterator<Item = EntityTypeId> + '_ {
        self.bindings.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
