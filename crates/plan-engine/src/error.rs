//! Error types for the plan engine.

use plan_types::EntityTypeId;
use thiserror::Error;

/// Errors that can occur while building or processing an indexing plan.
///
/// Collaborator failures (loaders, resolvers) cross the boundary as
/// [`anyhow::Error`] and are kept as sources, never flattened to strings.
#[derive(Error, Debug)]
pub enum PlanError {
    /// Operation supplied neither an identifier nor an entity to extract one from
    #[error("No identifier for entity of type '{type_id}': none provided and no instance to extract one from")]
    MissingIdentifier { type_id: EntityTypeId },

    /// Operation referenced a type with no registered binding
    #[error("Entity type '{type_id}' is not registered")]
    UnregisteredType { type_id: EntityTypeId },

    /// A supplied entity instance does not hold the registered type
    #[error("Entity instance does not match registered type '{type_id}'")]
    WrongEntityType { type_id: EntityTypeId },

    /// Entities of this type need loading but no loader is registered
    #[error("Entity type '{type_id}' requires loading but has no registered loader")]
    MissingLoader { type_id: EntityTypeId },

    /// A loader returned a result that does not line up with the request
    #[error("Loader for type '{type_id}' returned {actual} entities for {expected} identifiers")]
    LoaderMismatch {
        type_id: EntityTypeId,
        expected: usize,
        actual: usize,
    },

    /// A loader failed outright
    #[error("Failed to load entities of type '{type_id}'")]
    Load {
        type_id: EntityTypeId,
        #[source]
        source: anyhow::Error,
    },

    /// A reindexing resolver failed
    #[error("Failed to resolve entities to reindex for type '{type_id}'")]
    Resolve {
        type_id: EntityTypeId,
        #[source]
        source: anyhow::Error,
    },
}
