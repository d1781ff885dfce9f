//! Entity identity types.
//!
//! An identity is the pair (entity type, identifier value). The engine never
//! interprets identifiers or entity instances; identifiers are compared,
//! hashed, and displayed, and instances are passed through to the per-type
//! collaborators that know how to inspect them.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Token identifying one registered entity type.
///
/// Type bindings are assembled at configuration time, so names are
/// `'static` and the token is freely copyable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EntityTypeId(&'static str);

impl EntityTypeId {
    /// Create a type id from a static entity name.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The entity name this id was created with.
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for EntityTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Identifier value for one entity within its type.
///
/// The sole deduplication key inside a plan: two operations targeting the
/// same type and equal identifiers coalesce into one state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    /// Numeric identifier
    Int(i64),
    /// String identifier (ULIDs, UUIDs, natural keys)
    Str(String),
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        EntityId::Int(value)
    }
}

impl From<i32> for EntityId {
    fn from(value: i32) -> Self {
        EntityId::Int(value as i64)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId::Str(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        EntityId::Str(value)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(value) => write!(f, "{}", value),
            EntityId::Str(value) => f.write_str(value),
        }
    }
}

/// Fully qualified reference to one entity: type plus identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EntityReference {
    /// Type of the referenced entity
    pub type_id: EntityTypeId,
    /// Identifier of the referenced entity within its type
    pub id: EntityId,
}

impl EntityReference {
    /// Create a reference from a type id and identifier.
    pub fn new(type_id: EntityTypeId, id: EntityId) -> Self {
        Self { type_id, id }
    }
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_id, self.id)
    }
}

/// Opaque, cheaply clonable entity instance.
///
/// Cloning shares the underlying instance. Per-type collaborators downcast
/// to their concrete entity type at the boundary; a failed downcast means
/// the handle was registered under the wrong type.
#[derive(Clone)]
pub struct EntityHandle(Arc<dyn Any + Send + Sync>);

impl EntityHandle {
    /// Wrap a concrete entity instance.
    pub fn new<T: Any + Send + Sync>(entity: T) -> Self {
        Self(Arc::new(entity))
    }

    /// Downcast to a concrete entity type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EntityHandle(..)")
    }
}
