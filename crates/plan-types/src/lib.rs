//! Shared vocabulary types for the indexing plan engine.
//!
//! This crate defines the identity, routing, and dirty-tracking types used
//! across the system:
//! - [`EntityTypeId`], [`EntityId`], [`EntityReference`]: how entities are
//!   addressed
//! - [`EntityHandle`]: an opaque, cheaply clonable entity instance
//! - [`PathSet`]: a bit set of dirty-path ordinals
//! - [`DocumentRoute`], [`DocumentReference`]: where document operations land

pub mod entity;
pub mod paths;
pub mod route;

pub use entity::{EntityHandle, EntityId, EntityReference, EntityTypeId};
pub use paths::PathSet;
pub use route::{DocumentReference, DocumentRoute};
