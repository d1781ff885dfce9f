//! Document routing types.
//!
//! A route selects the index shard a document lives in. Routes are computed
//! per entity by the registered route provider, or forced by a
//! caller-provided routing key.

use crate::entity::EntityReference;
use serde::{Deserialize, Serialize};

/// Shard-selection decision for one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DocumentRoute {
    /// Routing key, or `None` for the backend's default shard
    pub routing_key: Option<String>,
}

impl DocumentRoute {
    /// Route with an explicit routing key.
    pub fn new(routing_key: impl Into<String>) -> Self {
        Self {
            routing_key: Some(routing_key.into()),
        }
    }

    /// Route to the backend's default shard.
    pub fn unrouted() -> Self {
        Self { routing_key: None }
    }
}

/// Fully resolved address of one document operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentReference {
    /// Backend document identifier
    pub document_id: String,
    /// Routing key the operation applies to, if any
    pub routing_key: Option<String>,
    /// Entity this document was produced from
    pub entity: EntityReference,
}

impl DocumentReference {
    /// Create a document reference.
    pub fn new(
        document_id: impl Into<String>,
        routing_key: Option<String>,
        entity: EntityReference,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            routing_key,
            entity,
        }
    }
}
