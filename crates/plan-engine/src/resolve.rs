//! Transitive reindexing resolution.
//!
//! When an entity changes, other entities may embed its data in their own
//! indexed documents. A [`ReindexResolver`] knows that dependency graph and
//! reports the affected entities through a [`ReindexCollector`]; the engine
//! turns every reported entity into an implicit update on its own type plan.

use plan_types::{EntityHandle, EntityId, EntityTypeId, PathSet};

/// Dirtiness view handed to reindexing resolvers.
#[derive(Debug, Clone, Copy)]
pub enum DirtySignal<'a> {
    /// Every field must be considered dirty
    All,
    /// Exactly these paths are dirty
    Paths(&'a PathSet),
}

impl DirtySignal<'_> {
    /// Whether any of the given paths is dirty under this signal.
    pub fn is_dirty(&self, paths: &PathSet) -> bool {
        match self {
            DirtySignal::All => true,
            DirtySignal::Paths(dirty) => dirty.intersects(paths),
        }
    }
}

/// Receives entities that must be reindexed because a related entity changed.
pub trait ReindexCollector {
    /// Mark one entity of a registered type for reindexing.
    fn mark_for_reindexing(&mut self, type_id: EntityTypeId, entity: EntityHandle);
}

/// Computes which other entities embed a changed entity's data.
///
/// Implementations own the transitive closure over their dependency graph;
/// the engine guarantees each identity is resolved at most once per unit of
/// work, so cycles between resolvers terminate.
pub trait ReindexResolver: Send + Sync {
    fn resolve(
        &self,
        id: &EntityId,
        entity: &EntityHandle,
        dirtiness: DirtySignal<'_>,
        collector: &mut dyn ReindexCollector,
    ) -> anyhow::Result<()>;
}

/// Resolver for types no other entity depends on.
#[derive(Debug, Default)]
pub struct NoOpReindexResolver;

impl ReindexResolver for NoOpReindexResolver {
    fn resolve(
        &self,
        _id: &EntityId,
        _entity: &EntityHandle,
        _dirtiness: DirtySignal<'_>,
        _collector: &mut dyn ReindexCollector,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Buffers resolver output until the owning plan can apply it.
///
/// Resolution runs while a type plan's states are borrowed; applying marks
/// immediately would mean mutating sibling plans mid-iteration. The queue
/// decouples the two: marks collect here and the root plan drains them
/// between type passes.
#[derive(Debug, Default)]
pub(crate) struct ReindexQueue {
    entries: Vec<(EntityTypeId, EntityHandle)>,
}

impl ReindexQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Take every buffered mark, leaving the queue empty.
    pub(crate) fn take(&mut self) -> Vec<(EntityTypeId, EntityHandle)> {
        std::mem::take(&mut self.entries)
    }
}

impl ReindexCollector for ReindexQueue {
    fn mark_for_reindexing(&mut self, type_id: EntityTypeId, entity: EntityHandle) {
        self.entries.push((type_id, entity));
    }
}
