//! Per-identity coalescing state.
//!
//! Every operation applied to an identity within one unit of work folds
//! into a single [`EntityState`]. The net backend operation is decided
//! later from the (initial, current) status pair alone, never from the
//! call history.

use crate::loading::LoadingPlan;
use plan_types::{EntityHandle, EntityTypeId, PathSet};

/// Index-side presence of an entity at a point in the unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum EntityStatus {
    /// No operation observed, or presence in the index unknown
    #[default]
    Unknown,
    /// Expected to be present in the index
    Present,
    /// Expected to be absent from the index
    Absent,
}

/// Coalesced record of every operation applied to one identity.
#[derive(Debug, Default)]
pub(crate) struct EntityState {
    /// Latest entity instance seen for this identity, if any
    pub(crate) entity: Option<EntityHandle>,
    /// Ticket into the loading plan when the instance must be fetched
    pub(crate) loading_ordinal: Option<usize>,
    /// Status before the first operation of this unit of work; set once
    pub(crate) initial_status: EntityStatus,
    /// Status after the most recent operation
    pub(crate) current_status: EntityStatus,
    /// Whether dependent entities still need to be resolved for reindexing
    pub(crate) should_resolve: bool,
    /// Whether every field must be considered dirty
    pub(crate) all_dirty: bool,
    /// Union of dirty paths supplied so far; `None` when no path info exists
    pub(crate) dirty_paths: Option<PathSet>,
    /// Routing key forced by the caller on the latest operation
    pub(crate) provided_routing_key: Option<String>,
    /// Whether a reindexing resolver pushed this entity into the plan
    pub(crate) updated_because_of_contained: bool,
}

impl EntityState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Apply an add: the document is expected to be absent from the index.
    pub(crate) fn add(&mut self, entity: Option<EntityHandle>, routing_key: Option<String>) {
        self.record_entity(entity);
        self.provided_routing_key = routing_key;
        self.should_resolve = true;
        if self.initial_status == EntityStatus::Unknown {
            self.initial_status = EntityStatus::Absent;
        }
        self.current_status = EntityStatus::Present;
        self.mark_all_dirty();
    }

    /// Apply an add-or-update.
    ///
    /// `dirty_paths` of `None` means no field-level information was
    /// supplied, which is treated as everything-dirty. An empty set means
    /// the change is known not to touch any indexed field.
    pub(crate) fn add_or_update(
        &mut self,
        entity: Option<EntityHandle>,
        routing_key: Option<String>,
        dirty_paths: Option<&PathSet>,
    ) {
        self.apply_update(entity, routing_key);
        self.should_resolve = true;
        match dirty_paths {
            None => self.mark_all_dirty(),
            Some(paths) => {
                if !self.all_dirty {
                    self.dirty_paths
                        .get_or_insert_with(PathSet::new)
                        .union_with(paths);
                }
            }
        }
    }

    /// Apply a delete: the document must end up absent from the index.
    pub(crate) fn delete(&mut self, entity: Option<EntityHandle>, routing_key: Option<String>) {
        self.record_entity(entity);
        self.provided_routing_key = routing_key;
        if self.initial_status == EntityStatus::Unknown {
            self.initial_status = EntityStatus::Present;
        }
        self.current_status = EntityStatus::Absent;
        // Deletes do not cascade: dependent entities receive their own
        // change events, and there is nothing left here to resolve from.
        self.should_resolve = false;
        self.all_dirty = false;
        self.dirty_paths = None;
        self.updated_because_of_contained = false;
    }

    /// Apply an implicit update caused by a change to a related entity.
    pub(crate) fn update_because_of_contained(&mut self, entity: EntityHandle) {
        if self.current_status == EntityStatus::Absent {
            // Deleted in this unit of work; a related entity still points
            // here, but there is nothing left to reindex.
            return;
        }
        self.apply_update(Some(entity), None);
        self.updated_because_of_contained = true;
        // `should_resolve` stays as it was: an otherwise-unmodified entity
        // must not trigger reindexing of its own dependents in turn.
    }

    /// Whether this state still needs an entity instance fetched.
    pub(crate) fn needs_loading(&self) -> bool {
        self.current_status == EntityStatus::Present
            && self.entity.is_none()
            && self.loading_ordinal.is_none()
    }

    /// The entity instance, pulling it out of the loading plan on first use.
    ///
    /// Returns `None` when the entity was never supplied and the load found
    /// nothing, in which case the identity is treated as deleted.
    pub(crate) fn entity_or_load(
        &mut self,
        loading: &LoadingPlan,
        type_id: EntityTypeId,
    ) -> Option<EntityHandle> {
        if self.entity.is_none() {
            if let Some(ordinal) = self.loading_ordinal.take() {
                self.entity = loading.retrieve(type_id, ordinal);
            }
        }
        self.entity.clone()
    }

    /// Shared transition for explicit and implicit updates.
    fn apply_update(&mut self, entity: Option<EntityHandle>, routing_key: Option<String>) {
        self.record_entity(entity);
        self.provided_routing_key = routing_key;
        if self.initial_status == EntityStatus::Unknown {
            self.initial_status = EntityStatus::Present;
        }
        self.current_status = EntityStatus::Present;
    }

    /// Keep the latest instance; an identifier-only operation keeps any
    /// instance a previous operation already supplied.
    fn record_entity(&mut self, entity: Option<EntityHandle>) {
        if let Some(entity) = entity {
            self.entity = Some(entity);
        }
    }

    fn mark_all_dirty(&mut self) {
        self.all_dirty = true;
        self.dirty_paths = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loading::EntityLoader;
    use plan_types::EntityId;
    use std::sync::Arc;
    use std::time::Instant;

    struct FixedLoader(Vec<Option<EntityHandle>>);

    impl EntityLoader for FixedLoader {
        fn load_blocking(
            &self,
            _ids: &[EntityId],
            _deadline: Option<Instant>,
        ) -> anyhow::Result<Vec<Option<EntityHandle>>> {
            Ok(self.0.clone())
        }
    }

    const TYPE: EntityTypeId = EntityTypeId::new("test");

    #[test]
    fn test_add_marks_absent_then_present() {
        let mut state = EntityState::new();
        state.add(None, None);
        assert_eq!(state.initial_status, EntityStatus::Absent);
        assert_eq!(state.current_status, EntityStatus::Present);
        assert!(state.should_resolve);
        assert!(state.all_dirty);
        assert!(state.dirty_paths.is_none());
    }

    #[test]
    fn test_add_then_delete_cancels_out() {
        let mut state = EntityState::new();
        state.add(None, None);
        state.delete(None, None);
        assert_eq!(state.initial_status, EntityStatus::Absent);
        assert_eq!(state.current_status, EntityStatus::Absent);
        assert!(!state.should_resolve);
        assert!(!state.all_dirty);
    }

    #[test]
    fn test_delete_then_add_reads_as_update() {
        let mut state = EntityState::new();
        state.delete(None, None);
        state.add(None, None);
        assert_eq!(state.initial_status, EntityStatus::Present);
        assert_eq!(state.current_status, EntityStatus::Present);
        assert!(state.all_dirty);
    }

    #[test]
    fn test_update_unions_dirty_paths() {
        let mut state = EntityState::new();
        state.add_or_update(None, None, Some(&PathSet::from_paths([1])));
        state.add_or_update(None, None, Some(&PathSet::from_paths([4])));
        let paths = state.dirty_paths.as_ref().expect("paths should accumulate");
        assert!(paths.contains(1));
        assert!(paths.contains(4));
        assert!(!state.all_dirty);
        assert!(state.should_resolve);
    }

    #[test]
    fn test_update_without_paths_considers_all_dirty() {
        let mut state = EntityState::new();
        state.add_or_update(None, None, Some(&PathSet::from_paths([1])));
        state.add_or_update(None, None, None);
        assert!(state.all_dirty);
        assert!(state.dirty_paths.is_none());
    }

    #[test]
    fn test_all_dirty_absorbs_later_paths() {
        let mut state = EntityState::new();
        state.add(None, None);
        state.add_or_update(None, None, Some(&PathSet::from_paths([2])));
        assert!(state.all_dirty);
        assert!(state.dirty_paths.is_none());
    }

    #[test]
    fn test_delete_clears_dirtiness_and_resolution() {
        let mut state = EntityState::new();
        state.add_or_update(None, None, Some(&PathSet::from_paths([1])));
        state.delete(None, None);
        assert!(!state.should_resolve);
        assert!(!state.all_dirty);
        assert!(state.dirty_paths.is_none());
        assert!(!state.updated_because_of_contained);
    }

    #[test]
    fn test_contained_update_ignored_after_delete() {
        let mut state = EntityState::new();
        state.delete(None, None);
        state.update_because_of_contained(EntityHandle::new(1u8));
        assert_eq!(state.current_status, EntityStatus::Absent);
        assert!(!state.updated_because_of_contained);
    }

    #[test]
    fn test_contained_update_does_not_cascade() {
        let mut state = EntityState::new();
        state.update_because_of_contained(EntityHandle::new(1u8));
        assert_eq!(state.initial_status, EntityStatus::Present);
        assert_eq!(state.current_status, EntityStatus::Present);
        assert!(state.updated_because_of_contained);
        assert!(!state.should_resolve);
    }

    #[test]
    fn test_contained_update_resets_provided_routing_key() {
        let mut state = EntityState::new();
        state.add_or_update(None, Some("shard-1".to_string()), None);
        state.update_because_of_contained(EntityHandle::new(1u8));
        assert_eq!(state.provided_routing_key, None);
    }

    #[test]
    fn test_latest_routing_key_wins() {
        let mut state = EntityState::new();
        state.add(None, Some("old".to_string()));
        state.add_or_update(None, Some("new".to_string()), None);
        assert_eq!(state.provided_routing_key, Some("new".to_string()));
        state.delete(None, None);
        assert_eq!(state.provided_routing_key, None);
    }

    #[test]
    fn test_identifier_only_op_keeps_known_entity() {
        let mut state = EntityState::new();
        state.add(Some(EntityHandle::new(7u32)), None);
        state.add_or_update(None, None, None);
        let entity = state.entity.as_ref().expect("entity should be retained");
        assert_eq!(entity.downcast_ref::<u32>(), Some(&7));
    }

    #[test]
    fn test_needs_loading_only_when_present_without_entity() {
        let mut state = EntityState::new();
        state.add_or_update(None, None, None);
        assert!(state.needs_loading());
        state.delete(None, None);
        assert!(!state.needs_loading());

        let mut with_entity = EntityState::new();
        with_entity.add(Some(EntityHandle::new(1u8)), None);
        assert!(!with_entity.needs_loading());
    }

    #[test]
    fn test_entity_or_load_caches_loaded_instance() {
        let loader: Arc<dyn EntityLoader> =
            Arc::new(FixedLoader(vec![Some(EntityHandle::new(42u32))]));
        let mut loading = LoadingPlan::new();
        let ordinal = loading.plan(TYPE, &loader, EntityId::from(1));
        loading.load_blocking(None).expect("load should succeed");

        let mut state = EntityState::new();
        state.add_or_update(None, None, None);
        state.loading_ordinal = Some(ordinal);

        let entity = state.entity_or_load(&loading, TYPE).expect("loaded");
        assert_eq!(entity.downcast_ref::<u32>(), Some(&42));
        assert!(state.loading_ordinal.is_none());
        // Second call serves the cached instance.
        assert!(state.entity_or_load(&loading, TYPE).is_some());
    }

    #[test]
    fn test_entity_or_load_misses_resolve_to_none() {
        let loader: Arc<dyn EntityLoader> = Arc::new(FixedLoader(vec![None]));
        let mut loading = LoadingPlan::new();
        let ordinal = loading.plan(TYPE, &loader, EntityId::from(1));
        loading.load_blocking(None).expect("load should succeed");

        let mut state = EntityState::new();
        state.add_or_update(None, None, None);
        state.loading_ordinal = Some(ordinal);
        assert!(state.entity_or_load(&loading, TYPE).is_none());
    }
}
