//! Routing decisions for document operations.
//!
//! A route provider computes where a document lives now and where it may
//! still live from before this unit of work. The engine enforces the
//! override and cleanup rules: a caller-provided routing key beats the
//! computed current route, previous routes equal to the current route are
//! skipped, and duplicates are purged once.

use plan_types::{DocumentRoute, EntityHandle, EntityId};

/// Computes current and previous routes for one entity type.
pub trait RouteProvider: Send + Sync {
    /// Route the document should live under now, or `None` to keep the
    /// entity out of the index entirely.
    fn current_route(&self, id: &EntityId, entity: &EntityHandle) -> Option<DocumentRoute>;

    /// Routes the document may still live under from previous states.
    ///
    /// Defaults to none, which fits providers whose routes never change.
    fn previous_routes(
        &self,
        current: Option<&DocumentRoute>,
        id: &EntityId,
        entity: &EntityHandle,
    ) -> Vec<DocumentRoute> {
        let _ = (current, id, entity);
        Vec::new()
    }
}

/// Routes every document to the backend's default shard.
#[derive(Debug, Default)]
pub struct DefaultRouteProvider;

impl RouteProvider for DefaultRouteProvider {
    fn current_route(&self, _id: &EntityId, _entity: &EntityHandle) -> Option<DocumentRoute> {
        Some(DocumentRoute::unrouted())
    }
}

/// Where a document must be written now, and which routes to purge first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RoutingDecision {
    pub(crate) current: Option<DocumentRoute>,
    pub(crate) previous: Vec<DocumentRoute>,
}

/// The current route alone, honoring a caller-provided routing key.
pub(crate) fn current_route(
    provider: &dyn RouteProvider,
    provided_routing_key: Option<&str>,
    id: &EntityId,
    entity: &EntityHandle,
) -> Option<DocumentRoute> {
    match provided_routing_key {
        Some(key) => Some(DocumentRoute::new(key)),
        None => provider.current_route(id, entity),
    }
}

/// Current and previous routes, filtered and deduplicated.
pub(crate) fn plan_routes(
    provider: &dyn RouteProvider,
    provided_routing_key: Option<&str>,
    id: &EntityId,
    entity: &EntityHandle,
) -> RoutingDecision {
    let current = current_route(provider, provided_routing_key, id, entity);
    let mut previous: Vec<DocumentRoute> = Vec::new();
    for route in provider.previous_routes(current.as_ref(), id, entity) {
        if Some(&route) == current.as_ref() || previous.contains(&route) {
            continue;
        }
        previous.push(route);
    }
    RoutingDecision { current, previous }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ShardedProvider {
        current: Option<&'static str>,
        previous: Vec<&'static str>,
    }

    impl RouteProvider for ShardedProvider {
        fn current_route(&self, _id: &EntityId, _entity: &EntityHandle) -> Option<DocumentRoute> {
            self.current.map(DocumentRoute::new)
        }

        fn previous_routes(
            &self,
            _current: Option<&DocumentRoute>,
            _id: &EntityId,
            _entity: &EntityHandle,
        ) -> Vec<DocumentRoute> {
            self.previous.iter().copied().map(DocumentRoute::new).collect()
        }
    }

    fn entity() -> EntityHandle {
        EntityHandle::new(())
    }

    #[test]
    fn test_default_provider_uses_default_shard() {
        let decision = plan_routes(&DefaultRouteProvider, None, &EntityId::from(1), &entity());
        assert_eq!(decision.current, Some(DocumentRoute::unrouted()));
        assert!(decision.previous.is_empty());
    }

    #[test]
    fn test_provided_key_overrides_provider() {
        let provider = ShardedProvider {
            current: Some("computed"),
            previous: vec![],
        };
        let decision = plan_routes(&provider, Some("forced"), &EntityId::from(1), &entity());
        assert_eq!(decision.current, Some(DocumentRoute::new("forced")));
    }

    #[test]
    fn test_previous_routes_skip_current_and_duplicates() {
        let provider = ShardedProvider {
            current: Some("new"),
            previous: vec!["old", "new", "old", "older"],
        };
        let decision = plan_routes(&provider, None, &EntityId::from(1), &entity());
        assert_eq!(
            decision.previous,
            vec![DocumentRoute::new("old"), DocumentRoute::new("older")]
        );
    }

    #[test]
    fn test_absent_current_route_still_purges_previous() {
        let provider = ShardedProvider {
            current: None,
            previous: vec!["old"],
        };
        let decision = plan_routes(&provider, None, &EntityId::from(1), &entity());
        assert_eq!(decision.current, None);
        assert_eq!(decision.previous, vec![DocumentRoute::new("old")]);
    }
}
