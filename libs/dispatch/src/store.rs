//! Dispatcher registry and resolution
//!
//! One dispatcher per resource type name. Resolution maps the event through
//! the [`TypeMapper`] and walks the mapped type's ancestry from most to least
//! specific, returning the first registered dispatcher that is open.

use crate::dispatcher::EntityDispatcher;
use crate::error::{DispatchError, Result};
use crate::resource_type::ResourceType;
use crate::type_mapper::TypeMapper;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use feed_types::Urn;
use std::sync::Arc;
use tracing::{debug, trace};

pub struct DispatcherStore {
    dispatchers: DashMap<&'static str, Arc<dyn EntityDispatcher>>,
    type_mapper: Arc<dyn TypeMapper>,
}

impl DispatcherStore {
    pub fn new(type_mapper: Arc<dyn TypeMapper>) -> Self {
        Self {
            dispatchers: DashMap::new(),
            type_mapper,
        }
    }

    /// Register `dispatcher` under its resource type
    pub fn add(&self, dispatcher: Arc<dyn EntityDispatcher>) -> Result<()> {
        let resource_type = dispatcher.resource_type().name();
        match self.dispatchers.entry(resource_type) {
            Entry::Occupied(_) => Err(DispatchError::DuplicateDispatcher { resource_type }),
            Entry::Vacant(slot) => {
                debug!(
                    dispatcher = dispatcher.name(),
                    resource_type, "Dispatcher registered"
                );
                slot.insert(dispatcher);
                Ok(())
            }
        }
    }

    pub fn remove(&self, resource_type: &ResourceType) -> Option<Arc<dyn EntityDispatcher>> {
        self.dispatchers
            .remove(resource_type.name())
            .map(|(_, dispatcher)| dispatcher)
    }

    /// Most specific open dispatcher for the event, if any
    pub fn get(&self, event_id: &Urn, sport_id: Option<&Urn>) -> Option<Arc<dyn EntityDispatcher>> {
        let Some(mapped) = self.type_mapper.map(event_id, sport_id) else {
            trace!(%event_id, "Event does not map to a resource type");
            return None;
        };

        mapped.ancestry().into_iter().find_map(|candidate| {
            self.dispatchers
                .get(candidate.name())
                .filter(|dispatcher| dispatcher.is_opened())
                .map(|dispatcher| Arc::clone(dispatcher.value()))
        })
    }

    pub fn resource_types(&self) -> Vec<ResourceType> {
        let mut types: Vec<_> = self
            .dispatchers
            .iter()
            .map(|entry| entry.value().resource_type())
            .collect();
        types.sort_by(|a, b| {
            b.specificity()
                .cmp(&a.specificity())
                .then_with(|| a.name().cmp(b.name()))
        });
        types
    }

    pub fn len(&self) -> usize {
        self.dispatchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty()
    }
}

impl std::fmt::Debug for DispatcherStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherStore")
            .field("resource_types", &self.resource_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::SpecificEntityDispatcher;
    use crate::mapper::HeaderMessageMapper;
    use crate::type_mapper::DefaultTypeMapper;
    use feed_types::FeedMetrics;

    const SOCCER_MATCH: ResourceType =
        ResourceType::derived("soccer_match", &ResourceType::MATCH);

    fn dispatcher(resource_type: ResourceType) -> Arc<SpecificEntityDispatcher> {
        Arc::new(SpecificEntityDispatcher::new(
            resource_type.name(),
            resource_type,
            vec!["en".to_string()],
            Arc::new(HeaderMessageMapper),
            Arc::new(FeedMetrics::new()),
        ))
    }

    fn store() -> DispatcherStore {
        DispatcherStore::new(Arc::new(
            DefaultTypeMapper::new().with_sport_override(Urn::sport(1), "match", SOCCER_MATCH),
        ))
    }

    #[test]
    fn prefers_most_specific_open_dispatcher() {
        let store = store();
        let generic = dispatcher(ResourceType::SPORT_EVENT);
        let soccer = dispatcher(SOCCER_MATCH);
        store.add(generic.clone()).unwrap();
        store.add(soccer.clone()).unwrap();
        generic.open().unwrap();
        soccer.open().unwrap();

        let resolved = store.get(&Urn::sr_match(1), Some(&Urn::sport(1))).unwrap();
        assert_eq!(resolved.resource_type(), SOCCER_MATCH);

        // Other sports fall back along the hierarchy
        let resolved = store.get(&Urn::sr_match(1), Some(&Urn::sport(2))).unwrap();
        assert_eq!(resolved.resource_type(), ResourceType::SPORT_EVENT);
    }

    #[test]
    fn closed_dispatchers_are_invisible() {
        let store = store();
        let generic = dispatcher(ResourceType::SPORT_EVENT);
        let soccer = dispatcher(SOCCER_MATCH);
        store.add(generic.clone()).unwrap();
        store.add(soccer.clone()).unwrap();
        generic.open().unwrap();

        let resolved = store.get(&Urn::sr_match(1), Some(&Urn::sport(1))).unwrap();
        assert_eq!(resolved.resource_type(), ResourceType::SPORT_EVENT);

        generic.close().unwrap();
        assert!(store.get(&Urn::sr_match(1), Some(&Urn::sport(1))).is_none());
    }

    #[test]
    fn unrelated_types_resolve_to_none() {
        let store = store();
        let matches = dispatcher(ResourceType::MATCH);
        store.add(matches.clone()).unwrap();
        matches.open().unwrap();

        let season: Urn = "sr:season:77".parse().unwrap();
        assert!(store.get(&season, None).is_none());
        let player: Urn = "sr:player:3".parse().unwrap();
        assert!(store.get(&player, None).is_none());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let store = store();
        store.add(dispatcher(ResourceType::MATCH)).unwrap();
        assert_eq!(
            store.add(dispatcher(ResourceType::MATCH)).unwrap_err(),
            DispatchError::DuplicateDispatcher {
                resource_type: "match"
            }
        );
        assert_eq!(store.len(), 1);

        assert!(store.remove(&ResourceType::MATCH).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn resource_types_are_listed_most_specific_first() {
        let store = store();
        store.add(dispatcher(ResourceType::SPORT_EVENT)).unwrap();
        store.add(dispatcher(SOCCER_MATCH)).unwrap();
        store.add(dispatcher(ResourceType::TOURNAMENT)).unwrap();
        assert_eq!(
            store.resource_types(),
            vec![SOCCER_MATCH, ResourceType::TOURNAMENT, ResourceType::SPORT_EVENT]
        );
    }
}
