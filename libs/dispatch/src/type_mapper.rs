//! Event id to resource type mapping

use crate::resource_type::ResourceType;
use feed_types::Urn;
use std::collections::HashMap;

/// Decides which resource type an event is delivered as
pub trait TypeMapper: Send + Sync {
    /// `None` when the event id does not denote a dispatchable resource
    fn map(&self, event_id: &Urn, sport_id: Option<&Urn>) -> Option<ResourceType>;
}

/// Maps by URN type, with optional per-sport overrides
///
/// ```rust
/// use feed_dispatch::{DefaultTypeMapper, ResourceType, TypeMapper};
/// use feed_types::Urn;
///
/// const SOCCER_MATCH: ResourceType = ResourceType::derived("soccer_match", &ResourceType::MATCH);
///
/// let mapper = DefaultTypeMapper::new().with_sport_override(Urn::sport(1), "match", SOCCER_MATCH);
/// assert_eq!(mapper.map(&Urn::sr_match(10), Some(&Urn::sport(1))), Some(SOCCER_MATCH));
/// assert_eq!(mapper.map(&Urn::sr_match(10), Some(&Urn::sport(2))), Some(ResourceType::MATCH));
/// ```
#[derive(Debug, Clone, Default)]
pub struct DefaultTypeMapper {
    overrides: HashMap<(Urn, String), ResourceType>,
}

impl DefaultTypeMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver events of URN type `event_kind` in `sport_id` as `resource_type`
    pub fn with_sport_override(
        mut self,
        sport_id: Urn,
        event_kind: impl Into<String>,
        resource_type: ResourceType,
    ) -> Self {
        self.overrides
            .insert((sport_id, event_kind.into()), resource_type);
        self
    }

    fn base_type(event_kind: &str) -> Option<ResourceType> {
        match event_kind {
            "match" => Some(ResourceType::MATCH),
            "stage" | "race" => Some(ResourceType::STAGE),
            "season" | "tournament" | "simple_tournament" => Some(ResourceType::TOURNAMENT),
            "lottery" => Some(ResourceType::LOTTERY),
            "draw" => Some(ResourceType::DRAW),
            _ => None,
        }
    }
}

impl TypeMapper for DefaultTypeMapper {
    fn map(&self, event_id: &Urn, sport_id: Option<&Urn>) -> Option<ResourceType> {
        if let Some(sport) = sport_id {
            if let Some(specific) = self
                .overrides
                .get(&(sport.clone(), event_id.kind().to_string()))
            {
                return Some(*specific);
            }
        }
        Self::base_type(event_id.kind())
    }
}
