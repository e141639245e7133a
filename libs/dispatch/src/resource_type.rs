//! Consumer-facing resource types
//!
//! Dispatchers are registered per resource type. Types form an explicit tree
//! rooted at [`ResourceType::SPORT_EVENT`]; a type is more specific the deeper
//! it sits. Applications derive their own sport-specific types as constants:
//!
//! ```rust
//! use feed_dispatch::ResourceType;
//!
//! const SOCCER_MATCH: ResourceType = ResourceType::derived("soccer_match", &ResourceType::MATCH);
//!
//! assert_eq!(SOCCER_MATCH.specificity(), 3);
//! assert!(SOCCER_MATCH.is_a(&ResourceType::SPORT_EVENT));
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceType {
    name: &'static str,
    parent: Option<&'static ResourceType>,
}

impl ResourceType {
    pub const SPORT_EVENT: ResourceType = ResourceType::root("sport_event");
    pub const COMPETITION: ResourceType =
        ResourceType::derived("competition", &ResourceType::SPORT_EVENT);
    pub const MATCH: ResourceType = ResourceType::derived("match", &ResourceType::COMPETITION);
    pub const STAGE: ResourceType = ResourceType::derived("stage", &ResourceType::COMPETITION);
    pub const LONG_TERM_EVENT: ResourceType =
        ResourceType::derived("long_term_event", &ResourceType::SPORT_EVENT);
    pub const TOURNAMENT: ResourceType =
        ResourceType::derived("tournament", &ResourceType::LONG_TERM_EVENT);
    pub const LOTTERY: ResourceType =
        ResourceType::derived("lottery", &ResourceType::LONG_TERM_EVENT);
    pub const DRAW: ResourceType = ResourceType::derived("draw", &ResourceType::SPORT_EVENT);

    pub const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    pub const fn derived(name: &'static str, parent: &'static ResourceType) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<ResourceType> {
        self.parent.copied()
    }

    /// This type followed by its ancestors, most specific first
    pub fn ancestry(&self) -> Vec<ResourceType> {
        let mut chain = vec![*self];
        let mut current = self.parent;
        while let Some(parent) = current {
            chain.push(*parent);
            current = parent.parent;
        }
        chain
    }

    /// Depth in the type tree; roots have specificity 0
    pub fn specificity(&self) -> usize {
        self.ancestry().len() - 1
    }

    /// `self` equals `other` or derives from it
    pub fn is_a(&self, other: &ResourceType) -> bool {
        self.ancestry().contains(other)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
