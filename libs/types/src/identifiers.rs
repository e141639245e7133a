//! # Feed Identifiers
//!
//! Every sport event, sport and competitor on the feed is addressed by a URN of
//! the form `prefix:type:id`, e.g. `sr:match:12345` or `sr:sport:1`. Some
//! producers publish prefixed ids such as `wns:draw:17`, so the prefix is kept
//! verbatim rather than assumed.

use crate::IdentifierError;
use std::fmt;
use std::str::FromStr;

/// Uniform resource name of a feed entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Urn {
    prefix: String,
    kind: String,
    id: i64,
}

impl Urn {
    /// Create a URN from its parts
    pub fn new(prefix: impl Into<String>, kind: impl Into<String>, id: i64) -> Self {
        Self {
            prefix: prefix.into(),
            kind: kind.into(),
            id,
        }
    }

    /// Convenience constructor for `sr:sport:{id}`
    pub fn sport(id: i64) -> Self {
        Self::new("sr", "sport", id)
    }

    /// Convenience constructor for `sr:match:{id}`
    pub fn sr_match(id: i64) -> Self {
        Self::new("sr", "match", id)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The entity type component (`match`, `stage`, `sport`, ...)
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> i64 {
        self.id
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.prefix, self.kind, self.id)
    }
}

impl FromStr for Urn {
    type Err = IdentifierError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut parts = input.trim().splitn(3, ':');
        let (prefix, kind, id) = match (parts.next(), parts.next(), parts.next()) {
            (Some(prefix), Some(kind), Some(id)) => (prefix, kind, id),
            _ => {
                return Err(IdentifierError::InvalidFormat {
                    input: input.to_string(),
                })
            }
        };

        if prefix.is_empty() {
            return Err(IdentifierError::EmptyComponent {
                component: "prefix",
                input: input.to_string(),
            });
        }
        if kind.is_empty() {
            return Err(IdentifierError::EmptyComponent {
                component: "type",
                input: input.to_string(),
            });
        }

        let id = id.parse::<i64>().map_err(|_| IdentifierError::InvalidId {
            input: input.to_string(),
        })?;

        Ok(Self::new(prefix, kind, id))
    }
}

impl TryFrom<String> for Urn {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Urn> for String {
    fn from(urn: Urn) -> Self {
        urn.to_string()
    }
}
