//! # Feed Dispatch
//!
//! Routes mapped feed events to the application:
//!
//! - [`ResourceType`]: explicit consumer-facing type tree with a specificity rank
//! - [`TypeMapper`]: maps an event (and its sport) to a resource type
//! - [`SpecificEntityDispatcher`]: per-type fan-out with isolated handlers
//! - [`DispatcherStore`]: resolves the most specific open dispatcher of an event
//!
//! ```rust
//! use feed_dispatch::{
//!     DefaultTypeMapper, DispatcherStore, EntityDispatcher, HeaderMessageMapper, ResourceType,
//!     SpecificEntityDispatcher,
//! };
//! use feed_types::{FeedMetrics, Urn};
//! use std::sync::Arc;
//!
//! let store = DispatcherStore::new(Arc::new(DefaultTypeMapper::new()));
//! let matches = Arc::new(SpecificEntityDispatcher::new(
//!     "matches",
//!     ResourceType::MATCH,
//!     vec!["en".to_string()],
//!     Arc::new(HeaderMessageMapper),
//!     Arc::new(FeedMetrics::new()),
//! ));
//! store.add(matches.clone()).unwrap();
//! matches.open().unwrap();
//!
//! assert!(store.get(&Urn::sr_match(1), None).is_some());
//! ```

pub mod dispatcher;
pub mod error;
pub mod mapper;
pub mod resource_type;
pub mod store;
pub mod type_mapper;

pub use dispatcher::{EntityDispatcher, SpecificEntityDispatcher};
pub use error::{DispatchError, MappingError, Result};
pub use mapper::{HeaderMessageMapper, MessageMapper};
pub use resource_type::ResourceType;
pub use store::DispatcherStore;
pub use type_mapper::{DefaultTypeMapper, TypeMapper};
