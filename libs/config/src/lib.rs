//! # Odds Feed Configuration
//!
//! Centralized configuration for the feed consumer: node identity, locales,
//! producer opt-outs and the timing knobs of the health and recovery layers.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use feed_config::FeedConfig;
//!
//! # fn main() -> Result<(), feed_config::ConfigError> {
//! // File plus ODDSFEED_* environment overrides, validated
//! let config = FeedConfig::load("config/feed.toml")?;
//! println!("inactivity window: {}s", config.max_inactivity_seconds);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod feed_config;

pub use error::{ConfigError, Result};
pub use feed_config::{FeedConfig, ENV_PREFIX};
