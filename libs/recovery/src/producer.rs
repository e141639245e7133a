//! Upstream producer identity and operational state
//!
//! The identity part (id, name, api path, scope, timing limits) is fixed at
//! construction. The operational part is mutated by the producer manager
//! (before it is locked) and by the recovery managers for the lifetime of the
//! process.

use chrono::{DateTime, Utc};
use feed_config::FeedConfig;
use feed_types::ProducerScope;
use parking_lot::RwLock;

/// Id of the synthetic producer returned for unknown ids
pub const UNKNOWN_PRODUCER_ID: u32 = 99;

/// Producer entry as announced by the upstream producer list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerDescriptor {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub api_url: String,
    /// Upstream declares the producer enabled for this account
    pub active: bool,
    pub scopes: Vec<ProducerScope>,
    /// Per-producer recovery window, falls back to the configured default
    pub stateful_recovery_window_minutes: Option<u64>,
}

/// Timing limits shared by every producer of one feed instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerTiming {
    pub max_inactivity_seconds: u64,
    pub max_recovery_time_seconds: u64,
    pub stateful_recovery_window_minutes: u64,
}

impl From<&FeedConfig> for ProducerTiming {
    fn from(config: &FeedConfig) -> Self {
        Self {
            max_inactivity_seconds: config.max_inactivity_seconds,
            max_recovery_time_seconds: config.max_recovery_time_seconds,
            stateful_recovery_window_minutes: config.stateful_recovery_window_minutes,
        }
    }
}

impl Default for ProducerTiming {
    fn default() -> Self {
        Self::from(&FeedConfig::default())
    }
}

/// Snapshot of the mutable producer state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerState {
    pub is_available: bool,
    pub is_disabled: bool,
    pub is_producer_down: bool,
    /// `None` means the producer was never disconnected
    pub last_timestamp_before_disconnect: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct Producer {
    id: u32,
    name: String,
    description: String,
    api_url: String,
    scopes: Vec<ProducerScope>,
    max_inactivity_seconds: u64,
    max_recovery_time_seconds: u64,
    stateful_recovery_window_minutes: u64,
    state: RwLock<ProducerState>,
}

impl Producer {
    /// New producers start down until their first recovery completes
    pub fn new(descriptor: ProducerDescriptor, timing: ProducerTiming) -> Self {
        Self {
            id: descriptor.id,
            name: descriptor.name,
            description: descriptor.description,
            api_url: descriptor.api_url,
            scopes: descriptor.scopes,
            max_inactivity_seconds: timing.max_inactivity_seconds,
            max_recovery_time_seconds: timing.max_recovery_time_seconds,
            stateful_recovery_window_minutes: descriptor
                .stateful_recovery_window_minutes
                .unwrap_or(timing.stateful_recovery_window_minutes),
            state: RwLock::new(ProducerState {
                is_available: descriptor.active,
                is_disabled: false,
                is_producer_down: true,
                last_timestamp_before_disconnect: None,
            }),
        }
    }

    /// Placeholder for ids the upstream never announced
    pub fn unknown(timing: ProducerTiming) -> Self {
        Self::new(
            ProducerDescriptor {
                id: UNKNOWN_PRODUCER_ID,
                name: "Unknown".to_string(),
                description: "Unknown producer".to_string(),
                api_url: String::new(),
                active: false,
                scopes: vec![
                    ProducerScope::Live,
                    ProducerScope::Prematch,
                    ProducerScope::Virtual,
                ],
                stateful_recovery_window_minutes: None,
            },
            timing,
        )
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn scopes(&self) -> &[ProducerScope] {
        &self.scopes
    }

    pub fn has_scope(&self, scope: ProducerScope) -> bool {
        self.scopes.contains(&scope)
    }

    /// Only virtual-sport content, which carries no real-time guarantee
    pub fn is_virtual_only(&self) -> bool {
        !self.scopes.is_empty() && self.scopes.iter().all(|s| *s == ProducerScope::Virtual)
    }

    pub fn max_inactivity_seconds(&self) -> u64 {
        self.max_inactivity_seconds
    }

    pub fn max_inactivity(&self) -> chrono::Duration {
        seconds(self.max_inactivity_seconds)
    }

    pub fn max_recovery_time(&self) -> chrono::Duration {
        seconds(self.max_recovery_time_seconds)
    }

    pub fn stateful_recovery_window_minutes(&self) -> u64 {
        self.stateful_recovery_window_minutes
    }

    /// How far back an after-timestamp recovery may reach
    pub fn max_after_age(&self) -> chrono::Duration {
        i64::try_from(self.stateful_recovery_window_minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn is_available(&self) -> bool {
        self.state.read().is_available
    }

    pub fn is_disabled(&self) -> bool {
        self.state.read().is_disabled
    }

    pub fn is_producer_down(&self) -> bool {
        self.state.read().is_producer_down
    }

    pub fn last_timestamp_before_disconnect(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_timestamp_before_disconnect
    }

    /// Available upstream and not disabled by the consumer
    pub fn is_enabled(&self) -> bool {
        let state = self.state.read();
        state.is_available && !state.is_disabled
    }

    pub fn state(&self) -> ProducerState {
        self.state.read().clone()
    }

    pub(crate) fn set_disabled(&self, disabled: bool) {
        self.state.write().is_disabled = disabled;
    }

    pub(crate) fn set_producer_down(&self, down: bool) {
        self.state.write().is_producer_down = down;
    }

    pub(crate) fn set_last_timestamp_before_disconnect(&self, timestamp: Option<DateTime<Utc>>) {
        self.state.write().last_timestamp_before_disconnect = timestamp;
    }
}

fn seconds(value: u64) -> chrono::Duration {
    i64::try_from(value)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}
