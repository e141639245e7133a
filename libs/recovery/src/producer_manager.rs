//! Process-wide producer registry
//!
//! Producers are registered at bootstrap from the upstream producer list. The
//! application may disable producers or seed their last-disconnect timestamps
//! until the feed opens; opening the feed locks the manager and every later
//! mutation fails with [`ProducerError::Locked`].

use crate::error::ProducerError;
use crate::producer::{Producer, ProducerDescriptor, ProducerTiming};
use chrono::{DateTime, Utc};
use feed_config::FeedConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct ProducerManager {
    producers: RwLock<HashMap<u32, Arc<Producer>>>,
    locked: AtomicBool,
    unknown: Arc<Producer>,
}

impl ProducerManager {
    pub fn new(producers: impl IntoIterator<Item = Producer>, timing: ProducerTiming) -> Self {
        let producers = producers
            .into_iter()
            .map(|producer| (producer.id(), Arc::new(producer)))
            .collect();

        Self {
            producers: RwLock::new(producers),
            locked: AtomicBool::new(false),
            unknown: Arc::new(Producer::unknown(timing)),
        }
    }

    /// Build the registry from the upstream producer list, applying the
    /// configured `disabled_producers`
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = ProducerDescriptor>,
        config: &FeedConfig,
    ) -> Self {
        let timing = ProducerTiming::from(config);
        let manager = Self::new(
            descriptors
                .into_iter()
                .map(|descriptor| Producer::new(descriptor, timing)),
            timing,
        );

        for id in &config.disabled_producers {
            if let Err(e) = manager.disable_producer(*id) {
                warn!(producer = id, error = %e, "Configured producer cannot be disabled");
            }
        }

        info!(
            producers = manager.producers.read().len(),
            disabled = config.disabled_producers.len(),
            "Producer manager initialized"
        );
        manager
    }

    /// Producer with the given id, or the shared "Unknown" producer
    pub fn get(&self, id: u32) -> Arc<Producer> {
        self.producers
            .read()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.unknown))
    }

    /// Producer with the given name (case-insensitive)
    pub fn get_by_name(&self, name: &str) -> Result<Arc<Producer>, ProducerError> {
        self.producers
            .read()
            .values()
            .find(|producer| producer.name().eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| ProducerError::NotFound(name.to_string()))
    }

    pub fn exists(&self, id: u32) -> bool {
        self.producers.read().contains_key(&id)
    }

    pub fn exists_by_name(&self, name: &str) -> bool {
        self.producers
            .read()
            .values()
            .any(|producer| producer.name().eq_ignore_ascii_case(name))
    }

    /// All registered producers ordered by id
    pub fn producers(&self) -> Vec<Arc<Producer>> {
        let mut producers: Vec<_> = self.producers.read().values().cloned().collect();
        producers.sort_by_key(|producer| producer.id());
        producers
    }

    pub fn disable_producer(&self, id: u32) -> Result<(), ProducerError> {
        self.mutate(id, |producer| producer.set_disabled(true))?;
        info!(producer = id, "Producer disabled");
        Ok(())
    }

    /// Seed the timestamp the next recovery of `id` should replay from
    pub fn add_timestamp_before_disconnect(
        &self,
        id: u32,
        timestamp: DateTime<Utc>,
    ) -> Result<(), ProducerError> {
        self.mutate(id, |producer| {
            producer.set_last_timestamp_before_disconnect(Some(timestamp))
        })?;
        debug!(producer = id, %timestamp, "Timestamp before disconnect set");
        Ok(())
    }

    /// Forget the seeded timestamp so the next recovery is a full one
    pub fn remove_timestamp_before_disconnect(&self, id: u32) -> Result<(), ProducerError> {
        self.mutate(id, |producer| producer.set_last_timestamp_before_disconnect(None))
    }

    /// Freeze the registry; one-way and idempotent
    pub fn lock(&self) {
        let _guard = self.producers.write();
        if !self.locked.swap(true, Ordering::SeqCst) {
            info!("Producer manager locked");
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    fn mutate(&self, id: u32, apply: impl FnOnce(&Producer)) -> Result<(), ProducerError> {
        // The write guard orders this check against a concurrent `lock()`
        let producers = self.producers.write();
        if self.locked.load(Ordering::SeqCst) {
            return Err(ProducerError::Locked { producer_id: id });
        }
        let producer = producers
            .get(&id)
            .ok_or_else(|| ProducerError::NotFound(id.to_string()))?;
        apply(producer);
        Ok(())
    }
}
