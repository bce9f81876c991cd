//! A thread-safe in-memory storage for the currently active configuration snapshot.
use std::sync::{Arc, RwLock};

use crate::models::{Configuration, Feature, Property, Segment};

/// `ConfigurationStore` provides a Sync storage for configuration that allows concurrent access
/// for readers and writers.
///
/// `Configuration` itself is always immutable and can only be replaced completely, so a reader
/// holding a snapshot never observes a mix of old and new features, properties and segments.
#[derive(Default)]
pub struct ConfigurationStore {
    configuration: RwLock<Option<Arc<Configuration>>>,
}

impl ConfigurationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        ConfigurationStore::default()
    }

    /// Get currently-active configuration. Returns `None` if configuration hasn't been loaded yet.
    pub fn get_configuration(&self) -> Option<Arc<Configuration>> {
        // self.configuration.read() should always return Ok(). Err() is possible only if the lock
        // is poisoned (writer panicked while holding the lock), which should never happen. Still,
        // using .ok()? here to not crash the app.
        let configuration = self.configuration.read().ok()?;
        configuration.clone()
    }

    /// Set new configuration, returning the previous one.
    pub fn replace(&self, configuration: Arc<Configuration>) -> Option<Arc<Configuration>> {
        let mut configuration_slot = match self.configuration.write() {
            Ok(slot) => slot,
            // The slot only ever holds a complete snapshot, so it is safe to keep using it.
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut configuration_slot, Some(configuration))
    }

    /// Look up a feature in the current snapshot.
    pub fn get_feature(&self, feature_id: &str) -> Option<Arc<Feature>> {
        self.get_configuration()?.get_feature(feature_id).cloned()
    }

    /// All features of the current snapshot, or `None` if nothing has been loaded yet.
    pub fn get_features(&self) -> Option<Vec<Arc<Feature>>> {
        Some(self.get_configuration()?.features().values().cloned().collect())
    }

    /// Look up a property in the current snapshot.
    pub fn get_property(&self, property_id: &str) -> Option<Arc<Property>> {
        self.get_configuration()?.get_property(property_id).cloned()
    }

    /// All properties of the current snapshot, or `None` if nothing has been loaded yet.
    pub fn get_properties(&self) -> Option<Vec<Arc<Property>>> {
        Some(self.get_configuration()?.properties().values().cloned().collect())
    }

    /// Look up a segment in the current snapshot.
    pub fn get_segment(&self, segment_id: &str) -> Option<Segment> {
        self.get_configuration()?.get_segment(segment_id).cloned()
    }
}
