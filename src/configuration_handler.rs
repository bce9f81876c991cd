//! Orchestrates configuration loading: fetch, parse, swap the active snapshot, and notify
//! listeners.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Condvar, Mutex, TryLockError,
};

use crate::{
    configuration_source::ConfigurationSource,
    configuration_store::ConfigurationStore,
    listeners::{ConfigurationUpdateListener, ListenerRegistry},
    models::Configuration,
    Error, Result,
};

/// Lifecycle state of a [`ConfigurationHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// No configuration source has been bound yet.
    Uninitialized,
    /// A source is bound, but no configuration has been loaded successfully.
    ContextSet,
    /// At least one configuration has been loaded.
    Loaded,
}

/// What a call to [`ConfigurationHandler::load_data`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A new snapshot was activated and listeners were notified.
    Loaded,
    /// Another load was in flight. Nothing was fetched by this call.
    AlreadyInProgress,
}

/// Owns the configuration lifecycle of one session.
///
/// `load_data()` is the only writer of the [`ConfigurationStore`]. Loads are serialized: a call
/// made while another load is in flight returns immediately with
/// [`LoadOutcome::AlreadyInProgress`] instead of fetching again. Readers are never blocked by a
/// load, they keep reading the last committed snapshot.
pub struct ConfigurationHandler {
    store: ConfigurationStore,
    listeners: ListenerRegistry,
    /// Held for the whole fetch-replace-notify cycle.
    source: Mutex<Option<Box<dyn ConfigurationSource>>>,
    context_set: AtomicBool,
    /// Holds `None` until the first load finishes. Holds `Some(Ok(()))` once a configuration has
    /// been loaded, and `Some(Err(...))` if loading failed in a way that cannot be retried.
    first_load: (Mutex<Option<Result<()>>>, Condvar),
}

impl Default for ConfigurationHandler {
    fn default() -> Self {
        ConfigurationHandler::new()
    }
}

impl ConfigurationHandler {
    /// Create a handler with no source bound.
    pub fn new() -> ConfigurationHandler {
        ConfigurationHandler {
            store: ConfigurationStore::new(),
            listeners: ListenerRegistry::default(),
            source: Mutex::new(None),
            context_set: AtomicBool::new(false),
            first_load: (Mutex::new(None), Condvar::new()),
        }
    }

    /// Current lifecycle state, derived from the source and the store.
    pub fn state(&self) -> HandlerState {
        if self.store.get_configuration().is_some() {
            HandlerState::Loaded
        } else if self.context_set.load(Ordering::Acquire) {
            HandlerState::ContextSet
        } else {
            HandlerState::Uninitialized
        }
    }

    /// Bind the configuration source. The source cannot be replaced afterward.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if a source is already bound.
    pub fn set_source(&self, source: Box<dyn ConfigurationSource>) -> Result<()> {
        let mut slot = match self.source.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_some() {
            return Err(Error::InvalidState("configuration source is already set"));
        }
        *slot = Some(source);
        self.context_set.store(true, Ordering::Release);
        Ok(())
    }

    /// Run one fetch-parse-replace cycle synchronously.
    ///
    /// On success, the new snapshot replaces the current one and every listener is notified,
    /// even if the new snapshot has the same contents as the previous one. On failure, the
    /// current snapshot is retained and no listener is notified.
    pub fn load_data(&self) -> Result<LoadOutcome> {
        let mut slot = match self.source.try_lock() {
            Ok(slot) => slot,
            Err(TryLockError::WouldBlock) => {
                log::debug!(target: "appconfiguration", "configuration load already in progress");
                return Ok(LoadOutcome::AlreadyInProgress);
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        let Some(source) = slot.as_mut() else {
            log::error!(target: "appconfiguration", "cannot load configuration before the context is set");
            return Err(Error::InvalidState("context is not set"));
        };

        log::debug!(target: "appconfiguration", "loading configuration");
        match source.fetch_configuration() {
            Ok(configuration) => {
                let configuration = Arc::new(configuration);
                self.store.replace(configuration.clone());
                log::debug!(target: "appconfiguration", "configuration updated");
                // Waiters are released before listeners run, so a listener may wait too.
                self.record_first_load(Ok(()));

                self.listeners.notify(&configuration);
                Ok(LoadOutcome::Loaded)
            }
            Err(err) => {
                log::warn!(target: "appconfiguration", "failed to load configuration: {err}");
                if err.is_unrecoverable() || !source.supports_live_updates() {
                    self.record_first_load(Err(err.clone()));
                }
                Err(err)
            }
        }
    }

    /// Register a listener notified after every successful load.
    pub fn register_configuration_update_listener(
        &self,
        listener: impl ConfigurationUpdateListener + Send + Sync + 'static,
    ) {
        self.listeners.register(listener);
        log::debug!(target: "appconfiguration",
                    listeners = self.listeners.len();
                    "registered configuration update listener");
    }

    /// Block until the first configuration has been loaded, or loading failed for good.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if no source has been bound.
    /// - The error of the first load, if it cannot be retried.
    pub fn wait_for_configuration(&self) -> Result<()> {
        if !self.context_set.load(Ordering::Acquire) {
            return Err(Error::InvalidState("context is not set"));
        }

        let (lock, condvar) = &self.first_load;
        let mut result = lock.lock().map_err(|_| Error::PollerThreadPanicked)?;
        loop {
            match &*result {
                Some(result) => return result.clone(),
                None => {
                    result = condvar
                        .wait(result)
                        .map_err(|_| Error::PollerThreadPanicked)?;
                }
            }
        }
    }

    /// The currently active snapshot.
    pub fn get_configuration(&self) -> Option<Arc<Configuration>> {
        self.store.get_configuration()
    }

    /// The store holding the active snapshot.
    pub fn store(&self) -> &ConfigurationStore {
        &self.store
    }

    fn record_first_load(&self, value: Result<()>) {
        let (lock, condvar) = &self.first_load;
        let mut first_load = match lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // A successful load is final. A later failure must not hide it.
        if !matches!(*first_load, Some(Ok(()))) {
            *first_load = Some(value);
            condvar.notify_all();
        }
    }
}
