//! Callbacks notified whenever a new configuration snapshot becomes active.
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::models::Configuration;

/// A listener notified after every successful configuration refresh.
///
/// Implemented for any `Fn(&Configuration)` closure:
///
/// ```
/// # use appconfiguration::Configuration;
/// # let client = appconfiguration::AppConfiguration::new();
/// client.register_configuration_update_listener(|configuration: &Configuration| {
///     println!("{} features loaded", configuration.features().len());
/// });
/// ```
pub trait ConfigurationUpdateListener {
    /// Called synchronously with the snapshot that has just been activated.
    fn on_configuration_update(&self, configuration: &Configuration);
}

impl<T: Fn(&Configuration)> ConfigurationUpdateListener for T {
    fn on_configuration_update(&self, configuration: &Configuration) {
        self(configuration);
    }
}

type BoxedListener = Arc<dyn ConfigurationUpdateListener + Send + Sync>;

/// Listeners in registration order.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: Mutex<Vec<BoxedListener>>,
}

impl ListenerRegistry {
    pub fn register(&self, listener: impl ConfigurationUpdateListener + Send + Sync + 'static) {
        match self.listeners.lock() {
            Ok(mut listeners) => listeners.push(Arc::new(listener)),
            Err(poisoned) => poisoned.into_inner().push(Arc::new(listener)),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Notify every listener in registration order. A panicking listener is logged and does not
    /// prevent the following listeners from being notified.
    pub fn notify(&self, configuration: &Configuration) {
        // Listeners are called outside of the lock, so they may register other listeners.
        for (index, listener) in self.snapshot().iter().enumerate() {
            let result = catch_unwind(AssertUnwindSafe(|| {
                listener.on_configuration_update(configuration)
            }));
            if result.is_err() {
                log::error!(target: "appconfiguration", listener_index = index; "configuration update listener panicked");
            }
        }
    }

    fn snapshot(&self) -> Vec<BoxedListener> {
        match self.listeners.lock() {
            Ok(listeners) => listeners.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
