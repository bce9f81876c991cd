use std::{collections::HashMap, path::Path, sync::Arc};

use crate::{
    configuration_fetcher::{ConfigurationFetcher, ConfigurationFetcherConfig},
    configuration_handler::{ConfigurationHandler, HandlerState, LoadOutcome},
    configuration_source::{ConfigurationSource, FileSource},
    listeners::ConfigurationUpdateListener,
    models::Configuration,
    poller_thread::{PollerThread, RefreshHandle},
    snapshot::{FeatureSnapshot, PropertySnapshot},
    ClientConfig, Error, Result,
};

struct Credentials {
    region: String,
    guid: String,
    apikey: String,
}

/// A session with the App Configuration service.
///
/// A session is set up in two steps: [`AppConfiguration::init`] stores the service credentials,
/// and [`AppConfiguration::set_context`] selects the collection and environment, loads the
/// configuration, and starts live updates.
///
/// Setup methods log every error they return, so the returned `Result`s may be ignored. Reads
/// never fail: before the configuration is loaded, they return `None`.
///
/// # Examples
/// ```no_run
/// # use appconfiguration::AppConfiguration;
/// let mut client = AppConfiguration::new();
/// client.init(AppConfiguration::REGION_US_SOUTH, "guid", "apikey");
/// client.set_context("collection", "environment", None, true);
///
/// if let Some(feature) = client.get_feature("dark-mode") {
///     let value = feature.get_current_value("user-id", &Default::default());
/// }
/// ```
pub struct AppConfiguration {
    config: ClientConfig,
    credentials: Option<Credentials>,
    handler: Arc<ConfigurationHandler>,
    poller: Option<PollerThread>,
}

impl Default for AppConfiguration {
    fn default() -> Self {
        AppConfiguration::new()
    }
}

impl AppConfiguration {
    /// Dallas.
    pub const REGION_US_SOUTH: &'static str = "us-south";
    /// Washington DC.
    pub const REGION_US_EAST: &'static str = "us-east";
    /// London.
    pub const REGION_EU_GB: &'static str = "eu-gb";
    /// Frankfurt.
    pub const REGION_EU_DE: &'static str = "eu-de";
    /// Sydney.
    pub const REGION_AU_SYD: &'static str = "au-syd";

    /// Create a session with the default [`ClientConfig`].
    pub fn new() -> Self {
        AppConfiguration::with_config(ClientConfig::default())
    }

    /// Create a session with a custom configuration. See also [`ClientConfig::to_client`].
    pub fn with_config(config: ClientConfig) -> Self {
        AppConfiguration {
            config,
            credentials: None,
            handler: Arc::new(ConfigurationHandler::new()),
            poller: None,
        }
    }

    /// Store the service credentials. May be called again to replace them until the context is
    /// set.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if any argument is empty. Previous credentials are kept.
    /// - [`Error::InvalidState`] if the context has already been set.
    pub fn init(&mut self, region: &str, guid: &str, apikey: &str) -> Result<()> {
        if self.handler.state() != HandlerState::Uninitialized {
            return Err(log_error(Error::InvalidState(
                "init() cannot be called after set_context()",
            )));
        }
        for (value, message) in [
            (region, "region must be a non-empty string"),
            (guid, "guid must be a non-empty string"),
            (apikey, "apikey must be a non-empty string"),
        ] {
            if value.trim().is_empty() {
                return Err(log_error(Error::Validation(message)));
            }
        }

        self.credentials = Some(Credentials {
            region: region.to_owned(),
            guid: guid.to_owned(),
            apikey: apikey.to_owned(),
        });
        Ok(())
    }

    /// Region passed to `init()`.
    pub fn get_region(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.region.as_str())
    }

    /// Instance guid passed to `init()`.
    pub fn get_guid(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.guid.as_str())
    }

    /// API key passed to `init()`.
    pub fn get_apikey(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.apikey.as_str())
    }

    /// Select the collection and environment, load the configuration once, and start live
    /// updates.
    ///
    /// With `live_config_update_enabled == false`, the configuration is read from
    /// `configuration_file` only, which is then mandatory. A configuration file also disables
    /// live updates when they are requested: this is reported as an error in the log, and the
    /// file is used without polling.
    ///
    /// A failure to load the configuration is logged and does not fail `set_context()`, reads
    /// keep returning `None` until a later refresh succeeds.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if `init()` has not succeeded, or the context is already set.
    /// - [`Error::Validation`] if an id is empty, or live updates are disabled without a file.
    /// - [`Error::InvalidBaseUrl`] if the service URL cannot be built.
    /// - [`Error::Io`] if the poller thread cannot be started.
    pub fn set_context(
        &mut self,
        collection_id: &str,
        environment_id: &str,
        configuration_file: Option<&Path>,
        live_config_update_enabled: bool,
    ) -> Result<()> {
        let Some(credentials) = &self.credentials else {
            return Err(log_error(Error::InvalidState(
                "init() must be called before set_context()",
            )));
        };
        if self.handler.state() != HandlerState::Uninitialized {
            return Err(log_error(Error::InvalidState("context is already set")));
        }
        if collection_id.trim().is_empty() {
            return Err(log_error(Error::Validation(
                "collection_id must be a non-empty string",
            )));
        }
        if environment_id.trim().is_empty() {
            return Err(log_error(Error::Validation(
                "environment_id must be a non-empty string",
            )));
        }

        let source: Box<dyn ConfigurationSource> = match configuration_file {
            Some(path) => {
                if live_config_update_enabled {
                    log::error!(target: "appconfiguration",
                                path:debug = path;
                                "live configuration updates are not available with a configuration file, using the file only");
                }
                Box::new(FileSource::new(path))
            }
            None if !live_config_update_enabled => {
                return Err(log_error(Error::Validation(
                    "configuration_file is required when live updates are disabled",
                )));
            }
            None => Box::new(
                ConfigurationFetcher::new(ConfigurationFetcherConfig {
                    region: credentials.region.clone(),
                    guid: credentials.guid.clone(),
                    apikey: credentials.apikey.clone(),
                    collection_id: collection_id.to_owned(),
                    environment_id: environment_id.to_owned(),
                    override_server_host: self.config.override_server_host.clone(),
                    request_timeout: self.config.request_timeout,
                })
                .map_err(log_error)?,
            ),
        };
        let live_updates = source.supports_live_updates();

        self.handler.set_source(source).map_err(log_error)?;
        log::debug!(target: "appconfiguration", collection_id, environment_id; "context set");

        // Errors are logged by the handler, the poller retries on the next tick.
        let first_load = self.handler.load_data();

        let unrecoverable = matches!(&first_load, Err(err) if err.is_unrecoverable());
        if live_updates && !unrecoverable {
            let poller = PollerThread::start(self.handler.clone(), self.config.poller.clone())
                .map_err(|err| log_error(Error::from(err)))?;
            self.poller = Some(poller);
        }

        Ok(())
    }

    /// Lifecycle state of the session.
    pub fn state(&self) -> HandlerState {
        self.handler.state()
    }

    /// Fetch the latest configuration now.
    ///
    /// Returns [`LoadOutcome::AlreadyInProgress`] without fetching if a refresh is in flight.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the context is not set.
    /// - The fetch error otherwise. The previous configuration stays active.
    pub fn fetch_configurations(&self) -> Result<LoadOutcome> {
        self.require_context()?;
        self.handler.load_data()
    }

    /// Register a listener called after every successful configuration refresh, in registration
    /// order.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the context is not set. The listener is not registered.
    pub fn register_configuration_update_listener(
        &self,
        listener: impl ConfigurationUpdateListener + Send + Sync + 'static,
    ) -> Result<()> {
        self.require_context()?;
        self.handler.register_configuration_update_listener(listener);
        Ok(())
    }

    /// Block until the first configuration is loaded, or loading failed in a way that cannot be
    /// retried.
    pub fn wait_for_configuration(&self) -> Result<()> {
        self.handler.wait_for_configuration()
    }

    /// A handle to request an immediate refresh from the poller thread, e.g. from a push
    /// notification. `None` when live updates are not running.
    pub fn refresh_handle(&self) -> Option<RefreshHandle> {
        self.poller.as_ref().map(PollerThread::refresh_handle)
    }

    /// Get a feature by id. Returns `None` if the feature does not exist or the configuration has
    /// not been loaded.
    pub fn get_feature(&self, feature_id: &str) -> Option<FeatureSnapshot> {
        let configuration = self.loaded_configuration()?;
        let Some(feature) = configuration.get_feature(feature_id).cloned() else {
            log::error!(target: "appconfiguration", feature_id; "invalid feature id");
            return None;
        };
        Some(FeatureSnapshot::new(feature, configuration))
    }

    /// Get all features, keyed by id.
    pub fn get_features(&self) -> Option<HashMap<String, FeatureSnapshot>> {
        let configuration = self.loaded_configuration()?;
        Some(
            configuration
                .features()
                .iter()
                .map(|(id, feature)| {
                    (
                        id.clone(),
                        FeatureSnapshot::new(feature.clone(), configuration.clone()),
                    )
                })
                .collect(),
        )
    }

    /// Ids of all features, in no particular order.
    pub fn get_feature_ids(&self) -> Option<Vec<String>> {
        Some(
            self.loaded_configuration()?
                .features()
                .keys()
                .cloned()
                .collect(),
        )
    }

    /// Get a property by id. Returns `None` if the property does not exist or the configuration
    /// has not been loaded.
    pub fn get_property(&self, property_id: &str) -> Option<PropertySnapshot> {
        let configuration = self.loaded_configuration()?;
        let Some(property) = configuration.get_property(property_id).cloned() else {
            log::error!(target: "appconfiguration", property_id; "invalid property id");
            return None;
        };
        Some(PropertySnapshot::new(property, configuration))
    }

    /// Get all properties, keyed by id.
    pub fn get_properties(&self) -> Option<HashMap<String, PropertySnapshot>> {
        let configuration = self.loaded_configuration()?;
        Some(
            configuration
                .properties()
                .iter()
                .map(|(id, property)| {
                    (
                        id.clone(),
                        PropertySnapshot::new(property.clone(), configuration.clone()),
                    )
                })
                .collect(),
        )
    }

    /// Ids of all properties, in no particular order.
    pub fn get_property_ids(&self) -> Option<Vec<String>> {
        Some(
            self.loaded_configuration()?
                .properties()
                .keys()
                .cloned()
                .collect(),
        )
    }

    /// Stop live updates and wait for the poller thread to exit.
    ///
    /// Dropping the session stops live updates too, without waiting.
    pub fn shutdown(mut self) -> Result<()> {
        match self.poller.take() {
            Some(poller) => poller.shutdown(),
            None => Ok(()),
        }
    }

    fn require_context(&self) -> Result<()> {
        if self.credentials.is_none() || self.handler.state() == HandlerState::Uninitialized {
            return Err(log_error(Error::InvalidState(
                "init() and set_context() must be called first",
            )));
        }
        Ok(())
    }

    fn loaded_configuration(&self) -> Option<Arc<Configuration>> {
        let configuration = self.handler.get_configuration();
        if configuration.is_none() {
            log::error!(target: "appconfiguration", "configuration has not been loaded yet");
        }
        configuration
    }
}

impl Drop for AppConfiguration {
    fn drop(&mut self) {
        if let Some(poller) = &self.poller {
            poller.stop();
        }
    }
}

fn log_error(err: Error) -> Error {
    log::error!(target: "appconfiguration", "{err}");
    err
}
