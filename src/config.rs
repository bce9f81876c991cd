use std::time::Duration;

use crate::{poller_thread::PollerThreadConfig, AppConfiguration};

/// Configuration for [`AppConfiguration`].
///
/// # Examples
/// ```
/// # use std::time::Duration;
/// # use appconfiguration::ClientConfig;
/// let client = ClientConfig::new()
///     .poll_interval(Duration::from_secs(60))
///     .to_client();
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) override_server_host: Option<String>,
    pub(crate) poller: PollerThreadConfig,
    pub(crate) request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            override_server_host: None,
            poller: PollerThreadConfig::default(),
            request_timeout: ClientConfig::DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Default timeout of a single HTTP request.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a default configuration.
    pub fn new() -> Self {
        ClientConfig::default()
    }

    /// Override the service and IAM host (e.g. `https://apprapp.example.com`). Clients should use
    /// the default regional endpoints in most cases.
    pub fn override_server_host(mut self, host: impl Into<String>) -> Self {
        self.override_server_host = Some(host.into());
        self
    }

    /// Interval between two configuration refreshes when live updates are enabled.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poller.interval = interval;
        self
    }

    /// Maximum random duration subtracted from the poll interval.
    pub fn poll_jitter(mut self, jitter: Duration) -> Self {
        self.poller.jitter = jitter;
        self
    }

    /// Timeout of a single HTTP request.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Create a new [`AppConfiguration`] session using this configuration.
    pub fn to_client(self) -> AppConfiguration {
        AppConfiguration::with_config(self)
    }
}
