use std::sync::Arc;

use thiserror::Error;

/// Result type used throughout the SDK.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while setting up the SDK, loading configuration, or evaluating features
/// and properties.
///
/// None of these errors are meant to be fatal for the application. The SDK logs every error at
/// the point where it happens, so callers may safely ignore returned errors.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// An argument passed to `init()` or `set_context()` is invalid.
    #[error("invalid argument: {0}")]
    Validation(&'static str),

    /// The configuration payload could not be parsed into features, properties and segments.
    #[error("malformed configuration: {0}")]
    MalformedConfig(String),

    /// Invalid server host or URL.
    #[error("invalid server url")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// The request was unauthorized, the API key is likely invalid.
    #[error("unauthorized, apikey is likely invalid")]
    Unauthorized,

    /// The server answered with a non-success status code.
    #[error("unexpected response status {0}")]
    UnexpectedStatus(u16),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// An I/O error, e.g. while reading a local configuration file.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// Evaluation was requested without a valid entity id.
    #[error("a valid entity id should be passed for evaluation")]
    InvalidEntity,

    /// The operation is not allowed in the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The poller thread panicked. This should normally never happen.
    #[error("poller thread panicked")]
    PollerThreadPanicked,
}

impl Error {
    /// Returns `true` if retrying the same operation later cannot succeed.
    pub(crate) fn is_unrecoverable(&self) -> bool {
        matches!(self, Error::Unauthorized | Error::InvalidBaseUrl(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::MalformedConfig(value.to_string())
    }
}
