//! Where configuration comes from: the App Configuration service or a local file.
use std::path::{Path, PathBuf};

use crate::{models::Configuration, Result};

/// A source of configuration snapshots.
///
/// The source is chosen once, when the context is set, and cannot be switched afterward.
pub trait ConfigurationSource: Send {
    /// Fetch and parse a complete configuration.
    fn fetch_configuration(&mut self) -> Result<Configuration>;

    /// Whether the source can provide updates after the first fetch. Sessions never poll a
    /// source that returns `false`.
    fn supports_live_updates(&self) -> bool;
}

/// Reads a configuration JSON document from disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Create a source reading `path` on every fetch.
    pub fn new(path: impl Into<PathBuf>) -> FileSource {
        FileSource { path: path.into() }
    }

    /// Path of the configuration file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigurationSource for FileSource {
    fn fetch_configuration(&mut self) -> Result<Configuration> {
        log::debug!(target: "appconfiguration", path:debug = self.path; "reading configuration file");
        let bytes = std::fs::read(&self.path)?;
        Configuration::from_json(&bytes)
    }

    fn supports_live_updates(&self) -> bool {
        false
    }
}
