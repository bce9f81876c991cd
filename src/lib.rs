//! The Rust SDK for App Configuration, a service to manage feature flags and properties and to
//! target their values at segments of users.
//!
//! # Overview
//!
//! The SDK revolves around an [`AppConfiguration`] session. A session is bound to a collection
//! and an environment, and keeps an immutable [`Configuration`] snapshot in memory, fetched from
//! the service (and refreshed in the background) or read from a local file.
//!
//! Features and properties are evaluated for `entities`, where each entity has a unique id and
//! key-value [`Attributes`] associated with it. Targeting rules select a value for entities
//! belonging to segments, and percentage rollouts admit a stable subset of entities.
//!
//! ```no_run
//! # use appconfiguration::{AppConfiguration, AttributeValue, Attributes};
//! let mut client = AppConfiguration::new();
//! client.init(AppConfiguration::REGION_US_SOUTH, "<guid>", "<apikey>")?;
//! client.set_context("<collection_id>", "<environment_id>", None, true)?;
//! client.wait_for_configuration()?;
//!
//! let attributes = Attributes::from([(
//!     "email".to_owned(),
//!     AttributeValue::from("alice@example.com"),
//! )]);
//! if let Some(feature) = client.get_feature("discount") {
//!     println!("{:?}", feature.get_current_value("alice", &attributes));
//! }
//! # Ok::<(), appconfiguration::Error>(())
//! ```
//!
//! Register a [`ConfigurationUpdateListener`] to be notified after each successful refresh.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Session methods also log every error they return, and reads return `None` instead of failing,
//! so applications may ignore errors in production. The returned errors are valuable for
//! debugging and usually indicate that developer's attention is needed.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages, under
//! the `appconfiguration` target. Consider integrating a `log`-compatible logger implementation
//! for better visibility into SDK operations.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod attributes;
mod client;
mod config;
mod error;
mod listeners;
mod models;
mod snapshot;
mod value;

pub mod configuration_fetcher;
pub mod configuration_handler;
pub mod configuration_source;
pub mod configuration_store;
pub mod eval;
pub mod poller_thread;
pub mod rules;
pub mod sharder;

pub use attributes::{AttributeValue, Attributes};
pub use client::AppConfiguration;
pub use config::ClientConfig;
pub use configuration_handler::{HandlerState, LoadOutcome};
pub use error::{Error, Result};
pub use eval::{Evaluation, EvaluationReason};
pub use listeners::ConfigurationUpdateListener;
pub use models::{
    Combinator, Configuration, Feature, Property, RuleValue, Segment, TargetingRule,
};
pub use poller_thread::RefreshHandle;
pub use snapshot::{FeatureSnapshot, PropertySnapshot};
pub use value::{ConfigurationType, Value, ValueFormat};
