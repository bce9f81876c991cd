//! Handles returned to applications for evaluating a feature or property.
use std::{ops::Deref, sync::Arc};

use crate::{
    eval::{evaluate, Evaluation},
    models::{Configuration, Feature, Property},
    sharder::Md5Sharder,
    Attributes, Result, Value,
};

/// A feature together with the configuration snapshot it was read from.
///
/// The snapshot holds all the values, rules and segments, so it always evaluates the same entity
/// to the same value. Refreshes do not affect it: request the feature again to observe updates.
#[derive(Debug, Clone)]
pub struct FeatureSnapshot {
    feature: Arc<Feature>,
    configuration: Arc<Configuration>,
}

impl FeatureSnapshot {
    pub(crate) fn new(feature: Arc<Feature>, configuration: Arc<Configuration>) -> Self {
        FeatureSnapshot {
            feature,
            configuration,
        }
    }

    /// Evaluate the feature for an entity, with details on how the value was chosen.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::InvalidEntity`] if `entity_id` is empty.
    pub fn evaluate(&self, entity_id: &str, entity_attributes: &Attributes) -> Result<Evaluation> {
        evaluate(
            &self.configuration,
            &*self.feature,
            entity_id,
            entity_attributes,
            &Md5Sharder,
        )
    }

    /// Get the evaluated value of the feature for an entity.
    ///
    /// Returns `None` (and logs an error) if `entity_id` is empty.
    ///
    /// ```
    /// # use appconfiguration::{AttributeValue, Attributes};
    /// # fn test(feature: appconfiguration::FeatureSnapshot) {
    /// let attributes = Attributes::from([("city".to_owned(), AttributeValue::from("Bangalore"))]);
    /// let enabled = feature
    ///     .get_current_value("user-id", &attributes)
    ///     .and_then(|value| value.as_boolean())
    ///     .unwrap_or(false);
    /// # }
    /// ```
    pub fn get_current_value(
        &self,
        entity_id: &str,
        entity_attributes: &Attributes,
    ) -> Option<Value> {
        self.evaluate(entity_id, entity_attributes)
            .inspect_err(|err| {
                log::error!(target: "appconfiguration",
                            feature_id:display = self.feature.feature_id;
                            "feature evaluation failed: {err}");
            })
            .ok()
            .map(|evaluation| evaluation.value)
    }
}

impl Deref for FeatureSnapshot {
    type Target = Feature;

    fn deref(&self) -> &Feature {
        &self.feature
    }
}

/// A property together with the configuration snapshot it was read from.
///
/// Like [`FeatureSnapshot`], it is not affected by later refreshes.
#[derive(Debug, Clone)]
pub struct PropertySnapshot {
    property: Arc<Property>,
    configuration: Arc<Configuration>,
}

impl PropertySnapshot {
    pub(crate) fn new(property: Arc<Property>, configuration: Arc<Configuration>) -> Self {
        PropertySnapshot {
            property,
            configuration,
        }
    }

    /// Evaluate the property for an entity, with details on how the value was chosen.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::InvalidEntity`] if `entity_id` is empty.
    pub fn evaluate(&self, entity_id: &str, entity_attributes: &Attributes) -> Result<Evaluation> {
        evaluate(
            &self.configuration,
            &*self.property,
            entity_id,
            entity_attributes,
            &Md5Sharder,
        )
    }

    /// Get the evaluated value of the property for an entity.
    ///
    /// Returns `None` (and logs an error) if `entity_id` is empty.
    pub fn get_current_value(
        &self,
        entity_id: &str,
        entity_attributes: &Attributes,
    ) -> Option<Value> {
        self.evaluate(entity_id, entity_attributes)
            .inspect_err(|err| {
                log::error!(target: "appconfiguration",
                            property_id:display = self.property.property_id;
                            "property evaluation failed: {err}");
            })
            .ok()
            .map(|evaluation| evaluation.value)
    }
}

impl Deref for PropertySnapshot {
    type Target = Property;

    fn deref(&self) -> &Property {
        &self.property
    }
}
