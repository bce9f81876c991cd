//! Features, properties and segments, and the versioned parser that builds a [`Configuration`]
//! snapshot out of a service response or a local configuration file.
use std::collections::{hash_map::Entry, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    rules::Rule,
    value::{ConfigurationType, Value, ValueFormat},
    Error, Result,
};

/// Value placeholder meaning "inherit from the feature or property".
const DEFAULT_PLACEHOLDER: &str = "$default";

const FULL_ROLLOUT: u32 = 100;

/// A feature flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub(crate) name: String,
    pub(crate) feature_id: String,
    pub(crate) feature_type: ConfigurationType,
    pub(crate) format: ValueFormat,
    pub(crate) enabled: bool,
    pub(crate) enabled_value: Value,
    pub(crate) disabled_value: Value,
    pub(crate) rollout_percentage: u32,
    pub(crate) segment_rules: Vec<TargetingRule>,
}

impl Feature {
    /// Display name of the feature.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unique id of the feature.
    pub fn feature_id(&self) -> &str {
        &self.feature_id
    }

    /// Declared type of the feature values.
    pub fn feature_type(&self) -> ConfigurationType {
        self.feature_type
    }

    /// Format of string values.
    pub fn format(&self) -> ValueFormat {
        self.format
    }

    /// Whether the feature is switched on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Value served while the feature is enabled.
    pub fn enabled_value(&self) -> &Value {
        &self.enabled_value
    }

    /// Value served while the feature is disabled.
    pub fn disabled_value(&self) -> &Value {
        &self.disabled_value
    }

    /// Percentage of entities receiving `enabled_value` when no targeting rule applies.
    pub fn rollout_percentage(&self) -> u32 {
        self.rollout_percentage
    }

    /// Targeting rules, sorted by `order`.
    pub fn segment_rules(&self) -> &[TargetingRule] {
        &self.segment_rules
    }
}

/// A property: a typed configuration value with optional targeting.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub(crate) name: String,
    pub(crate) property_id: String,
    pub(crate) property_type: ConfigurationType,
    pub(crate) format: ValueFormat,
    pub(crate) value: Value,
    pub(crate) segment_rules: Vec<TargetingRule>,
}

impl Property {
    /// Display name of the property.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unique id of the property.
    pub fn property_id(&self) -> &str {
        &self.property_id
    }

    /// Declared type of the property values.
    pub fn property_type(&self) -> ConfigurationType {
        self.property_type
    }

    /// Format of string values.
    pub fn format(&self) -> ValueFormat {
        self.format
    }

    /// Value served when no targeting rule applies.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Targeting rules, sorted by `order`.
    pub fn segment_rules(&self) -> &[TargetingRule] {
        &self.segment_rules
    }
}

/// A named, reusable set of rules. An entity belongs to the segment if it satisfies every rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub(crate) name: String,
    pub(crate) segment_id: String,
    pub(crate) rules: Vec<Rule>,
}

impl Segment {
    /// Display name of the segment.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unique id of the segment.
    pub fn segment_id(&self) -> &str {
        &self.segment_id
    }

    /// Rules an entity must all satisfy.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

/// How the segments referenced by a [`TargetingRule`] are combined.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    /// The entity must belong to at least one of the segments.
    #[default]
    Or,
    /// The entity must belong to all of the segments.
    And,
}

/// Value applied by a matching [`TargetingRule`].
#[derive(Debug, Clone, PartialEq)]
pub enum RuleValue {
    /// Use the base value of the feature (`enabled_value`) or property (`value`).
    Inherited,
    /// Use this value.
    Value(Value),
}

/// Targeting rule of a feature or property.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetingRule {
    pub(crate) segments: Vec<String>,
    pub(crate) combinator: Combinator,
    pub(crate) value: RuleValue,
    pub(crate) rollout_percentage: u32,
    pub(crate) order: Option<u32>,
}

impl TargetingRule {
    /// Ids of the referenced segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// How the referenced segments are combined.
    pub fn combinator(&self) -> Combinator {
        self.combinator
    }

    /// Value served to matching entities.
    pub fn value(&self) -> &RuleValue {
        &self.value
    }

    /// Percentage of matching entities the rule applies to.
    pub fn rollout_percentage(&self) -> u32 {
        self.rollout_percentage
    }
}

/// An immutable snapshot of all features, properties and segments of one collection and
/// environment.
///
/// A snapshot is never modified. Refreshing the configuration builds a new snapshot that replaces
/// the previous one as a whole.
#[derive(Debug, Clone)]
pub struct Configuration {
    fetched_at: DateTime<Utc>,
    features: HashMap<String, Arc<Feature>>,
    properties: HashMap<String, Arc<Property>>,
    segments: HashMap<String, Segment>,
}

impl Configuration {
    /// Version of the payload format understood by [`Configuration::from_json`].
    pub const FORMAT_VERSION: u32 = 1;

    /// Parse a configuration payload (service response or local file).
    ///
    /// Parsing fails closed: any missing identity, value of the wrong type, duplicate id, or
    /// out-of-range rollout rejects the whole payload with [`Error::MalformedConfig`].
    pub fn from_json(bytes: &[u8]) -> Result<Configuration> {
        let json: ConfigurationJson = serde_json::from_slice(bytes)?;
        json.try_into()
    }

    /// Timestamp when the configuration was loaded by the SDK.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Look up a feature by id.
    pub fn get_feature(&self, feature_id: &str) -> Option<&Arc<Feature>> {
        self.features.get(feature_id)
    }

    /// All features, keyed by id.
    pub fn features(&self) -> &HashMap<String, Arc<Feature>> {
        &self.features
    }

    /// Look up a property by id.
    pub fn get_property(&self, property_id: &str) -> Option<&Arc<Property>> {
        self.properties.get(property_id)
    }

    /// All properties, keyed by id.
    pub fn properties(&self) -> &HashMap<String, Arc<Property>> {
        &self.properties
    }

    /// Look up a segment by id.
    pub fn get_segment(&self, segment_id: &str) -> Option<&Segment> {
        self.segments.get(segment_id)
    }

    /// All segments, keyed by id.
    pub fn segments(&self) -> &HashMap<String, Segment> {
        &self.segments
    }
}

/// Snapshots are equal if their contents are, regardless of when they were fetched.
impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.features == other.features
            && self.properties == other.properties
            && self.segments == other.segments
    }
}

#[derive(Debug, Deserialize)]
struct ConfigurationJson {
    #[serde(default, alias = "features")]
    feature_flags: Vec<FeatureJson>,
    #[serde(default)]
    properties: Vec<PropertyJson>,
    #[serde(default)]
    segments: Vec<SegmentJson>,
}

#[derive(Debug, Deserialize)]
struct FeatureJson {
    #[serde(default)]
    name: String,
    feature_id: String,
    #[serde(default, rename = "type")]
    feature_type: Option<ConfigurationType>,
    #[serde(default)]
    format: Option<ValueFormat>,
    #[serde(default)]
    enabled: bool,
    enabled_value: serde_json::Value,
    disabled_value: serde_json::Value,
    #[serde(default)]
    rollout_percentage: Option<u32>,
    #[serde(default)]
    segment_rules: Vec<TargetingRuleJson>,
}

#[derive(Debug, Deserialize)]
struct PropertyJson {
    #[serde(default)]
    name: String,
    property_id: String,
    #[serde(default, rename = "type")]
    property_type: Option<ConfigurationType>,
    #[serde(default)]
    format: Option<ValueFormat>,
    value: serde_json::Value,
    #[serde(default)]
    segment_rules: Vec<TargetingRuleJson>,
}

#[derive(Debug, Deserialize)]
struct SegmentJson {
    #[serde(default)]
    name: String,
    segment_id: String,
    #[serde(default)]
    rules: Vec<Rule>,
}

#[derive(Debug, Deserialize)]
struct TargetingRuleJson {
    rules: Vec<SegmentGroupJson>,
    #[serde(default)]
    combinator: Combinator,
    value: serde_json::Value,
    #[serde(default)]
    rollout_percentage: Option<RolloutJson>,
    #[serde(default)]
    order: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SegmentGroupJson {
    segments: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RolloutJson {
    Percentage(u32),
    Placeholder(String),
}

impl TryFrom<ConfigurationJson> for Configuration {
    type Error = Error;

    fn try_from(json: ConfigurationJson) -> Result<Configuration> {
        let mut features = HashMap::with_capacity(json.feature_flags.len());
        for feature in json.feature_flags {
            let feature = Feature::try_from(feature)?;
            insert_unique(&mut features, feature.feature_id.clone(), Arc::new(feature))?;
        }

        let mut properties = HashMap::with_capacity(json.properties.len());
        for property in json.properties {
            let property = Property::try_from(property)?;
            insert_unique(&mut properties, property.property_id.clone(), Arc::new(property))?;
        }

        let mut segments = HashMap::with_capacity(json.segments.len());
        for segment in json.segments {
            require_id("segment_id", &segment.segment_id)?;
            insert_unique(
                &mut segments,
                segment.segment_id.clone(),
                Segment {
                    name: segment.name,
                    segment_id: segment.segment_id,
                    rules: segment.rules,
                },
            )?;
        }

        Ok(Configuration {
            fetched_at: Utc::now(),
            features,
            properties,
            segments,
        })
    }
}

impl TryFrom<FeatureJson> for Feature {
    type Error = Error;

    fn try_from(json: FeatureJson) -> Result<Feature> {
        require_id("feature_id", &json.feature_id)?;
        let feature_type = json.feature_type.unwrap_or_default();
        let format = json.format.unwrap_or_default();

        let enabled_value = typed_value(&json.feature_id, &json.enabled_value, feature_type, format)?;
        let disabled_value =
            typed_value(&json.feature_id, &json.disabled_value, feature_type, format)?;
        let rollout_percentage = percentage(&json.feature_id, json.rollout_percentage)?;

        let segment_rules = targeting_rules(
            &json.feature_id,
            json.segment_rules,
            feature_type,
            format,
            rollout_percentage,
        )?;

        Ok(Feature {
            name: json.name,
            feature_id: json.feature_id,
            feature_type,
            format,
            enabled: json.enabled,
            enabled_value,
            disabled_value,
            rollout_percentage,
            segment_rules,
        })
    }
}

impl TryFrom<PropertyJson> for Property {
    type Error = Error;

    fn try_from(json: PropertyJson) -> Result<Property> {
        require_id("property_id", &json.property_id)?;
        let property_type = json.property_type.unwrap_or_default();
        let format = json.format.unwrap_or_default();

        let value = typed_value(&json.property_id, &json.value, property_type, format)?;
        let segment_rules = targeting_rules(
            &json.property_id,
            json.segment_rules,
            property_type,
            format,
            FULL_ROLLOUT,
        )?;

        Ok(Property {
            name: json.name,
            property_id: json.property_id,
            property_type,
            format,
            value,
            segment_rules,
        })
    }
}

/// Convert targeting rules, resolving `$default` placeholders. Rules are ordered by their `order`
/// field; rules without one go last, and declaration order breaks ties.
fn targeting_rules(
    owner_id: &str,
    rules: Vec<TargetingRuleJson>,
    value_type: ConfigurationType,
    format: ValueFormat,
    inherited_rollout: u32,
) -> Result<Vec<TargetingRule>> {
    let mut result = rules
        .into_iter()
        .map(|rule| {
            let segments: Vec<String> = rule
                .rules
                .into_iter()
                .flat_map(|group| group.segments)
                .collect();
            if segments.is_empty() {
                return Err(malformed(owner_id, "targeting rule references no segments"));
            }

            let value = match &rule.value {
                serde_json::Value::String(s) if s == DEFAULT_PLACEHOLDER => RuleValue::Inherited,
                raw => RuleValue::Value(typed_value(owner_id, raw, value_type, format)?),
            };

            let rollout_percentage = match rule.rollout_percentage {
                None => FULL_ROLLOUT,
                Some(RolloutJson::Placeholder(s)) if s == DEFAULT_PLACEHOLDER => inherited_rollout,
                Some(RolloutJson::Placeholder(s)) => {
                    return Err(malformed(
                        owner_id,
                        &format!("invalid rollout_percentage {s:?}"),
                    ))
                }
                Some(RolloutJson::Percentage(p)) => percentage(owner_id, Some(p))?,
            };

            Ok(TargetingRule {
                segments,
                combinator: rule.combinator,
                value,
                rollout_percentage,
                order: rule.order,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    // `sort_by_key` is stable.
    result.sort_by_key(|rule| (rule.order.is_none(), rule.order));
    Ok(result)
}

fn typed_value(
    owner_id: &str,
    raw: &serde_json::Value,
    value_type: ConfigurationType,
    format: ValueFormat,
) -> Result<Value> {
    Value::from_json(raw, value_type, format).ok_or_else(|| {
        malformed(
            owner_id,
            &format!("value {raw} does not match type {value_type:?}"),
        )
    })
}

fn percentage(owner_id: &str, value: Option<u32>) -> Result<u32> {
    match value {
        None => Ok(FULL_ROLLOUT),
        Some(p) if p <= FULL_ROLLOUT => Ok(p),
        Some(p) => Err(malformed(
            owner_id,
            &format!("rollout_percentage {p} is out of range"),
        )),
    }
}

fn require_id(field: &'static str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::MalformedConfig(format!("{field} must not be empty")));
    }
    Ok(())
}

fn insert_unique<T>(map: &mut HashMap<String, T>, id: String, value: T) -> Result<()> {
    match map.entry(id) {
        Entry::Occupied(entry) => Err(Error::MalformedConfig(format!(
            "duplicate id {:?}",
            entry.key()
        ))),
        Entry::Vacant(entry) => {
            entry.insert(value);
            Ok(())
        }
    }
}

fn malformed(owner_id: &str, message: &str) -> Error {
    Error::MalformedConfig(format!("{owner_id}: {message}"))
}
