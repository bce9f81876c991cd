//! Evaluation of features and properties for an entity.
use serde::Serialize;

use crate::{
    models::{Combinator, Configuration, Feature, Property, RuleValue, Segment, TargetingRule},
    sharder::Sharder,
    Attributes, Error, Result, Value,
};

/// Something that can be evaluated against targeting rules: a [`Feature`] or a [`Property`].
pub trait Targetable {
    /// Identity used for rollout bucketing.
    fn targetable_id(&self) -> &str;

    /// Targeting rules, in evaluation order.
    fn segment_rules(&self) -> &[TargetingRule];

    /// Value used when no targeting rule applies, and for `$default` rule values.
    fn base_value(&self) -> &Value;

    /// Value returned without evaluating any rule, if the targetable is switched off.
    fn disabled_value(&self) -> Option<&Value> {
        None
    }

    /// Rollout applied to `base_value()` when no targeting rule applies, with the value used for
    /// entities left out of it.
    fn base_rollout(&self) -> Option<(u32, &Value)> {
        None
    }
}

impl Targetable for Feature {
    fn targetable_id(&self) -> &str {
        &self.feature_id
    }

    fn segment_rules(&self) -> &[TargetingRule] {
        &self.segment_rules
    }

    fn base_value(&self) -> &Value {
        &self.enabled_value
    }

    fn disabled_value(&self) -> Option<&Value> {
        (!self.enabled).then_some(&self.disabled_value)
    }

    fn base_rollout(&self) -> Option<(u32, &Value)> {
        Some((self.rollout_percentage, &self.disabled_value))
    }
}

impl Targetable for Property {
    fn targetable_id(&self) -> &str {
        &self.property_id
    }

    fn segment_rules(&self) -> &[TargetingRule] {
        &self.segment_rules
    }

    fn base_value(&self) -> &Value {
        &self.value
    }
}

/// Why an evaluation produced its value.
#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationReason {
    /// The feature is disabled, `disabled_value` was returned.
    Disabled,
    /// A targeting rule matched the entity.
    TargetingMatch,
    /// No targeting rule applied, the base value was returned.
    Default,
    /// No targeting rule applied and the entity is outside the feature rollout.
    RolloutExcluded,
}

/// Result of evaluating a feature or property for an entity.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct Evaluation {
    /// The evaluated value.
    pub value: Value,
    /// Index of the targeting rule that produced the value, if any.
    pub matched_rule: Option<usize>,
    /// Why `value` was chosen.
    pub reason: EvaluationReason,
}

/// Evaluate `targetable` for the entity.
///
/// Targeting rules are tried in order and the first one that matches wins. A matching rule whose
/// rollout does not admit the entity is skipped as if it did not match.
///
/// # Errors
///
/// Returns [`Error::InvalidEntity`] if `entity_id` is empty.
pub fn evaluate(
    configuration: &Configuration,
    targetable: &impl Targetable,
    entity_id: &str,
    entity_attributes: &Attributes,
    sharder: &impl Sharder,
) -> Result<Evaluation> {
    if entity_id.is_empty() {
        return Err(Error::InvalidEntity);
    }

    if let Some(value) = targetable.disabled_value() {
        return Ok(Evaluation {
            value: value.clone(),
            matched_rule: None,
            reason: EvaluationReason::Disabled,
        });
    }

    let id = targetable.targetable_id();

    let matched = targetable
        .segment_rules()
        .iter()
        .enumerate()
        .find(|(_, rule)| {
            rule.matches(configuration, id, entity_attributes)
                && sharder.is_in_rollout(entity_id, id, rule.rollout_percentage)
        });

    if let Some((index, rule)) = matched {
        let value = match &rule.value {
            RuleValue::Inherited => targetable.base_value(),
            RuleValue::Value(value) => value,
        };
        return Ok(Evaluation {
            value: value.clone(),
            matched_rule: Some(index),
            reason: EvaluationReason::TargetingMatch,
        });
    }

    match targetable.base_rollout() {
        Some((percentage, excluded_value)) if !sharder.is_in_rollout(entity_id, id, percentage) => {
            Ok(Evaluation {
                value: excluded_value.clone(),
                matched_rule: None,
                reason: EvaluationReason::RolloutExcluded,
            })
        }
        _ => Ok(Evaluation {
            value: targetable.base_value().clone(),
            matched_rule: None,
            reason: EvaluationReason::Default,
        }),
    }
}

impl TargetingRule {
    fn matches(&self, configuration: &Configuration, owner_id: &str, attributes: &Attributes) -> bool {
        let mut segments = self.segments.iter().map(|segment_id| {
            match configuration.get_segment(segment_id) {
                Some(segment) => segment.matches(attributes),
                None => {
                    log::warn!(target: "appconfiguration",
                               owner_id,
                               segment_id:display = segment_id;
                               "targeting rule references an unknown segment");
                    false
                }
            }
        });

        match self.combinator {
            Combinator::Or => segments.any(|matched| matched),
            Combinator::And => segments.all(|matched| matched),
        }
    }
}

impl Segment {
    /// Return `true` if the entity satisfies every rule of the segment.
    pub fn matches(&self, attributes: &Attributes) -> bool {
        self.rules.iter().all(|rule| rule.eval(attributes))
    }
}
