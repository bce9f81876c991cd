//! Segment rules: predicates over entity attributes.
use derive_more::From;
use serde::{Deserialize, Serialize};

use crate::{AttributeValue, Attributes};

/// A single predicate of a segment. The segment matches an entity only if all of its rules do.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Rule {
    pub(crate) attribute_name: String,
    pub(crate) operator: Operator,
    pub(crate) values: Vec<Operand>,
}

impl Rule {
    /// Evaluate the rule against entity attributes.
    ///
    /// An attribute that is absent (or null) never matches, whatever the operator is.
    pub fn eval(&self, attributes: &Attributes) -> bool {
        let attribute = match attributes.get(&self.attribute_name) {
            Some(value) if !value.is_null() => value,
            _ => return false,
        };

        match self.operator.try_eval(attribute, &self.values) {
            Some(result) => result,
            None => {
                log::warn!(target: "appconfiguration",
                           attribute_name:display = self.attribute_name,
                           operator:debug = self.operator;
                           "attribute type does not match rule operands, treating as non-matching");
                false
            }
        }
    }

    /// Name of the entity attribute the rule reads.
    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    /// Comparison applied to the attribute.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Operands compared with the attribute.
    pub fn values(&self) -> &[Operand] {
        &self.values
    }
}

/// An operand of a rule, as found in the configuration payload.
#[derive(Debug, Serialize, Deserialize, PartialEq, From, Clone)]
#[serde(untagged)]
pub enum Operand {
    /// A boolean operand.
    Boolean(bool),
    /// A numeric operand.
    Number(f64),
    /// A string operand. Numeric and boolean strings are coerced when compared against numeric
    /// and boolean attributes.
    String(String),
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl Operand {
    /// Numeric view of the operand. Numeric strings are accepted as the service sends most
    /// operands as strings.
    fn as_number(&self) -> Option<f64> {
        match self {
            Operand::Number(n) => Some(*n),
            Operand::String(s) => s.trim().parse().ok(),
            Operand::Boolean(_) => None,
        }
    }
}

/// Comparison operator of a [`Rule`], serialized in camelCase (`isNot`, `greaterThanEquals`, ...).
#[allow(missing_docs)]
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Is,
    IsNot,
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    OneOf,
    NotOneOf,
    GreaterThan,
    GreaterThanEquals,
    LesserThan,
    LesserThanEquals,
}

impl Operator {
    /// Applying `Operator` to the values. Returns `false` if the operator cannot be applied or
    /// there's a misconfiguration.
    pub fn eval(&self, attribute: &AttributeValue, operands: &[Operand]) -> bool {
        self.try_eval(attribute, operands).unwrap_or(false)
    }

    /// Try applying `Operator` to the values, returning `None` if the operator cannot be applied
    /// to the attribute type.
    ///
    /// Positive operators match if any operand matches. Negative operators match if none of the
    /// operands matches the positive form.
    fn try_eval(&self, attribute: &AttributeValue, operands: &[Operand]) -> Option<bool> {
        let (positive, negated) = self.positive_form();

        let mut any_match = false;
        let mut any_comparable = false;
        for operand in operands {
            match positive.matches(attribute, operand) {
                Some(true) => {
                    any_match = true;
                    break;
                }
                Some(false) => any_comparable = true,
                None => {}
            }
        }

        match (any_match, any_comparable, negated) {
            (true, _, negated) => Some(!negated),
            (false, true, negated) => Some(negated),
            // Nothing could be compared with the attribute.
            (false, false, _) if !operands.is_empty() => None,
            (false, false, negated) => Some(negated),
        }
    }

    fn positive_form(&self) -> (Operator, bool) {
        match self {
            Self::IsNot => (Self::Is, true),
            Self::NotContains => (Self::Contains, true),
            Self::NotStartsWith => (Self::StartsWith, true),
            Self::NotEndsWith => (Self::EndsWith, true),
            Self::NotOneOf => (Self::OneOf, true),
            op => (*op, false),
        }
    }

    /// Match a single operand with a positive operator.
    fn matches(&self, attribute: &AttributeValue, operand: &Operand) -> Option<bool> {
        match self {
            Self::Is | Self::OneOf => match (attribute, operand) {
                (AttributeValue::String(a), Operand::String(o)) => Some(a == o),
                (AttributeValue::Number(a), operand) => Some(*a == operand.as_number()?),
                (AttributeValue::Boolean(a), Operand::Boolean(o)) => Some(a == o),
                (AttributeValue::Boolean(a), Operand::String(o)) => {
                    Some(*a == o.parse::<bool>().ok()?)
                }
                _ => None,
            },

            Self::Contains | Self::StartsWith | Self::EndsWith => {
                let (AttributeValue::String(a), Operand::String(o)) = (attribute, operand) else {
                    return None;
                };
                Some(match self {
                    Self::Contains => a.contains(o.as_str()),
                    Self::StartsWith => a.starts_with(o.as_str()),
                    _ => a.ends_with(o.as_str()),
                })
            }

            Self::GreaterThan | Self::GreaterThanEquals | Self::LesserThan | Self::LesserThanEquals => {
                let a = attribute.as_number()?;
                let o = operand.as_number()?;
                Some(match self {
                    Self::GreaterThan => a > o,
                    Self::GreaterThanEquals => a >= o,
                    Self::LesserThan => a < o,
                    _ => a <= o,
                })
            }

            // Negative operators are resolved by `positive_form()`.
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{Operand, Operator, Rule};

    #[test]
    fn is() {
        assert!(Operator::Is.eval(&"NY".into(), &["NY".into()]));
        assert!(!Operator::Is.eval(&"LA".into(), &["NY".into()]));
        assert!(Operator::Is.eval(&"LA".into(), &["NY".into(), "LA".into()]));
    }

    #[test]
    fn is_not() {
        assert!(Operator::IsNot.eval(&"LA".into(), &["NY".into()]));
        assert!(!Operator::IsNot.eval(&"NY".into(), &["NY".into(), "LA".into()]));
        assert!(!Operator::IsNot.eval(&"LA".into(), &["NY".into(), "LA".into()]));
    }

    #[test]
    fn is_numeric_and_boolean() {
        assert!(Operator::Is.eval(&42.0.into(), &["42".into()]));
        assert!(Operator::Is.eval(&42.0.into(), &[42.0.into()]));
        assert!(!Operator::Is.eval(&41.0.into(), &["42".into()]));
        assert!(Operator::Is.eval(&true.into(), &["true".into()]));
        assert!(Operator::Is.eval(&false.into(), &[false.into()]));
        assert!(!Operator::Is.eval(&true.into(), &["false".into()]));
    }

    #[test]
    fn one_of() {
        let operands: Vec<Operand> = vec!["alice".into(), "bob".into()];
        assert!(Operator::OneOf.eval(&"alice".into(), &operands));
        assert!(Operator::OneOf.eval(&"bob".into(), &operands));
        assert!(!Operator::OneOf.eval(&"charlie".into(), &operands));
        assert!(!Operator::NotOneOf.eval(&"alice".into(), &operands));
        assert!(Operator::NotOneOf.eval(&"charlie".into(), &operands));
    }

    #[test]
    fn contains() {
        assert!(Operator::Contains.eval(&"user@ibm.com".into(), &["@ibm".into()]));
        assert!(!Operator::Contains.eval(&"user@example.com".into(), &["@ibm".into()]));
        assert!(Operator::NotContains.eval(&"user@example.com".into(), &["@ibm".into()]));
        assert!(!Operator::NotContains.eval(&"user@ibm.com".into(), &["@ibm".into()]));
    }

    #[test]
    fn starts_and_ends_with() {
        assert!(Operator::StartsWith.eval(&"test@example.com".into(), &["test".into()]));
        assert!(!Operator::StartsWith.eval(&"example@test.com".into(), &["test".into()]));
        assert!(Operator::NotStartsWith.eval(&"example@test.com".into(), &["test".into()]));
        assert!(Operator::EndsWith.eval(&"user@ibm.com".into(), &["ibm.com".into()]));
        assert!(!Operator::EndsWith.eval(&"user@ibm.org".into(), &["ibm.com".into()]));
        assert!(Operator::NotEndsWith.eval(&"user@ibm.org".into(), &["ibm.com".into()]));
    }

    #[test]
    fn string_operators_need_string_attributes() {
        assert!(!Operator::Contains.eval(&10.0.into(), &["1".into()]));
        assert!(!Operator::NotContains.eval(&10.0.into(), &["1".into()]));
    }

    #[test]
    fn greater_than() {
        assert!(Operator::GreaterThan.eval(&19.0.into(), &["18".into()]));
        assert!(!Operator::GreaterThan.eval(&18.0.into(), &["18".into()]));
        assert!(Operator::GreaterThanEquals.eval(&18.0.into(), &[18.0.into()]));
        assert!(!Operator::GreaterThanEquals.eval(&17.0.into(), &[18.0.into()]));
    }

    #[test]
    fn lesser_than() {
        assert!(Operator::LesserThan.eval(&17.0.into(), &["18".into()]));
        assert!(!Operator::LesserThan.eval(&18.0.into(), &["18".into()]));
        assert!(Operator::LesserThanEquals.eval(&18.0.into(), &["18".into()]));
        assert!(!Operator::LesserThanEquals.eval(&19.0.into(), &["18".into()]));
    }

    #[test]
    fn ordered_operators_reject_string_attributes() {
        assert!(!Operator::GreaterThan.eval(&"20".into(), &["18".into()]));
        assert!(!Operator::LesserThan.eval(&"10".into(), &["18".into()]));
        assert!(!Operator::GreaterThan.eval(&20.0.into(), &["abc".into()]));
    }

    #[test]
    fn single_rule() {
        let rule = Rule {
            attribute_name: "city".into(),
            operator: Operator::Is,
            values: vec!["NY".into()],
        };
        assert!(rule.eval(&HashMap::from([("city".into(), "NY".into())])));
        assert!(!rule.eval(&HashMap::from([("city".into(), "LA".into())])));
    }

    #[test]
    fn missing_attribute() {
        let rule = Rule {
            attribute_name: "age".into(),
            operator: Operator::GreaterThan,
            values: vec!["10".into()],
        };
        assert!(!rule.eval(&HashMap::from([("name".into(), "alice".into())])));
    }

    #[test]
    fn missing_attribute_fails_negative_operators_too() {
        let rule = Rule {
            attribute_name: "city".into(),
            operator: Operator::IsNot,
            values: vec!["NY".into()],
        };
        assert!(!rule.eval(&HashMap::new()));
        assert!(!rule.eval(&HashMap::from([(
            "city".into(),
            crate::AttributeValue::Null
        )])));
    }

    #[test]
    fn parses_wire_format() {
        let rule: Rule = serde_json::from_str(
            r#"{"attribute_name": "email", "operator": "endsWith", "values": ["@ibm.com"]}"#,
        )
        .unwrap();
        assert_eq!(rule.operator(), Operator::EndsWith);
        assert_eq!(rule.values(), &[Operand::from("@ibm.com")]);
    }

    #[test]
    fn unknown_operator_fails_to_parse() {
        let rule = serde_json::from_str::<Rule>(
            r#"{"attribute_name": "email", "operator": "matchesRegex", "values": ["x"]}"#,
        );
        assert!(rule.is_err());
    }
}
