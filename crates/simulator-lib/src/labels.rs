//! Label selector evaluation

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("invalid label key {0:?}")]
    InvalidKey(String),
    #[error("{0:?} is not a valid label selector operator")]
    InvalidOperator(String),
    #[error("values for key {key:?} with operator {operator}: {reason}")]
    InvalidValues {
        key: String,
        operator: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Requirement {
    key: String,
    operator: Operator,
    values: Vec<String>,
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            Operator::In => value.is_some_and(|v| self.values.contains(v)),
            Operator::NotIn => value.map_or(true, |v| !self.values.contains(v)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        }
    }
}

/// A validated label selector.
///
/// An absent selector matches nothing; an empty one matches everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    requirements: Option<Vec<Requirement>>,
}

impl Selector {
    pub fn everything() -> Self {
        Self {
            requirements: Some(Vec::new()),
        }
    }

    pub fn nothing() -> Self {
        Self { requirements: None }
    }

    /// Convert an API label selector, validating keys, operators and values
    pub fn from_label_selector(selector: Option<&LabelSelector>) -> Result<Self, SelectorError> {
        let Some(selector) = selector else {
            return Ok(Self::nothing());
        };

        let mut requirements = Vec::new();
        for (key, value) in selector.match_labels.iter().flatten() {
            validate_key(key)?;
            requirements.push(Requirement {
                key: key.clone(),
                operator: Operator::In,
                values: vec![value.clone()],
            });
        }
        for expr in selector.match_expressions.iter().flatten() {
            requirements.push(requirement_from_expression(expr)?);
        }

        Ok(Self {
            requirements: Some(requirements),
        })
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match &self.requirements {
            None => false,
            Some(reqs) => reqs.iter().all(|r| r.matches(labels)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.as_ref().is_some_and(|r| r.is_empty())
    }
}

fn requirement_from_expression(expr: &LabelSelectorRequirement) -> Result<Requirement, SelectorError> {
    validate_key(&expr.key)?;
    let values = expr.values.clone().unwrap_or_default();

    let operator = match expr.operator.as_str() {
        "In" => Operator::In,
        "NotIn" => Operator::NotIn,
        "Exists" => Operator::Exists,
        "DoesNotExist" => Operator::DoesNotExist,
        other => return Err(SelectorError::InvalidOperator(other.to_string())),
    };

    let invalid = |reason| SelectorError::InvalidValues {
        key: expr.key.clone(),
        operator: expr.operator.clone(),
        reason,
    };
    match operator {
        Operator::In | Operator::NotIn if values.is_empty() => {
            return Err(invalid("must be non-empty"));
        }
        Operator::Exists | Operator::DoesNotExist if !values.is_empty() => {
            return Err(invalid("must be empty"));
        }
        _ => {}
    }

    Ok(Requirement {
        key: expr.key.clone(),
        operator,
        values,
    })
}

fn validate_key(key: &str) -> Result<(), SelectorError> {
    let name = key.rsplit_once('/').map_or(key, |(_, name)| name);
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name.ends_with(|c: char| c.is_ascii_alphanumeric());
    if valid {
        Ok(())
    } else {
        Err(SelectorError::InvalidKey(key.to_string()))
    }
}
