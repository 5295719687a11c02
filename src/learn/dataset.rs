//! Numeric encoding of instances for tree training.
//!
//! Numeric and timestamp attributes are stored as `f64` (timestamps as epoch
//! millis). Literal attributes are stored as the index of the value in the
//! sorted literal domain, booleans as an index into `["T", "F"]`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;

use super::error::{LearnError, LearnResult};
use crate::attribute::{AttributeSchema, AttributeType, Instance, Value};
use crate::class::ClassDomain;

/// Nominal domain of boolean attributes.
pub const BOOLEAN_DOMAIN: [&str; 2] = ["T", "F"];

#[derive(Debug, Clone, PartialEq)]
pub enum Encoding {
    Numeric,
    Nominal(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedAttribute {
    pub name: String,
    pub kind: AttributeType,
    pub encoding: Encoding,
}

impl EncodedAttribute {
    /// Position of a nominal value in the domain.
    pub fn nominal_index(&self, value: &str) -> Option<usize> {
        match &self.encoding {
            Encoding::Nominal(domain) => domain.iter().position(|v| v == value),
            Encoding::Numeric => None,
        }
    }

    /// The domain text of a nominal index.
    pub fn nominal_value(&self, index: usize) -> Option<&str> {
        match &self.encoding {
            Encoding::Nominal(domain) => domain.get(index).map(String::as_str),
            Encoding::Numeric => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<Option<f64>>,
    pub class: usize,
    pub weight: f64,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    attributes: Vec<EncodedAttribute>,
    index: HashMap<String, usize>,
    class_labels: Vec<String>,
    rows: Vec<Row>,
}

impl Dataset {
    /// An empty dataset with one column per schema attribute.
    pub fn new(schema: &AttributeSchema, class_labels: Vec<String>) -> Self {
        let attributes: Vec<EncodedAttribute> = schema
            .attributes()
            .map(|(name, kind)| {
                let encoding = match kind {
                    AttributeType::Literal => Encoding::Nominal(
                        schema
                            .literal_values(name)
                            .map(|values| values.iter().cloned().collect())
                            .unwrap_or_default(),
                    ),
                    AttributeType::Boolean => {
                        Encoding::Nominal(BOOLEAN_DOMAIN.iter().map(|s| s.to_string()).collect())
                    }
                    _ => Encoding::Numeric,
                };
                EncodedAttribute {
                    name: name.to_string(),
                    kind,
                    encoding,
                }
            })
            .collect();
        let index = attributes
            .iter()
            .enumerate()
            .map(|(i, a)| (a.name.clone(), i))
            .collect();
        Self {
            attributes,
            index,
            class_labels,
            rows: Vec::new(),
        }
    }

    /// Encode `instances`, mapping each one to a class of `domain` through `target`.
    pub fn from_instances<K>(
        schema: &AttributeSchema,
        instances: &[Instance],
        domain: &ClassDomain<K>,
        target: impl Fn(&Instance) -> K,
    ) -> LearnResult<Self>
    where
        K: Clone + Eq + Hash + fmt::Display,
    {
        if domain.is_empty() {
            return Err(LearnError::NoClasses);
        }
        let mut dataset = Self::new(schema, domain.labels().to_vec());
        dataset.rows.reserve(instances.len());
        for instance in instances {
            let class_key = target(instance);
            let class = domain
                .index_of(&class_key)
                .ok_or_else(|| LearnError::UnknownTarget {
                    class: class_key.to_string(),
                })?;
            let values = dataset.encode_values(&instance.values)?;
            dataset.rows.push(Row {
                values,
                class,
                weight: instance.weight,
            });
        }
        Ok(dataset)
    }

    /// Encode a value map into a row vector. Names outside the schema are ignored.
    pub fn encode_values(&self, values: &BTreeMap<String, Value>) -> LearnResult<Vec<Option<f64>>> {
        let mut row = vec![None; self.attributes.len()];
        for (name, value) in values {
            let Some(&i) = self.index.get(name) else {
                continue;
            };
            row[i] = Some(self.encode_value(&self.attributes[i], value)?);
        }
        Ok(row)
    }

    fn encode_value(&self, attribute: &EncodedAttribute, value: &Value) -> LearnResult<f64> {
        let mismatch = || LearnError::UnsupportedValue {
            attribute: attribute.name.clone(),
            expected: attribute.kind,
            found: value.kind(),
        };
        match (attribute.kind, value) {
            (AttributeType::Literal, Value::Literal(text)) => attribute
                .nominal_index(text)
                .map(|i| i as f64)
                .ok_or_else(|| LearnError::UnknownLiteral {
                    attribute: attribute.name.clone(),
                    value: text.clone(),
                }),
            (AttributeType::Boolean, Value::Boolean(b)) => Ok(if *b { 0.0 } else { 1.0 }),
            (AttributeType::Discrete | AttributeType::Continuous, Value::Discrete(_))
            | (AttributeType::Discrete | AttributeType::Continuous, Value::Continuous(_))
            | (AttributeType::Timestamp, Value::Timestamp(_)) => value.as_f64().ok_or_else(mismatch),
            _ => Err(mismatch()),
        }
    }

    /// A dataset with the same columns and classes holding only `rows`.
    pub fn with_rows(&self, rows: Vec<Row>) -> Self {
        Self {
            attributes: self.attributes.clone(),
            index: self.index.clone(),
            class_labels: self.class_labels.clone(),
            rows,
        }
    }

    pub fn attributes(&self) -> &[EncodedAttribute] {
        &self.attributes
    }

    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn class_labels(&self) -> &[String] {
        &self.class_labels
    }

    pub fn num_classes(&self) -> usize {
        self.class_labels.len()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.rows.iter().map(|r| r.weight).sum()
    }

    /// Whether any row carries a weight above one.
    pub fn has_weights(&self) -> bool {
        self.rows.iter().any(|r| r.weight > 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassId;

    fn schema() -> AttributeSchema {
        AttributeSchema::new()
            .with_attribute("amount", AttributeType::Continuous)
            .with_attribute("paid", AttributeType::Boolean)
            .with_literals("tier", ["silver", "gold"])
    }

    #[test]
    fn encodes_typed_columns() {
        let domain = ClassDomain::new(vec![ClassId::new("a"), ClassId::new("b")]);
        let instances = vec![
            Instance::new("b")
                .with_value("amount", 12.5)
                .with_value("paid", false)
                .with_value("tier", "silver")
                .with_weight(3.0),
            Instance::new("a").with_value("amount", 4i64),
        ];
        let data =
            Dataset::from_instances(&schema(), &instances, &domain, |i| i.target.clone()).unwrap();
        let names: Vec<_> = data.attributes().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["amount", "paid", "tier"]);
        assert_eq!(data.rows()[0].values, vec![Some(12.5), Some(1.0), Some(1.0)]);
        assert_eq!(data.rows()[0].class, 1);
        assert_eq!(data.rows()[1].values, vec![Some(4.0), None, None]);
        assert_eq!(data.total_weight(), 4.0);
        assert!(data.has_weights());
    }

    #[test]
    fn rejects_mismatched_values() {
        let domain = ClassDomain::new(vec![ClassId::new("a")]);
        let bad_type = vec![Instance::new("a").with_value("amount", "lots")];
        assert!(matches!(
            Dataset::from_instances(&schema(), &bad_type, &domain, |i| i.target.clone()),
            Err(LearnError::UnsupportedValue { .. })
        ));
        let bad_literal = vec![Instance::new("a").with_value("tier", "bronze")];
        assert!(matches!(
            Dataset::from_instances(&schema(), &bad_literal, &domain, |i| i.target.clone()),
            Err(LearnError::UnknownLiteral { .. })
        ));
        let bad_class = vec![Instance::new("z")];
        assert!(matches!(
            Dataset::from_instances(&schema(), &bad_class, &domain, |i| i.target.clone()),
            Err(LearnError::UnknownTarget { .. })
        ));
    }
}
