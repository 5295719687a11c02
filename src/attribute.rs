//! Attribute model: types, values, schemas and training instances.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::class::ClassId;

/// Rendering format for timestamp thresholds inside guard expressions.
pub const TIMESTAMP_FORMAT: &str = "%a %b %d %H:%M:%S UTC %Y";

/// [`TIMESTAMP_FORMAT`] with milliseconds, for thresholds inside a second.
pub const TIMESTAMP_MILLIS_FORMAT: &str = "%a %b %d %H:%M:%S%.3f UTC %Y";

/// Type of an attribute observed at a decision point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Literal,
    Timestamp,
    Discrete,
    Continuous,
    Boolean,
}

impl AttributeType {
    /// Discrete and continuous attributes fold into numeric intervals.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Discrete | Self::Continuous)
    }

    /// Literal and boolean attributes are encoded as indices into a domain.
    pub fn is_nominal(self) -> bool {
        matches!(self, Self::Literal | Self::Boolean)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Literal => "literal",
            Self::Timestamp => "timestamp",
            Self::Discrete => "discrete",
            Self::Continuous => "continuous",
            Self::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// A concrete attribute value.
///
/// Deserialization is untagged: JSON booleans, integers, floats, RFC 3339
/// strings and other strings map to the variants in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Discrete(i64),
    Continuous(f64),
    Timestamp(DateTime<Utc>),
    Literal(String),
}

impl Value {
    pub fn kind(&self) -> AttributeType {
        match self {
            Self::Boolean(_) => AttributeType::Boolean,
            Self::Discrete(_) => AttributeType::Discrete,
            Self::Continuous(_) => AttributeType::Continuous,
            Self::Timestamp(_) => AttributeType::Timestamp,
            Self::Literal(_) => AttributeType::Literal,
        }
    }

    /// Numeric view used for interval tests. Timestamps are epoch millis.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Discrete(v) => Some(*v as f64),
            Self::Continuous(v) => Some(*v),
            Self::Timestamp(t) => Some(t.timestamp_millis() as f64),
            Self::Boolean(_) | Self::Literal(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Discrete(v) => write!(f, "{v}"),
            Self::Continuous(v) => write!(f, "{v}"),
            Self::Timestamp(t) => write!(f, "{}", t.format(TIMESTAMP_FORMAT)),
            Self::Literal(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Discrete(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Continuous(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Literal(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

/// Format epoch milliseconds the way guard expressions spell timestamps.
///
/// Fractions of a millisecond are floored, so `<=`/`>` against the text split
/// millisecond instants exactly as they split at `millis`.
pub fn format_timestamp_millis(millis: f64) -> Option<String> {
    if !millis.is_finite() {
        return None;
    }
    let millis = millis.floor() as i64;
    let format = if millis.rem_euclid(1000) == 0 {
        TIMESTAMP_FORMAT
    } else {
        TIMESTAMP_MILLIS_FORMAT
    };
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format(format).to_string())
}

/// Parse a timestamp literal written in [`TIMESTAMP_FORMAT`] or
/// [`TIMESTAMP_MILLIS_FORMAT`].
pub fn parse_timestamp_literal(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, TIMESTAMP_MILLIS_FORMAT))
        .ok()
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Variable names
// ---------------------------------------------------------------------------

/// Map an arbitrary attribute name to a valid expression identifier.
///
/// ASCII alphanumerics pass through, `_` doubles, and every other character
/// (plus a leading digit) becomes `_uXXXX_`. A bare `true` or `false` has its
/// first letter escaped so it cannot collide with the constants.
pub fn canonical_name(raw: &str) -> String {
    let reserved = raw == "true" || raw == "false";
    let mut out = String::with_capacity(raw.len());
    for (i, ch) in raw.chars().enumerate() {
        let escape_first = i == 0 && (ch.is_ascii_digit() || reserved);
        if ch.is_ascii_alphanumeric() && !escape_first {
            out.push(ch);
        } else if ch == '_' {
            out.push_str("__");
        } else {
            out.push_str(&format!("_u{:04X}_", ch as u32));
        }
    }
    out
}

/// Inverse of [`canonical_name`]. Returns `None` for text it could not have produced.
pub fn original_name(canonical: &str) -> Option<String> {
    let mut out = String::with_capacity(canonical.len());
    let mut chars = canonical.chars();
    while let Some(ch) = chars.next() {
        if ch != '_' {
            out.push(ch);
            continue;
        }
        match chars.next()? {
            '_' => out.push('_'),
            'u' => {
                let mut hex = String::new();
                loop {
                    match chars.next()? {
                        '_' => break,
                        c => hex.push(c),
                    }
                }
                let code = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(code)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Attribute types plus the value domain of every literal attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSchema {
    types: BTreeMap<String, AttributeType>,
    #[serde(default)]
    literals: BTreeMap<String, BTreeSet<String>>,
}

impl AttributeSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, kind: AttributeType) -> Self {
        self.types.insert(name.into(), kind);
        self
    }

    /// Declare a literal attribute together with its value domain.
    pub fn with_literals<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        let name = name.into();
        self.types.insert(name.clone(), AttributeType::Literal);
        self.literals
            .entry(name)
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Record one observed value. The first observed type of a name wins;
    /// every literal value joins that name's domain.
    pub fn observe(&mut self, name: &str, value: &Value) {
        self.types.entry(name.to_string()).or_insert(value.kind());
        if let Value::Literal(text) = value {
            self.literals
                .entry(name.to_string())
                .or_default()
                .insert(text.clone());
        }
    }

    /// Build a schema from the values carried by a set of instances.
    pub fn from_instances<'a>(instances: impl IntoIterator<Item = &'a Instance>) -> Self {
        let mut schema = Self::new();
        for instance in instances {
            for (name, value) in &instance.values {
                schema.observe(name, value);
            }
        }
        schema
    }

    pub fn attribute_type(&self, name: &str) -> Option<AttributeType> {
        self.types.get(name).copied()
    }

    pub fn literal_values(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.literals.get(name)
    }

    /// Attributes in name order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, AttributeType)> {
        self.types.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

fn default_weight() -> f64 {
    1.0
}

/// One training observation: attribute values, the branch taken, and a weight.
///
/// An attribute absent from `values` is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    pub target: ClassId,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl Instance {
    pub fn new(target: impl Into<ClassId>) -> Self {
        Self {
            values: BTreeMap::new(),
            target: target.into(),
            weight: 1.0,
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_round_trip() {
        for raw in ["amount", "case:concept name", "2nd", "true", "a_b", "preis€"] {
            let canonical = canonical_name(raw);
            assert!(
                canonical
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_'),
                "{canonical}"
            );
            assert!(!canonical.starts_with(|c: char| c.is_ascii_digit()));
            assert_eq!(original_name(&canonical).as_deref(), Some(raw));
        }
        assert_eq!(canonical_name("amount"), "amount");
        assert_eq!(canonical_name("a b"), "a_u0020_b");
    }

    #[test]
    fn original_name_rejects_foreign_text() {
        assert_eq!(original_name("a_b"), None);
        assert_eq!(original_name("a_u00zz_"), None);
    }

    #[test]
    fn schema_keeps_first_type_and_sorted_domain() {
        let mut schema = AttributeSchema::new();
        schema.observe("x", &Value::Discrete(3));
        schema.observe("x", &Value::Continuous(3.5));
        schema.observe("s", &Value::from("b"));
        schema.observe("s", &Value::from("a"));
        assert_eq!(schema.attribute_type("x"), Some(AttributeType::Discrete));
        let domain: Vec<_> = schema.literal_values("s").unwrap().iter().collect();
        assert_eq!(domain, vec!["a", "b"]);
    }

    #[test]
    fn values_deserialize_untagged() {
        let values: Vec<Value> =
            serde_json::from_str(r#"[true, 3, 2.5, "2024-01-02T03:04:05Z", "gold"]"#).unwrap();
        let kinds: Vec<_> = values.iter().map(Value::kind).collect();
        assert_eq!(
            kinds,
            vec![
                AttributeType::Boolean,
                AttributeType::Discrete,
                AttributeType::Continuous,
                AttributeType::Timestamp,
                AttributeType::Literal,
            ]
        );
    }

    #[test]
    fn timestamp_format_round_trips() {
        let text = format_timestamp_millis(1_700_000_000_000.0).unwrap();
        assert_eq!(text, "Tue Nov 14 22:13:20 UTC 2023");
        let parsed = parse_timestamp_literal(&text).unwrap();
        assert_eq!(parsed.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn sub_second_thresholds_keep_their_milliseconds() {
        let text = format_timestamp_millis(1_700_000_000_250.9).unwrap();
        assert_eq!(text, "Tue Nov 14 22:13:20.250 UTC 2023");
        let parsed = parse_timestamp_literal(&text).unwrap();
        assert_eq!(parsed.timestamp_millis(), 1_700_000_000_250);
        assert_eq!(format_timestamp_millis(f64::NAN), None);
    }
}
