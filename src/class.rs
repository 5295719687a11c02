//! Class identities at a decision point.
//!
//! A [`ClassId`] names one outgoing branch. Training targets are either a
//! single branch or, for the pairwise engine, a [`TargetClass::Combined`]
//! pair whose equality ignores the order of its members. A [`ClassDomain`]
//! assigns every target a unique textual label, which is how classes appear
//! in the leaves of a trained tree.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Identifier of one outgoing branch of a decision point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(String);

impl ClassId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ClassId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A training target: one branch, or two branches merged into one class.
///
/// `Combined` is normalized on construction so that `{a, b}` and `{b, a}`
/// compare and hash equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetClass {
    Single(ClassId),
    Combined(ClassId, ClassId),
}

impl TargetClass {
    pub fn single(class: ClassId) -> Self {
        Self::Single(class)
    }

    pub fn combined(a: ClassId, b: ClassId) -> Self {
        if a <= b {
            Self::Combined(a, b)
        } else {
            Self::Combined(b, a)
        }
    }

    /// Whether `class` is this target or one of its merged members.
    pub fn contains(&self, class: &ClassId) -> bool {
        match self {
            Self::Single(c) => c == class,
            Self::Combined(a, b) => a == class || b == class,
        }
    }

    /// The original branches this target stands for.
    pub fn members(&self) -> Vec<&ClassId> {
        match self {
            Self::Single(c) => vec![c],
            Self::Combined(a, b) => vec![a, b],
        }
    }
}

impl fmt::Display for TargetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(c) => write!(f, "{c}"),
            Self::Combined(a, b) => write!(f, "[{a}, {b}]"),
        }
    }
}

// ---------------------------------------------------------------------------
// Class domain
// ---------------------------------------------------------------------------

/// Bidirectional mapping between targets, their tree labels and class indices.
#[derive(Debug, Clone)]
pub struct ClassDomain<K> {
    classes: Vec<K>,
    labels: Vec<String>,
    by_label: HashMap<String, usize>,
    by_class: HashMap<K, usize>,
}

impl<K> ClassDomain<K>
where
    K: Clone + Eq + Hash + fmt::Display,
{
    /// Build a domain in the given order. Duplicate targets are ignored.
    ///
    /// Labels are the targets' display form with newlines flattened; clashing
    /// labels get a numeric suffix until they are unique.
    pub fn new(classes: impl IntoIterator<Item = K>) -> Self {
        let mut domain = Self {
            classes: Vec::new(),
            labels: Vec::new(),
            by_label: HashMap::new(),
            by_class: HashMap::new(),
        };
        for class in classes {
            if domain.by_class.contains_key(&class) {
                continue;
            }
            let mut label = class.to_string().replace('\n', " ");
            let mut n = 0;
            while domain.by_label.contains_key(&label) {
                n += 1;
                label = format!("{label}{n}");
            }
            let index = domain.classes.len();
            domain.by_label.insert(label.clone(), index);
            domain.by_class.insert(class.clone(), index);
            domain.labels.push(label);
            domain.classes.push(class);
        }
        domain
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> &[K] {
        &self.classes
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn class(&self, index: usize) -> Option<&K> {
        self.classes.get(index)
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn index_of(&self, class: &K) -> Option<usize> {
        self.by_class.get(class).copied()
    }

    /// Resolve a leaf label back to its target.
    pub fn resolve(&self, label: &str) -> Option<&K> {
        self.by_label.get(label).and_then(|&i| self.classes.get(i))
    }

    pub fn index_of_label(&self, label: &str) -> Option<usize> {
        self.by_label.get(label).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_class_ignores_member_order() {
        let ab = TargetClass::combined("a".into(), "b".into());
        let ba = TargetClass::combined("b".into(), "a".into());
        assert_eq!(ab, ba);
        assert!(ab.contains(&"a".into()));
        assert!(!ab.contains(&"c".into()));
        assert_eq!(ab.to_string(), "[a, b]");
    }

    #[test]
    fn domain_labels_are_unique() {
        let domain = ClassDomain::new(vec![
            ClassId::new("pay\nnow"),
            ClassId::new("pay now"),
            ClassId::new("cancel"),
        ]);
        assert_eq!(domain.labels(), &["pay now", "pay now1", "cancel"]);
        assert_eq!(domain.resolve("pay now1"), Some(&ClassId::new("pay now")));
        assert_eq!(domain.index_of(&ClassId::new("cancel")), Some(2));
    }

    #[test]
    fn domain_skips_duplicates() {
        let domain = ClassDomain::new(vec![true, false, true]);
        assert_eq!(domain.len(), 2);
        assert_eq!(domain.resolve("false"), Some(&false));
    }
}
