//! Ownership files as a tagged tree.
//!
//! Teams describe their paths in free-form YAML: a bare list, a mapping of
//! areas to lists, or anything nested in between. Every string leaf is a glob.

use serde_yaml::Value;

/// A parsed ownership document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipTree {
    /// A string leaf, or `None` for numbers, booleans and nulls.
    Scalar(Option<String>),
    List(Vec<OwnershipTree>),
    /// Mapping values in document order. Keys are labels, not patterns.
    Mapping(Vec<OwnershipTree>),
}

impl OwnershipTree {
    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        let value: Value = serde_yaml::from_str(content)?;
        Ok(Self::from(value))
    }

    /// Every string leaf, depth-first, in encounter order.
    pub fn patterns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_into(&mut out);
        out
    }

    fn collect_into(&self, out: &mut Vec<String>) {
        match self {
            OwnershipTree::Scalar(Some(s)) => out.push(s.clone()),
            OwnershipTree::Scalar(None) => {}
            OwnershipTree::List(items) | OwnershipTree::Mapping(items) => {
                for item in items {
                    item.collect_into(out);
                }
            }
        }
    }
}

impl From<Value> for OwnershipTree {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => OwnershipTree::Scalar(Some(s)),
            Value::Null | Value::Bool(_) | Value::Number(_) => OwnershipTree::Scalar(None),
            Value::Sequence(items) => {
                OwnershipTree::List(items.into_iter().map(OwnershipTree::from).collect())
            }
            Value::Mapping(map) => {
                OwnershipTree::Mapping(map.into_iter().map(|(_, v)| OwnershipTree::from(v)).collect())
            }
            Value::Tagged(tagged) => OwnershipTree::from(tagged.value),
        }
    }
}
