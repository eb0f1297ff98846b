//! The keyed bag of values passed between chains.

use std::collections::hash_map::{self, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::Document;
use crate::{Error, Result};

/// A mapping from string keys to dynamically-typed JSON values.
///
/// Every chain consumes and produces `ChainValues`. Cloning produces an
/// independent copy, which is how composites keep inner chains from
/// corrupting the values seen by outer ones.
///
/// # Example
///
/// ```rust
/// use llm_chains::ChainValues;
///
/// let mut values = ChainValues::from([("question", "What is Rust?")]);
/// values.insert("attempt", 1);
///
/// assert_eq!(values.get_string("question").unwrap(), "What is Rust?");
/// assert_eq!(values.get_string("attempt").unwrap(), "1");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainValues(HashMap<String, Value>);

impl ChainValues {
    /// Create an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous one for that key if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Borrow the raw value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Remove and return the value for `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the bag holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the keys in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Iterate over entries in arbitrary order.
    pub fn iter(&self) -> hash_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Merge every entry of `other` into this bag, overwriting on conflict.
    pub fn merge(&mut self, other: ChainValues) {
        self.0.extend(other.0);
    }

    /// Return a new bag containing exactly `keys`.
    ///
    /// Fails with [`Error::InvalidInputValues`] if any key is absent.
    pub fn project(&self, keys: &[String]) -> Result<ChainValues> {
        keys.iter()
            .map(|k| Ok((k.clone(), self.require(k)?.clone())))
            .collect()
    }

    /// Fetch `name` as text.
    ///
    /// Strings are returned as-is; numbers and booleans are rendered with
    /// their JSON representation. Any other type is an
    /// [`Error::InputValuesWrongType`].
    pub fn get_string(&self, name: &str) -> Result<String> {
        match self.require(name)? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err(Error::InputValuesWrongType(name.to_string())),
        }
    }

    /// Fetch `name` as a non-empty list of documents.
    pub fn get_documents(&self, name: &str) -> Result<Vec<Document>> {
        let value = self.require(name)?;
        let docs: Vec<Document> = serde_json::from_value(value.clone())
            .map_err(|_| Error::InputValuesWrongType(name.to_string()))?;
        if docs.is_empty() {
            return Err(Error::InvalidInputValues(format!("no documents for key {name}")));
        }
        Ok(docs)
    }

    /// Consume the bag, returning the underlying map.
    #[must_use]
    pub fn into_inner(self) -> HashMap<String, Value> {
        self.0
    }

    fn require(&self, name: &str) -> Result<&Value> {
        self.0
            .get(name)
            .ok_or_else(|| Error::InvalidInputValues(format!("no value for key {name}")))
    }
}

impl From<HashMap<String, Value>> for ChainValues {
    fn from(map: HashMap<String, Value>) -> Self {
        Self(map)
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for ChainValues
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl<K, V> FromIterator<(K, V)> for ChainValues
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for ChainValues {
    type Item = (String, Value);
    type IntoIter = hash_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChainValues {
    type Item = (&'a String, &'a Value);
    type IntoIter = hash_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
