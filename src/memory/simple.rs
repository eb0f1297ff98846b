//! Fixed variables that never change.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use super::Memory;
use crate::{ChainValues, Result};

/// Memory holding a fixed set of variables.
///
/// Saving and clearing are no-ops, so every run sees the same variables.
#[derive(Debug, Clone, Default)]
pub struct SimpleMemory {
    variables: HashMap<String, Value>,
}

impl SimpleMemory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fixed variable.
    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

impl<K, V> FromIterator<(K, V)> for SimpleMemory
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            variables: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl Memory for SimpleMemory {
    fn memory_keys(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }

    async fn load(&self, _inputs: &ChainValues) -> Result<HashMap<String, Value>> {
        Ok(self.variables.clone())
    }

    async fn save(&self, _inputs: &ChainValues, _outputs: &ChainValues) -> Result<()> {
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}
