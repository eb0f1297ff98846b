//! Several memories presented as one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::Memory;
use crate::{ChainValues, Error, Result};

/// Fans `load`, `save` and `clear` out to each wrapped memory in order.
///
/// The wrapped memories must not share any memory key.
#[derive(Clone)]
pub struct CombinedMemory {
    memories: Vec<Arc<dyn Memory>>,
}

impl CombinedMemory {
    /// Combine `memories`, failing with [`Error::RepeatedMemoryKey`] on a
    /// shared key.
    pub fn new(memories: Vec<Arc<dyn Memory>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for key in memories.iter().flat_map(|m| m.memory_keys()) {
            if !seen.insert(key.clone()) {
                return Err(Error::RepeatedMemoryKey(key));
            }
        }
        Ok(Self { memories })
    }
}

#[async_trait]
impl Memory for CombinedMemory {
    fn memory_keys(&self) -> Vec<String> {
        self.memories.iter().flat_map(|m| m.memory_keys()).collect()
    }

    async fn load(&self, inputs: &ChainValues) -> Result<HashMap<String, Value>> {
        let mut vars = HashMap::new();
        for memory in &self.memories {
            vars.extend(memory.load(inputs).await?);
        }
        Ok(vars)
    }

    async fn save(&self, inputs: &ChainValues, outputs: &ChainValues) -> Result<()> {
        for memory in &self.memories {
            memory.save(inputs, outputs).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        for memory in &self.memories {
            memory.clear().await?;
        }
        Ok(())
    }
}
