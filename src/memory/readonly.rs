//! Read-only view over another memory.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::Memory;
use crate::{ChainValues, Result};

/// Loads from the wrapped memory but never saves to or clears it.
///
/// Useful for sharing one conversation between chains where only one of
/// them should record new turns.
#[derive(Clone)]
pub struct ReadonlyMemory {
    inner: Arc<dyn Memory>,
}

impl ReadonlyMemory {
    #[must_use]
    pub fn new(inner: Arc<dyn Memory>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Memory for ReadonlyMemory {
    fn memory_keys(&self) -> Vec<String> {
        self.inner.memory_keys()
    }

    async fn load(&self, inputs: &ChainValues) -> Result<HashMap<String, Value>> {
        self.inner.load(inputs).await
    }

    async fn save(&self, _inputs: &ChainValues, _outputs: &ChainValues) -> Result<()> {
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}
