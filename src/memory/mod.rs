//! Stateful collaborators that feed variables into chains.
//!
//! The run driver loads a chain's memory before executing it and saves the
//! exchange only after a successful execution. Memories are never cleared
//! implicitly.
//!
//! Implementations must use interior mutability; the driver adds no locking
//! of its own, so a memory shared across concurrent invocations must be safe
//! for concurrent `load`/`save`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::{ChainValues, Result};

pub mod buffer;
pub mod combined;
pub mod history;
pub mod readonly;
pub mod simple;

pub use buffer::{ConversationBuffer, ConversationBufferOptions};
pub use combined::CombinedMemory;
pub use history::{ChatMessageHistory, InMemoryHistory};
pub use readonly::ReadonlyMemory;
pub use simple::SimpleMemory;

/// Context and memory management for a chain.
#[async_trait]
pub trait Memory: Send + Sync {
    /// Keys this memory contributes to the chain inputs.
    fn memory_keys(&self) -> Vec<String>;

    /// Variables for the upcoming run, given its inputs.
    async fn load(&self, inputs: &ChainValues) -> Result<HashMap<String, Value>>;

    /// Record a completed run.
    async fn save(&self, inputs: &ChainValues, outputs: &ChainValues) -> Result<()>;

    /// Forget everything.
    async fn clear(&self) -> Result<()>;
}
