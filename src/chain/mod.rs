//! The [`Chain`] capability and the built-in chains.
//!
//! A chain declares the keys it reads and writes, and turns one
//! [`ChainValues`] into another. Chains are normally invoked through the
//! run driver ([`crate::driver::call`]), which wraps every invocation in
//! callback notifications and memory handling; calling
//! [`Chain::call`] directly skips both.

use std::sync::Arc;

use async_trait::async_trait;

use crate::callback::Callback;
use crate::memory::Memory;
use crate::{ChainValues, ExecutionContext, Result};

pub mod llm;
pub mod sequential;
pub mod simple_sequential;
pub mod transform;

pub use llm::{LlmChain, LlmChainOptions};
pub use sequential::{Sequential, SequentialOptions};
pub use simple_sequential::{SimpleSequential, SimpleSequentialOptions};
pub use transform::Transform;

/// A unit of work over chain values.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use llm_chains::{Chain, ChainValues, ExecutionContext, Result};
///
/// struct Upper;
///
/// #[async_trait]
/// impl Chain for Upper {
///     async fn call(&self, _ctx: &ExecutionContext, inputs: ChainValues) -> Result<ChainValues> {
///         let text = inputs.get_string("text")?;
///         Ok(ChainValues::from([("upper", text.to_uppercase())]))
///     }
///
///     fn chain_type(&self) -> &str {
///         "Upper"
///     }
///
///     fn input_keys(&self) -> Vec<String> {
///         vec!["text".into()]
///     }
///
///     fn output_keys(&self) -> Vec<String> {
///         vec!["upper".into()]
///     }
/// }
/// ```
#[async_trait]
pub trait Chain: Send + Sync {
    /// Execute the chain.
    async fn call(&self, ctx: &ExecutionContext, inputs: ChainValues) -> Result<ChainValues>;

    /// Name reported to observers.
    fn chain_type(&self) -> &str;

    fn verbose(&self) -> bool {
        false
    }

    /// Observers local to this chain.
    fn callbacks(&self) -> Vec<Arc<dyn Callback>> {
        Vec::new()
    }

    fn memory(&self) -> Option<Arc<dyn Memory>> {
        None
    }

    fn input_keys(&self) -> Vec<String>;

    fn output_keys(&self) -> Vec<String>;
}

#[async_trait]
impl<C: Chain + ?Sized> Chain for Arc<C> {
    async fn call(&self, ctx: &ExecutionContext, inputs: ChainValues) -> Result<ChainValues> {
        (**self).call(ctx, inputs).await
    }

    fn chain_type(&self) -> &str {
        (**self).chain_type()
    }

    fn verbose(&self) -> bool {
        (**self).verbose()
    }

    fn callbacks(&self) -> Vec<Arc<dyn Callback>> {
        (**self).callbacks()
    }

    fn memory(&self) -> Option<Arc<dyn Memory>> {
        (**self).memory()
    }

    fn input_keys(&self) -> Vec<String> {
        (**self).input_keys()
    }

    fn output_keys(&self) -> Vec<String> {
        (**self).output_keys()
    }
}

/// Observers and verbosity shared by every chain and model.
#[derive(Clone, Default)]
pub struct CallbackOptions {
    pub callbacks: Vec<Arc<dyn Callback>>,
    pub verbose: bool,
}

impl CallbackOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    #[must_use]
    pub fn with_callbacks(mut self, callbacks: Vec<Arc<dyn Callback>>) -> Self {
        self.callbacks = callbacks;
        self
    }

    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl std::fmt::Debug for CallbackOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.callbacks.iter().map(|c| c.name()).collect();
        f.debug_struct("CallbackOptions")
            .field("callbacks", &names)
            .field("verbose", &self.verbose)
            .finish()
    }
}
