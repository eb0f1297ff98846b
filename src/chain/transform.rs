//! Chains backed by a closure.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::{CallbackOptions, Chain};
use crate::callback::Callback;
use crate::memory::Memory;
use crate::{ChainValues, ExecutionContext, Result};

/// A chain whose execution is an async closure.
///
/// The closure receives an owned copy of the execution context, so it may
/// invoke further chains through the run driver as nested runs.
///
/// # Example
///
/// ```rust
/// use llm_chains::chain::{Chain, Transform};
/// use llm_chains::{ChainValues, ExecutionContext};
///
/// # tokio_test::block_on(async {
/// let count = Transform::new(["text"], ["words"], |_ctx, inputs: ChainValues| async move {
///     let words = inputs.get_string("text")?.split_whitespace().count();
///     Ok(ChainValues::from([("words", words)]))
/// });
///
/// let out = count
///     .call(&ExecutionContext::new(), ChainValues::from([("text", "a b c")]))
///     .await
///     .unwrap();
/// assert_eq!(out.get_string("words").unwrap(), "3");
/// # });
/// ```
pub struct Transform<F> {
    input_keys: Vec<String>,
    output_keys: Vec<String>,
    f: F,
    opts: CallbackOptions,
    memory: Option<Arc<dyn Memory>>,
}

impl<F, Fut> Transform<F>
where
    F: Fn(ExecutionContext, ChainValues) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ChainValues>> + Send + 'static,
{
    pub fn new<I, O>(input_keys: I, output_keys: O, f: F) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            input_keys: input_keys.into_iter().map(Into::into).collect(),
            output_keys: output_keys.into_iter().map(Into::into).collect(),
            f,
            opts: CallbackOptions::default(),
            memory: None,
        }
    }
}

impl<F> Transform<F> {
    #[must_use]
    pub fn with_callback_options(mut self, opts: CallbackOptions) -> Self {
        self.opts = opts;
        self
    }

    #[must_use]
    pub fn with_memory(mut self, memory: Arc<dyn Memory>) -> Self {
        self.memory = Some(memory);
        self
    }
}

#[async_trait]
impl<F, Fut> Chain for Transform<F>
where
    F: Fn(ExecutionContext, ChainValues) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ChainValues>> + Send + 'static,
{
    async fn call(&self, ctx: &ExecutionContext, inputs: ChainValues) -> Result<ChainValues> {
        (self.f)(ctx.clone(), inputs).await
    }

    fn chain_type(&self) -> &str {
        "Transform"
    }

    fn verbose(&self) -> bool {
        self.opts.verbose
    }

    fn callbacks(&self) -> Vec<Arc<dyn Callback>> {
        self.opts.callbacks.clone()
    }

    fn memory(&self) -> Option<Arc<dyn Memory>> {
        self.memory.clone()
    }

    fn input_keys(&self) -> Vec<String> {
        self.input_keys.clone()
    }

    fn output_keys(&self) -> Vec<String> {
        self.output_keys.clone()
    }
}
