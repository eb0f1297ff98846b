//! Single-value sequential composition.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{CallbackOptions, Chain};
use crate::callback::Callback;
use crate::driver::{self, RunOptions};
use crate::memory::Memory;
use crate::{ChainValues, Error, ExecutionContext, Result};

/// Options for [`SimpleSequential::new`].
#[derive(Clone)]
pub struct SimpleSequentialOptions {
    pub callback_options: CallbackOptions,
    pub memory: Option<Arc<dyn Memory>>,
    /// Key the first chain's input is read from.
    pub input_key: String,
    /// Key the last chain's output is written to.
    pub output_key: String,
    /// Trim surrounding whitespace from each intermediate output.
    pub strip_outputs: bool,
}

impl Default for SimpleSequentialOptions {
    fn default() -> Self {
        Self {
            callback_options: CallbackOptions::default(),
            memory: None,
            input_key: "input".to_string(),
            output_key: "output".to_string(),
            strip_outputs: false,
        }
    }
}

impl SimpleSequentialOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_callback_options(mut self, opts: CallbackOptions) -> Self {
        self.callback_options = opts;
        self
    }

    #[must_use]
    pub fn with_memory(mut self, memory: Arc<dyn Memory>) -> Self {
        self.memory = Some(memory);
        self
    }

    #[must_use]
    pub fn with_input_key(mut self, key: impl Into<String>) -> Self {
        self.input_key = key.into();
        self
    }

    #[must_use]
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }

    #[must_use]
    pub fn with_strip_outputs(mut self, strip: bool) -> Self {
        self.strip_outputs = strip;
        self
    }
}

/// Threads one string through single-input, single-output chains.
pub struct SimpleSequential {
    chains: Vec<Arc<dyn Chain>>,
    opts: SimpleSequentialOptions,
}

impl SimpleSequential {
    /// Fails with [`Error::ChainArity`] if any chain does not take exactly
    /// one input and produce exactly one output. Inputs supplied by a
    /// chain's own memory are not counted.
    pub fn new(chains: Vec<Arc<dyn Chain>>, opts: SimpleSequentialOptions) -> Result<Self> {
        if chains.is_empty() {
            return Err(Error::EmptySequence);
        }
        for chain in &chains {
            let inputs = driver::caller_input_keys(chain.as_ref()).len();
            let outputs = chain.output_keys().len();
            if inputs != 1 || outputs != 1 {
                return Err(Error::ChainArity { inputs, outputs });
            }
        }
        Ok(Self { chains, opts })
    }
}

#[async_trait]
impl Chain for SimpleSequential {
    async fn call(&self, ctx: &ExecutionContext, inputs: ChainValues) -> Result<ChainValues> {
        let mut value: Value = inputs
            .get(&self.opts.input_key)
            .cloned()
            .ok_or_else(|| {
                Error::InvalidInputValues(format!("no value for key {}", self.opts.input_key))
            })?;

        for chain in &self.chains {
            ctx.check_cancelled()?;
            let mut output = driver::run(ctx, chain, value, RunOptions::new()).await?;
            if self.opts.strip_outputs {
                output = output.trim().to_string();
            }
            value = Value::String(output);
        }

        let mut outputs = ChainValues::new();
        outputs.insert(self.opts.output_key.clone(), value);
        Ok(outputs)
    }

    fn chain_type(&self) -> &str {
        "SimpleSequential"
    }

    fn verbose(&self) -> bool {
        self.opts.callback_options.verbose
    }

    fn callbacks(&self) -> Vec<Arc<dyn Callback>> {
        self.opts.callback_options.callbacks.clone()
    }

    fn memory(&self) -> Option<Arc<dyn Memory>> {
        self.opts.memory.clone()
    }

    fn input_keys(&self) -> Vec<String> {
        vec![self.opts.input_key.clone()]
    }

    fn output_keys(&self) -> Vec<String> {
        vec![self.opts.output_key.clone()]
    }
}
