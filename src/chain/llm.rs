//! A chain that formats a prompt and asks a model.

use std::sync::Arc;

use async_trait::async_trait;

use super::{CallbackOptions, Chain};
use crate::callback::Callback;
use crate::memory::Memory;
use crate::model::{generate_prompt, GenerateOptions, Model, NoOpParser, OutputParser, Prompt};
use crate::{ChainValues, Error, ExecutionContext, Result};

/// Key holding the raw generation when `return_final_only` is off.
pub const FULL_GENERATION_KEY: &str = "full_generation";

/// Options for [`LlmChain::new`].
#[derive(Clone)]
pub struct LlmChainOptions {
    pub callback_options: CallbackOptions,
    pub memory: Option<Arc<dyn Memory>>,
    /// Key the parsed output is written to.
    pub output_key: String,
    pub output_parser: Arc<dyn OutputParser>,
    /// Return only the parsed output, without the raw generation.
    pub return_final_only: bool,
}

impl Default for LlmChainOptions {
    fn default() -> Self {
        Self {
            callback_options: CallbackOptions::default(),
            memory: None,
            output_key: "text".to_string(),
            output_parser: Arc::new(NoOpParser),
            return_final_only: true,
        }
    }
}

impl LlmChainOptions {
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
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }

    #[must_use]
    pub fn with_output_parser(mut self, parser: Arc<dyn OutputParser>) -> Self {
        self.output_parser = parser;
        self
    }

    #[must_use]
    pub fn with_return_final_only(mut self, final_only: bool) -> Self {
        self.return_final_only = final_only;
        self
    }
}

/// Formats `prompt` with the chain inputs and generates with `model`.
///
/// The formatted prompt is reported to observers as text, and the model
/// call runs as a child of the chain's run.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use llm_chains::chain::{LlmChain, LlmChainOptions};
/// use llm_chains::driver::{run, RunOptions};
/// use llm_chains::model::{FakeLlm, Model, PromptTemplate};
/// use llm_chains::ExecutionContext;
///
/// # tokio_test::block_on(async {
/// let model = Model::Llm(Arc::new(FakeLlm::new(|prompt| Ok(format!("[{prompt}]")))));
/// let prompt = Arc::new(PromptTemplate::new("Tell me about {topic}.").unwrap());
/// let chain = LlmChain::new(model, prompt, LlmChainOptions::new());
///
/// let text = run(&ExecutionContext::new(), &chain, "crabs", RunOptions::new())
///     .await
///     .unwrap();
/// assert_eq!(text, "[Tell me about crabs.]");
/// # });
/// ```
pub struct LlmChain {
    model: Model,
    prompt: Arc<dyn Prompt>,
    opts: LlmChainOptions,
}

impl LlmChain {
    #[must_use]
    pub fn new(model: Model, prompt: Arc<dyn Prompt>, opts: LlmChainOptions) -> Self {
        Self {
            model,
            prompt,
            opts,
        }
    }

    pub fn prompt(&self) -> &dyn Prompt {
        self.prompt.as_ref()
    }
}

#[async_trait]
impl Chain for LlmChain {
    async fn call(&self, ctx: &ExecutionContext, inputs: ChainValues) -> Result<ChainValues> {
        let prompt = self.prompt.format_prompt(&inputs)?;

        let gen_opts = match ctx.run_manager() {
            Some(run_manager) => {
                run_manager
                    .on_text(&format!("\nPrompt after formatting:\n{}", prompt.text()))
                    .await?;
                GenerateOptions::child_of(run_manager)
            }
            None => GenerateOptions::new(),
        };

        let result = generate_prompt(ctx, &self.model, &prompt, gen_opts).await?;
        let Some(generation) = result.generations.first() else {
            return Err(Error::Model("model returned no generations".into()));
        };

        let mut outputs = ChainValues::new();
        outputs.insert(
            self.opts.output_key.clone(),
            self.opts.output_parser.parse_result(generation)?,
        );
        if !self.opts.return_final_only {
            outputs.insert(FULL_GENERATION_KEY, serde_json::to_value(generation)?);
        }
        Ok(outputs)
    }

    fn chain_type(&self) -> &str {
        "LLM"
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
        self.prompt.input_variables()
    }

    fn output_keys(&self) -> Vec<String> {
        vec![self.opts.output_key.clone()]
    }
}
