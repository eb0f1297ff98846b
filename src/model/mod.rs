//! Model capabilities and the drivers that wrap a generation in callbacks.
//!
//! Concrete providers live outside this crate. [`Llm`] and [`ChatModel`]
//! are the seams they implement; [`llm_generate`] and
//! [`chat_model_generate`] surround one generation with `on_llm_start` /
//! `on_chat_model_start`, then exactly one of `on_model_end` and
//! `on_model_error`, the same way the run driver wraps a chain.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::callback::{
    Callback, CallbackManager, ChainRunManager, ChatModelStartInput, LlmStartInput, ManagerOptions,
    ModelRunManager,
};
use crate::schema::{ChatMessages, ModelResult};
use crate::{ExecutionContext, Result};

pub mod fake;
pub mod prompt;

pub use fake::{FakeChatModel, FakeLlm};
pub use prompt::{
    CommaSeparatedListParser, NoOpParser, OutputParser, Prompt, PromptTemplate, PromptValue,
};

/// A text-completion model.
#[async_trait]
pub trait Llm: Send + Sync {
    /// Complete `prompt`. Streaming implementations report tokens through
    /// `run_manager`; stop words are available from `ctx`.
    async fn generate(
        &self,
        ctx: &ExecutionContext,
        prompt: &str,
        run_manager: &ModelRunManager,
    ) -> Result<ModelResult>;

    fn model_type(&self) -> &str;

    fn verbose(&self) -> bool {
        false
    }

    fn callbacks(&self) -> Vec<Arc<dyn Callback>> {
        Vec::new()
    }

    /// Parameters reported to observers on start.
    fn invocation_params(&self) -> HashMap<String, Value> {
        HashMap::new()
    }
}

/// A chat model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(
        &self,
        ctx: &ExecutionContext,
        messages: &ChatMessages,
        run_manager: &ModelRunManager,
    ) -> Result<ModelResult>;

    fn model_type(&self) -> &str;

    fn verbose(&self) -> bool {
        false
    }

    fn callbacks(&self) -> Vec<Arc<dyn Callback>> {
        Vec::new()
    }

    fn invocation_params(&self) -> HashMap<String, Value> {
        HashMap::new()
    }
}

/// Either kind of model.
#[derive(Clone)]
pub enum Model {
    Llm(Arc<dyn Llm>),
    Chat(Arc<dyn ChatModel>),
}

impl Model {
    pub fn model_type(&self) -> &str {
        match self {
            Self::Llm(llm) => llm.model_type(),
            Self::Chat(chat) => chat.model_type(),
        }
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Model").field(&self.model_type()).finish()
    }
}

/// Observers and parent run of one generation.
#[derive(Clone, Default)]
pub struct GenerateOptions {
    /// Call-scoped observers, treated as inheritable.
    pub callbacks: Vec<Arc<dyn Callback>>,
    /// The run this generation is nested under.
    pub parent_run_id: Option<Uuid>,
    parent_handlers: Vec<Arc<dyn Callback>>,
    parent_verbose: bool,
}

impl GenerateOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a generation nested under a running chain.
    ///
    /// Every observer of the chain run also observes the generation.
    #[must_use]
    pub fn child_of(run_manager: &ChainRunManager) -> Self {
        Self {
            callbacks: run_manager.inheritable_callbacks().to_vec(),
            parent_run_id: Some(run_manager.run_id()),
            parent_handlers: run_manager.handlers().to_vec(),
            parent_verbose: run_manager.verbose(),
        }
    }

    #[must_use]
    pub fn with_callbacks(mut self, callbacks: Vec<Arc<dyn Callback>>) -> Self {
        self.callbacks = callbacks;
        self
    }

    fn manager(self, local: Vec<Arc<dyn Callback>>, verbose: bool) -> CallbackManager {
        let mut handlers = self.parent_handlers;
        handlers.extend(local);
        CallbackManager::new(
            self.callbacks,
            handlers,
            self.parent_verbose || verbose,
            ManagerOptions {
                run_id: None,
                parent_run_id: self.parent_run_id,
            },
        )
    }
}

/// Close a model run with exactly one of end or error.
async fn finish(run_manager: &ModelRunManager, result: Result<ModelResult>) -> Result<ModelResult> {
    match result {
        Ok(result) => {
            run_manager.on_model_end(&result).await?;
            Ok(result)
        }
        Err(err) => {
            tracing::debug!(run_id = %run_manager.run_id(), error = %err, "model run failed");
            run_manager.on_model_error(&err).await?;
            Err(err)
        }
    }
}

/// Generate with a completion model under its own callback run.
pub async fn llm_generate(
    ctx: &ExecutionContext,
    llm: &dyn Llm,
    prompt: &str,
    opts: GenerateOptions,
) -> Result<ModelResult> {
    let manager = opts.manager(llm.callbacks(), llm.verbose());
    let run_manager = manager
        .on_llm_start(&LlmStartInput {
            llm_type: llm.model_type().to_string(),
            prompt: prompt.to_string(),
            invocation_params: llm.invocation_params(),
        })
        .await?;

    let result = llm.generate(ctx, prompt, &run_manager).await;
    finish(&run_manager, result).await
}

/// Generate with a chat model under its own callback run.
pub async fn chat_model_generate(
    ctx: &ExecutionContext,
    model: &dyn ChatModel,
    messages: &ChatMessages,
    opts: GenerateOptions,
) -> Result<ModelResult> {
    let manager = opts.manager(model.callbacks(), model.verbose());
    let run_manager = manager
        .on_chat_model_start(&ChatModelStartInput {
            chat_model_type: model.model_type().to_string(),
            messages: messages.clone(),
            invocation_params: model.invocation_params(),
        })
        .await?;

    let result = model.generate(ctx, messages, &run_manager).await;
    finish(&run_manager, result).await
}

/// Generate from a formatted prompt with whichever kind of model is given.
///
/// Completion models receive the prompt text, chat models its messages.
pub async fn generate_prompt(
    ctx: &ExecutionContext,
    model: &Model,
    prompt: &PromptValue,
    opts: GenerateOptions,
) -> Result<ModelResult> {
    match model {
        Model::Llm(llm) => llm_generate(ctx, llm.as_ref(), &prompt.text(), opts).await,
        Model::Chat(chat) => chat_model_generate(ctx, chat.as_ref(), &prompt.messages(), opts).await,
    }
}
