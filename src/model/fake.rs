//! Closure-backed models for tests and examples.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{ChatModel, Llm};
use crate::callback::{Callback, ModelRunManager};
use crate::chain::CallbackOptions;
use crate::schema::{ChatMessage, ChatMessages, Generation, ModelResult};
use crate::{ExecutionContext, Result};

type LlmResponder = dyn Fn(&str) -> Result<String> + Send + Sync;
type ChatResponder = dyn Fn(&ChatMessages) -> Result<String> + Send + Sync;

/// A completion model answering through a closure.
///
/// # Example
///
/// ```rust
/// use llm_chains::model::{llm_generate, FakeLlm, GenerateOptions};
/// use llm_chains::ExecutionContext;
///
/// # tokio_test::block_on(async {
/// let llm = FakeLlm::new(|prompt| Ok(prompt.to_uppercase()));
/// let result = llm_generate(&ExecutionContext::new(), &llm, "shout", GenerateOptions::new())
///     .await
///     .unwrap();
/// assert_eq!(result.generations[0].text, "SHOUT");
/// # });
/// ```
#[derive(Clone)]
pub struct FakeLlm {
    respond: Arc<LlmResponder>,
    opts: CallbackOptions,
    llm_output: HashMap<String, Value>,
    streaming: bool,
}

impl FakeLlm {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            respond: Arc::new(respond),
            opts: CallbackOptions::default(),
            llm_output: HashMap::new(),
            streaming: false,
        }
    }

    #[must_use]
    pub fn with_callback_options(mut self, opts: CallbackOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Provider output attached to every result, e.g. `token_usage`.
    #[must_use]
    pub fn with_llm_output(mut self, llm_output: HashMap<String, Value>) -> Self {
        self.llm_output = llm_output;
        self
    }

    /// Report each whitespace-separated word as a new token.
    #[must_use]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

#[async_trait]
impl Llm for FakeLlm {
    async fn generate(
        &self,
        ctx: &ExecutionContext,
        prompt: &str,
        run_manager: &ModelRunManager,
    ) -> Result<ModelResult> {
        ctx.check_cancelled()?;
        let text = (self.respond)(prompt)?;

        if self.streaming {
            for token in text.split_whitespace() {
                run_manager.on_model_new_token(token).await?;
            }
        }

        Ok(ModelResult {
            generations: vec![Generation::new(text)],
            llm_output: self.llm_output.clone(),
        })
    }

    fn model_type(&self) -> &str {
        "llm.Fake"
    }

    fn verbose(&self) -> bool {
        self.opts.verbose
    }

    fn callbacks(&self) -> Vec<Arc<dyn Callback>> {
        self.opts.callbacks.clone()
    }
}

/// A chat model answering through a closure.
#[derive(Clone)]
pub struct FakeChatModel {
    respond: Arc<ChatResponder>,
    opts: CallbackOptions,
}

impl FakeChatModel {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&ChatMessages) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            respond: Arc::new(respond),
            opts: CallbackOptions::default(),
        }
    }

    #[must_use]
    pub fn with_callback_options(mut self, opts: CallbackOptions) -> Self {
        self.opts = opts;
        self
    }
}

#[async_trait]
impl ChatModel for FakeChatModel {
    async fn generate(
        &self,
        ctx: &ExecutionContext,
        messages: &ChatMessages,
        _run_manager: &ModelRunManager,
    ) -> Result<ModelResult> {
        ctx.check_cancelled()?;
        let text = (self.respond)(messages)?;
        let generation = Generation {
            message: Some(ChatMessage::ai(text.clone())),
            ..Generation::new(text)
        };

        Ok(ModelResult {
            generations: vec![generation],
            llm_output: HashMap::new(),
        })
    }

    fn model_type(&self) -> &str {
        "chat_model.Fake"
    }

    fn verbose(&self) -> bool {
        self.opts.verbose
    }

    fn callbacks(&self) -> Vec<Arc<dyn Callback>> {
        self.opts.callbacks.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::RecordingHandler;
    use crate::events::CallbackEvent;
    use crate::model::{llm_generate, GenerateOptions};

    #[tokio::test]
    async fn test_streaming_reports_tokens() {
        let recorder = Arc::new(RecordingHandler::new());
        let llm = FakeLlm::new(|_| Ok("one two".into()))
            .with_streaming(true)
            .with_callback_options(CallbackOptions::default().with_callback(recorder.clone()));

        llm_generate(&ExecutionContext::new(), &llm, "count", GenerateOptions::new())
            .await
            .unwrap();

        let tokens: Vec<String> = recorder
            .entries()
            .into_iter()
            .filter_map(|e| match e.event {
                CallbackEvent::ModelNewToken { token } => Some(token),
                _ => None,
            })
            .collect();
        assert_eq!(tokens, vec!["one", "two"]);
    }
}
