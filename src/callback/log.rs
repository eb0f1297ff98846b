//! Forward lifecycle events to `tracing`.

use async_trait::async_trait;
use tracing::{info, trace, warn};

use super::{Callback, ChainStartInput, ChatModelStartInput, LlmStartInput, RunInfo, ToolStartInput};
use crate::schema::{AgentAction, AgentFinish, Document, ModelResult};
use crate::{ChainValues, Error, Result};

/// Emits one structured `tracing` event per lifecycle event.
///
/// Start/end events log at `info`, failures at `warn` and streamed tokens at
/// `trace`. The library installs no subscriber; applications choose one.
#[derive(Debug, Clone, Copy)]
pub struct TracingHandler {
    always_verbose: bool,
}

impl Default for TracingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl TracingHandler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            always_verbose: true,
        }
    }

    /// Only log when the dispatching manager is verbose.
    #[must_use]
    pub fn verbose_only(mut self) -> Self {
        self.always_verbose = false;
        self
    }
}

#[async_trait]
impl Callback for TracingHandler {
    fn name(&self) -> &str {
        "tracing"
    }

    fn always_verbose(&self) -> bool {
        self.always_verbose
    }

    async fn on_llm_start(&self, run: RunInfo, input: &LlmStartInput) -> Result<()> {
        info!(run_id = %run.run_id, parent_run_id = ?run.parent_run_id, llm_type = %input.llm_type, "llm start");
        Ok(())
    }

    async fn on_chat_model_start(&self, run: RunInfo, input: &ChatModelStartInput) -> Result<()> {
        info!(
            run_id = %run.run_id,
            parent_run_id = ?run.parent_run_id,
            chat_model_type = %input.chat_model_type,
            messages = input.messages.len(),
            "chat model start"
        );
        Ok(())
    }

    async fn on_model_new_token(&self, run: RunInfo, token: &str) -> Result<()> {
        trace!(run_id = %run.run_id, token, "model token");
        Ok(())
    }

    async fn on_model_end(&self, run: RunInfo, result: &ModelResult) -> Result<()> {
        info!(run_id = %run.run_id, generations = result.generations.len(), "model end");
        Ok(())
    }

    async fn on_model_error(&self, run: RunInfo, error: &Error) -> Result<()> {
        warn!(run_id = %run.run_id, %error, "model error");
        Ok(())
    }

    async fn on_chain_start(&self, run: RunInfo, input: &ChainStartInput) -> Result<()> {
        info!(
            run_id = %run.run_id,
            parent_run_id = ?run.parent_run_id,
            chain_type = %input.chain_type,
            "chain start"
        );
        Ok(())
    }

    async fn on_chain_end(&self, run: RunInfo, outputs: &ChainValues) -> Result<()> {
        info!(run_id = %run.run_id, outputs = outputs.len(), "chain end");
        Ok(())
    }

    async fn on_chain_error(&self, run: RunInfo, error: &Error) -> Result<()> {
        warn!(run_id = %run.run_id, %error, "chain error");
        Ok(())
    }

    async fn on_agent_action(&self, run: RunInfo, action: &AgentAction) -> Result<()> {
        info!(run_id = %run.run_id, tool = %action.tool, "agent action");
        Ok(())
    }

    async fn on_agent_finish(&self, run: RunInfo, _finish: &AgentFinish) -> Result<()> {
        info!(run_id = %run.run_id, "agent finish");
        Ok(())
    }

    async fn on_tool_start(&self, run: RunInfo, input: &ToolStartInput) -> Result<()> {
        info!(run_id = %run.run_id, tool = %input.tool_name, "tool start");
        Ok(())
    }

    async fn on_tool_end(&self, run: RunInfo, _output: &str) -> Result<()> {
        info!(run_id = %run.run_id, "tool end");
        Ok(())
    }

    async fn on_tool_error(&self, run: RunInfo, error: &Error) -> Result<()> {
        warn!(run_id = %run.run_id, %error, "tool error");
        Ok(())
    }

    async fn on_text(&self, run: RunInfo, text: &str) -> Result<()> {
        info!(run_id = %run.run_id, text, "text");
        Ok(())
    }

    async fn on_retriever_start(&self, run: RunInfo, query: &str) -> Result<()> {
        info!(run_id = %run.run_id, query, "retriever start");
        Ok(())
    }

    async fn on_retriever_end(&self, run: RunInfo, documents: &[Document]) -> Result<()> {
        info!(run_id = %run.run_id, documents = documents.len(), "retriever end");
        Ok(())
    }

    async fn on_retriever_error(&self, run: RunInfo, error: &Error) -> Result<()> {
        warn!(run_id = %run.run_id, %error, "retriever error");
        Ok(())
    }
}
