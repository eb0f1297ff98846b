//! An observer that keeps every event it sees.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{Callback, ChainStartInput, ChatModelStartInput, LlmStartInput, RunInfo, ToolStartInput};
use crate::events::{CallbackEvent, TraceEntry};
use crate::schema::{AgentAction, AgentFinish, Document, ModelResult};
use crate::{ChainValues, Error, Result};

/// Records each event as a [`TraceEntry`].
///
/// Always verbose by default, so it observes runs regardless of the
/// manager's verbosity. Useful for tests, debugging and exporting traces.
#[derive(Debug)]
pub struct RecordingHandler {
    entries: Mutex<Vec<TraceEntry>>,
    always_verbose: bool,
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingHandler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            always_verbose: true,
        }
    }

    /// Only record when the dispatching manager is verbose.
    #[must_use]
    pub fn verbose_only(mut self) -> Self {
        self.always_verbose = false;
        self
    }

    /// Snapshot of the recorded entries, in dispatch order.
    #[must_use]
    pub fn entries(&self) -> Vec<TraceEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drop all recorded entries.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record(&self, run: RunInfo, event: CallbackEvent) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(TraceEntry::new(run, event));
        Ok(())
    }
}

#[async_trait]
impl Callback for RecordingHandler {
    fn name(&self) -> &str {
        "recorder"
    }

    fn always_verbose(&self) -> bool {
        self.always_verbose
    }

    async fn on_llm_start(&self, run: RunInfo, input: &LlmStartInput) -> Result<()> {
        self.record(
            run,
            CallbackEvent::LlmStart {
                llm_type: input.llm_type.clone(),
                prompt: input.prompt.clone(),
            },
        )
    }

    async fn on_chat_model_start(&self, run: RunInfo, input: &ChatModelStartInput) -> Result<()> {
        self.record(
            run,
            CallbackEvent::ChatModelStart {
                chat_model_type: input.chat_model_type.clone(),
                messages: input.messages.clone(),
            },
        )
    }

    async fn on_model_new_token(&self, run: RunInfo, token: &str) -> Result<()> {
        self.record(
            run,
            CallbackEvent::ModelNewToken {
                token: token.to_string(),
            },
        )
    }

    async fn on_model_end(&self, run: RunInfo, result: &ModelResult) -> Result<()> {
        self.record(
            run,
            CallbackEvent::ModelEnd {
                result: result.clone(),
            },
        )
    }

    async fn on_model_error(&self, run: RunInfo, error: &Error) -> Result<()> {
        self.record(
            run,
            CallbackEvent::ModelError {
                message: error.to_string(),
            },
        )
    }

    async fn on_chain_start(&self, run: RunInfo, input: &ChainStartInput) -> Result<()> {
        self.record(
            run,
            CallbackEvent::ChainStart {
                chain_type: input.chain_type.clone(),
                inputs: input.inputs.clone(),
            },
        )
    }

    async fn on_chain_end(&self, run: RunInfo, outputs: &ChainValues) -> Result<()> {
        self.record(
            run,
            CallbackEvent::ChainEnd {
                outputs: outputs.clone(),
            },
        )
    }

    async fn on_chain_error(&self, run: RunInfo, error: &Error) -> Result<()> {
        self.record(
            run,
            CallbackEvent::ChainError {
                message: error.to_string(),
            },
        )
    }

    async fn on_agent_action(&self, run: RunInfo, action: &AgentAction) -> Result<()> {
        self.record(
            run,
            CallbackEvent::AgentAction {
                action: action.clone(),
            },
        )
    }

    async fn on_agent_finish(&self, run: RunInfo, finish: &AgentFinish) -> Result<()> {
        self.record(
            run,
            CallbackEvent::AgentFinish {
                finish: finish.clone(),
            },
        )
    }

    async fn on_tool_start(&self, run: RunInfo, input: &ToolStartInput) -> Result<()> {
        self.record(
            run,
            CallbackEvent::ToolStart {
                tool_name: input.tool_name.clone(),
                input: input.input.clone(),
            },
        )
    }

    async fn on_tool_end(&self, run: RunInfo, output: &str) -> Result<()> {
        self.record(
            run,
            CallbackEvent::ToolEnd {
                output: output.to_string(),
            },
        )
    }

    async fn on_tool_error(&self, run: RunInfo, error: &Error) -> Result<()> {
        self.record(
            run,
            CallbackEvent::ToolError {
                message: error.to_string(),
            },
        )
    }

    async fn on_text(&self, run: RunInfo, text: &str) -> Result<()> {
        self.record(
            run,
            CallbackEvent::Text {
                text: text.to_string(),
            },
        )
    }

    async fn on_retriever_start(&self, run: RunInfo, query: &str) -> Result<()> {
        self.record(
            run,
            CallbackEvent::RetrieverStart {
                query: query.to_string(),
            },
        )
    }

    async fn on_retriever_end(&self, run: RunInfo, documents: &[Document]) -> Result<()> {
        self.record(
            run,
            CallbackEvent::RetrieverEnd {
                documents: documents.to_vec(),
            },
        )
    }

    async fn on_retriever_error(&self, run: RunInfo, error: &Error) -> Result<()> {
        self.record(
            run,
            CallbackEvent::RetrieverError {
                message: error.to_string(),
            },
        )
    }
}
