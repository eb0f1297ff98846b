//! Serializable records of lifecycle events.
//!
//! [`RecordingHandler`](crate::callback::RecordingHandler) turns every
//! callback it receives into a [`TraceEntry`], giving a typed, exportable
//! log of a run tree instead of unstructured strings.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::callback::RunInfo;
use crate::schema::{AgentAction, AgentFinish, ChatMessages, Document, ModelResult};
use crate::ChainValues;

/// One lifecycle event, without its run identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum CallbackEvent {
    LlmStart {
        llm_type: String,
        prompt: String,
    },
    ChatModelStart {
        chat_model_type: String,
        messages: ChatMessages,
    },
    ModelNewToken {
        token: String,
    },
    ModelEnd {
        result: ModelResult,
    },
    ModelError {
        message: String,
    },
    ChainStart {
        chain_type: String,
        inputs: ChainValues,
    },
    ChainEnd {
        outputs: ChainValues,
    },
    ChainError {
        message: String,
    },
    AgentAction {
        action: AgentAction,
    },
    AgentFinish {
        finish: AgentFinish,
    },
    ToolStart {
        tool_name: String,
        input: String,
    },
    ToolEnd {
        output: String,
    },
    ToolError {
        message: String,
    },
    Text {
        text: String,
    },
    RetrieverStart {
        query: String,
    },
    RetrieverEnd {
        documents: Vec<Document>,
    },
    RetrieverError {
        message: String,
    },
}

impl CallbackEvent {
    /// Short snake_case name of the event kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            CallbackEvent::LlmStart { .. } => "llm_start",
            CallbackEvent::ChatModelStart { .. } => "chat_model_start",
            CallbackEvent::ModelNewToken { .. } => "model_new_token",
            CallbackEvent::ModelEnd { .. } => "model_end",
            CallbackEvent::ModelError { .. } => "model_error",
            CallbackEvent::ChainStart { .. } => "chain_start",
            CallbackEvent::ChainEnd { .. } => "chain_end",
            CallbackEvent::ChainError { .. } => "chain_error",
            CallbackEvent::AgentAction { .. } => "agent_action",
            CallbackEvent::AgentFinish { .. } => "agent_finish",
            CallbackEvent::ToolStart { .. } => "tool_start",
            CallbackEvent::ToolEnd { .. } => "tool_end",
            CallbackEvent::ToolError { .. } => "tool_error",
            CallbackEvent::Text { .. } => "text",
            CallbackEvent::RetrieverStart { .. } => "retriever_start",
            CallbackEvent::RetrieverEnd { .. } => "retriever_end",
            CallbackEvent::RetrieverError { .. } => "retriever_error",
        }
    }
}

/// A timestamped event attributed to a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Unix epoch timestamp in milliseconds when this event occurred.
    pub timestamp: u128,
    /// The run that emitted the event.
    pub run_id: Uuid,
    /// The enclosing run, if any.
    pub parent_run_id: Option<Uuid>,
    /// The recorded event.
    #[serde(flatten)]
    pub event: CallbackEvent,
}

impl TraceEntry {
    /// Create a new trace entry with the current timestamp.
    #[must_use]
    pub fn new(run: RunInfo, event: CallbackEvent) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Self {
            timestamp,
            run_id: run.run_id,
            parent_run_id: run.parent_run_id,
            event,
        }
    }
}
