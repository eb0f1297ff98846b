//! Lifecycle observers and the manager that fans events out to them.
//!
//! A [`Callback`] receives one notification per lifecycle event of every
//! run category: models, chains, agents, tools, retrievers and free text.
//! Chains never talk to observers directly; they go through a
//! [`CallbackManager`](manager::CallbackManager), which stamps each event
//! with the run identity and applies the verbosity and error policies.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::schema::{AgentAction, AgentFinish, ChatMessages, Document, ModelResult};
use crate::{ChainValues, Error, Result};

pub mod log;
pub mod manager;
pub mod recorder;
pub mod stdout;
pub mod token_usage;

pub use log::TracingHandler;
pub use manager::{
    CallbackManager, ChainRunManager, ManagerOptions, ModelRunManager, RetrieverRunManager,
    ToolRunManager,
};
pub use recorder::RecordingHandler;
pub use stdout::{StdOutHandler, WriterHandler, STDOUT_HANDLER_NAME};
pub use token_usage::TokenUsageHandler;

/// Identity of the run an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunInfo {
    /// The run that emitted the event.
    pub run_id: Uuid,
    /// The enclosing run, if this run is nested.
    pub parent_run_id: Option<Uuid>,
}

/// Payload of [`Callback::on_llm_start`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmStartInput {
    pub llm_type: String,
    pub prompt: String,
    pub invocation_params: HashMap<String, Value>,
}

/// Payload of [`Callback::on_chat_model_start`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatModelStartInput {
    pub chat_model_type: String,
    pub messages: ChatMessages,
    pub invocation_params: HashMap<String, Value>,
}

/// Payload of [`Callback::on_chain_start`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStartInput {
    pub chain_type: String,
    pub inputs: ChainValues,
}

/// Payload of [`Callback::on_tool_start`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStartInput {
    pub tool_name: String,
    pub input: String,
}

/// An observer of lifecycle events.
///
/// Every handler has a no-op default, so implementors only override the
/// events they care about. A handler is invoked when the dispatching manager
/// is verbose or when [`always_verbose`](Callback::always_verbose) returns
/// `true`. A failing handler is skipped and logged unless
/// [`raise_error`](Callback::raise_error) returns `true`, in which case the
/// failure stops dispatch and is returned to the caller.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use llm_chains::callback::{Callback, ChainStartInput, RunInfo};
///
/// struct PrintStarts;
///
/// #[async_trait]
/// impl Callback for PrintStarts {
///     fn always_verbose(&self) -> bool {
///         true
///     }
///
///     async fn on_chain_start(&self, run: RunInfo, input: &ChainStartInput) -> llm_chains::Result<()> {
///         println!("[{}] {}", run.run_id, input.chain_type);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
#[allow(unused_variables)]
pub trait Callback: Send + Sync {
    /// Name used in logs and for identity checks. Defaults to the type name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Receive events even when the manager is not verbose.
    fn always_verbose(&self) -> bool {
        false
    }

    /// Propagate handler failures instead of swallowing them.
    fn raise_error(&self) -> bool {
        false
    }

    async fn on_llm_start(&self, run: RunInfo, input: &LlmStartInput) -> Result<()> {
        Ok(())
    }

    async fn on_chat_model_start(&self, run: RunInfo, input: &ChatModelStartInput) -> Result<()> {
        Ok(())
    }

    async fn on_model_new_token(&self, run: RunInfo, token: &str) -> Result<()> {
        Ok(())
    }

    async fn on_model_end(&self, run: RunInfo, result: &ModelResult) -> Result<()> {
        Ok(())
    }

    async fn on_model_error(&self, run: RunInfo, error: &Error) -> Result<()> {
        Ok(())
    }

    async fn on_chain_start(&self, run: RunInfo, input: &ChainStartInput) -> Result<()> {
        Ok(())
    }

    async fn on_chain_end(&self, run: RunInfo, outputs: &ChainValues) -> Result<()> {
        Ok(())
    }

    async fn on_chain_error(&self, run: RunInfo, error: &Error) -> Result<()> {
        Ok(())
    }

    async fn on_agent_action(&self, run: RunInfo, action: &AgentAction) -> Result<()> {
        Ok(())
    }

    async fn on_agent_finish(&self, run: RunInfo, finish: &AgentFinish) -> Result<()> {
        Ok(())
    }

    async fn on_tool_start(&self, run: RunInfo, input: &ToolStartInput) -> Result<()> {
        Ok(())
    }

    async fn on_tool_end(&self, run: RunInfo, output: &str) -> Result<()> {
        Ok(())
    }

    async fn on_tool_error(&self, run: RunInfo, error: &Error) -> Result<()> {
        Ok(())
    }

    async fn on_text(&self, run: RunInfo, text: &str) -> Result<()> {
        Ok(())
    }

    async fn on_retriever_start(&self, run: RunInfo, query: &str) -> Result<()> {
        Ok(())
    }

    async fn on_retriever_end(&self, run: RunInfo, documents: &[Document]) -> Result<()> {
        Ok(())
    }

    async fn on_retriever_error(&self, run: RunInfo, error: &Error) -> Result<()> {
        Ok(())
    }
}
