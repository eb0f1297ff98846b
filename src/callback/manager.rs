//! Callback managers and run managers.
//!
//! A [`CallbackManager`] exists before a run starts. Its `on_*_start`
//! methods notify every observer and hand back a run manager bound to the
//! same run identity, which is then used for the matching end/error event
//! and for any intermediate events of that run.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use uuid::Uuid;

use super::stdout::{StdOutHandler, STDOUT_HANDLER_NAME};
use super::{Callback, ChainStartInput, ChatModelStartInput, LlmStartInput, RunInfo, ToolStartInput};
use crate::schema::{AgentAction, AgentFinish, Document, ModelResult};
use crate::{ChainValues, Error, Result};

/// Optional identity overrides for [`CallbackManager::new`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Pin the run identity instead of minting a fresh one.
    pub run_id: Option<Uuid>,
    /// Attribute the run to an enclosing run.
    pub parent_run_id: Option<Uuid>,
}

impl ManagerOptions {
    /// Options for a run nested under `parent`.
    #[must_use]
    pub fn child_of(parent: Uuid) -> Self {
        Self {
            run_id: None,
            parent_run_id: Some(parent),
        }
    }
}

/// Invoke `f` on every eligible handler in order.
///
/// A handler is eligible when `verbose` is set or it is always verbose.
/// Failures of non-raising handlers are logged and skipped; the first
/// failure of a raising handler aborts dispatch and is returned.
async fn dispatch<'a, F>(
    handlers: &'a [Arc<dyn Callback>],
    verbose: bool,
    event: &'static str,
    run: RunInfo,
    f: F,
) -> Result<()>
where
    F: Fn(&'a dyn Callback) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    for handler in handlers {
        if !(verbose || handler.always_verbose()) {
            continue;
        }

        if let Err(err) = f(handler.as_ref()).await {
            if handler.raise_error() {
                tracing::warn!(
                    handler = handler.name(),
                    event,
                    run_id = %run.run_id,
                    error = %err,
                    "raising callback failed, stopping dispatch"
                );
                return Err(err);
            }
            tracing::warn!(
                handler = handler.name(),
                event,
                run_id = %run.run_id,
                error = %err,
                "callback failed"
            );
        }
    }
    Ok(())
}

fn same_handler(a: &Arc<dyn Callback>, b: &Arc<dyn Callback>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a).cast::<()>(),
        Arc::as_ptr(b).cast::<()>(),
    )
}

fn dedup(handlers: Vec<Arc<dyn Callback>>) -> Vec<Arc<dyn Callback>> {
    let mut unique: Vec<Arc<dyn Callback>> = Vec::with_capacity(handlers.len());
    for handler in handlers {
        if !unique.iter().any(|h| same_handler(h, &handler)) {
            unique.push(handler);
        }
    }
    unique
}

fn handler_names(handlers: &[Arc<dyn Callback>]) -> Vec<&str> {
    handlers.iter().map(|h| h.name()).collect()
}

/// Handler set and identity shared by managers and run managers.
#[derive(Clone)]
struct RunScope {
    handlers: Vec<Arc<dyn Callback>>,
    inheritable: Vec<Arc<dyn Callback>>,
    run: RunInfo,
    verbose: bool,
}

impl RunScope {
    async fn dispatch<'a, F>(&'a self, event: &'static str, f: F) -> Result<()>
    where
        F: Fn(&'a dyn Callback) -> BoxFuture<'a, Result<()>> + Send + Sync,
    {
        dispatch(&self.handlers, self.verbose, event, self.run, f).await
    }

    fn child(&self) -> CallbackManager {
        CallbackManager::new(
            self.inheritable.clone(),
            self.handlers.clone(),
            self.verbose,
            ManagerOptions::child_of(self.run.run_id),
        )
    }
}

impl fmt::Debug for RunScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunScope")
            .field("run_id", &self.run.run_id)
            .field("parent_run_id", &self.run.parent_run_id)
            .field("handlers", &handler_names(&self.handlers))
            .field("inheritable", &handler_names(&self.inheritable))
            .field("verbose", &self.verbose)
            .finish()
    }
}

/// Dispatcher for one not-yet-started run.
///
/// The effective handler set is the union of the inheritable and local
/// handlers, in that order. When `verbose` is set and no stdout handler is
/// present, a [`StdOutHandler`] is appended.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use llm_chains::callback::{CallbackManager, ManagerOptions, RecordingHandler};
/// use llm_chains::ChainValues;
///
/// # tokio_test::block_on(async {
/// let recorder = Arc::new(RecordingHandler::new());
/// let manager = CallbackManager::new(vec![recorder.clone()], vec![], false, ManagerOptions::default());
///
/// let run = manager.on_chain_start("Demo", &ChainValues::new()).await.unwrap();
/// run.on_chain_end(&ChainValues::new()).await.unwrap();
///
/// assert_eq!(run.run_id(), manager.run_id());
/// assert_eq!(recorder.entries().len(), 2);
/// # });
/// ```
#[derive(Clone, Debug)]
pub struct CallbackManager {
    scope: RunScope,
}

impl CallbackManager {
    /// Build a manager from inheritable and call-local handlers.
    ///
    /// Handlers present in both lists (by pointer identity) are registered
    /// once.
    #[must_use]
    pub fn new(
        inheritable: Vec<Arc<dyn Callback>>,
        local: Vec<Arc<dyn Callback>>,
        verbose: bool,
        options: ManagerOptions,
    ) -> Self {
        let inheritable = dedup(inheritable);
        let mut handlers = dedup(inheritable.iter().cloned().chain(local).collect());

        if verbose && !handlers.iter().any(|h| h.name() == STDOUT_HANDLER_NAME) {
            handlers.push(Arc::new(StdOutHandler::stdout()));
        }

        Self {
            scope: RunScope {
                handlers,
                inheritable,
                run: RunInfo {
                    run_id: options.run_id.unwrap_or_else(Uuid::new_v4),
                    parent_run_id: options.parent_run_id,
                },
                verbose,
            },
        }
    }

    /// Identity of the run this manager will start.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.scope.run.run_id
    }

    #[must_use]
    pub fn parent_run_id(&self) -> Option<Uuid> {
        self.scope.run.parent_run_id
    }

    #[must_use]
    pub fn verbose(&self) -> bool {
        self.scope.verbose
    }

    /// The effective handler set.
    #[must_use]
    pub fn handlers(&self) -> &[Arc<dyn Callback>] {
        &self.scope.handlers
    }

    #[must_use]
    pub fn inheritable_callbacks(&self) -> &[Arc<dyn Callback>] {
        &self.scope.inheritable
    }

    /// Notify a chain start and return the manager for that run.
    pub async fn on_chain_start(
        &self,
        chain_type: &str,
        inputs: &ChainValues,
    ) -> Result<ChainRunManager> {
        let input = ChainStartInput {
            chain_type: chain_type.to_string(),
            inputs: inputs.clone(),
        };
        let input = &input;
        let run = self.scope.run;
        self.scope
            .dispatch("chain_start", move |h| h.on_chain_start(run, input))
            .await?;
        Ok(ChainRunManager {
            scope: self.scope.clone(),
        })
    }

    /// Notify a completion-model start and return the manager for that run.
    pub async fn on_llm_start(&self, input: &LlmStartInput) -> Result<ModelRunManager> {
        let run = self.scope.run;
        self.scope
            .dispatch("llm_start", move |h| h.on_llm_start(run, input))
            .await?;
        Ok(ModelRunManager {
            scope: self.scope.clone(),
        })
    }

    /// Notify a chat-model start and return the manager for that run.
    pub async fn on_chat_model_start(&self, input: &ChatModelStartInput) -> Result<ModelRunManager> {
        let run = self.scope.run;
        self.scope
            .dispatch("chat_model_start", move |h| h.on_chat_model_start(run, input))
            .await?;
        Ok(ModelRunManager {
            scope: self.scope.clone(),
        })
    }

    /// Notify a tool start and return the manager for that run.
    pub async fn on_tool_start(&self, tool_name: &str, tool_input: &str) -> Result<ToolRunManager> {
        let input = ToolStartInput {
            tool_name: tool_name.to_string(),
            input: tool_input.to_string(),
        };
        let input = &input;
        let run = self.scope.run;
        self.scope
            .dispatch("tool_start", move |h| h.on_tool_start(run, input))
            .await?;
        Ok(ToolRunManager {
            scope: self.scope.clone(),
        })
    }

    /// Notify a retriever start and return the manager for that run.
    pub async fn on_retriever_start(&self, query: &str) -> Result<RetrieverRunManager> {
        let run = self.scope.run;
        self.scope
            .dispatch("retriever_start", move |h| h.on_retriever_start(run, query))
            .await?;
        Ok(RetrieverRunManager {
            scope: self.scope.clone(),
        })
    }
}

/// Manager bound to one running chain.
#[derive(Clone, Debug)]
pub struct ChainRunManager {
    scope: RunScope,
}

impl ChainRunManager {
    pub async fn on_chain_end(&self, outputs: &ChainValues) -> Result<()> {
        let run = self.scope.run;
        self.scope
            .dispatch("chain_end", move |h| h.on_chain_end(run, outputs))
            .await
    }

    pub async fn on_chain_error(&self, error: &Error) -> Result<()> {
        let run = self.scope.run;
        self.scope
            .dispatch("chain_error", move |h| h.on_chain_error(run, error))
            .await
    }

    pub async fn on_agent_action(&self, action: &AgentAction) -> Result<()> {
        let run = self.scope.run;
        self.scope
            .dispatch("agent_action", move |h| h.on_agent_action(run, action))
            .await
    }

    pub async fn on_agent_finish(&self, finish: &AgentFinish) -> Result<()> {
        let run = self.scope.run;
        self.scope
            .dispatch("agent_finish", move |h| h.on_agent_finish(run, finish))
            .await
    }

    pub async fn on_text(&self, text: &str) -> Result<()> {
        let run = self.scope.run;
        self.scope
            .dispatch("text", move |h| h.on_text(run, text))
            .await
    }

    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.scope.run.run_id
    }

    #[must_use]
    pub fn parent_run_id(&self) -> Option<Uuid> {
        self.scope.run.parent_run_id
    }

    #[must_use]
    pub fn run_info(&self) -> RunInfo {
        self.scope.run
    }

    #[must_use]
    pub fn verbose(&self) -> bool {
        self.scope.verbose
    }

    #[must_use]
    pub fn handlers(&self) -> &[Arc<dyn Callback>] {
        &self.scope.handlers
    }

    /// Handlers that nested runs inherit.
    #[must_use]
    pub fn inheritable_callbacks(&self) -> &[Arc<dyn Callback>] {
        &self.scope.inheritable
    }

    /// Mint a manager for a run nested under this one.
    ///
    /// The child sees every handler of this run as local handlers, while
    /// only the inheritable set is passed on as inheritable.
    #[must_use]
    pub fn child(&self) -> CallbackManager {
        self.scope.child()
    }
}

/// Manager bound to one running model invocation.
#[derive(Clone, Debug)]
pub struct ModelRunManager {
    scope: RunScope,
}

impl ModelRunManager {
    pub async fn on_model_new_token(&self, token: &str) -> Result<()> {
        let run = self.scope.run;
        self.scope
            .dispatch("model_new_token", move |h| h.on_model_new_token(run, token))
            .await
    }

    pub async fn on_model_end(&self, result: &ModelResult) -> Result<()> {
        let run = self.scope.run;
        self.scope
            .dispatch("model_end", move |h| h.on_model_end(run, result))
            .await
    }

    pub async fn on_model_error(&self, error: &Error) -> Result<()> {
        let run = self.scope.run;
        self.scope
            .dispatch("model_error", move |h| h.on_model_error(run, error))
            .await
    }

    pub async fn on_text(&self, text: &str) -> Result<()> {
        let run = self.scope.run;
        self.scope
            .dispatch("text", move |h| h.on_text(run, text))
            .await
    }

    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.scope.run.run_id
    }

    #[must_use]
    pub fn parent_run_id(&self) -> Option<Uuid> {
        self.scope.run.parent_run_id
    }

    #[must_use]
    pub fn inheritable_callbacks(&self) -> &[Arc<dyn Callback>] {
        &self.scope.inheritable
    }
}

/// Manager bound to one running tool.
#[derive(Clone, Debug)]
pub struct ToolRunManager {
    scope: RunScope,
}

impl ToolRunManager {
    pub async fn on_tool_end(&self, output: &str) -> Result<()> {
        let run = self.scope.run;
        self.scope
            .dispatch("tool_end", move |h| h.on_tool_end(run, output))
            .await
    }

    pub async fn on_tool_error(&self, error: &Error) -> Result<()> {
        let run = self.scope.run;
        self.scope
            .dispatch("tool_error", move |h| h.on_tool_error(run, error))
            .await
    }

    pub async fn on_text(&self, text: &str) -> Result<()> {
        let run = self.scope.run;
        self.scope
            .dispatch("text", move |h| h.on_text(run, text))
            .await
    }

    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.scope.run.run_id
    }

    /// Mint a manager for a run nested under this tool run.
    #[must_use]
    pub fn child(&self) -> CallbackManager {
        self.scope.child()
    }
}

/// Manager bound to one running retrieval.
#[derive(Clone, Debug)]
pub struct RetrieverRunManager {
    scope: RunScope,
}

impl RetrieverRunManager {
    pub async fn on_retriever_end(&self, documents: &[Document]) -> Result<()> {
        let run = self.scope.run;
        self.scope
            .dispatch("retriever_end", move |h| h.on_retriever_end(run, documents))
            .await
    }

    pub async fn on_retriever_error(&self, error: &Error) -> Result<()> {
        let run = self.scope.run;
        self.scope
            .dispatch("retriever_error", move |h| h.on_retriever_error(run, error))
            .await
    }

    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.scope.run.run_id
    }
}
