//! Execution context for chain runs.
//!
//! This module provides the `ExecutionContext` which is passed to every
//! chain, carrying cancellation, stop words and the enclosing run manager.

use tokio_util::sync::CancellationToken;

use crate::callback::ChainRunManager;
use crate::{Error, Result};

/// Context passed to every chain invocation.
///
/// The context is immutable once built. The run driver derives a new
/// context for each nested run, so independent invocation trees never
/// share run state, while cancelling the token stops the whole tree.
///
/// # Example
///
/// ```rust
/// use llm_chains::ExecutionContext;
/// use tokio_util::sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// let ctx = ExecutionContext::new()
///     .with_cancellation(token.clone())
///     .with_stop(vec!["\nObservation:".to_string()]);
///
/// assert!(ctx.check_cancelled().is_ok());
/// token.cancel();
/// assert!(ctx.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    cancellation: CancellationToken,
    stop: Vec<String>,
    run_manager: Option<ChainRunManager>,
}

impl ExecutionContext {
    /// Create a root context with a fresh cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `token` for cancellation.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Stop words forwarded to models.
    #[must_use]
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    /// Derive the context seen by the chain of `run_manager`'s run.
    #[must_use]
    pub fn for_run(&self, run_manager: ChainRunManager) -> Self {
        Self {
            cancellation: self.cancellation.clone(),
            stop: self.stop.clone(),
            run_manager: Some(run_manager),
        }
    }

    /// The cancellation token shared by the whole invocation tree.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Return [`Error::Cancelled`] if cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    #[must_use]
    pub fn stop(&self) -> &[String] {
        &self.stop
    }

    /// Manager of the enclosing chain run, if running under the driver.
    #[must_use]
    pub fn run_manager(&self) -> Option<&ChainRunManager> {
        self.run_manager.as_ref()
    }
}
