//! Human-readable progress output.

use std::io::{self, Stdout, Write};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{Callback, ChainStartInput, RunInfo};
use crate::schema::{AgentAction, AgentFinish};
use crate::{ChainValues, Error, Result};

/// Name under which the stdout handler registers.
///
/// Managers use it to avoid adding a second stdout handler in verbose mode.
pub const STDOUT_HANDLER_NAME: &str = "stdout";

/// The handler managers append when running verbose.
pub type StdOutHandler = WriterHandler<Stdout>;

/// Writes chain progress, agent logs, tool output and free text to `W`.
///
/// # Example
///
/// ```rust
/// use llm_chains::callback::{Callback, RunInfo, WriterHandler};
///
/// # tokio_test::block_on(async {
/// let handler = WriterHandler::new(Vec::new());
/// let run = RunInfo { run_id: uuid::Uuid::new_v4(), parent_run_id: None };
/// handler.on_text(run, "hello").await.unwrap();
///
/// assert_eq!(handler.into_inner(), b"hello\n");
/// # });
/// ```
#[derive(Debug)]
pub struct WriterHandler<W> {
    writer: Mutex<W>,
    name: &'static str,
}

impl WriterHandler<Stdout> {
    /// Handler writing to the process's standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self {
            writer: Mutex::new(io::stdout()),
            name: STDOUT_HANDLER_NAME,
        }
    }
}

impl<W: Write + Send> WriterHandler<W> {
    /// Handler writing to an arbitrary sink.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            name: "writer",
        }
    }

    /// Consume the handler, returning the sink.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_line(&self, line: &str) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{line}").map_err(|e| Error::callback(self.name, e.to_string()))
    }
}

#[async_trait]
impl<W: Write + Send> Callback for WriterHandler<W> {
    fn name(&self) -> &str {
        self.name
    }

    async fn on_chain_start(&self, _run: RunInfo, input: &ChainStartInput) -> Result<()> {
        self.write_line(&format!(
            "\n\n\x1b[1m> Entering new {} chain...\x1b[0m",
            input.chain_type
        ))
    }

    async fn on_chain_end(&self, _run: RunInfo, _outputs: &ChainValues) -> Result<()> {
        self.write_line("\n\x1b[1m> Finished chain.\x1b[0m")
    }

    async fn on_agent_action(&self, _run: RunInfo, action: &AgentAction) -> Result<()> {
        self.write_line(&action.log)
    }

    async fn on_agent_finish(&self, _run: RunInfo, finish: &AgentFinish) -> Result<()> {
        self.write_line(&finish.log)
    }

    async fn on_tool_end(&self, _run: RunInfo, output: &str) -> Result<()> {
        self.write_line(output)
    }

    async fn on_text(&self, _run: RunInfo, text: &str) -> Result<()> {
        self.write_line(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> RunInfo {
        RunInfo {
            run_id: uuid::Uuid::new_v4(),
            parent_run_id: None,
        }
    }

    #[tokio::test]
    async fn test_chain_progress_lines() {
        let handler = WriterHandler::new(Vec::new());
        let input = ChainStartInput {
            chain_type: "Sequential".to_string(),
            inputs: ChainValues::new(),
        };
        handler.on_chain_start(run(), &input).await.unwrap();
        handler.on_chain_end(run(), &ChainValues::new()).await.unwrap();

        let out = String::from_utf8(handler.into_inner()).unwrap();
        assert!(out.contains("Entering new Sequential chain..."));
        assert!(out.contains("Finished chain."));
    }

    #[test]
    fn test_names() {
        assert_eq!(WriterHandler::stdout().name(), STDOUT_HANDLER_NAME);
        assert_eq!(WriterHandler::new(Vec::new()).name(), "writer");
    }
}
