//! Conversation transcript memory.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::history::{ChatMessageHistory, InMemoryHistory};
use super::Memory;
use crate::schema::ChatMessages;
use crate::{ChainValues, Error, Result};

/// Options for [`ConversationBuffer`].
#[derive(Clone)]
pub struct ConversationBufferOptions {
    /// Prefix of human turns in the formatted transcript.
    pub human_prefix: String,
    /// Prefix of AI turns in the formatted transcript.
    pub ai_prefix: String,
    /// Key under which the transcript is loaded.
    pub memory_key: String,
    /// Input key holding the human turn; inferred when `None`.
    pub input_key: Option<String>,
    /// Output key holding the AI turn; inferred when `None`.
    pub output_key: Option<String>,
    /// Load the message list instead of a formatted transcript.
    pub return_messages: bool,
    /// Keep only the last `k` exchanges.
    pub k: Option<usize>,
    /// Backing store.
    pub history: Arc<dyn ChatMessageHistory>,
}

impl Default for ConversationBufferOptions {
    fn default() -> Self {
        Self {
            human_prefix: "Human".to_string(),
            ai_prefix: "AI".to_string(),
            memory_key: "history".to_string(),
            input_key: None,
            output_key: None,
            return_messages: false,
            k: None,
            history: Arc::new(InMemoryHistory::new()),
        }
    }
}

impl ConversationBufferOptions {
    #[must_use]
    pub fn with_memory_key(mut self, key: impl Into<String>) -> Self {
        self.memory_key = key.into();
        self
    }

    #[must_use]
    pub fn with_prefixes(mut self, human: impl Into<String>, ai: impl Into<String>) -> Self {
        self.human_prefix = human.into();
        self.ai_prefix = ai.into();
        self
    }

    #[must_use]
    pub fn with_input_key(mut self, key: impl Into<String>) -> Self {
        self.input_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_return_messages(mut self, return_messages: bool) -> Self {
        self.return_messages = return_messages;
        self
    }

    /// Window the transcript to the last `k` exchanges.
    #[must_use]
    pub fn with_window(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: Arc<dyn ChatMessageHistory>) -> Self {
        self.history = history;
        self
    }
}

/// Remembers the conversation as alternating human/AI messages.
///
/// # Example
///
/// ```rust
/// use llm_chains::memory::{ConversationBuffer, Memory};
/// use llm_chains::ChainValues;
///
/// # tokio_test::block_on(async {
/// let memory = ConversationBuffer::default();
/// memory
///     .save(&ChainValues::from([("input", "Hi")]), &ChainValues::from([("output", "Hello!")]))
///     .await
///     .unwrap();
///
/// let vars = memory.load(&ChainValues::new()).await.unwrap();
/// assert_eq!(vars["history"], "Human: Hi\nAI: Hello!");
/// # });
/// ```
#[derive(Clone, Default)]
pub struct ConversationBuffer {
    opts: ConversationBufferOptions,
}

impl ConversationBuffer {
    #[must_use]
    pub fn new(opts: ConversationBufferOptions) -> Self {
        Self { opts }
    }

    fn window(&self, messages: ChatMessages) -> ChatMessages {
        match self.opts.k {
            None => messages,
            Some(k) => {
                let start = messages.0.len().saturating_sub(k.saturating_mul(2));
                ChatMessages(messages.0[start..].to_vec())
            }
        }
    }

    fn input_output(&self, inputs: &ChainValues, outputs: &ChainValues) -> Result<(String, String)> {
        let input_key = match &self.opts.input_key {
            Some(key) => key.clone(),
            None => prompt_input_key(inputs, &self.memory_keys())?,
        };
        let output_key = match &self.opts.output_key {
            Some(key) => key.clone(),
            None => {
                let mut keys = outputs.keys();
                match (keys.next(), keys.next()) {
                    (Some(key), None) => key.clone(),
                    _ => {
                        return Err(Error::Memory(format!(
                            "one output key expected, got {}",
                            outputs.len()
                        )))
                    }
                }
            }
        };

        let text = |values: &ChainValues, key: &str| match values.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(Error::Memory(format!("value for key '{key}' is not a string"))),
        };
        Ok((text(inputs, &input_key)?, text(outputs, &output_key)?))
    }
}

/// The single input key that is neither a memory key nor `stop`.
fn prompt_input_key(inputs: &ChainValues, memory_keys: &[String]) -> Result<String> {
    let candidates: Vec<&String> = inputs
        .keys()
        .filter(|k| k.as_str() != "stop" && !memory_keys.contains(k))
        .collect();
    match candidates.as_slice() {
        [key] => Ok((*key).clone()),
        _ => Err(Error::Memory(format!(
            "one input key expected, got {}",
            candidates.len()
        ))),
    }
}

#[async_trait]
impl Memory for ConversationBuffer {
    fn memory_keys(&self) -> Vec<String> {
        vec![self.opts.memory_key.clone()]
    }

    async fn load(&self, _inputs: &ChainValues) -> Result<HashMap<String, Value>> {
        let messages = self.window(self.opts.history.messages().await?);

        let value = if self.opts.return_messages {
            serde_json::to_value(&messages)?
        } else {
            Value::String(messages.format(&self.opts.human_prefix, &self.opts.ai_prefix))
        };

        Ok(HashMap::from([(self.opts.memory_key.clone(), value)]))
    }

    async fn save(&self, inputs: &ChainValues, outputs: &ChainValues) -> Result<()> {
        let (input, output) = self.input_output(inputs, outputs)?;
        self.opts.history.add_user_message(&input).await?;
        self.opts.history.add_ai_message(&output).await
    }

    async fn clear(&self) -> Result<()> {
        self.opts.history.clear().await
    }
}
