//! Data types exchanged with external collaborators.
//!
//! Models, agents, tools and retrievers are not implemented by this crate,
//! but their payloads flow through callbacks and chain values, so their
//! shapes live here.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A piece of text with arbitrary metadata, as returned by retrievers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// The document text.
    pub page_content: String,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Document {
    /// Create a document without metadata.
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: HashMap::new(),
        }
    }
}

/// A tool invocation decided by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    /// Name of the tool to invoke.
    pub tool: String,
    /// Input passed to the tool.
    pub tool_input: String,
    /// The agent's reasoning log.
    pub log: String,
}

/// The final answer of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFinish {
    /// Values returned to the caller.
    pub return_values: HashMap<String, Value>,
    /// The agent's reasoning log.
    pub log: String,
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMessageType {
    Human,
    Ai,
    System,
    Generic,
    Function,
}

/// A single message of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message.
    #[serde(rename = "type")]
    pub kind: ChatMessageType,
    /// Message text.
    pub content: String,
    /// Role for generic messages, function name for function messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn human(content: impl Into<String>) -> Self {
        Self::with_kind(ChatMessageType::Human, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::with_kind(ChatMessageType::Ai, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_kind(ChatMessageType::System, content)
    }

    /// A message with a custom role.
    pub fn generic(content: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            kind: ChatMessageType::Generic,
            content: content.into(),
            name: Some(role.into()),
        }
    }

    /// The result of a function call.
    pub fn function(content: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: ChatMessageType::Function,
            content: content.into(),
            name: Some(name.into()),
        }
    }

    fn with_kind(kind: ChatMessageType, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            name: None,
        }
    }
}

/// An ordered conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatMessages(pub Vec<ChatMessage>);

impl ChatMessages {
    /// Render the conversation as `Prefix: content` lines.
    ///
    /// ```rust
    /// use llm_chains::schema::{ChatMessage, ChatMessages};
    ///
    /// let messages = ChatMessages(vec![ChatMessage::human("Hello"), ChatMessage::ai("Hi there")]);
    /// assert_eq!(messages.format("Human", "AI"), "Human: Hello\nAI: Hi there");
    /// ```
    #[must_use]
    pub fn format(&self, human_prefix: &str, ai_prefix: &str) -> String {
        self.0
            .iter()
            .map(|m| {
                let prefix = match m.kind {
                    ChatMessageType::Human => human_prefix,
                    ChatMessageType::Ai => ai_prefix,
                    ChatMessageType::System => "System",
                    ChatMessageType::Function => "Function",
                    ChatMessageType::Generic => m.name.as_deref().unwrap_or("Generic"),
                };
                format!("{prefix}: {}", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ChatMessages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format("Human", "AI"))
    }
}

/// One candidate produced by a model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// Generated text.
    pub text: String,
    /// The chat message, for chat models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChatMessage>,
    /// Provider-specific generation info.
    #[serde(default)]
    pub info: HashMap<String, Value>,
}

impl Generation {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// The result of one model invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResult {
    /// Generated candidates.
    pub generations: Vec<Generation>,
    /// Provider-level output, e.g. `token_usage` and `model_name`.
    #[serde(default)]
    pub llm_output: HashMap<String, Value>,
}
