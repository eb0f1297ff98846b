//! Storage for conversation messages.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::schema::{ChatMessage, ChatMessages};
use crate::Result;

/// A store of chat messages backing conversational memory.
#[async_trait]
pub trait ChatMessageHistory: Send + Sync {
    /// All stored messages, oldest first.
    async fn messages(&self) -> Result<ChatMessages>;

    /// Append a message.
    async fn add_message(&self, message: ChatMessage) -> Result<()>;

    /// Remove all messages.
    async fn clear(&self) -> Result<()>;

    async fn add_user_message(&self, text: &str) -> Result<()> {
        self.add_message(ChatMessage::human(text)).await
    }

    async fn add_ai_message(&self, text: &str) -> Result<()> {
        self.add_message(ChatMessage::ai(text)).await
    }
}

/// Process-local message history.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    messages: Mutex<Vec<ChatMessage>>,
}

impl InMemoryHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing messages.
    #[must_use]
    pub fn with_messages(messages: ChatMessages) -> Self {
        Self {
            messages: Mutex::new(messages.0),
        }
    }
}

#[async_trait]
impl ChatMessageHistory for InMemoryHistory {
    async fn messages(&self) -> Result<ChatMessages> {
        let messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(ChatMessages(messages.clone()))
    }

    async fn add_message(&self, message: ChatMessage) -> Result<()> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_history() {
        let history = InMemoryHistory::new();
        history.add_user_message("hi").await.unwrap();
        history.add_ai_message("hello").await.unwrap();

        let messages = history.messages().await.unwrap();
        assert_eq!(
            messages,
            ChatMessages(vec![ChatMessage::human("hi"), ChatMessage::ai("hello")])
        );

        history.clear().await.unwrap();
        assert!(history.messages().await.unwrap().is_empty());
    }
}
