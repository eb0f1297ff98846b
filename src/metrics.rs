//! Token usage and cost accounting.

use serde::{Deserialize, Serialize};

/// Aggregated model usage across runs.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Total prompt tokens consumed.
    pub prompt_tokens: u64,
    /// Total completion tokens generated.
    pub completion_tokens: u64,
    /// Total tokens as reported by the provider.
    pub total_tokens: u64,
    /// Model calls that reported provider output.
    pub successful_requests: u64,
    /// Accumulated cost in USD.
    pub total_cost: f64,
}

impl TokenUsage {
    /// Record prompt, completion and total token counts.
    pub fn add_tokens(&mut self, prompt: u64, completion: u64, total: u64) {
        self.prompt_tokens += prompt;
        self.completion_tokens += completion;
        self.total_tokens += total;
    }

    /// Increment the successful request counter.
    pub fn record_request(&mut self) {
        self.successful_requests += 1;
    }

    /// Add a cost in USD.
    pub fn add_cost(&mut self, cost: f64) {
        self.total_cost += cost;
    }
}

impl std::fmt::Display for TokenUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tokens Used: {}\nPrompt Tokens: {}\nCompletion Tokens: {}\nSuccessful Requests: {}\nTotal Cost (USD): ${:.2}",
            self.total_tokens,
            self.prompt_tokens,
            self.completion_tokens,
            self.successful_requests,
            self.total_cost
        )
    }
}
