//! Token and cost tracking for OpenAI-style model output.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::{Callback, RunInfo};
use crate::metrics::TokenUsage;
use crate::schema::ModelResult;
use crate::{Error, Result};

/// USD price per 1K tokens.
fn cost_per_1k_tokens(model: &str) -> Option<f64> {
    let cost = match model {
        "gpt-4" | "gpt-4-0314" => 0.03,
        "gpt-4-completion" | "gpt-4-0314-completion" => 0.06,
        "gpt-4-32k" | "gpt-4-32k-0314" => 0.06,
        "gpt-4-32k-completion" | "gpt-4-32k-0314-completion" => 0.12,
        "gpt-3.5-turbo" | "gpt-3.5-turbo-0301" => 0.002,
        "text-ada-001" | "ada" => 0.0004,
        "text-babbage-001" | "babbage" => 0.0005,
        "text-curie-001" | "curie" => 0.002,
        "text-davinci-003" | "text-davinci-002" | "code-davinci-002" => 0.02,
        "ada-finetuned" => 0.0016,
        "babbage-finetuned" => 0.0024,
        "curie-finetuned" => 0.012,
        "davinci-finetuned" => 0.12,
        _ => return None,
    };
    Some(cost)
}

fn standardize_model_name(model: &str, is_completion: bool) -> String {
    let model = model.to_lowercase();
    if model.contains("ft-") {
        let base = model.split(':').next().unwrap_or_default();
        format!("{base}-finetuned")
    } else if is_completion && model.starts_with("gpt-4") {
        format!("{model}-completion")
    } else {
        model
    }
}

fn token_cost(model: &str, tokens: u64, is_completion: bool) -> Option<f64> {
    let name = standardize_model_name(model, is_completion);
    cost_per_1k_tokens(&name).map(|per_1k| per_1k * tokens as f64 / 1000.0)
}

fn count(usage: &serde_json::Map<String, Value>, key: &str) -> u64 {
    usage.get(key).and_then(Value::as_u64).unwrap_or(0)
}

/// Accumulates token usage and cost from `on_model_end`.
///
/// Reads `llm_output["token_usage"]` (`prompt_tokens`, `completion_tokens`,
/// `total_tokens`) and `llm_output["model_name"]`. Always verbose. An
/// unknown model name is a failure, which only interrupts the run when the
/// handler is built with [`raising`](TokenUsageHandler::raising).
#[derive(Debug, Default)]
pub struct TokenUsageHandler {
    usage: Mutex<TokenUsage>,
    raise_error: bool,
}

impl TokenUsageHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make accounting failures abort the notifying run.
    #[must_use]
    pub fn raising(mut self) -> Self {
        self.raise_error = true;
        self
    }

    /// Snapshot of the usage so far.
    #[must_use]
    pub fn usage(&self) -> TokenUsage {
        self.usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Callback for TokenUsageHandler {
    fn name(&self) -> &str {
        "token_usage"
    }

    fn always_verbose(&self) -> bool {
        true
    }

    fn raise_error(&self) -> bool {
        self.raise_error
    }

    async fn on_model_end(&self, _run: RunInfo, result: &ModelResult) -> Result<()> {
        if result.llm_output.is_empty() {
            return Ok(());
        }

        let mut usage = self.usage.lock().unwrap_or_else(PoisonError::into_inner);
        usage.record_request();

        let Some(tokens) = result.llm_output.get("token_usage").and_then(Value::as_object) else {
            return Ok(());
        };
        let prompt = count(tokens, "prompt_tokens");
        let completion = count(tokens, "completion_tokens");
        let total = count(tokens, "total_tokens");

        if let Some(model) = result.llm_output.get("model_name").and_then(Value::as_str) {
            let costs = token_cost(model, completion, true).zip(token_cost(model, prompt, false));
            let Some((completion_cost, prompt_cost)) = costs else {
                return Err(Error::callback(self.name(), format!("unknown model: {model}")));
            };
            usage.add_cost(completion_cost + prompt_cost);
        }

        usage.add_tokens(prompt, completion, total);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run() -> RunInfo {
        RunInfo {
            run_id: uuid::Uuid::new_v4(),
            parent_run_id: None,
        }
    }

    fn result(model: &str) -> ModelResult {
        let mut result = ModelResult::default();
        result.llm_output.insert(
            "token_usage".to_string(),
            json!({"prompt_tokens": 1000, "completion_tokens": 500, "total_tokens": 1500}),
        );
        result
            .llm_output
            .insert("model_name".to_string(), json!(model));
        result
    }

    #[test]
    fn test_standardize_model_name() {
        assert_eq!(standardize_model_name("GPT-4", true), "gpt-4-completion");
        assert_eq!(standardize_model_name("gpt-4", false), "gpt-4");
        assert_eq!(
            standardize_model_name("curie:ft-acme-2023", false),
            "curie-finetuned"
        );
    }

    #[tokio::test]
    async fn test_accumulates_usage_and_cost() {
        let handler = TokenUsageHandler::new();
        handler.on_model_end(run(), &result("gpt-4")).await.unwrap();

        let usage = handler.usage();
        assert_eq!(usage.successful_requests, 1);
        assert_eq!(usage.prompt_tokens, 1000);
        assert_eq!(usage.completion_tokens, 500);
        assert_eq!(usage.total_tokens, 1500);
        // 1000 prompt tokens at 0.03 + 500 completion tokens at 0.06
        assert!((usage.total_cost - 0.06).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unknown_model_fails() {
        let handler = TokenUsageHandler::new();
        let err = handler
            .on_model_end(run(), &result("mystery-model"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown model: mystery-model"));
    }

    #[tokio::test]
    async fn test_empty_output_is_ignored() {
        let handler = TokenUsageHandler::new();
        handler
            .on_model_end(run(), &ModelResult::default())
            .await
            .unwrap();
        assert_eq!(handler.usage(), TokenUsage::default());
    }
}
