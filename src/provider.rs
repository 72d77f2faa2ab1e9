//! LLM provider abstraction.
//!
//! Used two ways: as the judge backend for C4 (GRM scorer sends a rubric
//! prompt and parses a JSON verdict out of the response) and, in the
//! `mse-bench` harness, as the simulated subject answering dilemma prompts.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{ProviderConfig, ProviderKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub tokens_used: usize,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub latency_ms: u64,
    pub model: String,
    pub finish_reason: Option<String>,
}

#[async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<LlmResponse>;

    fn name(&self) -> &str;

    fn is_available(&self) -> bool;
}

pub fn create_provider(kind: ProviderKind) -> Box<dyn LlmProvider> {
    match kind {
        ProviderKind::Mock => Box::new(MockProvider::new()),
        ProviderKind::Anthropic => Box::new(AnthropicProvider::new(ProviderConfig::anthropic())),
        ProviderKind::OpenAi => Box::new(OpenAiProvider::new(ProviderConfig::openai())),
        ProviderKind::OpenAiCompatible => {
            Box::new(OpenAiProvider::new(ProviderConfig::openai_compatible()))
        }
    }
}

// ============ Mock Provider ============

/// Deterministic, dependency-free provider used for dry runs and tests.
/// Recognizes the GRM judge's rubric prompt shape and returns a plausible
/// JSON verdict instead of calling out to a network.
#[derive(Debug)]
pub struct MockProvider {
    latency_ms: u64,
}

impl MockProvider {
    pub fn new() -> Self {
        Self { latency_ms: 20 }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn generate(&self, prompt: &str, _system_prompt: Option<&str>) -> Result<LlmResponse> {
        tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;
        let content = generate_mock_response(prompt);

        Ok(LlmResponse {
            content,
            tokens_used: 120,
            prompt_tokens: 80,
            completion_tokens: 40,
            latency_ms: self.latency_ms,
            model: "mock-judge-v1".to_string(),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn generate_mock_response(prompt: &str) -> String {
    let lower = prompt.to_lowercase();

    if lower.contains("grm rubric") || lower.contains("score the response") {
        let mentions_both = lower.contains("both") || lower.contains("trade-off") || lower.contains("tradeoff");
        let category = if mentions_both { 3 } else { 2 };
        return serde_json::json!({
            "category": category,
            "mentions_both_poles": mentions_both,
            "identifies_non_obvious": lower.contains("however") || lower.contains("consider"),
            "recognizes_residue": lower.contains("regret") || lower.contains("cost"),
            "reasoning_quality": 0.6,
            "reasoning": "Heuristic mock judge: surface pattern match on rubric keywords."
        })
        .to_string();
    }

    "I would weigh the competing obligations here and lean toward the option that minimizes harm, \
     while acknowledging the cost to the other party."
        .to_string()
}

// ============ shared retry helper ============

async fn with_retry<F, Fut, T>(mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let mut backoff = Duration::from_secs(1);
    let max_retries = 5;

    for i in 0..max_retries {
        match f().await {
            Ok(res) => return Ok(res),
            Err(e) if i < max_retries - 1 => {
                let msg = e.to_string();
                if msg.contains("429")
                    || msg.contains("500")
                    || msg.contains("502")
                    || msg.contains("503")
                    || msg.contains("timeout")
                {
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    continue;
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!()
}

// ============ Anthropic Provider ============

#[derive(Debug)]
pub struct AnthropicProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("failed to build HTTP client");
        Self { config, client }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<LlmResponse> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("ANTHROPIC_API_KEY not set"))?;

        let start = std::time::Instant::now();

        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens
        });
        if let Some(sys) = system_prompt {
            body["system"] = serde_json::json!(sys);
        }

        let resp = with_retry(|| async {
            let r = self
                .client
                .post("https://api.anthropic.com/v1/messages")
                .header("x-api-key", api_key)
                .header("anthropic-version", "2023-06-01")
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await?;

            if !r.status().is_success() {
                return Err(anyhow::anyhow!("API error: {}", r.status()));
            }
            Ok(r)
        })
        .await?;

        let response: serde_json::Value = resp.json().await?;
        let content = response["content"][0]["text"].as_str().unwrap_or("").to_string();
        let input_tokens = response["usage"]["input_tokens"].as_u64().unwrap_or(0) as usize;
        let output_tokens = response["usage"]["output_tokens"].as_u64().unwrap_or(0) as usize;

        Ok(LlmResponse {
            content,
            tokens_used: input_tokens + output_tokens,
            prompt_tokens: input_tokens,
            completion_tokens: output_tokens,
            latency_ms: start.elapsed().as_millis() as u64,
            model: self.config.model.clone(),
            finish_reason: response["stop_reason"].as_str().map(String::from),
        })
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn is_available(&self) -> bool {
        self.config.api_key.is_some()
    }
}

// ============ OpenAI / OpenAI-compatible Provider ============

#[derive(Debug)]
pub struct OpenAiProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("failed to build HTTP client");
        Self { config, client }
    }

    fn endpoint(&self) -> String {
        match &self.config.base_url {
            Some(base) => format!("{}/v1/chat/completions", base.trim_end_matches('/')),
            None => "https://api.openai.com/v1/chat/completions".to_string(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<LlmResponse> {
        let start = std::time::Instant::now();

        let mut messages = Vec::new();
        if let Some(sys) = system_prompt {
            messages.push(serde_json::json!({"role": "system", "content": sys}));
        }
        messages.push(serde_json::json!({"role": "user", "content": prompt}));

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens
        });

        let mut request = self.client.post(self.endpoint()).header("Content-Type", "application/json");
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let resp = with_retry(|| async {
            let r = request
                .try_clone()
                .ok_or_else(|| anyhow::anyhow!("request not cloneable"))?
                .json(&body)
                .send()
                .await?;

            if !r.status().is_success() {
                return Err(anyhow::anyhow!("API error: {}", r.status()));
            }
            Ok(r)
        })
        .await?;

        let response: serde_json::Value = resp.json().await?;
        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();
        let prompt_tokens = response["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as usize;
        let completion_tokens = response["usage"]["completion_tokens"].as_u64().unwrap_or(0) as usize;
        let total_tokens = response["usage"]["total_tokens"].as_u64().unwrap_or(0) as usize;

        Ok(LlmResponse {
            content,
            tokens_used: total_tokens,
            prompt_tokens,
            completion_tokens,
            latency_ms: start.elapsed().as_millis() as u64,
            model: self.config.model.clone(),
            finish_reason: response["choices"][0]["finish_reason"].as_str().map(String::from),
        })
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn is_available(&self) -> bool {
        self.config.api_key.is_some() || self.config.base_url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_provider_is_always_available() {
        let provider = MockProvider::new();
        assert!(provider.is_available());
    }

    #[tokio::test]
    async fn mock_provider_recognizes_judge_prompts() {
        let provider = MockProvider::new();
        let resp = provider
            .generate("Please use the GRM rubric to score the response below for trade-off awareness", None)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&resp.content).unwrap();
        assert!(parsed["category"].is_number());
    }
}
