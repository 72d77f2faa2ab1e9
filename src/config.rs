//! Configuration for the Moral Spectrometry Engine

#![allow(dead_code)]

use serde::{Deserialize, Serialize};

/// Which LLM backend a [`crate::provider::LlmProvider`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Mock,
    Anthropic,
    OpenAi,
    OpenAiCompatible,
}

impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(ProviderKind::Mock),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "openai" => Ok(ProviderKind::OpenAi),
            "openai_compatible" | "openai-compatible" | "compatible" => {
                Ok(ProviderKind::OpenAiCompatible)
            }
            other => anyhow::bail!("unknown provider: {other}"),
        }
    }
}

/// Engine-wide configuration for a single evaluation run. Accepts both
/// snake_case and camelCase keys on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(alias = "exam_version")]
    pub exam_version: String,

    #[serde(alias = "min_items_per_axis", default = "default_min_items")]
    pub min_items_per_axis: usize,

    #[serde(alias = "max_items_per_axis", default = "default_max_items")]
    pub max_items_per_axis: usize,

    #[serde(alias = "target_se", default = "default_target_se")]
    pub target_se: f64,

    #[serde(alias = "adaptive", default = "default_true")]
    pub adaptive: bool,

    #[serde(alias = "memory_enabled", default)]
    pub memory_enabled: bool,

    #[serde(alias = "seed")]
    pub seed: Option<String>,

    #[serde(alias = "provider", default)]
    pub provider: Option<String>,
}

fn default_min_items() -> usize {
    8
}

fn default_max_items() -> usize {
    15
}

fn default_target_se() -> f64 {
    0.06
}

fn default_true() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            exam_version: "v2".to_string(),
            min_items_per_axis: default_min_items(),
            max_items_per_axis: default_max_items(),
            target_se: default_target_se(),
            adaptive: true,
            memory_enabled: false,
            seed: None,
            provider: None,
        }
    }
}

/// Per-provider connection settings, mirroring the shape used across the
/// corpus (API key pulled from environment, model/temperature/timeout
/// pinned per backend).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Anthropic Messages API.
    pub fn anthropic() -> Self {
        Self {
            api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            base_url: None,
            model: "claude-3-5-sonnet-20241022".to_string(),
            temperature: 0.3,
            max_tokens: 1024,
            timeout_secs: 60,
        }
    }

    /// OpenAI Chat Completions API.
    pub fn openai() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: None,
            model: "gpt-4o".to_string(),
            temperature: 0.3,
            max_tokens: 1024,
            timeout_secs: 60,
        }
    }

    /// Any OpenAI-compatible chat completions endpoint (e.g. a local
    /// llama.cpp server), keyed off `MSE_COMPATIBLE_BASE_URL`.
    pub fn openai_compatible() -> Self {
        Self {
            api_key: std::env::var("MSE_COMPATIBLE_API_KEY").ok(),
            base_url: std::env::var("MSE_COMPATIBLE_BASE_URL").ok(),
            model: std::env::var("MSE_COMPATIBLE_MODEL").unwrap_or_else(|_| "local-model".to_string()),
            temperature: 0.3,
            max_tokens: 1024,
            timeout_secs: 120,
        }
    }

    /// Deterministic heuristic provider used for tests and dry runs.
    pub fn mock() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: "mock-judge-v1".to_string(),
            temperature: 0.0,
            max_tokens: 512,
            timeout_secs: 1,
        }
    }

    pub fn for_kind(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Mock => Self::mock(),
            ProviderKind::Anthropic => Self::anthropic(),
            ProviderKind::OpenAi => Self::openai(),
            ProviderKind::OpenAiCompatible => Self::openai_compatible(),
        }
    }
}
