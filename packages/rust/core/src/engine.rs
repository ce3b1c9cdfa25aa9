//! Analysis engine: an OpenAI-compatible chat completion client.
//!
//! The engine is asked for a JSON object and the first choice's content must
//! deserialize into [`Analysis`]. There is no retry here; a failed call or an
//! unparseable reply is reported to the caller, which skips the contract.

use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use contractscope_shared::{
    Analysis, AnalysisConfig, AppConfig, ContractScopeError, Result, validate_api_key,
};

use crate::prompt::{SYSTEM_PROMPT, build_prompt};

/// Produces a structured analysis for one contract's source.
pub trait AnalysisEngine: Send + Sync {
    fn analyze(&self, source: &str) -> impl Future<Output = Result<Analysis>> + Send;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

// ---------------------------------------------------------------------------
// OpenAiEngine
// ---------------------------------------------------------------------------

/// Chat-completions engine with fixed model and temperature.
#[derive(Debug, Clone)]
pub struct OpenAiEngine {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiEngine {
    /// Build an engine from config, reading the API key from the environment.
    ///
    /// Fails with a config error when the key is missing.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = validate_api_key(config)?;
        Self::new(&config.analysis, api_key)
    }

    pub fn new(config: &AnalysisConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ContractScopeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

impl AnalysisEngine for OpenAiEngine {
    async fn analyze(&self, source: &str) -> Result<Analysis> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage::new("system", SYSTEM_PROMPT),
                ChatMessage::new("user", build_prompt(source)),
            ],
            temperature: self.temperature,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let start = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ContractScopeError::Analysis(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ContractScopeError::Analysis(format!(
                "HTTP {status}: {}",
                body.trim()
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ContractScopeError::Analysis(format!("malformed completion: {e}")))?;

        if let Some(usage) = &completion.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                latency_ms = start.elapsed().as_millis() as u64,
                "analysis completed"
            );
        }

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ContractScopeError::Analysis("empty response".into()))?;

        let analysis: Analysis = serde_json::from_str(&content).map_err(|e| {
            ContractScopeError::Analysis(format!("response is not a valid analysis: {e}"))
        })?;

        Ok(analysis.dedup_tags())
    }
}
