use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: String, // "gemini", "ollama" or "openai"
    #[serde(default = "default_retry_count")]
    pub retry_count: usize,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
    pub gemini: Option<GeminiConfig>,
    pub ollama: Option<OllamaConfig>,
    pub openai: Option<OpenAIConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeminiConfig {
    /// Falls back to `GOOGLE_API_KEY`.
    pub api_key: Option<String>,
    #[serde(default = "default_gemini_model")]
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIConfig {
    /// Falls back to `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
}

fn default_retry_count() -> usize {
    3
}
fn default_retry_delay() -> u64 {
    10
}
fn default_gemini_model() -> String {
    "gemini-1.5-pro".to_string()
}

/// Sampling parameters passed with every completion request.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait LlmClient: Send + Sync + Debug {
    async fn complete(&self, prompt: &str, params: &SamplingParams) -> Result<String>;

    /// Start-up availability check.
    async fn probe(&self) -> Result<()> {
        Ok(())
    }

    /// Label recorded in the generation info for content this client wrote.
    fn model_name(&self) -> &str;
}

pub fn create_llm(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    let inner: Box<dyn LlmClient> = match config.provider.as_str() {
        "gemini" => {
            let cfg = config.gemini.as_ref().context("Gemini config missing")?;
            let api_key = resolve_key(cfg.api_key.as_deref(), "GOOGLE_API_KEY")?;
            Box::new(GeminiClient::new(&api_key, &cfg.model))
        }
        "ollama" => {
            let cfg = config.ollama.as_ref().context("Ollama config missing")?;
            Box::new(OllamaClient::new(&cfg.base_url, &cfg.model))
        }
        "openai" => {
            let cfg = config.openai.as_ref().context("OpenAI config missing")?;
            let api_key = resolve_key(cfg.api_key.as_deref(), "OPENAI_API_KEY")?;
            Box::new(OpenAIClient::new(&api_key, &cfg.model, cfg.base_url.as_deref()))
        }
        _ => return Err(anyhow!("Unknown LLM provider: {}", config.provider)),
    };

    Ok(Box::new(RetryingClient::new(
        inner,
        config.retry_count,
        Duration::from_secs(config.retry_delay_seconds),
    )))
}

fn resolve_key(configured: Option<&str>, env_var: &str) -> Result<String> {
    match configured {
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        _ => std::env::var(env_var).with_context(|| format!("API key missing: set {}", env_var)),
    }
}

// --- Retry ---

/// Retries failed completions with a fixed delay. Probes are not retried.
#[derive(Debug)]
pub struct RetryingClient {
    inner: Box<dyn LlmClient>,
    retry_count: usize,
    delay: Duration,
}

impl RetryingClient {
    pub fn new(inner: Box<dyn LlmClient>, retry_count: usize, delay: Duration) -> Self {
        Self {
            inner,
            retry_count,
            delay,
        }
    }
}

#[async_trait]
impl LlmClient for RetryingClient {
    async fn complete(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        let attempts = self.retry_count + 1;
        let mut last_error = anyhow!("No attempt made");

        for attempt in 0..attempts {
            if attempt > 0 {
                warn!(
                    "{} completion failed (attempt {}/{}), retrying...",
                    self.inner.model_name(),
                    attempt,
                    attempts
                );
                tokio::time::sleep(self.delay).await;
            }

            match self.inner.complete(prompt, params).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    debug!("Completion error: {:#}", e);
                    last_error = e;
                }
            }
        }

        Err(last_error.context(format!("Completion failed after {} attempts", attempts)))
    }

    async fn probe(&self) -> Result<()> {
        self.inner.probe().await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

// --- Gemini ---
#[derive(Debug)]
struct GeminiClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
struct GeminiPartResponse {
    text: String,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    message: String,
}

#[derive(Deserialize)]
struct GeminiModelList {
    #[serde(default)]
    models: Vec<GeminiModel>,
}

#[derive(Deserialize)]
struct GeminiModel {
    name: String,
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: params.temperature,
                top_p: params.top_p,
                top_k: params.top_k,
                max_output_tokens: params.max_tokens,
            },
        };

        let resp = self.client.post(&url).json(&request_body).send().await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("Gemini API error: {}", error_text));
        }

        let response_text = resp.text().await?;
        let result: GeminiResponse = match serde_json::from_str(&response_text) {
            Ok(r) => r,
            Err(e) => {
                return Err(anyhow!(
                    "Failed to parse Gemini response: {}. Body: {}",
                    e,
                    response_text
                ))
            }
        };

        if let Some(err) = result.error {
            return Err(anyhow!("Gemini API returned error: {}", err.message));
        }

        if let Some(candidates) = result.candidates {
            if let Some(first) = candidates.first() {
                if let Some(content) = &first.content {
                    if let Some(part) = content.parts.first() {
                        return Ok(part.text.clone());
                    }
                }

                let reason = first.finish_reason.as_deref().unwrap_or("UNKNOWN");
                return Err(anyhow!("Gemini response empty. Finish reason: {}", reason));
            }
        }

        Err(anyhow!(
            "Gemini response format unexpected or empty. Body: {}",
            response_text
        ))
    }

    async fn probe(&self) -> Result<()> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models?key={}",
            self.api_key
        );
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("Gemini model list failed: {}", resp.status()));
        }

        let list: GeminiModelList = resp.json().await?;
        if list.models.iter().any(|m| m.name.to_lowercase().contains("gemini")) {
            Ok(())
        } else {
            Err(anyhow!("Gemini API reachable but no Gemini models listed"))
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// --- Ollama ---
#[derive(Debug)]
struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessageResponse,
}

#[derive(Deserialize)]
struct OllamaMessageResponse {
    content: String,
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);

        let request_body = OllamaRequest {
            model: self.model.clone(),
            messages: vec![OllamaMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: false,
            options: OllamaOptions {
                temperature: params.temperature,
                top_p: params.top_p,
                top_k: params.top_k,
                num_predict: params.max_tokens,
            },
        };

        let resp = self.client.post(&url).json(&request_body).send().await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("Ollama API error: {}", error_text));
        }

        let result: OllamaResponse = resp.json().await?;
        Ok(result.message.content)
    }

    async fn probe(&self) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(anyhow!("Ollama not available: {}", resp.status()))
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// --- OpenAI ---

#[derive(Debug)]
struct OpenAIClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIClient {
    fn new(api_key: &str, model: &str, base_url: Option<&str>) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        // top_k has no OpenAI equivalent
        let request_body = OpenAIRequest {
            model: self.model.clone(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
        };

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("OpenAI API error: {}", error_text));
        }

        let result: OpenAIResponse = resp.json().await?;
        if let Some(choice) = result.choices.first() {
            if let Some(content) = &choice.message.content {
                return Ok(content.clone());
            }
        }

        Err(anyhow!("OpenAI response empty or missing content"))
    }

    async fn probe(&self) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(anyhow!("OpenAI model list failed: {}", resp.status()))
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug)]
    struct FlakyClient {
        failures_left: Arc<Mutex<usize>>,
        calls: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl LlmClient for FlakyClient {
        async fn complete(&self, _prompt: &str, _params: &SamplingParams) -> Result<String> {
            *self.calls.lock().unwrap() += 1;
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                Err(anyhow!("Mock upstream error"))
            } else {
                Ok("ok".to_string())
            }
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    fn params() -> SamplingParams {
        SamplingParams {
            temperature: 0.5,
            top_p: 0.9,
            top_k: 10,
            max_tokens: 100,
        }
    }

    #[tokio::test]
    async fn test_retrying_client_recovers() -> Result<()> {
        let calls = Arc::new(Mutex::new(0));
        let client = RetryingClient::new(
            Box::new(FlakyClient {
                failures_left: Arc::new(Mutex::new(2)),
                calls: calls.clone(),
            }),
            2,
            Duration::ZERO,
        );

        assert_eq!(client.complete("hi", &params()).await?, "ok");
        assert_eq!(*calls.lock().unwrap(), 3);
        assert_eq!(client.model_name(), "flaky");
        Ok(())
    }

    #[tokio::test]
    async fn test_retrying_client_gives_up() {
        let calls = Arc::new(Mutex::new(0));
        let client = RetryingClient::new(
            Box::new(FlakyClient {
                failures_left: Arc::new(Mutex::new(5)),
                calls: calls.clone(),
            }),
            1,
            Duration::ZERO,
        );

        assert!(client.complete("hi", &params()).await.is_err());
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let config = LlmConfig {
            provider: "mystery".to_string(),
            retry_count: 0,
            retry_delay_seconds: 0,
            gemini: None,
            ollama: None,
            openai: None,
        };
        assert!(create_llm(&config).is_err());
    }

    #[test]
    fn test_gemini_request_uses_camel_case_generation_config() {
        let body = GeminiRequest {
            contents: vec![],
            generation_config: GeminiGenerationConfig {
                temperature: 0.7,
                top_p: 0.95,
                top_k: 40,
                max_output_tokens: 2500,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2500);
        assert_eq!(json["generationConfig"]["topK"], 40);
    }

    #[test]
    fn test_gemini_response_parsing_safety_block() {
        let json = r#"{
            "candidates": [
                {
                    "finishReason": "SAFETY",
                    "index": 0
                }
            ]
        }"#;

        let result: GeminiResponse = serde_json::from_str(json).unwrap();
        let candidate = &result.candidates.as_ref().unwrap()[0];

        assert!(candidate.content.is_none());
        assert_eq!(candidate.finish_reason.as_deref(), Some("SAFETY"));
    }

    #[test]
    fn test_gemini_model_list_parsing() {
        let json = r#"{ "models": [ { "name": "models/gemini-1.5-pro", "version": "001" } ] }"#;
        let list: GeminiModelList = serde_json::from_str(json).unwrap();
        assert_eq!(list.models[0].name, "models/gemini-1.5-pro");
    }

    #[test]
    fn test_openai_response_parsing_success() {
        let json = r#"{
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "{\"scenes\": []}"
                },
                "finish_reason": "stop"
            }]
        }"#;

        let result: OpenAIResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            result.choices[0].message.content.as_deref(),
            Some("{\"scenes\": []}")
        );
    }
}
