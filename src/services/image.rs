use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Debug;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageConfig {
    /// `replicate`, or absent to use placeholder art only.
    #[serde(default)]
    pub provider: Option<String>,

    pub replicate: Option<ReplicateConfig>,

    /// Longest edge of an embedded image, in pixels.
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Shorter background descriptions are not worth an image request.
    #[serde(default = "default_min_description_len")]
    pub min_description_len: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            provider: None,
            replicate: None,
            max_dimension: default_max_dimension(),
            jpeg_quality: default_jpeg_quality(),
            max_concurrency: default_max_concurrency(),
            min_description_len: default_min_description_len(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReplicateConfig {
    /// Falls back to `REPLICATE_API_TOKEN`.
    pub api_token: Option<String>,
    #[serde(default = "default_replicate_version")]
    pub model_version: String,
    #[serde(default = "default_image_size")]
    pub width: u32,
    #[serde(default = "default_image_size")]
    pub height: u32,
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
}

fn default_max_dimension() -> u32 {
    800
}
fn default_jpeg_quality() -> u8 {
    85
}
fn default_max_concurrency() -> usize {
    4
}
fn default_min_description_len() -> usize {
    10
}
fn default_replicate_version() -> String {
    // bytedance/sdxl-lightning-4step
    "5599ed30703defd1d160a25a63321b4dec97101d98b4674bcc56e41f62f35637".to_string()
}
fn default_image_size() -> u32 {
    1024
}
fn default_poll_attempts() -> u32 {
    60
}

#[async_trait]
pub trait ImageClient: Send + Sync + Debug {
    /// Returns the URL of the generated image, or `None` if the backend
    /// produced nothing.
    async fn generate(&self, prompt: &str) -> Result<Option<String>>;

    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

pub fn create_image_client(config: &ImageConfig) -> Result<Option<Box<dyn ImageClient>>> {
    match config.provider.as_deref() {
        None => Ok(None),
        Some("replicate") => {
            let cfg = config.replicate.clone().context("Replicate config missing")?;
            let token = match cfg.api_token.as_deref() {
                Some(t) if !t.is_empty() => t.to_string(),
                _ => std::env::var("REPLICATE_API_TOKEN")
                    .context("API token missing: set REPLICATE_API_TOKEN")?,
            };
            info!("Using Replicate for image generation");
            Ok(Some(Box::new(ReplicateClient::new(token, cfg))))
        }
        Some(other) => Err(anyhow!("Unknown image provider: {}", other)),
    }
}

// --- Replicate ---

#[derive(Debug)]
struct ReplicateClient {
    token: String,
    config: ReplicateConfig,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct Prediction {
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    urls: Option<PredictionUrls>,
}

#[derive(Deserialize)]
struct PredictionUrls {
    get: String,
}

impl Prediction {
    fn first_output(&self) -> Option<String> {
        match self.output.as_ref()? {
            serde_json::Value::Array(items) => items.first()?.as_str().map(str::to_string),
            serde_json::Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }
}

impl ReplicateClient {
    fn new(token: String, config: ReplicateConfig) -> Self {
        Self {
            token,
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn poll(&self, url: &str) -> Result<Prediction> {
        for _ in 0..self.config.poll_attempts {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let prediction: Prediction = self
                .client
                .get(url)
                .bearer_auth(&self.token)
                .send()
                .await?
                .json()
                .await
                .context("Failed to parse Replicate prediction")?;
            if prediction.is_terminal() {
                return Ok(prediction);
            }
        }
        Err(anyhow!("Replicate prediction did not finish in time"))
    }
}

#[async_trait]
impl ImageClient for ReplicateClient {
    async fn generate(&self, prompt: &str) -> Result<Option<String>> {
        let body = json!({
            "version": self.config.model_version,
            "input": {
                "width": self.config.width,
                "height": self.config.height,
                "prompt": prompt,
                "scheduler": "K_EULER",
                "num_outputs": 1,
                "guidance_scale": 0,
                "negative_prompt": "worst quality, low quality, blurry, distorted features",
                "num_inference_steps": 4
            }
        });

        let resp = self
            .client
            .post("https://api.replicate.com/v1/predictions")
            .bearer_auth(&self.token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("Replicate API error: {}", error_text));
        }

        let mut prediction: Prediction = resp
            .json()
            .await
            .context("Failed to parse Replicate prediction")?;

        if !prediction.is_terminal() {
            let url = prediction
                .urls
                .as_ref()
                .map(|u| u.get.clone())
                .ok_or_else(|| anyhow!("Replicate prediction has no polling URL"))?;
            debug!("Replicate prediction still {}, polling", prediction.status);
            prediction = self.poll(&url).await?;
        }

        if prediction.status != "succeeded" {
            return Err(anyhow!(
                "Replicate prediction {}: {}",
                prediction.status,
                prediction.error.map(|e| e.to_string()).unwrap_or_default()
            ));
        }

        Ok(prediction.first_output())
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let url = url::Url::parse(url).with_context(|| format!("Invalid image URL: {}", url))?;
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("Failed to download image: {}", resp.status()));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}
