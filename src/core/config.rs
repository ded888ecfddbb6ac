use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::services::image::ImageConfig;
use crate::services::llm::{LlmConfig, SamplingParams};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Text backend. Without one every run takes the offline placeholder path.
    #[serde(default)]
    pub llm: Option<LlmConfig>,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_scene_limit")]
    pub scene_limit: usize,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// How long a caller waits on another caller's in-flight scene before
    /// generating it itself.
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_secs: u64,

    #[serde(default = "default_outline_params")]
    pub outline_params: SamplingParams,

    #[serde(default = "default_scene_params")]
    pub scene_params: SamplingParams,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            scene_limit: default_scene_limit(),
            max_concurrency: default_max_concurrency(),
            wait_timeout_secs: default_wait_timeout(),
            outline_params: default_outline_params(),
            scene_params: default_scene_params(),
        }
    }
}

fn default_scene_limit() -> usize {
    5
}
fn default_max_concurrency() -> usize {
    5
}
fn default_wait_timeout() -> u64 {
    30
}
fn default_outline_params() -> SamplingParams {
    SamplingParams {
        temperature: 0.7,
        top_p: 0.95,
        top_k: 40,
        max_tokens: 2500,
    }
}
fn default_scene_params() -> SamplingParams {
    SamplingParams {
        temperature: 0.8,
        top_p: 0.95,
        top_k: 40,
        max_tokens: 4000,
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.yml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("{} not found. Please create one.", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(content)?)
    }
}
