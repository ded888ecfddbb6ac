use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::services::image::ImageClient;
use crate::services::llm::{LlmClient, SamplingParams};

type Responder = dyn Fn(&str) -> Result<String> + Send + Sync;

/// Text backend whose reply is computed from the prompt.
#[derive(Clone)]
pub struct MockLlm {
    pub calls: Arc<Mutex<usize>>,
    responder: Arc<Responder>,
    delay: Duration,
    online: bool,
}

impl fmt::Debug for MockLlm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockLlm")
            .field("calls", &self.calls)
            .field("online", &self.online)
            .finish()
    }
}

impl MockLlm {
    pub fn new(responder: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            calls: Arc::new(Mutex::new(0)),
            responder: Arc::new(responder),
            delay: Duration::ZERO,
            online: true,
        }
    }

    pub fn replying(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new(move |_| Ok(reply.clone()))
    }

    pub fn failing() -> Self {
        Self::new(|_| Err(anyhow!("Mock upstream error")))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn offline(mut self) -> Self {
        self.online = false;
        self
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, prompt: &str, _params: &SamplingParams) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.responder)(prompt)
    }

    async fn probe(&self) -> Result<()> {
        if self.online {
            Ok(())
        } else {
            Err(anyhow!("Mock backend is offline"))
        }
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

/// Image backend that returns fixed bytes, or fails for prompts containing
/// `fail_on`.
#[derive(Debug, Clone)]
pub struct MockImages {
    pub prompts: Arc<Mutex<Vec<String>>>,
    bytes: Vec<u8>,
    fail_on: Option<String>,
}

impl MockImages {
    pub fn new() -> Self {
        Self {
            prompts: Arc::new(Mutex::new(Vec::new())),
            bytes: png_bytes(16, 16),
            fail_on: None,
        }
    }

    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageClient for MockImages {
    async fn generate(&self, prompt: &str) -> Result<Option<String>> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.fail_on {
            Some(needle) if prompt.contains(needle.as_str()) => Err(anyhow!("Mock image error")),
            _ => Ok(Some("https://images.test/generated.png".to_string())),
        }
    }

    async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    let img = RgbImage::from_pixel(width, height, Rgb([30, 60, 90]));
    let mut out = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}
