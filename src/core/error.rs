use thiserror::Error;

/// Failure modes of the generation backends.
///
/// None of these escape the planner, synthesizer or visual enhancer: they
/// are logged and replaced with placeholder content where they occur.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("text backend failed: {0:#}")]
    Upstream(anyhow::Error),

    #[error("backend output did not match the expected shape: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("image generation failed: {0:#}")]
    Image(anyhow::Error),
}

impl GenerationError {
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Upstream(_) => "UPSTREAM_ERROR",
            GenerationError::Malformed(_) => "MALFORMED_OUTPUT",
            GenerationError::Image(_) => "IMAGE_ERROR",
        }
    }
}
