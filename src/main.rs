use anyhow::{Context, Result};
use log::{info, warn};
use std::path::Path;

use novel2vn::core::analysis::BookAnalysis;
use novel2vn::core::config::Config;
use novel2vn::services::workflow::VisualNovelGenerator;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .context("Usage: novel2vn <analysis.json>")?;

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("{:#}; generating offline", e);
            Config::default()
        }
    };

    let content = std::fs::read_to_string(Path::new(&path))
        .with_context(|| format!("Failed to read {}", path))?;
    let analysis: BookAnalysis = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse book analysis {}", path))?;

    let generator = VisualNovelGenerator::from_config(config)?;
    let script = generator.generate(analysis).await;
    info!("Writing {} scenes", script.scenes.len());

    println!("{}", serde_json::to_string_pretty(&script)?);
    Ok(())
}
