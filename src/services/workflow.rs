use anyhow::Result;
use futures_util::StreamExt;
use log::{info, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::analysis::BookAnalysis;
use crate::core::config::Config;
use crate::core::script::{GenerationInfo, Scene, ScriptData, PLACEHOLDER_MODEL};
use crate::core::state::GenerationSession;
use crate::services::image::{create_image_client, ImageClient};
use crate::services::llm::{create_llm, LlmClient};
use crate::services::placeholder::offline_script;
use crate::services::planner::OutlinePlanner;
use crate::services::resolver::SceneResolver;
use crate::services::synthesizer::SceneSynthesizer;
use crate::services::validator::validate;
use crate::services::visuals::VisualEnhancer;

pub struct VisualNovelGenerator {
    config: Config,
    llm: Option<Box<dyn LlmClient>>,
    images: Option<Box<dyn ImageClient>>,
    session: GenerationSession,
    backend_available: AtomicBool,
}

impl VisualNovelGenerator {
    pub fn new(
        config: Config,
        llm: Option<Box<dyn LlmClient>>,
        images: Option<Box<dyn ImageClient>>,
    ) -> Self {
        let backend_available = AtomicBool::new(llm.is_some());
        Self {
            config,
            llm,
            images,
            session: GenerationSession::new(),
            backend_available,
        }
    }

    /// Builds the configured backends. A missing `llm` section means offline
    /// generation; a broken one is an error.
    pub fn from_config(config: Config) -> Result<Self> {
        let llm = config.llm.as_ref().map(create_llm).transpose()?;
        let images = create_image_client(&config.image)?;
        Ok(Self::new(config, llm, images))
    }

    pub fn session(&self) -> &GenerationSession {
        &self.session
    }

    fn llm(&self) -> Option<&dyn LlmClient> {
        if self.backend_available.load(Ordering::Relaxed) {
            self.llm.as_deref()
        } else {
            None
        }
    }

    async fn probe(&self) -> bool {
        let available = match self.llm.as_deref() {
            None => {
                info!("No text backend configured, generating offline");
                false
            }
            Some(llm) => match llm.probe().await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Text backend {} unavailable: {:#}", llm.model_name(), e);
                    false
                }
            },
        };
        self.backend_available.store(available, Ordering::Relaxed);
        available
    }

    /// Runs the whole pipeline for one book. Never fails: every backend
    /// problem degrades to placeholder content.
    pub async fn generate(&self, analysis: BookAnalysis) -> ScriptData {
        self.session.begin(analysis);
        let analysis = self.session.analysis();

        let script = if self.probe().await {
            self.generate_online(&analysis).await
        } else {
            self.generate_offline(&analysis)
        };

        info!(
            "Generated \"{}\": {} scenes, outline by {}",
            script.title,
            script.scenes.len(),
            script.generation_info.outline_model
        );
        script
    }

    fn generate_offline(&self, analysis: &BookAnalysis) -> ScriptData {
        let mut script = offline_script(analysis);
        validate(&mut script);
        self.remember(&script.scenes);
        for scene in &script.scenes {
            self.session.record_model(&scene.id, PLACEHOLDER_MODEL);
        }
        script
    }

    async fn generate_online(&self, analysis: &BookAnalysis) -> ScriptData {
        let generation = &self.config.generation;
        let llm = self.llm();

        let outline = OutlinePlanner::new(generation, llm)
            .plan(analysis, generation.scene_limit)
            .await;

        let synthesizer = SceneSynthesizer::new(generation, llm, &self.session);
        let generated: Vec<Scene> = futures_util::stream::iter(outline.scenes.iter())
            .map(|o| synthesizer.synthesize(o))
            .buffered(generation.max_concurrency.max(1))
            .collect()
            .await;

        let mut seen = HashSet::new();
        let scenes: Vec<Scene> = generated
            .into_iter()
            .filter(|s| seen.insert(s.id.clone()))
            .collect();

        let mut script = ScriptData {
            title: format!("{}: Interactive Edition", analysis.title()),
            scenes,
            generation_info: GenerationInfo::default(),
        };

        VisualEnhancer::new(&self.config.image, self.images.as_deref(), &self.session)
            .enhance(&mut script.scenes, &analysis.characters)
            .await;

        let report = validate(&mut script);
        if !report.is_clean() {
            info!("Repaired {} graph issues", report.issues.len());
        }
        self.remember(&script.scenes);

        script.generation_info = GenerationInfo {
            outline_model: outline.generated_with,
            scene_models: self.session.scene_models(),
            backend_available: true,
        };
        script
    }

    fn remember(&self, scenes: &[Scene]) {
        for scene in scenes {
            self.session.store(scene.clone());
        }
        self.session.update_graph(scenes);
    }

    /// Returns the scene for `id`, generating it from graph context if it
    /// was never produced.
    pub async fn resolve_scene(&self, id: &str) -> Scene {
        SceneResolver::new(&self.config.generation, self.llm(), &self.session)
            .resolve_or_create(id)
            .await
    }

    /// Resolves `id`, gives it images and appends it to `script`. A scene
    /// the script already holds is returned unchanged.
    pub async fn extend_script(&self, script: &mut ScriptData, id: &str) -> Scene {
        if let Some(existing) = script.scene(id) {
            return existing.clone();
        }

        let mut scene = self.resolve_scene(id).await;
        let analysis = self.session.analysis();
        VisualEnhancer::new(&self.config.image, self.images.as_deref(), &self.session)
            .enhance_from(
                std::slice::from_mut(&mut scene),
                &analysis.characters,
                script.scenes.len(),
            )
            .await;
        self.session.store(scene.clone());

        script.generation_info.scene_models.insert(
            scene.id.clone(),
            scene
                .generated_with
                .clone()
                .unwrap_or_else(|| PLACEHOLDER_MODEL.to_string()),
        );
        script.scenes.push(scene.clone());
        scene
    }
}
