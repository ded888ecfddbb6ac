use log::{debug, info, warn};
use rand::Rng;
use std::time::Duration;

use crate::core::analysis::BookAnalysis;
use crate::core::config::GenerationConfig;
use crate::core::error::GenerationError;
use crate::core::script::{Scene, SceneOutline, PLACEHOLDER_MODEL};
use crate::core::state::{Claim, GenerationSession};
use crate::services::llm::LlmClient;
use crate::services::placeholder::placeholder_scene;
use crate::utils::json::parse_with_repair;

/// Expands outlines into full scenes, at most once per scene id per session.
pub struct SceneSynthesizer<'a> {
    config: &'a GenerationConfig,
    llm: Option<&'a dyn LlmClient>,
    session: &'a GenerationSession,
}

impl<'a> SceneSynthesizer<'a> {
    pub fn new(
        config: &'a GenerationConfig,
        llm: Option<&'a dyn LlmClient>,
        session: &'a GenerationSession,
    ) -> Self {
        Self {
            config,
            llm,
            session,
        }
    }

    /// Returns the session's scene for `outline.id`, generating it if no one
    /// has yet. Concurrent callers for the same id share one generation.
    pub async fn synthesize(&self, outline: &SceneOutline) -> Scene {
        let wait = Duration::from_secs(self.config.wait_timeout_secs);

        let scene = loop {
            match self.session.claim(&outline.id) {
                Claim::Cached(scene) => {
                    debug!("Scene {} already generated", outline.id);
                    break scene;
                }
                Claim::Owner(flight) => {
                    let scene = self.generate(outline).await;
                    break flight.complete(scene);
                }
                Claim::Pending(mut rx) => {
                    debug!("Scene {} is being generated, waiting", outline.id);
                    match tokio::time::timeout(wait, GenerationSession::wait_for(&mut rx)).await {
                        Ok(Some(scene)) => break scene,
                        Ok(None) => {
                            debug!("Claim on {} was abandoned, retrying", outline.id);
                        }
                        Err(_) => {
                            warn!(
                                "Timed out waiting for scene {}, generating it now",
                                outline.id
                            );
                            let scene = self.generate(outline).await;
                            break self.session.publish(scene);
                        }
                    }
                }
            }
        };

        self.session.record_model(
            &scene.id,
            scene.generated_with.as_deref().unwrap_or(PLACEHOLDER_MODEL),
        );
        scene
    }

    async fn generate(&self, outline: &SceneOutline) -> Scene {
        let analysis = self.session.analysis();
        let Some(llm) = self.llm else {
            return placeholder_scene(outline, &analysis);
        };

        match self.request(llm, outline, &analysis).await {
            Ok(scene) => {
                info!(
                    "Generated scene {} ({} dialogue entries)",
                    scene.id,
                    scene.dialogue.len()
                );
                scene
            }
            Err(e) => {
                warn!(
                    "Scene {} generation failed [{}]: {}, using placeholder",
                    outline.id,
                    e.kind(),
                    e
                );
                placeholder_scene(outline, &analysis)
            }
        }
    }

    async fn request(
        &self,
        llm: &dyn LlmClient,
        outline: &SceneOutline,
        analysis: &BookAnalysis,
    ) -> Result<Scene, GenerationError> {
        let dialogue_count = outline
            .dialogue_count
            .unwrap_or_else(|| rand::rng().random_range(6..=10));
        let prompt = scene_prompt(outline, analysis, dialogue_count);
        debug!("Scene {} prompt: {} chars", outline.id, prompt.len());

        let reply = llm
            .complete(&prompt, &self.config.scene_params)
            .await
            .map_err(GenerationError::Upstream)?;
        debug!("Scene {} reply: {} chars", outline.id, reply.len());

        let mut scene: Scene = parse_with_repair(&reply)?;
        if scene.id != outline.id {
            debug!("Renaming generated scene {:?} to {}", scene.id, outline.id);
            scene.id = outline.id.clone();
        }
        scene.generated_with = Some(llm.model_name().to_string());
        Ok(scene)
    }
}

fn text_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() {
        default
    } else {
        value
    }
}

pub fn scene_prompt(outline: &SceneOutline, analysis: &BookAnalysis, dialogue_count: u32) -> String {
    let mut character_info = String::new();
    for c in outline
        .characters
        .iter()
        .filter_map(|key| analysis.find_character(key))
    {
        character_info.push_str(&format!(
            "- {} (id: {}):\n  * Role: {}\n  * Description: {}\n  * Personality: {}\n  * Speech patterns: {}\n  * Motivations: {}\n",
            text_or(&c.name, "Unknown"),
            c.id,
            c.role.as_deref().unwrap_or("A character in the story"),
            c.description.as_deref().unwrap_or("No description"),
            c.personality.as_deref().unwrap_or(""),
            c.speech_patterns.as_deref().unwrap_or(""),
            c.motivations.as_deref().unwrap_or("Unknown"),
        ));
    }
    if character_info.is_empty() {
        character_info.push_str("No specific characters identified for this scene.\n");
    }

    let connections = if outline.connects_to.is_empty() {
        "None specified".to_string()
    } else {
        outline.connects_to.join(", ")
    };

    format!(
        "Generate a detailed scene for a visual novel with rich dialogue and atmosphere.\n\
        \n\
        SCENE INFORMATION:\n\
        - ID: {id}\n\
        - Description: {description}\n\
        - Setting: {setting}\n\
        - Atmosphere: {atmosphere}\n\
        \n\
        CHARACTERS PRESENT:\n{character_info}\n\
        CONNECTIONS:\n\
        This scene should connect to these scenes: {connections}\n\
        \n\
        REQUIREMENTS:\n\
        1. Create exactly {dialogue_count} dialogue exchanges for a slow, immersive pace.\n\
        2. Every character speaks in their distinctive voice.\n\
        3. Include descriptive narration between dialogue to establish mood and setting.\n\
        4. End with meaningful choices whose nextScene values are the connected scene ids.\n\
        5. Foreshadow any critical plot element before it appears.\n\
        \n\
        Return only a JSON object for this single scene with this structure:\n\
        {{\n\
          \"id\": \"{id}\",\n\
          \"background\": \"Detailed description of the setting and visuals\",\n\
          \"characters\": [ {{ \"id\": \"character_id\", \"image\": \"Detailed character appearance\" }} ],\n\
          \"dialogue\": [\n\
            {{ \"speaker\": \"Character Name\", \"text\": \"Natural dialogue in the character's voice\", \"character\": \"character_id\" }},\n\
            {{ \"speaker\": \"Narrator\", \"text\": \"Narration that establishes mood and emotion\" }},\n\
            {{ \"speaker\": \"Character Name\", \"text\": \"Final choice prompt\", \"character\": \"character_id\",\n\
              \"choices\": [ {{ \"text\": \"Meaningful choice\", \"nextScene\": \"target_scene_id\" }} ] }}\n\
          ]\n\
        }}",
        id = outline.id,
        description = text_or(&outline.description, "A scene in the story"),
        setting = text_or(&outline.setting, "An important location"),
        atmosphere = text_or(&outline.atmosphere, "Creates a specific mood"),
        character_info = character_info,
        connections = connections,
        dialogue_count = dialogue_count,
    )
}
