use log::{debug, info, warn};
use rand::Rng;

use crate::core::analysis::BookAnalysis;
use crate::core::config::GenerationConfig;
use crate::core::error::GenerationError;
use crate::core::script::Outline;
use crate::services::llm::LlmClient;
use crate::services::placeholder::fallback_outline;
use crate::utils::json::parse_with_repair;

/// Turns a book analysis into a bounded list of scene outlines.
pub struct OutlinePlanner<'a> {
    config: &'a GenerationConfig,
    llm: Option<&'a dyn LlmClient>,
}

impl<'a> OutlinePlanner<'a> {
    pub fn new(config: &'a GenerationConfig, llm: Option<&'a dyn LlmClient>) -> Self {
        Self { config, llm }
    }

    /// Never fails: any backend or parse problem yields the fallback outline.
    pub async fn plan(&self, analysis: &BookAnalysis, scene_limit: usize) -> Outline {
        let mut outline = match self.llm {
            None => fallback_outline(),
            Some(llm) => match self.request(llm, analysis, scene_limit).await {
                Ok(outline) if !outline.scenes.is_empty() => outline,
                Ok(_) => {
                    warn!("Outline reply contained no scenes, using fallback outline");
                    fallback_outline()
                }
                Err(e) => {
                    warn!("Outline generation failed [{}]: {}", e.kind(), e);
                    fallback_outline()
                }
            },
        };

        outline.scenes.truncate(scene_limit.max(1));
        let mut rng = rand::rng();
        for scene in &mut outline.scenes {
            scene.id = scene.id.trim().to_string();
            if scene.id.is_empty() {
                scene.id = format!("scene_{}", rng.random_range(1000..=9999));
            }
        }

        info!(
            "Planned {} scenes ({})",
            outline.scenes.len(),
            outline.generated_with
        );
        outline
    }

    async fn request(
        &self,
        llm: &dyn LlmClient,
        analysis: &BookAnalysis,
        scene_limit: usize,
    ) -> Result<Outline, GenerationError> {
        let prompt = outline_prompt(analysis, scene_limit);
        debug!("Outline prompt: {} chars", prompt.len());

        let reply = llm
            .complete(&prompt, &self.config.outline_params)
            .await
            .map_err(GenerationError::Upstream)?;
        debug!("Outline reply: {} chars", reply.len());

        let mut outline: Outline = parse_with_repair(&reply)?;
        outline.generated_with = llm.model_name().to_string();
        Ok(outline)
    }
}

fn text_or<'a>(value: &'a Option<String>, default: &'a str) -> &'a str {
    value.as_deref().unwrap_or(default)
}

pub fn outline_prompt(analysis: &BookAnalysis, scene_limit: usize) -> String {
    let mut character_info = String::new();
    for c in analysis.characters.iter().take(7) {
        character_info.push_str(&format!(
            "- {}: {}\n  * Description: {}\n  * Personality: {}\n  * Speech patterns: {}\n  * Motivations: {}\n  * Relationships: {}\n",
            if c.name.is_empty() { "Unknown" } else { c.name.as_str() },
            text_or(&c.role, "A character"),
            text_or(&c.description, "No description"),
            text_or(&c.personality, ""),
            text_or(&c.speech_patterns, ""),
            text_or(&c.motivations, ""),
            text_or(&c.relationships, "Unknown"),
        ));
    }

    let mut branching_info = String::new();
    for (i, bp) in analysis.plot.branching_points.iter().take(5).enumerate() {
        let options: Vec<String> = bp.options.iter().map(|o| format!("\"{}\"", o)).collect();
        branching_info.push_str(&format!(
            "- Choice point {}: {}\n  * Options: {}\n",
            i + 1,
            text_or(&bp.description, "A decision"),
            options.join(", "),
        ));
    }

    let key_points: Vec<&str> = analysis
        .plot
        .key_points
        .iter()
        .take(8)
        .map(String::as_str)
        .collect();
    let themes: Vec<&str> = if analysis.themes.is_empty() {
        vec!["adventure"]
    } else {
        analysis.themes.iter().take(3).map(String::as_str).collect()
    };

    format!(
        "Create a detailed outline for an interactive visual novel adaptation of this book:\n\
        \n\
        TITLE: {title}\n\
        \n\
        KEY CHARACTERS:\n{character_info}\n\
        PLOT SUMMARY:\n{summary}\n\
        \n\
        CENTRAL CONFLICT:\n{conflict}\n\
        \n\
        KEY PLOT POINTS:\n{key_points}\n\
        \n\
        POTENTIAL BRANCHING POINTS:\n{branching_info}\n\
        THEMES: {themes}\n\
        TONE: {tone}\n\
        \n\
        REQUIREMENTS:\n\
        1. PACING: a slow, deliberate progression that lets readers immerse themselves.\n\
        2. SCENE DEVELOPMENT: every scene establishes setting, mood and character emotions.\n\
        3. FORESHADOWING: important plot elements are established before they matter.\n\
        4. NARRATIVE DEPTH: every scene has 6-10 dialogue exchanges.\n\
        5. BRANCHING STRUCTURE: meaningful choice points with consequences.\n\
        \n\
        Create exactly {scene_limit} scenes that follow a clear narrative path with branching options.\n\
        For each scene provide an id (e.g. \"scene_1\", \"scene_forest\"), a 4-5 sentence description, \
        the characters present, the setting and atmosphere, and the scenes it connects to.\n\
        \n\
        Output only JSON in this format:\n\
        {{\n\
          \"scenes\": [\n\
            {{\n\
              \"id\": \"scene_id\",\n\
              \"description\": \"Detailed description of what happens in this scene\",\n\
              \"characters\": [\"char1\", \"char2\"],\n\
              \"setting\": \"Detailed setting description\",\n\
              \"atmosphere\": \"Mood and tone of the scene\",\n\
              \"dialogue_count\": 8,\n\
              \"connects_to\": [\"scene_id_1\", \"scene_id_2\"]\n\
            }}\n\
          ]\n\
        }}",
        title = analysis.title(),
        character_info = character_info,
        summary = text_or(&analysis.plot.summary, "A story with characters and challenges."),
        conflict = text_or(
            &analysis.plot.central_conflict,
            "A conflict that drives the narrative"
        ),
        key_points = key_points.join(", "),
        branching_info = branching_info,
        themes = themes.join(", "),
        tone = text_or(&analysis.tone, "neutral"),
        scene_limit = scene_limit,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analysis::{Character, Metadata};
    use crate::core::script::PLACEHOLDER_MODEL;
    use crate::services::testing::MockLlm;

    fn analysis() -> BookAnalysis {
        BookAnalysis {
            metadata: Metadata {
                title: Some("The Speckled Band".to_string()),
                author: Some("Arthur Conan Doyle".to_string()),
            },
            characters: (0..9)
                .map(|i| Character {
                    id: format!("c{}", i),
                    name: format!("Character {}", i),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    const THREE_SCENES: &str = r#"```json
    { "scenes": [
        { "id": "scene_1", "description": "Helen arrives", "connects_to": ["scene_2"] },
        { "id": "  ", "description": "Holmes reasons" },
        { "id": "scene_3", "description": "The whistle" }
    ] }
    ```"#;

    #[test]
    fn test_prompt_is_bounded() {
        let prompt = outline_prompt(&analysis(), 4);
        assert!(prompt.contains("TITLE: The Speckled Band"));
        assert!(prompt.contains("Create exactly 4 scenes"));
        assert!(prompt.contains("Character 6"));
        assert!(!prompt.contains("Character 7"));
        assert!(prompt.contains("THEMES: adventure"));
        assert!(prompt.contains("TONE: neutral"));
    }

    #[tokio::test]
    async fn test_plan_parses_truncates_and_names() {
        let config = GenerationConfig::default();
        let llm = MockLlm::replying(THREE_SCENES);
        let planner = OutlinePlanner::new(&config, Some(&llm));

        let outline = planner.plan(&analysis(), 2).await;

        assert_eq!(outline.scenes.len(), 2);
        assert_eq!(outline.generated_with, "mock-model");
        assert_eq!(outline.scenes[0].connects_to, vec!["scene_2".to_string()]);
        let generated = &outline.scenes[1].id;
        let number: u32 = generated.strip_prefix("scene_").unwrap().parse().unwrap();
        assert!((1000..=9999).contains(&number));
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_plan_repairs_truncated_reply() {
        let config = GenerationConfig::default();
        let llm = MockLlm::replying(r#"{"scenes": [{"id": "scene_1", "characters": ["holmes""#);
        let planner = OutlinePlanner::new(&config, Some(&llm));

        let outline = planner.plan(&analysis(), 5).await;
        assert_eq!(outline.scenes.len(), 1);
        assert_eq!(outline.scenes[0].characters, vec!["holmes".to_string()]);
    }

    #[tokio::test]
    async fn test_plan_falls_back() {
        let config = GenerationConfig::default();
        for llm in [
            MockLlm::failing(),
            MockLlm::replying("I cannot help with that."),
            MockLlm::replying(r#"{"scenes": []}"#),
        ] {
            let planner = OutlinePlanner::new(&config, Some(&llm));
            let outline = planner.plan(&analysis(), 5).await;
            assert_eq!(outline.generated_with, PLACEHOLDER_MODEL);
            assert_eq!(outline.scenes[0].id, "scene_1");
            assert_eq!(outline.scenes[1].id, "scene_2a");
        }

        let planner = OutlinePlanner::new(&config, None);
        assert_eq!(planner.plan(&analysis(), 1).await.scenes.len(), 1);
    }
}
