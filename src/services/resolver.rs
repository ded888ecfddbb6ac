use log::info;
use rand::Rng;

use crate::core::config::GenerationConfig;
use crate::core::script::{Scene, SceneOutline};
use crate::core::state::GenerationSession;
use crate::services::llm::LlmClient;
use crate::services::synthesizer::SceneSynthesizer;

/// How much the session knows about a requested scene id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Cached,
    /// Named by at least one choice in an indexed scene.
    KnownTarget,
    Unknown,
}

/// Produces scenes the reader navigates to that were never generated.
pub struct SceneResolver<'a> {
    config: &'a GenerationConfig,
    llm: Option<&'a dyn LlmClient>,
    session: &'a GenerationSession,
}

impl<'a> SceneResolver<'a> {
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

    pub fn classify(&self, id: &str) -> Resolution {
        if self.session.has_scene(id) {
            Resolution::Cached
        } else if self.session.with_graph(|g| !g.incoming(id).is_empty()) {
            Resolution::KnownTarget
        } else {
            Resolution::Unknown
        }
    }

    /// Outline for a scene that has not been generated, built from whatever
    /// the graph says leads to it.
    pub fn outline_for(&self, id: &str) -> SceneOutline {
        let sources: Vec<String> = self.session.with_graph(|g| {
            g.incoming(id).iter().map(|e| e.source.clone()).collect()
        });

        if sources.is_empty() {
            return SceneOutline {
                id: id.to_string(),
                description: "Continuation of the adventure".to_string(),
                characters: Vec::new(),
                setting: "A location within the story world".to_string(),
                atmosphere: "Consistent with the narrative".to_string(),
                dialogue_count: Some(8),
                connects_to: vec!["scene_next".to_string(), "scene_alt".to_string()],
            };
        }

        let mut characters: Vec<String> = Vec::new();
        for source in sources.iter().filter_map(|s| self.session.scene(s)) {
            for c in source.characters {
                if !c.id.is_empty() && !characters.contains(&c.id) {
                    characters.push(c.id);
                }
            }
        }

        SceneOutline {
            id: id.to_string(),
            description: format!("Continuation of the story from {}", sources.join(", ")),
            characters,
            setting: "A location appropriate to the story progression".to_string(),
            atmosphere: "Consistent with the narrative tone".to_string(),
            dialogue_count: Some(rand::rng().random_range(7..=10)),
            connects_to: Vec::new(),
        }
    }

    pub async fn resolve_or_create(&self, id: &str) -> Scene {
        let resolution = self.classify(id);
        let outline = match resolution {
            Resolution::Cached => match self.session.scene(id) {
                Some(scene) => return scene,
                None => self.outline_for(id),
            },
            _ => self.outline_for(id),
        };
        info!("Resolving scene {} ({:?})", id, resolution);

        let scene = SceneSynthesizer::new(self.config, self.llm, self.session)
            .synthesize(&outline)
            .await;
        self.session.update_graph(std::slice::from_ref(&scene));
        scene
    }
}
