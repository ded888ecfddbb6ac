use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Terminal choice target. Never validated or indexed.
pub const EXIT_SCENE: &str = "exit";

/// Model label recorded for placeholder content.
pub const PLACEHOLDER_MODEL: &str = "Placeholder";

/// Planning record for one scene, as returned by the outline planner.
#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SceneOutline {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default)]
    pub setting: String,
    #[serde(default)]
    pub atmosphere: String,
    #[serde(
        default,
        alias = "dialogue_count",
        deserialize_with = "lenient_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub dialogue_count: Option<u32>,
    #[serde(default, alias = "connects_to")]
    pub connects_to: Vec<String>,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct Outline {
    #[serde(default)]
    pub scenes: Vec<SceneOutline>,
    #[serde(skip)]
    pub generated_with: String,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub characters: Vec<SceneCharacter>,
    #[serde(default)]
    pub dialogue: Vec<DialogueEntry>,
    #[serde(default, alias = "generated_with", skip_serializing_if = "Option::is_none")]
    pub generated_with: Option<String>,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct SceneCharacter {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub image: String,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DialogueEntry {
    #[serde(default)]
    pub speaker: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, alias = "character", skip_serializing_if = "Option::is_none")]
    pub character_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Choice>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    #[serde(default)]
    pub text: String,
    #[serde(alias = "next_scene")]
    pub next_scene: String,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationInfo {
    pub outline_model: String,
    pub scene_models: BTreeMap<String, String>,
    pub backend_available: bool,
}

/// The document handed to the rendering front end.
#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptData {
    pub title: String,
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub generation_info: GenerationInfo,
}

impl DialogueEntry {
    pub fn narrator(text: impl Into<String>) -> Self {
        Self {
            speaker: "Narrator".to_string(),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn spoken(speaker: &str, character_id: &str, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.to_string(),
            text: text.into(),
            character_id: Some(character_id.to_string()),
            choices: None,
        }
    }

    pub fn with_choices(mut self, choices: Vec<Choice>) -> Self {
        self.choices = Some(choices);
        self
    }
}

impl Choice {
    pub fn new(text: impl Into<String>, next_scene: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            next_scene: next_scene.into(),
        }
    }

    pub fn is_exit(&self) -> bool {
        self.next_scene == EXIT_SCENE
    }
}

impl Scene {
    /// All choices of the scene, in dialogue order.
    pub fn choices(&self) -> impl Iterator<Item = &Choice> {
        self.dialogue
            .iter()
            .filter_map(|d| d.choices.as_ref())
            .flatten()
    }

    pub fn choices_mut(&mut self) -> impl Iterator<Item = &mut Choice> {
        self.dialogue
            .iter_mut()
            .filter_map(|d| d.choices.as_mut())
            .flatten()
    }

    /// Targets of every non-exit choice, in dialogue order.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.choices()
            .filter(|c| !c.is_exit())
            .map(|c| c.next_scene.as_str())
    }

    pub fn has_choice_point(&self) -> bool {
        self.dialogue.iter().any(|d| d.choices.is_some())
    }
}

impl ScriptData {
    pub fn scene(&self, id: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.scene(id).is_some()
    }
}

/// True when the value is an embeddable image rather than a description.
pub fn is_image_ref(value: &str) -> bool {
    value.starts_with("data:")
}

// The text backend is prompted with "6-10" as the expected range and
// occasionally echoes a string back.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => {
            let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        }
        _ => None,
    })
}
