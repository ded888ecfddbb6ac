use serde::{Deserialize, Serialize};

/// Output of the upstream book analysis step. Every field is optional on the
/// wire; the generator only reads it.
#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct BookAnalysis {
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub settings: Vec<Setting>,
    #[serde(default)]
    pub plot: Plot,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub tone: Option<String>,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct Metadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct Character {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub speech_patterns: Option<String>,
    #[serde(default)]
    pub motivations: Option<String>,
    #[serde(default)]
    pub relationships: Option<String>,
    #[serde(default)]
    pub arc: Option<String>,
    #[serde(default)]
    pub importance: Option<String>,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct Setting {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub atmosphere: Option<String>,
    #[serde(default)]
    pub significance: Option<String>,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct Plot {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub central_conflict: Option<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub branching_points: Vec<BranchingPoint>,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct BranchingPoint {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

impl BookAnalysis {
    pub fn title(&self) -> &str {
        self.metadata
            .title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or("Untitled")
    }

    /// Finds a character by id, or by case-insensitive name.
    pub fn find_character(&self, key: &str) -> Option<&Character> {
        self.characters
            .iter()
            .find(|c| c.id == key || c.name.to_lowercase() == key.to_lowercase())
    }
}
