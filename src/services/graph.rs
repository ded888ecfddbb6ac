use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::script::Scene;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OutgoingEdge {
    pub target: String,
    pub text: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct IncomingEdge {
    pub source: String,
    pub text: String,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct SceneNode {
    pub outgoing: Vec<OutgoingEdge>,
    pub incoming: Vec<IncomingEdge>,
}

/// Adjacency index over scenes and their choice targets. Derived from scene
/// contents, never authoritative over them.
#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct SceneGraph {
    nodes: HashMap<String, SceneNode>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges the edges of `scenes` into the index. Re-adding a known edge is
    /// a no-op; the first text seen for an edge is kept.
    pub fn update(&mut self, scenes: &[Scene]) {
        for scene in scenes {
            self.nodes.entry(scene.id.clone()).or_default();

            for choice in scene.choices().filter(|c| !c.is_exit()) {
                let source = self.nodes.entry(scene.id.clone()).or_default();
                if !source.outgoing.iter().any(|e| e.target == choice.next_scene) {
                    source.outgoing.push(OutgoingEdge {
                        target: choice.next_scene.clone(),
                        text: choice.text.clone(),
                    });
                }

                let target = self.nodes.entry(choice.next_scene.clone()).or_default();
                if !target.incoming.iter().any(|e| e.source == scene.id) {
                    target.incoming.push(IncomingEdge {
                        source: scene.id.clone(),
                        text: choice.text.clone(),
                    });
                }
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    pub fn incoming(&self, id: &str) -> &[IncomingEdge] {
        self.nodes.get(id).map(|n| n.incoming.as_slice()).unwrap_or(&[])
    }

    pub fn outgoing(&self, id: &str) -> &[OutgoingEdge] {
        self.nodes.get(id).map(|n| n.outgoing.as_slice()).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::script::{Choice, DialogueEntry};

    fn scene(id: &str, choices: &[(&str, &str)]) -> Scene {
        Scene {
            id: id.to_string(),
            dialogue: vec![DialogueEntry::narrator("?").with_choices(
                choices.iter().map(|(t, n)| Choice::new(*t, *n)).collect(),
            )],
            ..Default::default()
        }
    }

    #[test]
    fn test_update_builds_both_directions() {
        let mut graph = SceneGraph::new();
        graph.update(&[
            scene("scene_1", &[("Left", "scene_2"), ("Right", "scene_3")]),
            scene("scene_2", &[("Back", "scene_1"), ("Leave", "exit")]),
        ]);

        assert_eq!(graph.outgoing("scene_1").len(), 2);
        assert_eq!(graph.incoming("scene_1")[0].source, "scene_2");
        assert_eq!(graph.incoming("scene_3")[0].text, "Right");
        // Targets become nodes even before they exist as scenes.
        assert!(graph.contains("scene_3"));
        assert!(!graph.contains("exit"));
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_update_is_idempotent_and_merges() {
        let mut graph = SceneGraph::new();
        let first = [scene("scene_1", &[("Go", "scene_2"), ("Go again", "scene_2")])];
        graph.update(&first);
        let snapshot = graph.clone();
        graph.update(&first);
        assert_eq!(graph, snapshot);
        assert_eq!(graph.outgoing("scene_1").len(), 1);
        assert_eq!(graph.outgoing("scene_1")[0].text, "Go");

        graph.update(&[scene("scene_9", &[("Jump", "scene_2")])]);
        let sources: Vec<_> = graph
            .incoming("scene_2")
            .iter()
            .map(|e| e.source.as_str())
            .collect();
        assert_eq!(sources, vec!["scene_1", "scene_9"]);
    }

    #[test]
    fn test_unknown_ids_have_no_edges() {
        let graph = SceneGraph::new();
        assert!(graph.incoming("nowhere").is_empty());
        assert!(graph.node("nowhere").is_none());
        assert!(graph.is_empty());
    }
}
