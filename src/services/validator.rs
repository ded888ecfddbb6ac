use log::{info, warn};
use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

use crate::core::script::{Choice, Scene, ScriptData};

/// Something the validator found, and what it did about it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphIssue {
    #[error("choice {text:?} in {source_scene} pointed at missing scene {target}, now {replacement}")]
    DanglingReference {
        source_scene: String,
        text: String,
        target: String,
        replacement: String,
    },

    #[error("scene {scene} was unreachable, linked from {linked_from}")]
    UnreachableScene { scene: String, linked_from: String },

    #[error("scene {scene} is unreachable and no reachable scene offers choices")]
    Unrepairable { scene: String },
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValidationReport {
    pub entry: Option<String>,
    pub issues: Vec<GraphIssue>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn dangling(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| matches!(i, GraphIssue::DanglingReference { .. }))
            .count()
    }

    pub fn unrepaired(&self) -> Vec<&str> {
        self.issues
            .iter()
            .filter_map(|i| match i {
                GraphIssue::Unrepairable { scene } => Some(scene.as_str()),
                _ => None,
            })
            .collect()
    }
}

pub const EXPLORE_TEXT: &str = "Explore a different path";

/// Rewrites dangling choice targets and links unreachable scenes in place.
pub fn validate(script: &mut ScriptData) -> ValidationReport {
    validate_with_rng(script, &mut rand::rng())
}

pub fn validate_with_rng<R: Rng + ?Sized>(script: &mut ScriptData, rng: &mut R) -> ValidationReport {
    let mut report = ValidationReport::default();
    if script.scenes.is_empty() {
        return report;
    }

    repair_references(&mut script.scenes, &mut report);

    let entry = entry_scene(&script.scenes).to_string();
    repair_reachability(&mut script.scenes, &entry, rng, &mut report);
    report.entry = Some(entry);

    info!(
        "Validated {} scenes: {} issues",
        script.scenes.len(),
        report.issues.len()
    );
    report
}

/// `scene_intro`, then `scene_1`, then whichever scene comes first.
pub fn entry_scene(scenes: &[Scene]) -> &str {
    ["scene_intro", "scene_1"]
        .into_iter()
        .find(|id| scenes.iter().any(|s| s.id == *id))
        .or_else(|| scenes.first().map(|s| s.id.as_str()))
        .unwrap_or_default()
}

fn repair_references(scenes: &mut [Scene], report: &mut ValidationReport) {
    let ids: Vec<String> = scenes.iter().map(|s| s.id.clone()).collect();
    let known: HashSet<&str> = ids.iter().map(String::as_str).collect();

    for scene in scenes.iter_mut() {
        let source = scene.id.clone();
        for choice in scene.choices_mut() {
            if choice.is_exit() || known.contains(choice.next_scene.as_str()) {
                continue;
            }
            let target = &choice.next_scene;
            let replacement = ids
                .iter()
                .find(|id| target.contains(id.as_str()) || id.contains(target.as_str()))
                .unwrap_or(&ids[0])
                .clone();

            let issue = GraphIssue::DanglingReference {
                source_scene: source.clone(),
                text: choice.text.clone(),
                target: target.clone(),
                replacement: replacement.clone(),
            };
            warn!("{}", issue);
            report.issues.push(issue);
            choice.next_scene = replacement;
        }
    }
}

/// Every scene reachable from `entry` over non-exit choices.
pub fn reachable_from(scenes: &[Scene], entry: &str) -> HashSet<String> {
    let mut reachable = HashSet::new();
    let mut queue = VecDeque::from([entry.to_string()]);

    while let Some(id) = queue.pop_front() {
        if !reachable.insert(id.clone()) {
            continue;
        }
        if let Some(scene) = scenes.iter().find(|s| s.id == id) {
            for target in scene.targets() {
                if !reachable.contains(target) {
                    queue.push_back(target.to_string());
                }
            }
        }
    }
    reachable
}

fn repair_reachability<R: Rng + ?Sized>(
    scenes: &mut [Scene],
    entry: &str,
    rng: &mut R,
    report: &mut ValidationReport,
) {
    let mut reachable = reachable_from(scenes, entry);

    while let Some(missing) = scenes
        .iter()
        .find(|s| !reachable.contains(&s.id))
        .map(|s| s.id.clone())
    {
        let candidates: Vec<usize> = scenes
            .iter()
            .enumerate()
            .filter(|(_, s)| reachable.contains(&s.id) && s.has_choice_point())
            .map(|(i, _)| i)
            .collect();

        let Some(&source) = candidates.choose(rng) else {
            for scene in scenes.iter().filter(|s| !reachable.contains(&s.id)) {
                let issue = GraphIssue::Unrepairable {
                    scene: scene.id.clone(),
                };
                warn!("{}", issue);
                report.issues.push(issue);
            }
            return;
        };

        let host = &mut scenes[source];
        if let Some(choices) = host
            .dialogue
            .iter_mut()
            .rev()
            .find_map(|d| d.choices.as_mut())
        {
            choices.push(Choice::new(EXPLORE_TEXT, missing.as_str()));
        }

        let issue = GraphIssue::UnreachableScene {
            scene: missing,
            linked_from: host.id.clone(),
        };
        warn!("{}", issue);
        report.issues.push(issue);

        reachable = reachable_from(scenes, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::script::DialogueEntry;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn scene(id: &str, choices: Option<&[&str]>) -> Scene {
        let mut dialogue = vec![DialogueEntry::narrator(format!("In {}", id))];
        if let Some(targets) = choices {
            dialogue.push(
                DialogueEntry::narrator("Choose.").with_choices(
                    targets
                        .iter()
                        .map(|t| Choice::new(format!("Go to {}", t), *t))
                        .collect(),
                ),
            );
        }
        Scene {
            id: id.to_string(),
            dialogue,
            ..Default::default()
        }
    }

    fn script(scenes: Vec<Scene>) -> ScriptData {
        ScriptData {
            title: "Test".to_string(),
            scenes,
            ..Default::default()
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_dangling_reference_uses_substring_match() {
        let mut script = script(vec![
            scene("scene_1", Some(&["scene_2_library", "nowhere", "exit"])),
            scene("scene_2", Some(&["scene_1"])),
        ]);

        let report = validate_with_rng(&mut script, &mut rng());

        let targets: Vec<_> = script.scenes[0].targets().collect();
        assert_eq!(targets, vec!["scene_2", "scene_1"]);
        assert_eq!(script.scenes[0].choices().last().unwrap().next_scene, "exit");
        assert_eq!(report.dangling(), 2);
        assert_eq!(report.entry.as_deref(), Some("scene_1"));
    }

    #[test]
    fn test_unreachable_scene_is_linked() {
        let mut script = script(vec![
            scene("scene_1", Some(&["scene_2"])),
            scene("scene_2", Some(&["exit"])),
            scene("scene_3", None),
        ]);

        let report = validate_with_rng(&mut script, &mut rng());

        let reachable = reachable_from(&script.scenes, "scene_1");
        assert_eq!(reachable.len(), 3);
        assert!(script
            .scenes
            .iter()
            .flat_map(|s| s.choices())
            .any(|c| c.text == EXPLORE_TEXT && c.next_scene == "scene_3"));
        assert!(matches!(
            &report.issues[0],
            GraphIssue::UnreachableScene { scene, .. } if scene == "scene_3"
        ));
    }

    #[test]
    fn test_link_goes_on_last_choice_entry() {
        let mut first = scene("scene_1", Some(&["exit"]));
        first
            .dialogue
            .push(DialogueEntry::narrator("Again?").with_choices(vec![Choice::new("Stay", "scene_1")]));
        let mut script = script(vec![first, scene("scene_9", None)]);

        validate_with_rng(&mut script, &mut rng());

        let entries = &script.scenes[0].dialogue;
        assert_eq!(entries[1].choices.as_ref().unwrap().len(), 1);
        let last = entries[2].choices.as_ref().unwrap();
        assert_eq!(last.last().unwrap().next_scene, "scene_9");
    }

    #[test]
    fn test_unrepairable_when_nothing_has_choices() {
        let mut script = script(vec![scene("scene_1", None), scene("scene_2", None)]);

        let report = validate_with_rng(&mut script, &mut rng());

        assert_eq!(report.unrepaired(), vec!["scene_2"]);
        assert!(script.scenes[0].choices().next().is_none());
    }

    #[test]
    fn test_entry_precedence() {
        let scenes = vec![scene("scene_5", None), scene("scene_1", None)];
        assert_eq!(entry_scene(&scenes), "scene_1");

        let scenes = vec![scene("scene_1", None), scene("scene_intro", None)];
        assert_eq!(entry_scene(&scenes), "scene_intro");

        let scenes = vec![scene("harbour", None), scene("market", None)];
        assert_eq!(entry_scene(&scenes), "harbour");
    }

    #[test]
    fn test_revalidation_is_a_no_op() {
        let mut script = script(vec![
            scene("scene_1", Some(&["scene_2x"])),
            scene("scene_2", Some(&["exit"])),
            scene("scene_3", None),
            scene("scene_4", Some(&["scene_1"])),
        ]);

        validate_with_rng(&mut script, &mut rng());
        let repaired = script.clone();
        let report = validate_with_rng(&mut script, &mut StdRng::seed_from_u64(99));

        assert!(report.is_clean());
        assert_eq!(script, repaired);
    }

    #[test]
    fn test_empty_script() {
        let mut script = script(vec![]);
        let report = validate(&mut script);
        assert!(report.is_clean());
        assert!(report.entry.is_none());
    }
}
