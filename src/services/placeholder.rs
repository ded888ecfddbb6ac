//! Deterministic stand-in content used whenever a backend is missing or
//! fails: the fallback outline, placeholder scenes, placeholder art and the
//! fully offline script.

use crate::core::analysis::{BookAnalysis, Character};
use crate::core::script::{
    Choice, DialogueEntry, GenerationInfo, Outline, Scene, SceneCharacter, SceneOutline,
    ScriptData, PLACEHOLDER_MODEL,
};
use crate::utils::image::stable_hash;

/// Background art, rotated by scene index.
pub const PLACEHOLDER_BACKGROUNDS: [&str; 5] = [
    // main
    "data:image/svg+xml;utf8,<svg xmlns='http://www.w3.org/2000/svg' viewBox='0 0 800 600'><rect width='800' height='600' fill='%23243b55'/><path d='M0 450 Q 400 400 800 450 L 800 600 L 0 600 Z' fill='%23141e30'/></svg>",
    // secondary
    "data:image/svg+xml;utf8,<svg xmlns='http://www.w3.org/2000/svg' viewBox='0 0 800 600'><rect width='800' height='600' fill='%232c3e50'/><path d='M0 450 Q 400 400 800 450 L 800 600 L 0 600 Z' fill='%23141e30'/></svg>",
    // dark
    "data:image/svg+xml;utf8,<svg xmlns='http://www.w3.org/2000/svg' viewBox='0 0 800 600'><rect width='800' height='600' fill='%231a1a2e'/><path d='M0 450 Q 400 400 800 450 L 800 600 L 0 600 Z' fill='%230f0f1a'/></svg>",
    // light
    "data:image/svg+xml;utf8,<svg xmlns='http://www.w3.org/2000/svg' viewBox='0 0 800 600'><rect width='800' height='600' fill='%23e0e0e0'/><path d='M0 450 Q 400 400 800 450 L 800 600 L 0 600 Z' fill='%23c0c0c0'/></svg>",
    // forest
    "data:image/svg+xml;utf8,<svg xmlns='http://www.w3.org/2000/svg' viewBox='0 0 800 600'><rect width='800' height='600' fill='%23234010'/><path d='M0 450 Q 400 400 800 450 L 800 600 L 0 600 Z' fill='%23132010'/></svg>",
];

const PALETTE: [&str; 10] = [
    "f9d5e5", "b06ab3", "6a0572", "d1d1e0", "800000", "333333", "e6ccb2", "7b7554", "c0d6df",
    "4a6fa5",
];

const MAIN: usize = 0;
const SECONDARY: usize = 1;
const DARK: usize = 2;

pub fn placeholder_background(index: usize) -> &'static str {
    PLACEHOLDER_BACKGROUNDS[index % PLACEHOLDER_BACKGROUNDS.len()]
}

/// Silhouette portrait whose colours are picked by a stable hash of the id,
/// so a character looks the same in every scene and every run.
pub fn placeholder_character(id: &str) -> String {
    let idx = (stable_hash(id) % PALETTE.len() as u64) as usize;
    let head = PALETTE[idx];
    let torso = PALETTE[(idx + 1) % PALETTE.len()];
    let legs = PALETTE[(idx + 2) % PALETTE.len()];
    format!(
        "data:image/svg+xml;utf8,<svg xmlns='http://www.w3.org/2000/svg' viewBox='0 0 100 250'>\
         <rect x='35' y='20' width='30' height='30' rx='15' fill='%23{head}'/>\
         <rect x='30' y='50' width='40' height='60' fill='%23{torso}'/>\
         <rect x='25' y='110' width='50' height='50' fill='%23{legs}'/>\
         <rect x='25' y='110' width='20' height='70' rx='5' fill='%23{legs}'/>\
         <rect x='55' y='110' width='20' height='70' rx='5' fill='%23{legs}'/></svg>"
    )
}

/// Two-scene outline used when planning produces nothing usable.
pub fn fallback_outline() -> Outline {
    Outline {
        scenes: vec![
            SceneOutline {
                id: "scene_1".to_string(),
                description: "Introduction to the story and main characters".to_string(),
                characters: vec!["protagonist".to_string()],
                setting: "The main setting of the story".to_string(),
                atmosphere: "Establishes the tone of the narrative".to_string(),
                dialogue_count: Some(8),
                connects_to: vec!["scene_2a".to_string(), "scene_2b".to_string()],
            },
            SceneOutline {
                id: "scene_2a".to_string(),
                description: "The protagonist takes an active approach".to_string(),
                characters: vec!["protagonist".to_string(), "supporting".to_string()],
                setting: "A location that presents challenges".to_string(),
                atmosphere: "Tense and action-oriented".to_string(),
                dialogue_count: Some(7),
                connects_to: vec!["scene_3".to_string()],
            },
        ],
        generated_with: PLACEHOLDER_MODEL.to_string(),
    }
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() {
        default
    } else {
        value
    }
}

/// Scene built purely from the outline and the analysis.
pub fn placeholder_scene(outline: &SceneOutline, analysis: &BookAnalysis) -> Scene {
    let mut characters: Vec<SceneCharacter> = outline
        .characters
        .iter()
        .filter_map(|key| {
            analysis.find_character(key).map(|c| SceneCharacter {
                id: if c.id.is_empty() { key.clone() } else { c.id.clone() },
                image: format!("A character representing {}", or_default(&c.name, "a person")),
            })
        })
        .collect();

    if characters.is_empty() {
        characters.push(SceneCharacter {
            id: "character".to_string(),
            image: "A person relevant to this scene".to_string(),
        });
    }

    let description = or_default(&outline.description, "A scene in the story");
    let setting = or_default(&outline.setting, "An important location");
    let atmosphere = or_default(&outline.atmosphere, "Creates a specific mood");

    let mut choices: Vec<Choice> = outline
        .connects_to
        .iter()
        .map(|conn| Choice::new(format!("Continue to {}", conn), conn.as_str()))
        .collect();
    if choices.is_empty() {
        choices.push(Choice::new("Continue", "scene_next"));
    }

    let speaker = &characters[0].id;
    let dialogue = vec![
        DialogueEntry::narrator(format!("{}. {}.", setting, atmosphere)),
        DialogueEntry::narrator(description),
        DialogueEntry::spoken(
            speaker,
            speaker,
            "We need to proceed carefully in this situation.",
        ),
        DialogueEntry::narrator("What will you do next?").with_choices(choices),
    ];

    Scene {
        id: outline.id.clone(),
        background: setting.to_string(),
        characters,
        dialogue,
        generated_with: Some(PLACEHOLDER_MODEL.to_string()),
    }
}

fn default_cast() -> Vec<Character> {
    [
        ("protagonist", "Protagonist", "The main character"),
        ("supporting", "Supporting Character", "A helpful friend"),
        ("antagonist", "Antagonist", "The opposition"),
    ]
    .into_iter()
    .map(|(id, name, description)| Character {
        id: id.to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        ..Default::default()
    })
    .collect()
}

fn offline_scene(id: &str, background: usize, dialogue: Vec<DialogueEntry>) -> Scene {
    Scene {
        id: id.to_string(),
        background: placeholder_background(background).to_string(),
        characters: Vec::new(),
        dialogue,
        generated_with: Some(PLACEHOLDER_MODEL.to_string()),
    }
}

fn cast_member(character: &Character) -> SceneCharacter {
    SceneCharacter {
        id: character.id.clone(),
        image: placeholder_character(&character.id),
    }
}

fn choices(options: &[(&str, &str)]) -> Vec<Choice> {
    options.iter().map(|(t, n)| Choice::new(*t, *n)).collect()
}

/// Ten-scene script produced without any backend. Art is already resolved.
pub fn offline_script(analysis: &BookAnalysis) -> ScriptData {
    let title = analysis.title();
    let cast = if analysis.characters.is_empty() {
        default_cast()
    } else {
        analysis.characters.clone()
    };
    let lead = &cast[0];
    let lead_name = or_default(&lead.name, "Protagonist");

    let mut intro = vec![
        DialogueEntry::narrator(format!("Welcome to the world of {}.", title)),
        DialogueEntry::narrator(
            analysis
                .plot
                .summary
                .clone()
                .unwrap_or_else(|| "An exciting adventure awaits!".to_string()),
        ),
    ];
    for character in cast.iter().take(2) {
        intro.push(DialogueEntry::narrator(format!(
            "Meet {}, {}.",
            character.name,
            character.description.as_deref().unwrap_or("a figure in this tale")
        )));
    }
    intro.push(
        DialogueEntry::narrator("How would you like to begin this adventure?").with_choices(
            choices(&[
                ("With courage and determination", "scene_2"),
                ("With caution and planning", "scene_3"),
                ("Let fate decide my path", "scene_4"),
            ]),
        ),
    );

    let mut scenes = vec![offline_scene("scene_1", MAIN, intro)];

    let mut courage = offline_scene(
        "scene_2",
        MAIN,
        vec![
            DialogueEntry::spoken(lead_name, &lead.id, "I need to face this challenge head-on."),
            DialogueEntry::narrator("With determination guiding your steps, you move forward."),
            DialogueEntry::spoken(lead_name, &lead.id, "What path should I take?").with_choices(
                choices(&[
                    ("The direct approach", "scene_5"),
                    ("Seek allies first", "scene_6"),
                    ("Gather more information", "scene_7"),
                ]),
            ),
        ],
    );
    courage.characters.push(cast_member(lead));
    scenes.push(courage);

    let mut planning = offline_scene(
        "scene_3",
        SECONDARY,
        vec![
            DialogueEntry::spoken(
                lead_name,
                &lead.id,
                "I need to plan carefully before proceeding.",
            ),
            DialogueEntry::narrator(
                "Taking your time to consider options might reveal hidden paths.",
            ),
            DialogueEntry::spoken(lead_name, &lead.id, "What should I focus on first?")
                .with_choices(choices(&[
                    ("Study the situation", "scene_8"),
                    ("Prepare equipment", "scene_9"),
                    ("Consult with others", "scene_10"),
                ])),
        ],
    );
    planning.characters.push(cast_member(lead));
    scenes.push(planning);

    scenes.push(offline_scene(
        "scene_4",
        DARK,
        vec![
            DialogueEntry::narrator(
                "You surrender to the flow of the story, letting fate guide your journey.",
            ),
            DialogueEntry::narrator(
                "Sometimes the most interesting paths are those we don't choose ourselves.",
            ),
            DialogueEntry::narrator(
                "As you drift with the current of the narrative, you find yourself drawn to...",
            )
            .with_choices(choices(&[
                ("A mysterious encounter", "scene_7"),
                ("An unexpected opportunity", "scene_8"),
                ("A moment of revelation", "scene_9"),
            ])),
        ],
    ));

    let branches = [
        ("scene_5", MAIN),
        ("scene_6", SECONDARY),
        ("scene_7", DARK),
        ("scene_8", SECONDARY),
        ("scene_9", MAIN),
        ("scene_10", DARK),
    ];
    for (i, (id, background)) in branches.into_iter().enumerate() {
        let mut scene = offline_scene(
            id,
            background,
            vec![
                DialogueEntry::narrator("Your journey continues along this path..."),
                DialogueEntry::narrator("What would you like to do next?").with_choices(choices(
                    &[
                        ("Return to the beginning", "scene_1"),
                        ("Continue on this path", "scene_1"),
                    ],
                )),
            ],
        );
        if i % 2 == 0 {
            let character = &cast[i % cast.len()];
            scene.characters.push(cast_member(character));
            scene.dialogue.insert(
                1,
                DialogueEntry::spoken(
                    or_default(&character.name, "Character"),
                    &character.id,
                    "This path has its own challenges and rewards.",
                ),
            );
        }
        scenes.push(scene);
    }

    let generation_info = GenerationInfo {
        outline_model: PLACEHOLDER_MODEL.to_string(),
        scene_models: scenes
            .iter()
            .map(|s| (s.id.clone(), PLACEHOLDER_MODEL.to_string()))
            .collect(),
        backend_available: false,
    };

    ScriptData {
        title: format!("{}: An Interactive Adventure", title),
        scenes,
        generation_info,
    }
}
