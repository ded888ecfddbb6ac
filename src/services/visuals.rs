use futures_util::StreamExt;
use log::{debug, info, warn};
use std::collections::HashSet;

use crate::core::analysis::Character;
use crate::core::error::GenerationError;
use crate::core::script::{is_image_ref, Scene};
use crate::core::state::GenerationSession;
use crate::services::image::{ImageClient, ImageConfig};
use crate::services::placeholder::{placeholder_background, placeholder_character};
use crate::utils::image::to_data_uri;

/// Replaces textual background and character descriptions with embeddable
/// images, falling back to placeholder art per asset.
pub struct VisualEnhancer<'a> {
    config: &'a ImageConfig,
    images: Option<&'a dyn ImageClient>,
    session: &'a GenerationSession,
}

impl<'a> VisualEnhancer<'a> {
    pub fn new(
        config: &'a ImageConfig,
        images: Option<&'a dyn ImageClient>,
        session: &'a GenerationSession,
    ) -> Self {
        Self {
            config,
            images,
            session,
        }
    }

    pub async fn enhance(&self, scenes: &mut [Scene], characters: &[Character]) {
        self.enhance_from(scenes, characters, 0).await;
    }

    /// As [`enhance`](Self::enhance), with placeholder backgrounds picked as
    /// if the scenes started at position `offset` in the script.
    pub async fn enhance_from(&self, scenes: &mut [Scene], characters: &[Character], offset: usize) {
        self.enhance_backgrounds(scenes, offset).await;
        self.enhance_characters(scenes, characters).await;
    }

    async fn enhance_backgrounds(&self, scenes: &mut [Scene], offset: usize) {
        if let Some(images) = self.images {
            let mut seen = HashSet::new();
            let pending: Vec<String> = scenes
                .iter()
                .map(|s| s.background.as_str())
                .filter(|bg| !is_image_ref(bg))
                .filter(|bg| bg.chars().count() >= self.config.min_description_len)
                .filter(|bg| seen.insert(*bg))
                .filter(|bg| self.session.cached_background(bg).is_none())
                .map(str::to_string)
                .collect();

            if !pending.is_empty() {
                info!("Generating {} background images", pending.len());
            }

            let results: Vec<(String, Result<String, GenerationError>)> =
                futures_util::stream::iter(pending)
                    .map(|desc| async move {
                        let prompt = format!(
                            "A detailed atmospheric scene: {}. Suitable as a visual novel background, high quality, detailed.",
                            desc
                        );
                        let result = self.render(images, &prompt).await;
                        (desc, result)
                    })
                    .buffer_unordered(self.config.max_concurrency.max(1))
                    .collect()
                    .await;

            for (desc, result) in results {
                match result {
                    Ok(uri) => self.session.cache_background(&desc, uri),
                    Err(e) => warn!("Background for {:?} failed: {}", truncate(&desc), e),
                }
            }
        }

        for (i, scene) in scenes.iter_mut().enumerate() {
            if is_image_ref(&scene.background) {
                continue;
            }
            scene.background = match self.session.cached_background(&scene.background) {
                Some(uri) => {
                    debug!("Using cached background for {}", scene.id);
                    uri
                }
                None => placeholder_background(offset + i).to_string(),
            };
        }
    }

    async fn enhance_characters(&self, scenes: &mut [Scene], characters: &[Character]) {
        if let Some(images) = self.images {
            let mut seen = HashSet::new();
            let pending: Vec<String> = scenes
                .iter()
                .flat_map(|s| s.characters.iter())
                .filter(|c| !is_image_ref(&c.image))
                .map(|c| c.id.as_str())
                .filter(|id| seen.insert(*id))
                .filter(|id| self.session.cached_character(id).is_none())
                .map(str::to_string)
                .collect();

            if !pending.is_empty() {
                info!("Generating {} character images", pending.len());
            }

            let results: Vec<(String, Result<String, GenerationError>)> =
                futures_util::stream::iter(pending)
                    .map(|id| async move {
                        let prompt = format!(
                            "Portrait of {}. Full-body portrait, high-quality, detailed, visual novel style, well-lit, clear features, expressive pose.",
                            character_description(&id, characters)
                        );
                        let result = self.render(images, &prompt).await;
                        (id, result)
                    })
                    .buffer_unordered(self.config.max_concurrency.max(1))
                    .collect()
                    .await;

            for (id, result) in results {
                match result {
                    Ok(uri) => self.session.cache_character(&id, uri),
                    Err(e) => warn!("Portrait for {} failed: {}", id, e),
                }
            }
        }

        for character in scenes.iter_mut().flat_map(|s| s.characters.iter_mut()) {
            if is_image_ref(&character.image) {
                continue;
            }
            character.image = self
                .session
                .cached_character(&character.id)
                .unwrap_or_else(|| placeholder_character(&character.id));
        }
    }

    async fn render(&self, images: &dyn ImageClient, prompt: &str) -> Result<String, GenerationError> {
        let url = images
            .generate(prompt)
            .await
            .map_err(GenerationError::Image)?
            .ok_or_else(|| GenerationError::Image(anyhow::anyhow!("backend returned no image")))?;
        let bytes = images.fetch(&url).await.map_err(GenerationError::Image)?;
        to_data_uri(&bytes, self.config.max_dimension, self.config.jpeg_quality)
            .map_err(GenerationError::Image)
    }
}

/// Text an image prompt is built from for one character.
pub fn character_description(id: &str, characters: &[Character]) -> String {
    match characters.iter().find(|c| c.id == id) {
        Some(c) => {
            let mut description = format!(
                "{}: {}",
                if c.name.is_empty() { "Character" } else { c.name.as_str() },
                c.description.as_deref().unwrap_or("")
            );
            if let Some(personality) = &c.personality {
                description.push_str(&format!(". Personality: {}", personality));
            }
            description
        }
        None => format!("Character {}", id),
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(30).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::script::SceneCharacter;
    use crate::services::placeholder::PLACEHOLDER_BACKGROUNDS;
    use crate::services::testing::MockImages;

    fn scene(id: &str, background: &str, cast: &[&str]) -> Scene {
        Scene {
            id: id.to_string(),
            background: background.to_string(),
            characters: cast
                .iter()
                .map(|c| SceneCharacter {
                    id: c.to_string(),
                    image: format!("{} in a tweed coat", c),
                })
                .collect(),
            ..Default::default()
        }
    }

    fn cast() -> Vec<Character> {
        vec![Character {
            id: "holmes".to_string(),
            name: "Sherlock Holmes".to_string(),
            description: Some("A consulting detective".to_string()),
            personality: Some("Cold and precise".to_string()),
            ..Default::default()
        }]
    }

    #[test]
    fn test_character_description() {
        assert_eq!(
            character_description("holmes", &cast()),
            "Sherlock Holmes: A consulting detective. Personality: Cold and precise"
        );
        assert_eq!(character_description("watson", &cast()), "Character watson");
    }

    #[tokio::test]
    async fn test_without_backend_everything_gets_placeholders() {
        let config = ImageConfig::default();
        let session = GenerationSession::new();
        let enhancer = VisualEnhancer::new(&config, None, &session);
        let mut scenes: Vec<Scene> = (0..6)
            .map(|i| scene(&format!("scene_{}", i), "A long gloomy corridor", &["holmes"]))
            .collect();

        enhancer.enhance(&mut scenes, &cast()).await;

        assert_eq!(scenes[0].background, PLACEHOLDER_BACKGROUNDS[0]);
        assert_eq!(scenes[4].background, PLACEHOLDER_BACKGROUNDS[4]);
        assert_eq!(scenes[5].background, PLACEHOLDER_BACKGROUNDS[0]);
        assert_eq!(scenes[0].characters[0].image, placeholder_character("holmes"));
    }

    #[tokio::test]
    async fn test_duplicates_render_once_and_cache() {
        let config = ImageConfig::default();
        let session = GenerationSession::new();
        let images = MockImages::new();
        let enhancer = VisualEnhancer::new(&config, Some(&images), &session);
        let mut scenes = vec![
            scene("scene_1", "A long gloomy corridor", &["holmes", "watson"]),
            scene("scene_2", "A long gloomy corridor", &["holmes"]),
            scene("scene_3", "Hall", &[]),
        ];

        enhancer.enhance(&mut scenes, &cast()).await;

        // One background, two portraits; "Hall" is too short to render.
        assert_eq!(images.prompt_count(), 3);
        assert!(scenes[0].background.starts_with("data:image/jpeg;base64,"));
        assert_eq!(scenes[0].background, scenes[1].background);
        assert_eq!(scenes[2].background, PLACEHOLDER_BACKGROUNDS[2]);
        assert!(scenes[1].characters[0].image.starts_with("data:image/jpeg"));

        let mut again = vec![scene("scene_9", "A long gloomy corridor", &["holmes"])];
        enhancer.enhance(&mut again, &cast()).await;
        assert_eq!(images.prompt_count(), 3);
        assert_eq!(again[0].background, scenes[0].background);
    }

    #[tokio::test]
    async fn test_failure_degrades_only_that_asset() {
        let config = ImageConfig::default();
        let session = GenerationSession::new();
        let images = MockImages::new().failing_on("Character watson");
        let enhancer = VisualEnhancer::new(&config, Some(&images), &session);
        let mut scenes = vec![scene("scene_1", "A long gloomy corridor", &["holmes", "watson"])];

        enhancer.enhance(&mut scenes, &cast()).await;

        assert!(scenes[0].background.starts_with("data:image/jpeg"));
        assert!(scenes[0].characters[0].image.starts_with("data:image/jpeg"));
        assert_eq!(scenes[0].characters[1].image, placeholder_character("watson"));
    }

    #[tokio::test]
    async fn test_resolved_values_are_kept() {
        let config = ImageConfig::default();
        let session = GenerationSession::new();
        let images = MockImages::new();
        let enhancer = VisualEnhancer::new(&config, Some(&images), &session);
        let mut scenes = vec![scene("scene_1", "data:image/png;base64,AAAA", &[])];

        enhancer.enhance_from(&mut scenes, &[], 3).await;

        assert_eq!(images.prompt_count(), 0);
        assert_eq!(scenes[0].background, "data:image/png;base64,AAAA");
    }

    #[tokio::test]
    async fn test_cache_is_used_without_backend() {
        let config = ImageConfig::default();
        let session = GenerationSession::new();
        session.cache_background("A long gloomy corridor", "data:image/jpeg;base64,CACHED".into());
        let enhancer = VisualEnhancer::new(&config, None, &session);
        let mut scenes = vec![scene("scene_1", "A long gloomy corridor", &[])];

        enhancer.enhance_from(&mut scenes, &[], 2).await;
        assert_eq!(scenes[0].background, "data:image/jpeg;base64,CACHED");
    }
}
