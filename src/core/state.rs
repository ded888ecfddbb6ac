use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;

use crate::core::analysis::BookAnalysis;
use crate::core::script::Scene;
use crate::services::graph::SceneGraph;

/// Everything one generation run shares: finished scenes, in-flight claims,
/// image caches, the graph index and model attribution.
///
/// Scene state is reset by [`GenerationSession::begin`]; the image caches are
/// keyed by content and survive across runs.
#[derive(Debug, Default)]
pub struct GenerationSession {
    analysis: RwLock<Arc<BookAnalysis>>,
    scenes: DashMap<String, Scene>,
    in_flight: DashMap<String, InFlight>,
    backgrounds: DashMap<String, String>,
    characters: DashMap<String, String>,
    scene_models: DashMap<String, String>,
    graph: RwLock<SceneGraph>,
    next_token: AtomicU64,
}

#[derive(Debug)]
struct InFlight {
    token: u64,
    tx: watch::Sender<Option<Scene>>,
}

/// Outcome of trying to claim a scene id for generation.
#[derive(Debug)]
pub enum Claim<'a> {
    /// Already generated in this session.
    Cached(Scene),
    /// Another caller owns the generation; the receiver yields its result.
    Pending(watch::Receiver<Option<Scene>>),
    /// The caller owns the generation and must complete the flight.
    Owner(Flight<'a>),
}

/// Ownership of one in-flight scene. Dropping it without calling
/// [`Flight::complete`] releases the claim and wakes every waiter.
#[derive(Debug)]
pub struct Flight<'a> {
    session: &'a GenerationSession,
    id: String,
    token: u64,
    completed: bool,
}

impl GenerationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a top-level run over `analysis`.
    pub fn begin(&self, analysis: BookAnalysis) {
        *self.analysis.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(analysis);
        self.scenes.clear();
        self.in_flight.clear();
        self.scene_models.clear();
        *self.graph.write().unwrap_or_else(PoisonError::into_inner) = SceneGraph::new();
    }

    pub fn analysis(&self) -> Arc<BookAnalysis> {
        self.analysis
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn scene(&self, id: &str) -> Option<Scene> {
        self.scenes.get(id).map(|s| s.value().clone())
    }

    pub fn has_scene(&self, id: &str) -> bool {
        self.scenes.contains_key(id)
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        self.in_flight.contains_key(id)
    }

    /// Claims `id` for generation, or reports who already has it.
    pub fn claim(&self, id: &str) -> Claim<'_> {
        if let Some(scene) = self.scene(id) {
            return Claim::Cached(scene);
        }

        match self.in_flight.entry(id.to_string()) {
            Entry::Occupied(entry) => Claim::Pending(entry.get().tx.subscribe()),
            Entry::Vacant(entry) => {
                // An owner may have published between the lookup above and
                // taking the entry.
                if let Some(scene) = self.scene(id) {
                    return Claim::Cached(scene);
                }
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                let (tx, _) = watch::channel(None);
                entry.insert(InFlight { token, tx });
                Claim::Owner(Flight {
                    session: self,
                    id: id.to_string(),
                    token,
                    completed: false,
                })
            }
        }
    }

    /// Stores `scene` unless one with the same id is already there, and
    /// returns whichever value the session holds afterwards.
    pub fn publish(&self, scene: Scene) -> Scene {
        self.scenes
            .entry(scene.id.clone())
            .or_insert(scene)
            .value()
            .clone()
    }

    /// Overwrites the stored scene, for content that was repaired after
    /// generation.
    pub fn store(&self, scene: Scene) {
        self.scenes.insert(scene.id.clone(), scene);
    }

    /// Waits for the owner of a pending claim. `None` means the owner gave up
    /// without a result.
    pub async fn wait_for(rx: &mut watch::Receiver<Option<Scene>>) -> Option<Scene> {
        match rx.wait_for(|value| value.is_some()).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        }
    }

    pub fn cached_background(&self, description: &str) -> Option<String> {
        self.backgrounds.get(description).map(|v| v.value().clone())
    }

    pub fn cache_background(&self, description: &str, image: String) {
        self.backgrounds.insert(description.to_string(), image);
    }

    pub fn cached_character(&self, id: &str) -> Option<String> {
        self.characters.get(id).map(|v| v.value().clone())
    }

    pub fn cache_character(&self, id: &str, image: String) {
        self.characters.insert(id.to_string(), image);
    }

    pub fn record_model(&self, scene_id: &str, label: &str) {
        self.scene_models
            .insert(scene_id.to_string(), label.to_string());
    }

    pub fn scene_models(&self) -> BTreeMap<String, String> {
        self.scene_models
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn update_graph(&self, scenes: &[Scene]) {
        self.graph
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .update(scenes);
    }

    /// Runs `f` against the graph index. The lock is released before this
    /// returns, so `f` must not block.
    pub fn with_graph<R>(&self, f: impl FnOnce(&SceneGraph) -> R) -> R {
        f(&self.graph.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Flight<'_> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Publishes the generated scene and wakes the waiters. If a scene was
    /// stored concurrently, that value wins and is returned instead.
    pub fn complete(mut self, scene: Scene) -> Scene {
        let stored = self.session.publish(scene);
        if let Some((_, flight)) = self.release() {
            flight.tx.send_replace(Some(stored.clone()));
        }
        self.completed = true;
        stored
    }

    fn release(&self) -> Option<(String, InFlight)> {
        self.session
            .in_flight
            .remove_if(&self.id, |_, flight| flight.token == self.token)
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if !self.completed && self.release().is_some() {
            debug!("Released abandoned claim on {}", self.id);
        }
    }
}
