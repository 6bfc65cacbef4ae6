//! MotionStage - text-to-motion and body-shape playground
//!
//! A Rust service and desktop viewer that:
//! - Sends text prompts to a motion-generation service and plays the returned BVH
//! - Builds a skinned 55-bone body mesh from measurements and exports it as GLB
//! - Retargets the motion onto a character by bone name
//! - Serves the generated assets, a JSON API and an SSE stream of scene changes

pub mod body;
pub mod character;
pub mod config;
pub mod error;
pub mod motion;
pub mod scene;
pub mod services;
pub mod storage;
pub mod viewer;
pub mod web;

#[cfg(feature = "native-ui")]
pub mod ui;

pub use config::Config;
pub use error::{MotionStageError, Result};

use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use scene::SceneState;
use services::ServiceClient;
use storage::MeshStore;

/// Application state shared across all components
#[derive(Debug)]
pub struct AppState {
    /// Current configuration
    pub config: RwLock<Config>,
    /// Current scene state
    pub scene: RwLock<SceneState>,
    /// Channel for scene updates
    pub scene_tx: broadcast::Sender<SceneState>,
    /// Shutdown signal
    pub shutdown_tx: broadcast::Sender<()>,
    /// Client for the external services
    pub services: ServiceClient,
    /// Generated mesh storage
    pub store: MeshStore,
}

impl AppState {
    /// Create a new application state with the given configuration
    pub fn new(config: Config) -> Result<Arc<Self>> {
        let (scene_tx, _) = broadcast::channel(64);
        let (shutdown_tx, _) = broadcast::channel(1);

        let services = ServiceClient::new(&config.services)?;
        let store = MeshStore::from_config(&config.storage);
        let scene = SceneState::new(config.measurements.initial);

        Ok(Arc::new(Self {
            config: RwLock::new(config),
            scene: RwLock::new(scene),
            scene_tx,
            shutdown_tx,
            services,
            store,
        }))
    }

    /// Apply a transition to the scene and broadcast the result
    pub async fn update_scene<F>(&self, transition: F) -> SceneState
    where
        F: FnOnce(SceneState) -> SceneState,
    {
        let mut current = self.scene.write().await;
        let next = transition(current.clone());
        *current = next.clone();
        let _ = self.scene_tx.send(next.clone());
        next
    }

    /// Get the current scene state
    pub async fn get_scene(&self) -> SceneState {
        self.scene.read().await.clone()
    }

    /// Subscribe to scene changes
    pub fn subscribe_scene(&self) -> broadcast::Receiver<SceneState> {
        self.scene_tx.subscribe()
    }

    /// Subscribe to shutdown signal
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;
    use scene::ScenePhase;

    #[tokio::test]
    async fn test_update_scene_broadcasts() {
        let state = AppState::new(Config::default()).unwrap();
        let mut rx = state.subscribe_scene();

        let next = state.update_scene(SceneState::with_prompt_sent).await;
        assert_eq!(next.phase(), ScenePhase::Loading);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, next);
        assert_eq!(state.get_scene().await.phase(), ScenePhase::Loading);
    }

    #[tokio::test]
    async fn test_initial_scene_uses_configured_measurements() {
        let mut config = Config::default();
        config.measurements.initial.height = 190.0;
        let state = AppState::new(config).unwrap();
        assert_eq!(state.get_scene().await.measurements().height, 190.0);
    }

    #[tokio::test]
    async fn test_shutdown_signal() {
        let state = AppState::new(Config::default()).unwrap();
        let mut rx = state.subscribe_shutdown();
        state.shutdown();
        assert!(rx.recv().await.is_ok());
    }
}
