//! Decides when the stage has to fetch a new motion or character

use crate::scene::SceneState;

/// A served file the stage should load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageLoad {
    /// BVH clip
    Motion(String),
    /// Character GLB
    Character(String),
}

/// Remembers which motion and mesh revisions the stage already asked for
#[derive(Debug, Clone)]
pub struct StageSync {
    motion_revision: u64,
    mesh_revision: u64,
    prefer_generated_mesh: bool,
}

impl StageSync {
    /// The stage starts with whatever character is on disk, so the current
    /// mesh revision counts as loaded. Any motion still needs fetching.
    pub fn new(scene: &SceneState, prefer_generated_mesh: bool) -> Self {
        Self {
            motion_revision: 0,
            mesh_revision: scene.mesh_revision(),
            prefer_generated_mesh,
        }
    }

    /// Loads needed to catch the stage up with `scene`
    pub fn poll(&mut self, scene: &SceneState) -> Vec<StageLoad> {
        let mut loads = Vec::new();

        if scene.motion_revision() != self.motion_revision {
            self.motion_revision = scene.motion_revision();
            if let Some(file) = scene.bvh_file() {
                loads.push(StageLoad::Motion(file.to_string()));
            }
        }

        if scene.mesh_revision() != self.mesh_revision {
            self.mesh_revision = scene.mesh_revision();
            if self.prefer_generated_mesh {
                if let Some(url) = scene.mesh_url() {
                    loads.push(StageLoad::Character(url.to_string()));
                }
            }
        }

        loads
    }
}
