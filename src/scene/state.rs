//! Scene state machine

use serde::{Deserialize, Serialize};

use crate::body::measurements::Measurements;

/// Coarse phase of the scene, derived from the state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenePhase {
    /// No motion requested yet
    Idle,
    /// Waiting for the motion service
    Loading,
    /// A motion file is available for playback
    Ready,
}

impl std::fmt::Display for ScenePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenePhase::Idle => write!(f, "idle"),
            ScenePhase::Loading => write!(f, "loading"),
            ScenePhase::Ready => write!(f, "ready"),
        }
    }
}

/// Everything the front ends display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneState {
    /// BVH filename returned by the motion service
    bvh_file: Option<String>,
    /// Bumped on every received motion, so a repeated filename still reloads
    motion_revision: u64,
    /// True between sending a prompt and receiving its motion
    loading: bool,
    /// Last committed measurements
    measurements: Measurements,
    /// Bumped on every stored mesh; viewers reload when it changes
    mesh_revision: u64,
    /// Served path of the latest mesh
    mesh_url: Option<String>,
    /// Most recent failure, for display
    last_error: Option<String>,
}

impl Default for SceneState {
    fn default() -> Self {
        Self::new(Measurements::default())
    }
}

impl SceneState {
    pub fn new(measurements: Measurements) -> Self {
        Self {
            bvh_file: None,
            motion_revision: 0,
            loading: false,
            measurements,
            mesh_revision: 0,
            mesh_url: None,
            last_error: None,
        }
    }

    pub fn bvh_file(&self) -> Option<&str> {
        self.bvh_file.as_deref()
    }

    pub fn motion_revision(&self) -> u64 {
        self.motion_revision
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn measurements(&self) -> &Measurements {
        &self.measurements
    }

    pub fn mesh_revision(&self) -> u64 {
        self.mesh_revision
    }

    pub fn mesh_url(&self) -> Option<&str> {
        self.mesh_url.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn phase(&self) -> ScenePhase {
        if self.loading {
            ScenePhase::Loading
        } else if self.bvh_file.is_some() {
            ScenePhase::Ready
        } else {
            ScenePhase::Idle
        }
    }

    /// A prompt went out: drop the current motion and show loading
    pub fn with_prompt_sent(mut self) -> Self {
        self.bvh_file = None;
        self.loading = true;
        self.last_error = None;
        self
    }

    /// The motion service answered with a filename
    pub fn with_motion_received(mut self, filename: impl Into<String>) -> Self {
        self.bvh_file = Some(filename.into());
        self.motion_revision += 1;
        self.loading = false;
        self
    }

    pub fn with_measurements(mut self, measurements: Measurements) -> Self {
        self.measurements = measurements;
        self
    }

    /// A new mesh was stored
    pub fn with_mesh_ready(mut self, url: impl Into<String>) -> Self {
        self.mesh_revision += 1;
        self.mesh_url = Some(url.into());
        self
    }

    /// Record a failure. The loading flag is left as it is.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.last_error = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::measurements::MeasurementKey;

    #[test]
    fn test_default_state() {
        let state = SceneState::default();
        assert_eq!(state.phase(), ScenePhase::Idle);
        assert!(!state.is_loading());
        assert!(state.bvh_file().is_none());
        assert_eq!(state.mesh_revision(), 0);
        assert_eq!(state.measurements().height, 175.0);
    }

    #[test]
    fn test_prompt_cycle() {
        let state = SceneState::default().with_prompt_sent();
        assert_eq!(state.phase(), ScenePhase::Loading);

        let state = state.with_motion_received("motion_42.bvh");
        assert_eq!(state.phase(), ScenePhase::Ready);
        assert_eq!(state.bvh_file(), Some("motion_42.bvh"));

        // a second prompt clears the previous motion
        let state = state.with_prompt_sent();
        assert!(state.bvh_file().is_none());
        assert!(state.is_loading());
    }

    #[test]
    fn test_same_filename_counts_as_new_motion() {
        let state = SceneState::default()
            .with_prompt_sent()
            .with_motion_received("out.bvh");
        assert_eq!(state.motion_revision(), 1);

        let state = state.with_prompt_sent().with_motion_received("out.bvh");
        assert_eq!(state.bvh_file(), Some("out.bvh"));
        assert_eq!(state.motion_revision(), 2);
    }

    #[test]
    fn test_failed_prompt_stays_loading() {
        let state = SceneState::default()
            .with_prompt_sent()
            .with_error("motion service unreachable");
        assert_eq!(state.phase(), ScenePhase::Loading);
        assert_eq!(state.last_error(), Some("motion service unreachable"));
    }

    #[test]
    fn test_mesh_revision_increments() {
        let state = SceneState::default()
            .with_mesh_ready("/mesh/mesh.glb")
            .with_mesh_ready("/mesh/mesh.glb");
        assert_eq!(state.mesh_revision(), 2);
        assert_eq!(state.mesh_url(), Some("/mesh/mesh.glb"));
    }

    #[test]
    fn test_measurements_do_not_touch_motion() {
        let state = SceneState::default()
            .with_prompt_sent()
            .with_motion_received("a.bvh")
            .with_measurements(Measurements::default().with(MeasurementKey::Hips, 110.0));
        assert_eq!(state.measurements().hips, 110.0);
        assert_eq!(state.bvh_file(), Some("a.bvh"));
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(SceneState::default().with_prompt_sent()).unwrap();
        assert_eq!(json["loading"], true);
        assert!(json["bvh_file"].is_null());
        assert_eq!(json["motion_revision"], 0);
    }
}
