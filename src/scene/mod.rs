//! Scene state shared by the web API and the desktop viewer

mod state;

pub use state::{ScenePhase, SceneState};
