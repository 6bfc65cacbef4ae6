//! Native egui UI for motionstage.
//!
//! Provides a desktop window with:
//! - Chat bar that sends text prompts to the motion service
//! - "Body" measurement sliders that rebuild the parametric mesh on release
//! - 3D viewport playing the retargeted motion on the character, drawn
//!   with wgpu into an offscreen target with a depth buffer
//!
//! Enabled via `--features native-ui`.

mod app;
mod renderer;
mod viewport;

pub use app::MotionStageApp;
