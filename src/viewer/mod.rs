//! Renderer-independent viewer: camera, lighting and the retargeted character

mod camera;
mod lighting;
mod stage;
mod sync;

pub use camera::{OrbitCamera, Projected};
pub use lighting::{rgb_to_linear, HemisphereLight};
pub use stage::{Stage, Triangle};
pub use sync::{StageLoad, StageSync};
