//! Hemisphere light shared by the stage renderers

use glam::Vec3;

use crate::body::mesh::srgb_to_linear;

/// Sky/ground light blended by how far a surface faces up.
///
/// A surface with normal `n` receives `mix(ground, sky, n.y * 0.5 + 0.5) * intensity`,
/// and its diffuse colour is `base * irradiance / PI`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HemisphereLight {
    /// Linear RGB
    pub sky: Vec3,
    /// Linear RGB
    pub ground: Vec3,
    pub intensity: f32,
}

impl Default for HemisphereLight {
    fn default() -> Self {
        Self {
            sky: rgb_to_linear(0xffffff),
            ground: rgb_to_linear(0x8d8d8d),
            intensity: 3.0,
        }
    }
}

/// 0xRRGGBB to linear RGB
pub fn rgb_to_linear(rgb: u32) -> Vec3 {
    let channel = |shift: u32| srgb_to_linear(((rgb >> shift) & 0xff) as f32 / 255.0);
    Vec3::new(channel(16), channel(8), channel(0))
}
