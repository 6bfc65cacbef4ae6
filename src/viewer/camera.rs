//! Perspective orbit camera

use glam::{Mat4, Vec3, Vec4};

use crate::config::CameraConfig;

const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// A point projected into viewport pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projected {
    pub x: f32,
    pub y: f32,
    /// Distance along the view direction
    pub depth: f32,
}

/// Camera orbiting a target at a bounded distance
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
    pub target: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub distance: f32,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl OrbitCamera {
    /// Place the camera at the configured position, looking at the target
    pub fn from_config(config: &CameraConfig) -> Self {
        let target = Vec3::from(config.target);
        let offset = Vec3::from(config.position) - target;
        let length = offset.length().max(f32::EPSILON);

        Self {
            fov_deg: config.fov_deg,
            near: config.near,
            far: config.far,
            target,
            yaw: offset.x.atan2(offset.z),
            pitch: (offset.y / length).asin().clamp(-PITCH_LIMIT, PITCH_LIMIT),
            distance: length.clamp(config.min_distance, config.max_distance),
            min_distance: config.min_distance,
            max_distance: config.max_distance,
        }
    }

    pub fn eye(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        self.target + self.distance * Vec3::new(cp * sy, sp, cp * cy)
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.target, Vec3::Y)
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_deg.to_radians(), aspect, self.near, self.far)
    }

    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        self.projection(aspect) * self.view()
    }

    /// Project a world point into a `width` x `height` viewport.
    ///
    /// Returns None outside the near/far range.
    pub fn project(&self, point: Vec3, width: f32, height: f32) -> Option<Projected> {
        let aspect = if height > 0.0 { width / height } else { 1.0 };
        let clip = self.view_proj(aspect) * Vec4::new(point.x, point.y, point.z, 1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        if !(0.0..=1.0).contains(&ndc.z) {
            return None;
        }
        Some(Projected {
            x: (ndc.x + 1.0) * 0.5 * width,
            y: (1.0 - ndc.y) * 0.5 * height,
            depth: clip.w,
        })
    }

    /// Rotate around the target by the given angles in radians
    pub fn orbit(&mut self, d_yaw: f32, d_pitch: f32) {
        self.yaw += d_yaw;
        self.pitch = (self.pitch + d_pitch).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Move toward (positive) or away from the target, within the distance limits
    pub fn zoom(&mut self, delta: f32) {
        self.distance = (self.distance - delta).clamp(self.min_distance, self.max_distance);
    }
}
