//! Looping playback of a BVH clip

use super::bvh::{BvhClip, BvhJoint, JointTransform};

/// Sampled clip pose with lookup by joint name
#[derive(Debug, Clone)]
pub struct BvhPose<'a> {
    joints: &'a [BvhJoint],
    transforms: Vec<JointTransform>,
}

impl<'a> BvhPose<'a> {
    pub fn new(joints: &'a [BvhJoint], transforms: Vec<JointTransform>) -> Self {
        Self { joints, transforms }
    }

    /// Transform of the first joint with this name
    pub fn get(&self, name: &str) -> Option<&JointTransform> {
        self.joints
            .iter()
            .position(|j| j.name == name)
            .and_then(|i| self.transforms.get(i))
    }

    pub fn by_index(&self, index: usize) -> Option<&JointTransform> {
        self.transforms.get(index)
    }
}

/// Owns a clip and its playback time
#[derive(Debug, Clone)]
pub struct ClipPlayer {
    clip: BvhClip,
    time: f32,
}

impl ClipPlayer {
    pub fn new(clip: BvhClip) -> Self {
        Self { clip, time: 0.0 }
    }

    pub fn clip(&self) -> &BvhClip {
        &self.clip
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// Move the clock forward, wrapping at the clip duration
    pub fn advance(&mut self, dt: f32) {
        let duration = self.clip.duration();
        self.time = if duration > 0.0 {
            (self.time + dt.max(0.0)).rem_euclid(duration)
        } else {
            0.0
        };
    }

    pub fn reset(&mut self) {
        self.time = 0.0;
    }

    pub fn pose(&self) -> BvhPose<'_> {
        BvhPose::new(self.clip.joints(), self.clip.sample(self.time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::bvh::tests::WALK;
    use glam::Vec3;

    fn player() -> ClipPlayer {
        ClipPlayer::new(BvhClip::parse(WALK).unwrap())
    }

    #[test]
    fn test_advance_wraps() {
        let mut p = player();
        p.advance(0.4);
        p.advance(0.4);
        p.advance(0.4);
        assert!((p.time() - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_negative_dt_is_ignored() {
        let mut p = player();
        p.advance(0.3);
        p.advance(-1.0);
        assert!((p.time() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_pose_lookup_by_name() {
        let mut p = player();
        p.advance(0.5);
        let pose = p.pose();
        assert_eq!(
            pose.get("Hips").unwrap().translation,
            Vec3::new(10.0, 90.0, 0.0)
        );
        assert_eq!(
            pose.get("LeftUpLeg").unwrap().translation,
            Vec3::new(8.0, -5.0, 0.0)
        );
        assert!(pose.get("RightUpLeg").is_none());
    }

    #[test]
    fn test_duplicate_names_first_wins() {
        let text = WALK.replace("JOINT LeftUpLeg", "JOINT Spine");
        let p = ClipPlayer::new(BvhClip::parse(&text).unwrap());
        let pose = p.pose();
        assert_eq!(
            pose.get("Spine").unwrap().translation,
            Vec3::new(0.0, 10.0, 0.0)
        );
    }

    #[test]
    fn test_reset() {
        let mut p = player();
        p.advance(0.7);
        p.reset();
        assert_eq!(p.time(), 0.0);
    }
}
