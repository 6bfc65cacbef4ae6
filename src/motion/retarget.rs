//! Name-based retargeting of a BVH pose onto a character skeleton.
//!
//! Character bones are matched to BVH joints by name once the character's
//! rig prefix (e.g. `mixamorig` in `mixamorigHips` or `mixamorig:Hips`) is
//! stripped. Only skin joints take part; unmatched bones keep whatever
//! transform they already have.

use super::bvh::BvhJoint;
use super::player::BvhPose;
use crate::character::CharacterPose;

/// Remove a leading rig prefix, along with a `:` separator if present
pub fn strip_prefix<'a>(name: &'a str, prefix: &str) -> &'a str {
    if prefix.is_empty() {
        return name;
    }
    match name.strip_prefix(prefix) {
        Some(rest) => rest.strip_prefix(':').unwrap_or(rest),
        None => name,
    }
}

/// One matched bone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BonePair {
    /// Character node index
    pub target: usize,
    /// BVH joint index
    pub source: usize,
    pub name: String,
}

/// Target-node to source-joint pairing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetargetMap {
    pairs: Vec<BonePair>,
}

impl RetargetMap {
    /// Pair each target bone with the first source joint of the same name
    pub fn build<'n, I>(targets: I, source: &[BvhJoint], prefix: &str) -> Self
    where
        I: IntoIterator<Item = (usize, &'n str)>,
    {
        let pairs: Vec<BonePair> = targets
            .into_iter()
            .filter_map(|(target, full_name)| {
                let name = strip_prefix(full_name, prefix);
                source
                    .iter()
                    .position(|j| j.name == name)
                    .map(|source| BonePair {
                        target,
                        source,
                        name: name.to_string(),
                    })
            })
            .collect();

        tracing::debug!("Retarget map: {} bones matched", pairs.len());
        Self { pairs }
    }

    pub fn pairs(&self) -> &[BonePair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Snap matched bones to the source pose
    pub fn copy(&self, source: &BvhPose, target: &mut CharacterPose) {
        for pair in &self.pairs {
            if let Some(t) = source.by_index(pair.source) {
                target.translations[pair.target] = t.translation;
                target.rotations[pair.target] = t.rotation;
            }
        }
    }

    /// Move matched bones part of the way toward the source pose
    pub fn follow(&self, source: &BvhPose, target: &mut CharacterPose, factor: f32) {
        for pair in &self.pairs {
            if let Some(t) = source.by_index(pair.source) {
                let translation = &mut target.translations[pair.target];
                *translation = translation.lerp(t.translation, factor);
                let rotation = &mut target.rotations[pair.target];
                *rotation = rotation.slerp(t.rotation, factor);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::bvh::tests::WALK;
    use crate::motion::bvh::BvhClip;
    use crate::motion::player::ClipPlayer;
    use glam::{Quat, Vec3};

    fn target_pose(n: usize) -> CharacterPose {
        CharacterPose {
            translations: vec![Vec3::ZERO; n],
            rotations: vec![Quat::IDENTITY; n],
            scales: vec![Vec3::ONE; n],
            model_scale: 1.0,
        }
    }

    #[test]
    fn test_strip_prefix() {
        assert_eq!(strip_prefix("mixamorigHips", "mixamorig"), "Hips");
        assert_eq!(strip_prefix("mixamorig:Spine", "mixamorig"), "Spine");
        assert_eq!(strip_prefix("Hips", "mixamorig"), "Hips");
        // only a leading prefix is removed
        assert_eq!(strip_prefix("Leftmixamorig", "mixamorig"), "Leftmixamorig");
        assert_eq!(strip_prefix("mixamorigHips", ""), "mixamorigHips");
    }

    #[test]
    fn test_build_matches_by_stripped_name() {
        let clip = BvhClip::parse(WALK).unwrap();
        let targets = [
            (2, "mixamorigHips"),
            (5, "mixamorig:LeftUpLeg"),
            (7, "mixamorigRightUpLeg"),
        ];
        let map = RetargetMap::build(targets, clip.joints(), "mixamorig");

        assert_eq!(map.len(), 2);
        assert_eq!(map.pairs()[0].target, 2);
        assert_eq!(map.pairs()[0].source, 0);
        assert_eq!(map.pairs()[1].name, "LeftUpLeg");
        assert_eq!(map.pairs()[1].source, 3);
    }

    #[test]
    fn test_copy_snaps_and_leaves_unmatched() {
        let clip = BvhClip::parse(WALK).unwrap();
        let mut player = ClipPlayer::new(clip.clone());
        player.advance(0.5);

        let map = RetargetMap::build([(0, "mixamorigHips")], clip.joints(), "mixamorig");
        let mut pose = target_pose(2);
        pose.translations[1] = Vec3::new(1.0, 2.0, 3.0);

        map.copy(&player.pose(), &mut pose);
        assert_eq!(pose.translations[0], Vec3::new(10.0, 90.0, 0.0));
        assert_eq!(pose.translations[1], Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_follow_moves_halfway() {
        let clip = BvhClip::parse(WALK).unwrap();
        let mut player = ClipPlayer::new(clip.clone());
        player.advance(0.5);

        let map = RetargetMap::build([(0, "Hips")], clip.joints(), "mixamorig");
        let mut pose = target_pose(1);
        pose.translations[0] = Vec3::new(0.0, 80.0, 0.0);

        map.follow(&player.pose(), &mut pose, 0.5);
        assert!((pose.translations[0] - Vec3::new(5.0, 85.0, 0.0)).length() < 1e-4);
        let expected = Quat::from_rotation_x(std::f32::consts::FRAC_PI_4);
        assert!(pose.rotations[0].angle_between(expected) < 1e-3);

        // repeated follows converge on the source
        for _ in 0..30 {
            map.follow(&player.pose(), &mut pose, 0.5);
        }
        assert!((pose.translations[0] - Vec3::new(10.0, 90.0, 0.0)).length() < 1e-3);
    }
}
