//! The fixed 55-bone body skeleton returned by the body-shape service.

use glam::{Mat4, Vec3};

use crate::error::MeshError;

/// Number of bones in the body skeleton
pub const BONE_COUNT: usize = 55;

/// Bone names, in joint-array order
pub const BONE_NAMES: [&str; BONE_COUNT] = [
    "Hips", "LeftUpLeg", "RightUpLeg", "Spine", "LeftLeg", "RightLeg",
    "Spine1", "LeftFoot", "RightFoot", "Spine2", "LeftToe", "RightToe",
    "Neck", "LeftShoulder", "RightShoulder", "Head", "LeftArm", "RightArm",
    "LeftForeArm", "RightForeArm", "LeftHand", "RightHand", "Jaw", "LeftEye",
    "RightEye", "LeftIndex1", "LeftIndex2", "LeftIndex3", "LeftMiddle1",
    "LeftMiddle2", "LeftMiddle3", "LeftPinky1", "LeftPinky2", "LeftPinky3",
    "LeftRing1", "LeftRing2", "LeftRing3", "LeftThumb1", "LeftThumb2",
    "LeftThumb3", "RightIndex1", "RightIndex2", "RightIndex3", "RightMiddle1",
    "RightMiddle2", "RightMiddle3", "RightPinky1", "RightPinky2", "RightPinky3",
    "RightRing1", "RightRing2", "RightRing3", "RightThumb1", "RightThumb2", "RightThumb3",
];

/// Parent of each bone; -1 marks the root
pub const PARENT_INDICES: [i32; BONE_COUNT] = [
    -1, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 9, 9, 12, 13, 14, 16, 17,
    18, 19, 15, 15, 15, 20, 25, 26, 20, 28, 29, 20, 31, 32, 20, 34, 35,
    20, 37, 38, 21, 40, 41, 21, 43, 44, 21, 46, 47, 21, 49, 50, 21, 52, 53,
];

/// A bone with its translation relative to the parent
#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: &'static str,
    pub parent: Option<usize>,
    pub translation: Vec3,
    pub children: Vec<usize>,
}

/// Bind-pose skeleton built from absolute joint positions
#[derive(Debug, Clone)]
pub struct BodySkeleton {
    bones: Vec<Bone>,
}

impl BodySkeleton {
    /// Build bones from absolute joint positions.
    ///
    /// Root translation is absolute; every other bone stores its offset from
    /// the parent joint.
    pub fn from_joints(joints: &[[f32; 3]]) -> Result<Self, MeshError> {
        if joints.len() != BONE_COUNT {
            return Err(MeshError::JointCount {
                expected: BONE_COUNT,
                found: joints.len(),
            });
        }

        let mut bones: Vec<Bone> = joints
            .iter()
            .enumerate()
            .map(|(i, joint)| {
                let parent = parent_of(i);
                let pos = Vec3::from(*joint);
                let translation = match parent {
                    Some(p) => pos - Vec3::from(joints[p]),
                    None => pos,
                };
                Bone {
                    name: BONE_NAMES[i],
                    parent,
                    translation,
                    children: Vec::new(),
                }
            })
            .collect();

        for i in 0..bones.len() {
            if let Some(p) = bones[i].parent {
                bones[p].children.push(i);
            }
        }

        Ok(Self { bones })
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn root(&self) -> usize {
        0
    }

    /// Recompose absolute joint positions from relative translations
    pub fn world_positions(&self) -> Vec<Vec3> {
        let mut world = vec![Vec3::ZERO; self.bones.len()];
        // parents always precede children
        for (i, bone) in self.bones.iter().enumerate() {
            world[i] = match bone.parent {
                Some(p) => world[p] + bone.translation,
                None => bone.translation,
            };
        }
        world
    }

    /// Inverse bind matrices for binding the mesh in the current pose.
    ///
    /// Bones carry no rotation, so each is the inverse of a pure translation.
    pub fn inverse_bind_matrices(&self) -> Vec<Mat4> {
        self.world_positions()
            .into_iter()
            .map(|p| Mat4::from_translation(-p))
            .collect()
    }
}

fn parent_of(index: usize) -> Option<usize> {
    let p = PARENT_INDICES[index];
    if p < 0 {
        None
    } else {
        Some(p as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_joints() -> Vec<[f32; 3]> {
        (0..BONE_COUNT)
            .map(|i| [i as f32 * 0.1, 1.0 + i as f32 * 0.01, -(i as f32) * 0.02])
            .collect()
    }

    #[test]
    fn test_parents_precede_children() {
        assert_eq!(PARENT_INDICES[0], -1);
        for (i, &p) in PARENT_INDICES.iter().enumerate().skip(1) {
            assert!(p >= 0 && (p as usize) < i, "bone {} has parent {}", i, p);
        }
    }

    #[test]
    fn test_single_root() {
        assert_eq!(PARENT_INDICES.iter().filter(|&&p| p == -1).count(), 1);
    }

    #[test]
    fn test_relative_translations() {
        let joints = sample_joints();
        let skeleton = BodySkeleton::from_joints(&joints).unwrap();
        let bones = skeleton.bones();

        assert_eq!(bones[0].translation, Vec3::from(joints[0]));
        // LeftLeg (4) hangs off LeftUpLeg (1)
        let expected = Vec3::from(joints[4]) - Vec3::from(joints[1]);
        assert!((bones[4].translation - expected).length() < 1e-6);
        assert_eq!(bones[4].name, "LeftLeg");
        assert_eq!(bones[4].parent, Some(1));
    }

    #[test]
    fn test_world_positions_round_trip() {
        let joints = sample_joints();
        let skeleton = BodySkeleton::from_joints(&joints).unwrap();
        for (world, joint) in skeleton.world_positions().iter().zip(&joints) {
            assert!((*world - Vec3::from(*joint)).length() < 1e-5);
        }
    }

    #[test]
    fn test_children_lists() {
        let skeleton = BodySkeleton::from_joints(&sample_joints()).unwrap();
        // Hips -> LeftUpLeg, RightUpLeg, Spine
        assert_eq!(skeleton.bones()[0].children, vec![1, 2, 3]);
        // LeftHand -> index, middle, pinky, ring, thumb roots
        assert_eq!(skeleton.bones()[20].children, vec![25, 28, 31, 34, 37]);
    }

    #[test]
    fn test_inverse_bind_moves_joint_to_origin() {
        let joints = sample_joints();
        let skeleton = BodySkeleton::from_joints(&joints).unwrap();
        let ibm = skeleton.inverse_bind_matrices();
        let moved = ibm[30].transform_point3(Vec3::from(joints[30]));
        assert!(moved.length() < 1e-5);
    }

    #[test]
    fn test_wrong_joint_count() {
        let err = BodySkeleton::from_joints(&[[0.0; 3]; 24]).unwrap_err();
        assert_eq!(
            err,
            MeshError::JointCount {
                expected: BONE_COUNT,
                found: 24
            }
        );
    }
}
