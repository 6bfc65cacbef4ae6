//! CPU skinning: forward kinematics and linear blend skinning (LBS).

use glam::{Mat4, Quat, Vec3, Vec4};

use super::model::CharacterModel;

/// Mutable per-node local transforms, initialised from the rest pose.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterPose {
    pub translations: Vec<Vec3>,
    pub rotations: Vec<Quat>,
    pub scales: Vec<Vec3>,
    /// Uniform scale applied above every root node
    pub model_scale: f32,
}

impl CharacterPose {
    pub fn from_rest(model: &CharacterModel, model_scale: f32) -> Self {
        Self {
            translations: model.rest_translations.clone(),
            rotations: model.rest_rotations.clone(),
            scales: model.rest_scales.clone(),
            model_scale,
        }
    }

    pub fn len(&self) -> usize {
        self.translations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.translations.is_empty()
    }
}

/// Compute world transforms for all nodes using forward kinematics.
pub fn compute_world_transforms(model: &CharacterModel, pose: &CharacterPose) -> Vec<Mat4> {
    let root = Mat4::from_scale(Vec3::splat(pose.model_scale));
    let mut world = vec![Mat4::IDENTITY; model.node_count];
    let mut computed = vec![false; model.node_count];

    for i in 0..model.node_count {
        compute_node(model, pose, root, &mut world, &mut computed, i);
    }

    world
}

fn compute_node(
    model: &CharacterModel,
    pose: &CharacterPose,
    root: Mat4,
    world: &mut [Mat4],
    computed: &mut [bool],
    idx: usize,
) {
    if computed[idx] {
        return;
    }

    let local = Mat4::from_scale_rotation_translation(
        pose.scales[idx],
        pose.rotations[idx],
        pose.translations[idx],
    );

    if let Some(parent) = model.parents[idx] {
        compute_node(model, pose, root, world, computed, parent);
        world[idx] = world[parent] * local;
    } else {
        world[idx] = root * local;
    }
    computed[idx] = true;
}

/// Apply linear blend skinning to one mesh.
///
/// Returns world-space positions for each primitive. Meshes without a skin
/// are moved by the world transform of the node that instances them.
pub fn skin_vertices(
    model: &CharacterModel,
    mesh_idx: usize,
    world_transforms: &[Mat4],
) -> Vec<Vec<Vec3>> {
    let mesh = &model.meshes[mesh_idx];

    let skin = match model.mesh_skin.get(&mesh_idx) {
        Some(&s) => &model.skins[s],
        None => {
            let node_world = model
                .mesh_node
                .get(&mesh_idx)
                .map_or(Mat4::IDENTITY, |&n| world_transforms[n]);
            return mesh
                .primitives
                .iter()
                .map(|p| {
                    p.positions
                        .iter()
                        .map(|&v| node_world.transform_point3(v))
                        .collect()
                })
                .collect();
        }
    };

    // Precompute joint matrices: world[joint_node] * inverse_bind_matrix
    let joint_matrices: Vec<Mat4> = skin
        .joints
        .iter()
        .zip(skin.inverse_bind_matrices.iter())
        .map(|(&node_idx, ibm)| world_transforms[node_idx] * *ibm)
        .collect();

    let mut result = Vec::with_capacity(mesh.primitives.len());

    for prim in &mesh.primitives {
        let mut skinned = vec![Vec3::ZERO; prim.positions.len()];

        for (v_idx, pos) in prim.positions.iter().enumerate() {
            let j = prim.joints[v_idx];
            let w = prim.weights[v_idx];
            let p = Vec4::new(pos.x, pos.y, pos.z, 1.0);

            let mut result_pos = Vec4::ZERO;
            let mut total = 0.0;
            for k in 0..4 {
                if w[k] < 0.0001 {
                    continue;
                }
                let Some(jm) = joint_matrices.get(j[k] as usize) else {
                    continue;
                };
                result_pos += w[k] * (*jm * p);
                total += w[k];
            }

            skinned[v_idx] = if total > 0.0 {
                result_pos.truncate() / total
            } else {
                *pos
            };
        }

        result.push(skinned);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::model::tests::body_glb;

    fn model() -> CharacterModel {
        CharacterModel::from_slice(&body_glb()).unwrap()
    }

    #[test]
    fn test_rest_pose_world_matches_joints() {
        let model = model();
        let pose = CharacterPose::from_rest(&model, 1.0);
        let world = compute_world_transforms(&model, &pose);
        assert_eq!(world.len(), model.node_count);

        // Spine joint sits at y = 3 in the generated body
        let spine = model.node_index("Spine").unwrap();
        let p = world[spine].transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(0.0, 3.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_rest_pose_skinning_is_identity() {
        let model = model();
        let pose = CharacterPose::from_rest(&model, 1.0);
        let world = compute_world_transforms(&model, &pose);
        let skinned = skin_vertices(&model, 0, &world);
        for (a, b) in skinned[0].iter().zip(&model.meshes[0].primitives[0].positions) {
            assert!((*a - *b).length() < 1e-5);
        }
    }

    #[test]
    fn test_model_scale() {
        let model = model();
        let pose = CharacterPose::from_rest(&model, 100.0);
        let world = compute_world_transforms(&model, &pose);
        let skinned = skin_vertices(&model, 0, &world);
        assert!((skinned[0][1] - Vec3::new(100.0, 0.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn test_rotating_a_joint_moves_its_vertices() {
        let model = model();
        let mut pose = CharacterPose::from_rest(&model, 1.0);
        let hips = model.node_index("Hips").unwrap();

        // vertex 2 sits at (0,3,0), bound to Spine; rotate Hips 90 degrees about Z
        pose.rotations[hips] = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let world = compute_world_transforms(&model, &pose);
        let skinned = skin_vertices(&model, 0, &world);

        assert!((skinned[0][2] - Vec3::new(-3.0, 0.0, 0.0)).length() < 1e-4);
        // vertex 0 is at the Hips joint (origin), unaffected
        assert!(skinned[0][0].length() < 1e-5);
    }
}
