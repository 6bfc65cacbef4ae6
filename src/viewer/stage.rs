//! Render-loop state: character, motion and the skinned result

use glam::Vec3;

use crate::character::{compute_world_transforms, skin_vertices, CharacterModel, CharacterPose};
use crate::config::{GridConfig, ViewerConfig};
use crate::motion::{BvhClip, ClipPlayer, RetargetMap};

/// One world-space triangle ready to draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub positions: [Vec3; 3],
    pub normal: Vec3,
    pub color: [f32; 4],
}

impl Triangle {
    fn new(positions: [Vec3; 3], color: [f32; 4]) -> Self {
        let [a, b, c] = positions;
        Self {
            positions,
            normal: (b - a).cross(c - a).normalize_or_zero(),
            color,
        }
    }
}

pub struct Stage {
    model_scale: f32,
    bone_prefix: String,
    follow_factor: f32,
    grid: GridConfig,
    character: Option<(CharacterModel, CharacterPose)>,
    player: Option<ClipPlayer>,
    retarget: RetargetMap,
    triangles: Vec<Triangle>,
}

impl Stage {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            model_scale: config.model_scale,
            bone_prefix: config.bone_prefix.clone(),
            follow_factor: config.follow_factor,
            grid: config.grid.clone(),
            character: None,
            player: None,
            retarget: RetargetMap::default(),
            triangles: Vec::new(),
        }
    }

    pub fn character(&self) -> Option<&CharacterModel> {
        self.character.as_ref().map(|(model, _)| model)
    }

    pub fn pose(&self) -> Option<&CharacterPose> {
        self.character.as_ref().map(|(_, pose)| pose)
    }

    pub fn player(&self) -> Option<&ClipPlayer> {
        self.player.as_ref()
    }

    pub fn retarget(&self) -> &RetargetMap {
        &self.retarget
    }

    /// Skinned triangles from the last `update`
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Replace the character, starting from its rest pose
    pub fn set_character(&mut self, model: CharacterModel) {
        tracing::info!(
            "Stage character: {} nodes, {} vertices",
            model.node_count,
            model.vertex_count()
        );
        let pose = CharacterPose::from_rest(&model, self.model_scale);
        self.character = Some((model, pose));
        self.retarget_current();
    }

    /// Start playing a clip from the beginning
    pub fn load_motion(&mut self, clip: BvhClip) {
        tracing::info!(
            "Stage motion: {} joints, {} frames",
            clip.joints().len(),
            clip.frame_count()
        );
        self.player = Some(ClipPlayer::new(clip));
        self.retarget_current();
    }

    /// Rebuild the bone map and snap the character to the current frame
    fn retarget_current(&mut self) {
        let (Some((model, pose)), Some(player)) = (self.character.as_mut(), self.player.as_ref())
        else {
            self.retarget = RetargetMap::default();
            return;
        };

        self.retarget = RetargetMap::build(
            model.skin_joints(),
            player.clip().joints(),
            &self.bone_prefix,
        );
        if self.retarget.is_empty() {
            tracing::warn!("No character bones match the motion's joints");
        }
        self.retarget.copy(&player.pose(), pose);
    }

    /// Step the animation and re-skin the character
    pub fn update(&mut self, dt: f32) -> &[Triangle] {
        self.triangles.clear();
        let Some((model, pose)) = self.character.as_mut() else {
            return &self.triangles;
        };

        if let Some(player) = self.player.as_mut() {
            player.advance(dt);
            self.retarget
                .follow(&player.pose(), pose, self.follow_factor);
        }

        let world = compute_world_transforms(model, pose);
        for (mesh_idx, mesh) in model.meshes.iter().enumerate() {
            let skinned = skin_vertices(model, mesh_idx, &world);
            for (prim, positions) in mesh.primitives.iter().zip(&skinned) {
                for face in prim.indices.chunks_exact(3) {
                    let corner = |i: usize| positions.get(face[i] as usize).copied();
                    if let (Some(a), Some(b), Some(c)) = (corner(0), corner(1), corner(2)) {
                        self.triangles.push(Triangle::new([a, b, c], prim.base_color));
                    }
                }
            }
        }

        &self.triangles
    }

    /// Ground grid line segments
    pub fn grid_lines(&self) -> Vec<[Vec3; 2]> {
        let GridConfig {
            size,
            divisions,
            height,
        } = self.grid;
        let half = size / 2.0;
        let step = size / divisions.max(1) as f32;

        (0..=divisions.max(1))
            .flat_map(|i| {
                let k = -half + i as f32 * step;
                [
                    [Vec3::new(k, height, -half), Vec3::new(k, height, half)],
                    [Vec3::new(-half, height, k), Vec3::new(half, height, k)],
                ]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::model::tests::body_glb;
    use crate::motion::bvh::tests::WALK;

    fn stage(scale: f32) -> Stage {
        let config = ViewerConfig {
            model_scale: scale,
            ..ViewerConfig::default()
        };
        Stage::new(&config)
    }

    fn body() -> CharacterModel {
        CharacterModel::from_slice(&body_glb()).unwrap()
    }

    fn walk() -> BvhClip {
        BvhClip::parse(WALK).unwrap()
    }

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-3
    }

    #[test]
    fn test_empty_stage_draws_nothing() {
        let mut stage = stage(1.0);
        assert!(stage.update(0.016).is_empty());
        stage.load_motion(walk());
        assert!(stage.update(0.016).is_empty());
        assert!(stage.retarget().is_empty());
    }

    #[test]
    fn test_rest_pose_with_scale() {
        let mut stage = stage(2.0);
        stage.set_character(body());
        let tris = stage.update(0.016);
        assert_eq!(tris.len(), 1);
        assert!(close(tris[0].positions[1], Vec3::new(2.0, 0.0, 0.0)));
        assert!(close(tris[0].positions[2], Vec3::new(0.0, 6.0, 0.0)));
        assert!(close(tris[0].normal, Vec3::Z));
    }

    #[test]
    fn test_load_motion_snaps_to_first_frame() {
        let mut stage = stage(1.0);
        stage.set_character(body());
        stage.load_motion(walk());
        assert_eq!(stage.retarget().len(), 3);

        let tris = stage.update(0.0);
        assert!(close(tris[0].positions[0], Vec3::new(0.0, 90.0, 0.0)));
        assert!(close(tris[0].positions[1], Vec3::new(1.0, 90.0, 0.0)));
        // spine vertex follows the motion's spine offset
        assert!(close(tris[0].positions[2], Vec3::new(0.0, 100.0, 0.0)));
    }

    #[test]
    fn test_character_swap_keeps_motion() {
        let mut stage = stage(1.0);
        stage.load_motion(walk());
        stage.set_character(body());
        assert_eq!(stage.retarget().len(), 3);

        let hips = stage.character().unwrap().node_index("Hips").unwrap();
        assert_eq!(
            stage.pose().unwrap().translations[hips],
            Vec3::new(0.0, 90.0, 0.0)
        );
    }

    #[test]
    fn test_update_follows_halfway() {
        let mut stage = stage(1.0);
        stage.set_character(body());
        stage.load_motion(walk());
        stage.update(0.5);

        let hips = stage.character().unwrap().node_index("Hips").unwrap();
        let pose = stage.pose().unwrap();
        assert!(close(pose.translations[hips], Vec3::new(5.0, 90.0, 0.0)));
        assert!((stage.player().unwrap().time() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_grid_lines() {
        let stage = stage(1.0);
        let lines = stage.grid_lines();
        assert_eq!(lines.len(), 22);
        assert_eq!(lines[0][0], Vec3::new(-200.0, -19.0, -200.0));
        assert_eq!(lines[0][1], Vec3::new(-200.0, -19.0, 200.0));
        assert!(lines.iter().all(|[a, b]| a.y == -19.0 && b.y == -19.0));
    }
}
