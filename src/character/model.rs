//! Skinned glTF character loader using the `gltf` crate.
//!
//! Extracts the node hierarchy with rest-pose TRS and node names, skins
//! (joint lists and inverse bind matrices), and per-primitive geometry with
//! joint indices and weights.

use glam::{Mat4, Quat, Vec3};
use std::collections::HashMap;
use std::path::Path;

use crate::error::CharacterError;

/// A loaded character ready for CPU skinning.
pub struct CharacterModel {
    pub meshes: Vec<MeshData>,
    /// Node names; unnamed nodes get an empty string
    pub node_names: Vec<String>,
    /// Skeleton: node index → rest-pose local transform
    pub rest_translations: Vec<Vec3>,
    pub rest_rotations: Vec<Quat>,
    pub rest_scales: Vec<Vec3>,
    /// Parent map: child node → parent node (None if root)
    pub parents: Vec<Option<usize>>,
    pub node_count: usize,
    pub skins: Vec<SkinData>,
    /// Which skin each mesh uses: mesh_index → skin_index
    pub mesh_skin: HashMap<usize, usize>,
    /// Node instancing each mesh: mesh_index → node_index
    pub mesh_node: HashMap<usize, usize>,
}

pub struct SkinData {
    pub joints: Vec<usize>,
    pub inverse_bind_matrices: Vec<Mat4>,
}

/// All primitives of one mesh
pub struct MeshData {
    pub primitives: Vec<PrimitiveData>,
}

/// Geometry for a single primitive.
pub struct PrimitiveData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
    /// Per-vertex joint indices (4 per vertex)
    pub joints: Vec<[u16; 4]>,
    /// Per-vertex joint weights (4 per vertex)
    pub weights: Vec<[f32; 4]>,
    /// Base color factor from material (linear RGBA)
    pub base_color: [f32; 4],
}

impl CharacterModel {
    /// Load a GLB/glTF file from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CharacterError> {
        let path = path.as_ref();
        let (document, buffers, _) = gltf::import(path)
            .map_err(|e| CharacterError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_document(&document, &buffers)
    }

    /// Load from GLB bytes (e.g. fetched over HTTP).
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CharacterError> {
        let (document, buffers, _) =
            gltf::import_slice(bytes).map_err(|e| CharacterError::Load(e.to_string()))?;
        Self::from_document(&document, &buffers)
    }

    fn from_document(
        document: &gltf::Document,
        buffers: &[gltf::buffer::Data],
    ) -> Result<Self, CharacterError> {
        if document.skins().next().is_none() {
            return Err(CharacterError::NoSkin);
        }

        // Build parent map
        let node_count = document.nodes().count();
        let mut parents = vec![None; node_count];
        for node in document.nodes() {
            for child in node.children() {
                parents[child.index()] = Some(node.index());
            }
        }

        let mut node_names = Vec::with_capacity(node_count);
        let mut rest_translations = Vec::with_capacity(node_count);
        let mut rest_rotations = Vec::with_capacity(node_count);
        let mut rest_scales = Vec::with_capacity(node_count);
        for node in document.nodes() {
            node_names.push(node.name().unwrap_or_default().to_string());
            let (t, r, s) = node.transform().decomposed();
            rest_translations.push(Vec3::from(t));
            rest_rotations.push(Quat::from_array(r));
            rest_scales.push(Vec3::from(s));
        }

        let mut skins = Vec::new();
        for skin in document.skins() {
            let joints: Vec<usize> = skin.joints().map(|j| j.index()).collect();
            let reader = skin.reader(|buffer| Some(&buffers[buffer.index()]));
            let ibms: Vec<Mat4> = reader
                .read_inverse_bind_matrices()
                .map(|iter| iter.map(|m| Mat4::from_cols_array_2d(&m)).collect())
                .unwrap_or_else(|| vec![Mat4::IDENTITY; joints.len()]);

            skins.push(SkinData {
                joints,
                inverse_bind_matrices: ibms,
            });
        }

        let mut mesh_skin = HashMap::new();
        let mut mesh_node = HashMap::new();
        for node in document.nodes() {
            if let Some(mesh) = node.mesh() {
                mesh_node.entry(mesh.index()).or_insert(node.index());
                if let Some(skin) = node.skin() {
                    mesh_skin.insert(mesh.index(), skin.index());
                }
            }
        }

        let mut meshes = Vec::new();
        for mesh in document.meshes() {
            let mut primitives = Vec::new();
            for prim in mesh.primitives() {
                if prim.mode() != gltf::mesh::Mode::Triangles {
                    continue;
                }
                let reader = prim.reader(|buffer| Some(&buffers[buffer.index()]));

                let positions: Vec<Vec3> = reader
                    .read_positions()
                    .map(|iter| iter.map(Vec3::from).collect())
                    .unwrap_or_default();

                let normals: Vec<Vec3> = reader
                    .read_normals()
                    .map(|iter| iter.map(Vec3::from).collect())
                    .unwrap_or_else(|| vec![Vec3::Y; positions.len()]);

                // Non-indexed primitives draw vertices in order
                let indices: Vec<u32> = reader
                    .read_indices()
                    .map(|iter| iter.into_u32().collect())
                    .unwrap_or_else(|| (0..positions.len() as u32).collect());

                let joints: Vec<[u16; 4]> = reader
                    .read_joints(0)
                    .map(|iter| iter.into_u16().collect())
                    .unwrap_or_else(|| vec![[0; 4]; positions.len()]);

                let weights: Vec<[f32; 4]> = reader
                    .read_weights(0)
                    .map(|iter| iter.into_f32().collect())
                    .unwrap_or_else(|| vec![[1.0, 0.0, 0.0, 0.0]; positions.len()]);

                let base_color = prim
                    .material()
                    .pbr_metallic_roughness()
                    .base_color_factor();

                primitives.push(PrimitiveData {
                    positions,
                    normals,
                    indices,
                    joints,
                    weights,
                    base_color,
                });
            }
            meshes.push(MeshData { primitives });
        }

        tracing::debug!(
            "Loaded character: {} nodes, {} meshes, {} skins",
            node_count,
            meshes.len(),
            skins.len()
        );

        Ok(CharacterModel {
            meshes,
            node_names,
            rest_translations,
            rest_rotations,
            rest_scales,
            parents,
            node_count,
            skins,
            mesh_skin,
            mesh_node,
        })
    }

    /// First node with this exact name
    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.node_names.iter().position(|n| n == name)
    }

    /// Every node used as a joint by any skin, with its name, in node order
    pub fn skin_joints(&self) -> Vec<(usize, &str)> {
        let mut is_joint = vec![false; self.node_count];
        for skin in &self.skins {
            for &j in &skin.joints {
                is_joint[j] = true;
            }
        }
        is_joint
            .iter()
            .enumerate()
            .filter(|(_, &joint)| joint)
            .map(|(i, _)| (i, self.node_names[i].as_str()))
            .collect()
    }

    pub fn vertex_count(&self) -> usize {
        self.meshes
            .iter()
            .flat_map(|m| &m.primitives)
            .map(|p| p.positions.len())
            .sum()
    }
}
