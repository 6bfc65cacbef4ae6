//! Skinned body mesh assembled from the body-shape service's raw arrays.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::skeleton::{BodySkeleton, BONE_COUNT};
use crate::error::MeshError;

/// Raw response of the body-shape service.
///
/// Every field is optional on the wire so that a missing one is reported by
/// name instead of as a generic decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BodyShapeResponse {
    #[serde(default)]
    pub vertices: Option<Vec<[f32; 3]>>,
    #[serde(default)]
    pub faces: Option<Vec<[u32; 3]>>,
    #[serde(default)]
    pub joints: Option<Vec<[f32; 3]>>,
    #[serde(default)]
    pub weights: Option<Vec<[f32; 4]>>,
    #[serde(default)]
    pub indices: Option<Vec<[u16; 4]>>,
}

impl BodyShapeResponse {
    /// Presence-check all five arrays and build the mesh
    pub fn into_mesh_data(self) -> Result<SkinnedMeshData, MeshError> {
        let vertices = self.vertices.ok_or(MeshError::MissingField("vertices"))?;
        let faces = self.faces.ok_or(MeshError::MissingField("faces"))?;
        let joints = self.joints.ok_or(MeshError::MissingField("joints"))?;
        let weights = self.weights.ok_or(MeshError::MissingField("weights"))?;
        let indices = self.indices.ok_or(MeshError::MissingField("indices"))?;

        SkinnedMeshData::new(vertices, faces, &joints, weights, indices)
    }
}

/// Index buffer, narrowed to u16 when the vertex count allows it
#[derive(Debug, Clone, PartialEq)]
pub enum IndexBuffer {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexBuffer {
    fn from_faces(faces: &[[u32; 3]], vertex_count: usize) -> Self {
        let flat = faces.iter().flatten().copied();
        if vertex_count <= u16::MAX as usize {
            IndexBuffer::U16(flat.map(|i| i as u16).collect())
        } else {
            IndexBuffer::U32(flat.collect())
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexBuffer::U16(v) => v.len(),
            IndexBuffer::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// PBR material parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyMaterial {
    /// Linear RGBA
    pub base_color: [f32; 4],
    pub metalness: f32,
    pub roughness: f32,
}

impl Default for BodyMaterial {
    fn default() -> Self {
        let grey = srgb_to_linear(0xaa as f32 / 255.0);
        Self {
            base_color: [grey, grey, grey, 1.0],
            metalness: 0.5,
            roughness: 0.5,
        }
    }
}

pub(crate) fn srgb_to_linear(c: f32) -> f32 {
    if c < 0.04045 {
        c * 0.0773993808
    } else {
        (c * 0.9478672986 + 0.0521327014).powf(2.4)
    }
}

/// Validated geometry, skin and skeleton ready for export
#[derive(Debug, Clone)]
pub struct SkinnedMeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub faces: Vec<[u32; 3]>,
    pub skin_weights: Vec<[f32; 4]>,
    pub skin_indices: Vec<[u16; 4]>,
    pub skeleton: BodySkeleton,
    pub material: BodyMaterial,
}

impl SkinnedMeshData {
    pub fn new(
        vertices: Vec<[f32; 3]>,
        faces: Vec<[u32; 3]>,
        joints: &[[f32; 3]],
        weights: Vec<[f32; 4]>,
        indices: Vec<[u16; 4]>,
    ) -> Result<Self, MeshError> {
        let count = vertices.len();
        if count == 0 {
            return Err(MeshError::Empty("vertices"));
        }
        if faces.is_empty() {
            return Err(MeshError::Empty("faces"));
        }
        if weights.len() != count {
            return Err(MeshError::LengthMismatch {
                field: "weights",
                found: weights.len(),
                vertices: count,
            });
        }
        if indices.len() != count {
            return Err(MeshError::LengthMismatch {
                field: "indices",
                found: indices.len(),
                vertices: count,
            });
        }

        for (face, tri) in faces.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i as usize >= count) {
                return Err(MeshError::FaceIndex {
                    face,
                    index,
                    vertices: count,
                });
            }
        }

        for (vertex, influences) in indices.iter().enumerate() {
            if let Some(&index) = influences.iter().find(|&&i| i as usize >= BONE_COUNT) {
                return Err(MeshError::SkinIndex {
                    vertex,
                    index,
                    bones: BONE_COUNT,
                });
            }
        }

        let skeleton = BodySkeleton::from_joints(joints)?;
        let normals = compute_vertex_normals(&vertices, &faces);

        Ok(Self {
            positions: vertices,
            normals,
            faces,
            skin_weights: weights,
            skin_indices: indices,
            skeleton,
            material: BodyMaterial::default(),
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn index_buffer(&self) -> IndexBuffer {
        IndexBuffer::from_faces(&self.faces, self.positions.len())
    }
}

/// Smooth normals: area-weighted sum of adjacent face normals.
///
/// Vertices with no (non-degenerate) adjacent face get +Y.
pub fn compute_vertex_normals(positions: &[[f32; 3]], faces: &[[u32; 3]]) -> Vec<[f32; 3]> {
    let mut acc = vec![Vec3::ZERO; positions.len()];

    for tri in faces {
        let [a, b, c] = tri.map(|i| i as usize);
        let (pa, pb, pc) = (
            Vec3::from(positions[a]),
            Vec3::from(positions[b]),
            Vec3::from(positions[c]),
        );
        // unnormalized: length is twice the triangle area
        let n = (pc - pb).cross(pa - pb);
        acc[a] += n;
        acc[b] += n;
        acc[c] += n;
    }

    acc.into_iter()
        .map(|n| n.try_normalize().unwrap_or(Vec3::Y).to_array())
        .collect()
}
