//! Binary glTF export of the skinned body mesh

use std::collections::BTreeMap;

use gltf_json as json;
use gltf_json::validation::Checked::Valid;

use super::mesh::{BodyMaterial, IndexBuffer, SkinnedMeshData};
use super::skeleton::BodySkeleton;
use crate::error::MeshError;

const GENERATOR: &str = concat!("motionstage ", env!("CARGO_PKG_VERSION"));

/// Name of the node carrying the mesh and skin
pub const MESH_NODE_NAME: &str = "SkinnedMesh";

/// Accessor indices for one skinned primitive
#[derive(Debug, Clone, Copy)]
pub struct MeshAccessors {
    pub positions: json::Index<json::Accessor>,
    pub normals: json::Index<json::Accessor>,
    pub joints: json::Index<json::Accessor>,
    pub weights: json::Index<json::Accessor>,
    pub indices: json::Index<json::Accessor>,
    pub inverse_bind_matrices: json::Index<json::Accessor>,
}

/// Packs vertex data into a single 4-byte aligned buffer and assembles the
/// glTF document around it
#[derive(Default)]
pub struct GlbBuilder {
    buffer: Vec<u8>,
    views: Vec<json::buffer::View>,
    accessors: Vec<json::Accessor>,
}

impl GlbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    /// Positions carry min/max bounds, which glTF requires for POSITION
    pub fn pack_positions(&mut self, positions: &[[f32; 3]]) -> json::Index<json::Accessor> {
        let (min, max) = compute_bounds(positions);
        self.push(
            bytemuck::cast_slice(positions),
            positions.len(),
            json::accessor::ComponentType::F32,
            json::accessor::Type::Vec3,
            Some(json::buffer::Target::ArrayBuffer),
            Some((min, max)),
        )
    }

    pub fn pack_vec3(&mut self, data: &[[f32; 3]]) -> json::Index<json::Accessor> {
        self.push(
            bytemuck::cast_slice(data),
            data.len(),
            json::accessor::ComponentType::F32,
            json::accessor::Type::Vec3,
            Some(json::buffer::Target::ArrayBuffer),
            None,
        )
    }

    pub fn pack_vec4(&mut self, data: &[[f32; 4]]) -> json::Index<json::Accessor> {
        self.push(
            bytemuck::cast_slice(data),
            data.len(),
            json::accessor::ComponentType::F32,
            json::accessor::Type::Vec4,
            Some(json::buffer::Target::ArrayBuffer),
            None,
        )
    }

    /// Joint indices as unsigned short vec4
    pub fn pack_joints_u16(&mut self, joints: &[[u16; 4]]) -> json::Index<json::Accessor> {
        let bytes: Vec<u8> = joints
            .iter()
            .flatten()
            .flat_map(|j| j.to_le_bytes())
            .collect();
        self.push(
            &bytes,
            joints.len(),
            json::accessor::ComponentType::U16,
            json::accessor::Type::Vec4,
            Some(json::buffer::Target::ArrayBuffer),
            None,
        )
    }

    pub fn pack_indices(&mut self, indices: &IndexBuffer) -> json::Index<json::Accessor> {
        let (bytes, component): (Vec<u8>, _) = match indices {
            IndexBuffer::U16(v) => (
                v.iter().flat_map(|i| i.to_le_bytes()).collect(),
                json::accessor::ComponentType::U16,
            ),
            IndexBuffer::U32(v) => (
                v.iter().flat_map(|i| i.to_le_bytes()).collect(),
                json::accessor::ComponentType::U32,
            ),
        };
        self.push(
            &bytes,
            indices.len(),
            component,
            json::accessor::Type::Scalar,
            Some(json::buffer::Target::ElementArrayBuffer),
            None,
        )
    }

    /// Column-major 4x4 matrices (inverse bind matrices)
    pub fn pack_mat4(&mut self, matrices: &[[f32; 16]]) -> json::Index<json::Accessor> {
        self.push(
            bytemuck::cast_slice(matrices),
            matrices.len(),
            json::accessor::ComponentType::F32,
            json::accessor::Type::Mat4,
            None,
            None,
        )
    }

    fn push(
        &mut self,
        bytes: &[u8],
        count: usize,
        component: json::accessor::ComponentType,
        type_: json::accessor::Type,
        target: Option<json::buffer::Target>,
        bounds: Option<(Vec<f32>, Vec<f32>)>,
    ) -> json::Index<json::Accessor> {
        let offset = self.buffer.len();
        self.buffer.extend_from_slice(bytes);

        self.views.push(json::buffer::View {
            buffer: json::Index::new(0),
            byte_length: bytes.len().into(),
            byte_offset: Some((offset as u64).into()),
            byte_stride: None,
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            target: target.map(Valid),
        });

        let (min, max) = match bounds {
            Some((min, max)) => (Some(to_json_array(&min)), Some(to_json_array(&max))),
            None => (None, None),
        };

        let index = self.accessors.len() as u32;
        self.accessors.push(json::Accessor {
            buffer_view: Some(json::Index::new(self.views.len() as u32 - 1)),
            byte_offset: Some(0u64.into()),
            count: count.into(),
            component_type: Valid(json::accessor::GenericComponentType(component)),
            extensions: Default::default(),
            extras: Default::default(),
            type_: Valid(type_),
            min,
            max,
            name: None,
            normalized: false,
            sparse: None,
        });

        align_buffer(&mut self.buffer);
        json::Index::new(index)
    }

    /// Pack every buffer the skinned mesh needs
    pub fn pack_mesh(&mut self, mesh: &SkinnedMeshData) -> MeshAccessors {
        let inverse_bind: Vec<[f32; 16]> = mesh
            .skeleton
            .inverse_bind_matrices()
            .iter()
            .map(|m| m.to_cols_array())
            .collect();

        MeshAccessors {
            positions: self.pack_positions(&mesh.positions),
            normals: self.pack_vec3(&mesh.normals),
            joints: self.pack_joints_u16(&mesh.skin_indices),
            weights: self.pack_vec4(&mesh.skin_weights),
            indices: self.pack_indices(&mesh.index_buffer()),
            inverse_bind_matrices: self.pack_mat4(&inverse_bind),
        }
    }

    /// Build the document: node 0 holds mesh and skin, bones follow as
    /// nodes 1..=55 with the root bone as node 0's only child.
    pub fn into_document(
        self,
        skeleton: &BodySkeleton,
        material: &BodyMaterial,
        accessors: &MeshAccessors,
    ) -> (json::Root, Vec<u8>) {
        let bone_node = |bone: usize| json::Index::<json::Node>::new(bone as u32 + 1);

        let mut nodes = Vec::with_capacity(skeleton.bones().len() + 1);
        nodes.push(json::Node {
            camera: None,
            children: Some(vec![bone_node(skeleton.root())]),
            extensions: Default::default(),
            extras: Default::default(),
            matrix: None,
            mesh: Some(json::Index::new(0)),
            name: Some(MESH_NODE_NAME.to_string()),
            rotation: None,
            scale: None,
            skin: Some(json::Index::new(0)),
            translation: None,
            weights: None,
        });

        for bone in skeleton.bones() {
            let children = if bone.children.is_empty() {
                None
            } else {
                Some(bone.children.iter().map(|&c| bone_node(c)).collect())
            };
            nodes.push(json::Node {
                camera: None,
                children,
                extensions: Default::default(),
                extras: Default::default(),
                matrix: None,
                mesh: None,
                name: Some(bone.name.to_string()),
                rotation: None,
                scale: None,
                skin: None,
                translation: Some(bone.translation.to_array()),
                weights: None,
            });
        }

        let mut attributes = BTreeMap::new();
        attributes.insert(Valid(json::mesh::Semantic::Positions), accessors.positions);
        attributes.insert(Valid(json::mesh::Semantic::Normals), accessors.normals);
        attributes.insert(Valid(json::mesh::Semantic::Joints(0)), accessors.joints);
        attributes.insert(Valid(json::mesh::Semantic::Weights(0)), accessors.weights);

        let mesh = json::Mesh {
            extensions: Default::default(),
            extras: Default::default(),
            name: Some("Body".to_string()),
            primitives: vec![json::mesh::Primitive {
                attributes,
                extensions: Default::default(),
                extras: Default::default(),
                indices: Some(accessors.indices),
                material: Some(json::Index::new(0)),
                mode: Valid(json::mesh::Mode::Triangles),
                targets: None,
            }],
            weights: None,
        };

        let skin = json::Skin {
            extensions: Default::default(),
            extras: Default::default(),
            inverse_bind_matrices: Some(accessors.inverse_bind_matrices),
            joints: (0..skeleton.bones().len()).map(bone_node).collect(),
            name: Some("BodySkeleton".to_string()),
            skeleton: Some(bone_node(skeleton.root())),
        };

        let material = json::Material {
            name: Some("BodyMaterial".to_string()),
            pbr_metallic_roughness: json::material::PbrMetallicRoughness {
                base_color_factor: json::material::PbrBaseColorFactor(material.base_color),
                metallic_factor: json::material::StrengthFactor(material.metalness),
                roughness_factor: json::material::StrengthFactor(material.roughness),
                ..Default::default()
            },
            ..Default::default()
        };

        let root = json::Root {
            accessors: self.accessors,
            animations: Vec::new(),
            asset: json::Asset {
                copyright: None,
                extensions: Default::default(),
                extras: Default::default(),
                generator: Some(GENERATOR.to_string()),
                min_version: None,
                version: "2.0".to_string(),
            },
            buffers: vec![json::Buffer {
                byte_length: self.buffer.len().into(),
                extensions: Default::default(),
                extras: Default::default(),
                name: None,
                uri: None,
            }],
            buffer_views: self.views,
            cameras: Vec::new(),
            extensions: Default::default(),
            extensions_required: Vec::new(),
            extensions_used: Vec::new(),
            extras: Default::default(),
            images: Vec::new(),
            materials: vec![material],
            meshes: vec![mesh],
            nodes,
            samplers: Vec::new(),
            scene: Some(json::Index::new(0)),
            scenes: vec![json::Scene {
                extensions: Default::default(),
                extras: Default::default(),
                name: Some("Scene".to_string()),
                nodes: vec![json::Index::new(0)],
            }],
            skins: vec![skin],
            textures: Vec::new(),
        };

        (root, self.buffer)
    }
}

/// Export a validated mesh as GLB bytes
pub fn build_glb(mesh: &SkinnedMeshData) -> Result<Vec<u8>, MeshError> {
    let mut builder = GlbBuilder::new();
    let accessors = builder.pack_mesh(mesh);
    let (root, bin) = builder.into_document(&mesh.skeleton, &mesh.material, &accessors);
    assemble_glb(&root, &bin)
}

/// GLB container: 12-byte header, JSON chunk padded with spaces, BIN chunk
/// padded with zeros
pub fn assemble_glb(root: &json::Root, bin: &[u8]) -> Result<Vec<u8>, MeshError> {
    let json_string =
        json::serialize::to_string(root).map_err(|e| MeshError::Serialize(e.to_string()))?;
    let json_bytes = json_string.as_bytes();

    let json_padding = (4 - json_bytes.len() % 4) % 4;
    let json_chunk_length = json_bytes.len() + json_padding;
    let bin_padding = (4 - bin.len() % 4) % 4;
    let bin_chunk_length = bin.len() + bin_padding;

    let total_length = 12 + 8 + json_chunk_length + 8 + bin_chunk_length;
    let mut glb = Vec::with_capacity(total_length);

    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total_length as u32).to_le_bytes());

    glb.extend_from_slice(&(json_chunk_length as u32).to_le_bytes());
    glb.extend_from_slice(b"JSON");
    glb.extend_from_slice(json_bytes);
    glb.resize(glb.len() + json_padding, b' ');

    glb.extend_from_slice(&(bin_chunk_length as u32).to_le_bytes());
    glb.extend_from_slice(b"BIN\0");
    glb.extend_from_slice(bin);
    glb.resize(glb.len() + bin_padding, 0);

    Ok(glb)
}

/// True when `bytes` starts with a GLB header
pub fn is_glb(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"glTF"
}

fn compute_bounds(positions: &[[f32; 3]]) -> (Vec<f32>, Vec<f32>) {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for pos in positions {
        for i in 0..3 {
            min[i] = min[i].min(pos[i]);
            max[i] = max[i].max(pos[i]);
        }
    }
    (min.to_vec(), max.to_vec())
}

fn to_json_array(values: &[f32]) -> json::Value {
    json::Value::Array(values.iter().map(|&v| json::Value::from(v)).collect())
}

fn align_buffer(buffer: &mut Vec<u8>) {
    while buffer.len() % 4 != 0 {
        buffer.push(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::mesh::BodyShapeResponse;
    use crate::body::skeleton::{BONE_COUNT, BONE_NAMES};

    fn sample_mesh() -> SkinnedMeshData {
        // a tetrahedron bound to the first few bones
        let vertices = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        let joints: Vec<[f32; 3]> = (0..BONE_COUNT)
            .map(|i| [0.0, i as f32 * 0.01, 0.0])
            .collect();
        BodyShapeResponse {
            vertices: Some(vertices),
            faces: Some(vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]]),
            joints: Some(joints),
            weights: Some(vec![[0.5, 0.5, 0.0, 0.0]; 4]),
            indices: Some(vec![[0, 3, 0, 0], [1, 4, 0, 0], [2, 5, 0, 0], [3, 6, 0, 0]]),
        }
        .into_mesh_data()
        .unwrap()
    }

    #[test]
    fn test_align_buffer() {
        let mut buffer = vec![1, 2, 3];
        align_buffer(&mut buffer);
        assert_eq!(buffer, vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_u16_joints_are_aligned() {
        let mut builder = GlbBuilder::new();
        builder.pack_joints_u16(&[[1, 2, 3, 4]]);
        assert_eq!(builder.data().len(), 8);
        assert_eq!(&builder.data()[0..4], &[1, 0, 2, 0]);

        builder.pack_indices(&IndexBuffer::U16(vec![0, 1, 2]));
        // 6 bytes of indices padded to 8
        assert_eq!(builder.data().len(), 16);
    }

    #[test]
    fn test_glb_header() {
        let glb = build_glb(&sample_mesh()).unwrap();
        assert!(is_glb(&glb));
        assert_eq!(u32::from_le_bytes(glb[4..8].try_into().unwrap()), 2);
        assert_eq!(
            u32::from_le_bytes(glb[8..12].try_into().unwrap()) as usize,
            glb.len()
        );
        assert_eq!(glb.len() % 4, 0);
        assert_eq!(&glb[16..20], b"JSON");
    }

    #[test]
    fn test_glb_loads_with_skin() {
        let glb = build_glb(&sample_mesh()).unwrap();
        let (document, buffers, _) = gltf::import_slice(&glb).unwrap();

        assert_eq!(document.nodes().count(), BONE_COUNT + 1);
        let mesh_node = document.nodes().next().unwrap();
        assert_eq!(mesh_node.name(), Some(MESH_NODE_NAME));
        assert!(mesh_node.mesh().is_some());

        let skin = mesh_node.skin().unwrap();
        let joints: Vec<_> = skin.joints().collect();
        assert_eq!(joints.len(), BONE_COUNT);
        assert_eq!(joints[0].name(), Some(BONE_NAMES[0]));
        assert_eq!(joints[54].name(), Some("RightThumb3"));
        assert_eq!(skin.skeleton().unwrap().index(), 1);

        let reader = skin.reader(|b| Some(&buffers[b.index()]));
        let ibms: Vec<_> = reader.read_inverse_bind_matrices().unwrap().collect();
        assert_eq!(ibms.len(), BONE_COUNT);
        // Spine (3) sits at y = 0.03, so its IBM translates by -0.03
        assert!((ibms[3][3][1] + 0.03).abs() < 1e-6);
    }

    #[test]
    fn test_glb_primitive_contents() {
        let glb = build_glb(&sample_mesh()).unwrap();
        let (document, buffers, _) = gltf::import_slice(&glb).unwrap();
        let primitive = document.meshes().next().unwrap().primitives().next().unwrap();
        let reader = primitive.reader(|b| Some(&buffers[b.index()]));

        assert_eq!(reader.read_positions().unwrap().count(), 4);
        assert_eq!(reader.read_indices().unwrap().into_u32().count(), 12);
        let joints: Vec<[u16; 4]> = reader.read_joints(0).unwrap().into_u16().collect();
        assert_eq!(joints[2], [2, 5, 0, 0]);

        let pbr = primitive.material().pbr_metallic_roughness();
        assert_eq!(pbr.metallic_factor(), 0.5);
        assert_eq!(pbr.roughness_factor(), 0.5);
    }

    #[test]
    fn test_bone_hierarchy_preserved() {
        let glb = build_glb(&sample_mesh()).unwrap();
        let (document, _, _) = gltf::import_slice(&glb).unwrap();
        let nodes: Vec<_> = document.nodes().collect();
        // LeftUpLeg (bone 1, node 2) has child LeftLeg (bone 4, node 5)
        let children: Vec<usize> = nodes[2].children().map(|c| c.index()).collect();
        assert_eq!(children, vec![5]);
        let (t, _, _) = nodes[5].transform().decomposed();
        assert!((t[1] - 0.03).abs() < 1e-6);
    }
}
