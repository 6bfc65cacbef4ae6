//! Skinned character models: loading, posing and CPU skinning

pub mod model;
pub mod skinning;

pub use model::{CharacterModel, MeshData, PrimitiveData, SkinData};
pub use skinning::{compute_world_transforms, skin_vertices, CharacterPose};
