//! Parametric body: measurements in, skinned GLB out.

pub mod export;
pub mod measurements;
pub mod mesh;
pub mod skeleton;

use std::future::Future;

pub use export::{build_glb, is_glb};
pub use measurements::{MeasurementDraft, MeasurementKey, Measurements, SliderRange};
pub use mesh::{BodyShapeResponse, SkinnedMeshData};
pub use skeleton::{BodySkeleton, BONE_COUNT, BONE_NAMES, PARENT_INDICES};

use crate::error::Result;

/// Destination for an exported GLB; returns the URL path it is served at
pub trait GlbSink {
    fn store(&self, bytes: Vec<u8>) -> impl Future<Output = Result<String>> + Send;
}

/// Turn a body-shape response into a stored GLB.
///
/// Any failure is logged and returned; nothing is retried.
pub async fn create_and_save_glb<S: GlbSink + Sync>(
    response: BodyShapeResponse,
    sink: &S,
) -> Result<String> {
    let glb = response
        .into_mesh_data()
        .and_then(|mesh| {
            tracing::debug!(
                "Building GLB: {} vertices, {} triangles",
                mesh.vertex_count(),
                mesh.faces.len()
            );
            build_glb(&mesh)
        })
        .map_err(|e| {
            tracing::error!("Error creating mesh: {}", e);
            e
        })?;

    let size = glb.len();
    match sink.store(glb).await {
        Ok(url) => {
            tracing::info!("Mesh saved to {} ({} bytes)", url, size);
            Ok(url)
        }
        Err(e) => {
            tracing::error!("Error uploading GLB: {}", e);
            Err(e)
        }
    }
}
