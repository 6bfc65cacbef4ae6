//! Fixed-path storage for the generated mesh

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::body::{is_glb, GlbSink};
use crate::config::StorageConfig;
use crate::error::{Result, StorageError};

/// Writes the generated mesh under the public directory
#[derive(Debug, Clone)]
pub struct MeshStore {
    public_dir: PathBuf,
    mesh_file: PathBuf,
}

impl MeshStore {
    pub fn new(public_dir: impl Into<PathBuf>, mesh_file: impl Into<PathBuf>) -> Self {
        Self {
            public_dir: public_dir.into(),
            mesh_file: mesh_file.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.public_dir, &config.mesh_file)
    }

    /// Directory served as static files
    pub fn public_dir(&self) -> &Path {
        &self.public_dir
    }

    /// Filesystem location of the mesh
    pub fn path(&self) -> PathBuf {
        self.public_dir.join(&self.mesh_file)
    }

    /// URL path the mesh is served at
    pub fn url_path(&self) -> String {
        let parts: Vec<_> = self
            .mesh_file
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect();
        format!("/{}", parts.join("/"))
    }

    /// Local file behind a served URL path. Only plain names are allowed,
    /// so the result always stays under the public directory.
    pub fn asset_path(&self, url_path: &str) -> std::result::Result<PathBuf, StorageError> {
        let relative = Path::new(url_path.trim_start_matches('/'));
        let plain = relative.components().next().is_some()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(StorageError::AssetPath(url_path.to_string()));
        }
        Ok(self.public_dir.join(relative))
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    /// Write the GLB, replacing any previous mesh; returns the served path
    pub async fn save(&self, bytes: &[u8]) -> std::result::Result<String, StorageError> {
        if !is_glb(bytes) {
            return Err(StorageError::NotGlb);
        }

        let path = self.path();
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StorageError::CreateDir {
                    path: dir.display().to_string(),
                    message: e.to_string(),
                })?;
        }

        let target = path.clone();
        let data = bytes.to_vec();
        tokio::task::spawn_blocking(move || replace_file(&target, &data))
            .await
            .map_err(|e| StorageError::Write {
                path: path.display().to_string(),
                message: e.to_string(),
            })??;

        tracing::info!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(self.url_path())
    }
}

impl GlbSink for MeshStore {
    async fn store(&self, bytes: Vec<u8>) -> Result<String> {
        Ok(self.save(&bytes).await?)
    }
}

/// Write to a fresh temp file beside `path`, then rename it into place.
/// Readers only ever see complete files, and concurrent saves never share a temp file.
fn replace_file(path: &Path, bytes: &[u8]) -> std::result::Result<(), StorageError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".mesh-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| write_error(dir, e))?;
    tmp.write_all(bytes)
        .map_err(|e| write_error(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| write_error(path, e.error))?;
    Ok(())
}

fn write_error(path: &Path, e: std::io::Error) -> StorageError {
    StorageError::Write {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glb(payload: &[u8]) -> Vec<u8> {
        let mut bytes = b"glTF\x02\x00\x00\x00\x00\x00\x00\x00".to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_paths() {
        let store = MeshStore::new("public", "mesh/mesh.glb");
        assert_eq!(store.path(), PathBuf::from("public/mesh/mesh.glb"));
        assert_eq!(store.url_path(), "/mesh/mesh.glb");
    }

    #[test]
    fn test_asset_path_stays_inside_public_dir() {
        let store = MeshStore::new("public", "mesh/mesh.glb");
        assert_eq!(
            store.asset_path("/motions/walk.bvh").unwrap(),
            PathBuf::from("public/motions/walk.bvh")
        );
        assert_eq!(
            store.asset_path("walk.bvh").unwrap(),
            PathBuf::from("public/walk.bvh")
        );

        for bad in ["../secret.bvh", "/a/../../etc/passwd", "./walk.bvh", "", "/"] {
            assert!(
                matches!(store.asset_path(bad), Err(StorageError::AssetPath(_))),
                "{bad}"
            );
        }
    }

    #[tokio::test]
    async fn test_save_creates_dirs_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = MeshStore::new(dir.path(), "mesh/mesh.glb");
        assert!(!store.exists());

        assert_eq!(store.save(&glb(b"first")).await.unwrap(), "/mesh/mesh.glb");
        assert_eq!(store.save(&glb(b"second")).await.unwrap(), "/mesh/mesh.glb");

        let written = std::fs::read(dir.path().join("mesh/mesh.glb")).unwrap();
        assert_eq!(written, glb(b"second"));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("mesh"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("mesh.glb")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_saves_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let store = MeshStore::new(dir.path(), "mesh/mesh.glb");

        let tasks: Vec<_> = (0..16u8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.save(&glb(&[i; 64])).await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "/mesh/mesh.glb");
        }

        // the survivor is one complete upload
        let written = std::fs::read(store.path()).unwrap();
        assert_eq!(written.len(), 12 + 64);
        assert!(written[12..].iter().all(|&b| b == written[12]));
    }

    #[tokio::test]
    async fn test_rejects_non_glb() {
        let dir = tempfile::tempdir().unwrap();
        let store = MeshStore::new(dir.path(), "mesh.glb");
        assert!(matches!(
            store.save(b"{\"not\": \"glb\"}").await,
            Err(StorageError::NotGlb)
        ));
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn test_store_via_sink() {
        let dir = tempfile::tempdir().unwrap();
        let store = MeshStore::new(dir.path(), "mesh/mesh.glb");
        let url = store.store(glb(b"x")).await.unwrap();
        assert_eq!(url, "/mesh/mesh.glb");
        assert!(store.exists());
    }
}
