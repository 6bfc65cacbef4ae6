//! Configuration parsing and management for MotionStage

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::body::measurements::{Measurements, SliderRange};
use crate::error::{ConfigError, MotionStageError};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub services: ServicesConfig,
    pub storage: StorageConfig,
    pub viewer: ViewerConfig,
    pub measurements: MeasurementsConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MotionStageError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_toml(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(s: &str) -> Result<Self, MotionStageError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Load configuration from default paths
    pub fn load() -> Result<Self, MotionStageError> {
        let paths = [
            PathBuf::from("config.toml"),
            PathBuf::from("config/default.toml"),
            dirs_path().join("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Move the HTTP server to another port. Service URLs that pointed at
    /// this server (upload, assets) follow it; external services are untouched.
    pub fn set_http_port(&mut self, port: u16) {
        let old = self.http.port;
        self.http.port = port;

        let hosts = ["localhost", "127.0.0.1", self.http.host.as_str()];
        for url in [
            &mut self.services.upload_url,
            &mut self.services.asset_base_url,
        ] {
            if let Some(moved) = repoint(url, &hosts, old, port) {
                *url = moved;
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), MotionStageError> {
        if self.http.port == 0 {
            return Err(invalid("http.port", "Port must be greater than 0"));
        }

        if self.services.timeout_secs == 0 {
            return Err(invalid(
                "services.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&self.viewer.follow_factor) {
            return Err(invalid(
                "viewer.follow_factor",
                "Follow factor must be between 0.0 and 1.0",
            ));
        }

        if self.viewer.model_scale <= 0.0 {
            return Err(invalid(
                "viewer.model_scale",
                "Model scale must be greater than 0",
            ));
        }

        let cam = &self.viewer.camera;
        if cam.min_distance <= 0.0 || cam.min_distance > cam.max_distance {
            return Err(invalid(
                "viewer.camera.min_distance",
                "Orbit distance range must satisfy 0 < min <= max",
            ));
        }
        if cam.near <= 0.0 || cam.near >= cam.far {
            return Err(invalid(
                "viewer.camera.near",
                "Clip planes must satisfy 0 < near < far",
            ));
        }

        let range = &self.measurements.range;
        if range.min >= range.max || range.step <= 0.0 {
            return Err(invalid(
                "measurements.range",
                "Slider range must satisfy min < max and step > 0",
            ));
        }

        if self.storage.mesh_file.is_absolute() {
            return Err(invalid(
                "storage.mesh_file",
                "Mesh file must be relative to the public directory",
            ));
        }

        if !Path::new(&self.viewer.character_model).exists() {
            tracing::warn!(
                "Character model not found at: {}",
                self.viewer.character_model
            );
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> MotionStageError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Enable HTTP server
    pub enabled: bool,
    /// HTTP server host
    pub host: String,
    /// HTTP server port
    pub port: u16,
    /// Enable CORS
    pub cors_enabled: bool,
    /// Largest accepted request body (uploads)
    pub max_upload_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors_enabled: true,
            max_upload_bytes: 64 * 1024 * 1024,
        }
    }
}

/// External service endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Motion-generation endpoint (text prompt -> BVH filename)
    pub motion_url: String,
    /// Body-shape endpoint (measurements -> mesh arrays)
    pub body_shape_url: String,
    /// Mesh upload endpoint
    pub upload_url: String,
    /// Base URL the viewer fetches BVH and GLB files from
    pub asset_base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            motion_url: "http://localhost:8000/generate-motion".to_string(),
            body_shape_url: "http://localhost:8080/calculate-anthrobetas/".to_string(),
            upload_url: "http://localhost:3000/api/upload".to_string(),
            asset_base_url: "http://localhost:3000".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Where served files live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory served at `/`
    pub public_dir: PathBuf,
    /// Generated mesh location, relative to `public_dir`
    pub mesh_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            public_dir: PathBuf::from("public"),
            mesh_file: PathBuf::from("mesh/mesh.glb"),
        }
    }
}

/// 3D viewer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Character model rendered when no generated mesh exists
    pub character_model: String,
    /// Render the generated body mesh once one has been uploaded
    pub prefer_generated_mesh: bool,
    /// Uniform scale applied to the character
    pub model_scale: f32,
    /// Prefix stripped from character bone names before matching
    pub bone_prefix: String,
    /// Per-frame blend toward the animation pose (0 = frozen, 1 = snap)
    pub follow_factor: f32,
    /// Background colour (0xRRGGBB)
    pub background: u32,
    pub camera: CameraConfig,
    pub grid: GridConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            character_model: "public/Xbot.glb".to_string(),
            prefer_generated_mesh: true,
            model_scale: 100.0,
            bone_prefix: "mixamorig".to_string(),
            follow_factor: 0.5,
            background: 0xa0a0a0,
            camera: CameraConfig::default(),
            grid: GridConfig::default(),
        }
    }
}

/// Perspective camera with orbit limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub min_distance: f32,
    pub max_distance: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_deg: 60.0,
            near: 1.0,
            far: 1000.0,
            position: [0.0, 200.0, 300.0],
            target: [0.0, 0.0, 0.0],
            min_distance: 300.0,
            max_distance: 700.0,
        }
    }
}

/// Ground grid
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub size: f32,
    pub divisions: u32,
    pub height: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            size: 400.0,
            divisions: 10,
            height: -19.0,
        }
    }
}

/// Measurement slider defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementsConfig {
    pub initial: Measurements,
    pub range: SliderRange,
}

impl Default for MeasurementsConfig {
    fn default() -> Self {
        Self {
            initial: Measurements::default(),
            range: SliderRange::default(),
        }
    }
}

/// Get the platform-specific configuration directory
fn dirs_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        if let Some(config_dir) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(config_dir).join("motionstage");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".config/motionstage");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join("Library/Application Support/motionstage");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("motionstage");
        }
    }

    PathBuf::from(".")
}

/// Rewrite `http://<host>:<old>...` to the new port when host is one of `hosts`
fn repoint(url: &str, hosts: &[&str], old: u16, new: u16) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let split = rest.find('/').unwrap_or(rest.len());
    let (authority, path) = rest.split_at(split);
    let (host, port) = authority.rsplit_once(':')?;
    if port.parse::<u16>().ok()? != old || !hosts.contains(&host) {
        return None;
    }
    Some(format!("{}://{}:{}{}", scheme, host, new, path))
}
