//! Error types for MotionStage

use thiserror::Error;

/// Main error type for MotionStage
#[derive(Error, Debug)]
pub enum MotionStageError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("BVH error: {0}")]
    Bvh(#[from] BvhError),

    #[error("Mesh error: {0}")]
    Mesh(#[from] MeshError),

    #[error("Character error: {0}")]
    Character(#[from] CharacterError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Web server error: {0}")]
    Web(#[from] WebError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// BVH parse errors
#[derive(Error, Debug, PartialEq)]
pub enum BvhError {
    #[error("line {line}: expected {expected}, found {found:?}")]
    Unexpected {
        line: usize,
        expected: String,
        found: String,
    },

    #[error("line {line}: invalid number {value:?}")]
    BadNumber { line: usize, value: String },

    #[error("line {line}: unknown channel {channel:?}")]
    UnknownChannel { line: usize, channel: String },

    #[error("unexpected end of file while reading {0}")]
    UnexpectedEof(String),

    #[error("frame {frame} has {found} values, expected {expected}")]
    ChannelCount {
        frame: usize,
        expected: usize,
        found: usize,
    },

    #[error("declared {declared} frames but found {found}")]
    FrameCount { declared: usize, found: usize },

    #[error("frame time must be positive, got {0}")]
    FrameTime(f32),

    #[error("hierarchy has no joints")]
    EmptyHierarchy,
}

/// Mesh construction and export errors
#[derive(Error, Debug, PartialEq)]
pub enum MeshError {
    #[error("Missing required data fields in input dictionary: {0}")]
    MissingField(&'static str),

    #[error("expected {expected} joints, got {found}")]
    JointCount { expected: usize, found: usize },

    #[error("{field} has {found} entries but there are {vertices} vertices")]
    LengthMismatch {
        field: &'static str,
        found: usize,
        vertices: usize,
    },

    #[error("face {face} references vertex {index} (only {vertices} vertices)")]
    FaceIndex {
        face: usize,
        index: u32,
        vertices: usize,
    },

    #[error("vertex {vertex} references bone {index} (only {bones} bones)")]
    SkinIndex {
        vertex: usize,
        index: u16,
        bones: usize,
    },

    #[error("mesh has no {0}")]
    Empty(&'static str),

    #[error("GLB serialization failed: {0}")]
    Serialize(String),
}

/// Character model (glTF) loading errors
#[derive(Error, Debug)]
pub enum CharacterError {
    #[error("Failed to load glTF: {0}")]
    Load(String),

    #[error("Model has no skinned mesh")]
    NoSkin,
}

/// External service (motion, body-shape, upload) errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Response from {url} is missing field {field}")]
    MissingField { url: String, field: &'static str },

    #[error("Invalid response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Server rejected upload: {0}")]
    Rejected(String),
}

/// Local file storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory {path}: {message}")]
    CreateDir { path: String, message: String },

    #[error("Failed to write {path}: {message}")]
    Write { path: String, message: String },

    #[error("Upload is not a GLB file")]
    NotGlb,

    #[error("Asset path escapes the public directory: {0}")]
    AssetPath(String),
}

/// Web server errors
#[derive(Error, Debug)]
pub enum WebError {
    #[error("Failed to bind to address: {0}")]
    Bind(String),

    #[error("Server startup failed: {0}")]
    Startup(String),
}

/// Result type alias for MotionStage operations
pub type Result<T> = std::result::Result<T, MotionStageError>;
