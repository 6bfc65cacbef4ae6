//! External services and their wire formats

mod client;

pub use client::ServiceClient;

use serde::{Deserialize, Serialize};

/// Body of a motion-generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionRequest {
    pub text_prompt: String,
}

/// Motion-generation reply
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MotionResponse {
    #[serde(default)]
    pub filename: Option<String>,
}

/// Reply of the mesh upload endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(rename = "filePath", default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResponse {
    pub fn stored(file_path: impl Into<String>) -> Self {
        Self {
            success: true,
            file_path: Some(file_path.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            file_path: None,
            error: Some(error.into()),
        }
    }
}
