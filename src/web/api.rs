//! REST API endpoints

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::sse;
use crate::body::{create_and_save_glb, Measurements};
use crate::error::{MotionStageError, StorageError};
use crate::scene::{ScenePhase, SceneState};
use crate::services::UploadResponse;
use crate::AppState;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

impl ApiResponse<()> {
    pub fn error(message: &str) -> Json<Self> {
        Json(Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
        })
    }
}

/// HTTP status for a failed measurement commit
fn error_status(e: &MotionStageError) -> StatusCode {
    match e {
        MotionStageError::Service(_) | MotionStageError::Mesh(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub name: String,
    pub version: String,
    pub phase: ScenePhase,
    pub bvh_file: Option<String>,
    pub mesh_revision: u64,
}

/// Get current status
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let scene = state.get_scene().await;

    ApiResponse::success(StatusResponse {
        name: crate::NAME.to_string(),
        version: crate::VERSION.to_string(),
        phase: scene.phase(),
        bvh_file: scene.bvh_file().map(str::to_string),
        mesh_revision: scene.mesh_revision(),
    })
}

/// Get the current scene
pub async fn get_scene(State(state): State<Arc<AppState>>) -> Json<SceneState> {
    Json(state.get_scene().await)
}

/// Store an uploaded GLB at the fixed mesh path.
///
/// The uploader bumps the mesh revision once it has the path.
pub async fn upload(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match state.store.save(&body).await {
        Ok(path) => Json(UploadResponse::stored(path)).into_response(),
        Err(e) => {
            tracing::error!("Error saving file: {}", e);
            let status = match e {
                StorageError::NotGlb => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(UploadResponse::failed(e.to_string()))).into_response()
        }
    }
}

/// Prompt request
#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    pub text: String,
}

/// Prompt result
#[derive(Debug, Serialize)]
pub struct PromptResponse {
    pub filename: String,
}

/// Send a text prompt to the motion service
pub async fn send_prompt(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PromptRequest>,
) -> Response {
    let text = request.text.trim();
    if text.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            ApiResponse::error("Prompt is empty"),
        )
            .into_response();
    }

    state.update_scene(SceneState::with_prompt_sent).await;

    match state.services.generate_motion(text).await {
        Ok(filename) => {
            tracing::info!("Motion ready: {}", filename);
            state
                .update_scene(|scene| scene.with_motion_received(filename.clone()))
                .await;
            ApiResponse::success(PromptResponse { filename }).into_response()
        }
        Err(e) => {
            tracing::error!("Error: {}", e);
            let message = e.to_string();
            state
                .update_scene(|scene| scene.with_error(message.clone()))
                .await;
            (StatusCode::BAD_GATEWAY, ApiResponse::error(&message)).into_response()
        }
    }
}

/// Mesh result
#[derive(Debug, Serialize)]
pub struct MeshResponse {
    #[serde(rename = "filePath")]
    pub file_path: String,
    pub revision: u64,
}

/// Commit measurements: body shape, GLB export and storage
pub async fn commit_measurements(
    State(state): State<Arc<AppState>>,
    Json(measurements): Json<Measurements>,
) -> Response {
    state
        .update_scene(|scene| scene.with_measurements(measurements))
        .await;

    let result = build_body_mesh(&state, &measurements).await;

    match result {
        Ok(path) => {
            let scene = state
                .update_scene(|scene| scene.with_mesh_ready(path.clone()))
                .await;
            ApiResponse::success(MeshResponse {
                file_path: path,
                revision: scene.mesh_revision(),
            })
            .into_response()
        }
        Err(e) => {
            let message = e.to_string();
            state
                .update_scene(|scene| scene.with_error(message.clone()))
                .await;
            (error_status(&e), ApiResponse::error(&message)).into_response()
        }
    }
}

async fn build_body_mesh(state: &AppState, measurements: &Measurements) -> crate::Result<String> {
    let response = state
        .services
        .calculate_body_shape(measurements)
        .await
        .map_err(|e| {
            tracing::error!("Error: {}", e);
            e
        })?;
    create_and_save_glb(response, &state.store).await
}

/// SSE stream endpoint
pub async fn scene_stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    sse::create_scene_stream(state)
}
