//! HTTP client for the motion, body-shape and upload endpoints

use std::time::Duration;

use super::{MotionRequest, MotionResponse, UploadResponse};
use crate::body::measurements::Measurements;
use crate::body::mesh::BodyShapeResponse;
use crate::body::GlbSink;
use crate::config::ServicesConfig;
use crate::error::ServiceError;

/// Talks to the external services. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    config: ServicesConfig,
}

impl ServiceClient {
    pub fn new(config: &ServicesConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::Request {
                url: String::new(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    /// Send a text prompt; returns the generated BVH filename
    pub async fn generate_motion(&self, prompt: &str) -> Result<String, ServiceError> {
        let url = &self.config.motion_url;
        tracing::info!("Requesting motion for prompt: {:?}", prompt);

        let response = self
            .http
            .post(url)
            .json(&MotionRequest {
                text_prompt: prompt.to_string(),
            })
            .send()
            .await
            .map_err(|e| request_error(url, e))?;
        let body: MotionResponse = decode(url, response).await?;

        body.filename.ok_or_else(|| ServiceError::MissingField {
            url: url.clone(),
            field: "filename",
        })
    }

    /// Send measurements; returns the raw mesh arrays
    pub async fn calculate_body_shape(
        &self,
        measurements: &Measurements,
    ) -> Result<BodyShapeResponse, ServiceError> {
        let url = &self.config.body_shape_url;
        tracing::debug!("Requesting body shape for {:?}", measurements);

        let response = self
            .http
            .post(url)
            .json(measurements)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;
        decode(url, response).await
    }

    /// Upload GLB bytes; returns the path the file is served at
    pub async fn upload_glb(&self, bytes: Vec<u8>) -> Result<String, ServiceError> {
        let url = &self.config.upload_url;
        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        // failures still carry a JSON body explaining why
        let status = response.status();
        let body = response.bytes().await.map_err(|e| request_error(url, e))?;
        let parsed: UploadResponse = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(ServiceError::Status {
                    url: url.clone(),
                    status: status.as_u16(),
                })
            }
            Err(e) => {
                return Err(ServiceError::Decode {
                    url: url.clone(),
                    message: e.to_string(),
                })
            }
        };

        if !parsed.success {
            return Err(ServiceError::Rejected(
                parsed.error.unwrap_or_else(|| format!("HTTP {}", status)),
            ));
        }
        parsed.file_path.ok_or_else(|| ServiceError::MissingField {
            url: url.clone(),
            field: "filePath",
        })
    }

    /// GET a file relative to the asset base URL
    pub async fn fetch_asset(&self, path: &str) -> Result<Vec<u8>, ServiceError> {
        let url = asset_url(&self.config.asset_base_url, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error(&url, e))?;

        if !response.status().is_success() {
            return Err(ServiceError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| request_error(&url, e))?;
        Ok(bytes.to_vec())
    }
}

impl GlbSink for ServiceClient {
    async fn store(&self, bytes: Vec<u8>) -> crate::error::Result<String> {
        Ok(self.upload_glb(bytes).await?)
    }
}

fn asset_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn request_error(url: &str, e: reqwest::Error) -> ServiceError {
    ServiceError::Request {
        url: url.to_string(),
        message: e.to_string(),
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    url: &str,
    response: reqwest::Response,
) -> Result<T, ServiceError> {
    if !response.status().is_success() {
        return Err(ServiceError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }
    response.json().await.map_err(|e| ServiceError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    /// Serve `router` on an ephemeral local port and return its base URL
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client_for(base: &str) -> ServiceClient {
        let config = ServicesConfig {
            motion_url: format!("{}/generate-motion", base),
            body_shape_url: format!("{}/calculate-anthrobetas/", base),
            upload_url: format!("{}/api/upload", base),
            asset_base_url: base.to_string(),
            timeout_secs: 5,
        };
        ServiceClient::new(&config).unwrap()
    }

    #[test]
    fn test_asset_url_joins_slashes() {
        assert_eq!(
            asset_url("http://localhost:3000/", "/walk.bvh"),
            "http://localhost:3000/walk.bvh"
        );
        assert_eq!(
            asset_url("http://localhost:3000", "mesh/mesh.glb"),
            "http://localhost:3000/mesh/mesh.glb"
        );
    }

    #[tokio::test]
    async fn test_generate_motion_sends_text_prompt() {
        let router = Router::new().route(
            "/generate-motion",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body, json!({ "text_prompt": "a person waves" }));
                Json(json!({ "filename": "wave.bvh" }))
            }),
        );
        let client = client_for(&serve(router).await);
        assert_eq!(
            client.generate_motion("a person waves").await.unwrap(),
            "wave.bvh"
        );
    }

    #[tokio::test]
    async fn test_generate_motion_missing_filename() {
        let router = Router::new().route(
            "/generate-motion",
            post(|| async { Json(json!({ "status": "ok" })) }),
        );
        let client = client_for(&serve(router).await);
        assert!(matches!(
            client.generate_motion("jump").await,
            Err(ServiceError::MissingField {
                field: "filename",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_generate_motion_http_error() {
        let router = Router::new().route(
            "/generate-motion",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let client = client_for(&serve(router).await);
        assert!(matches!(
            client.generate_motion("jump").await,
            Err(ServiceError::Status { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let client = client_for("http://127.0.0.1:9");
        assert!(matches!(
            client.generate_motion("jump").await,
            Err(ServiceError::Request { .. })
        ));
    }

    #[tokio::test]
    async fn test_calculate_body_shape_posts_measurements() {
        let router = Router::new().route(
            "/calculate-anthrobetas/",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["waist"], 85.0);
                Json(json!({ "vertices": [[0.0, 0.0, 0.0]], "faces": [] }))
            }),
        );
        let client = client_for(&serve(router).await);
        let shape = client
            .calculate_body_shape(&Measurements::default())
            .await
            .unwrap();
        assert_eq!(shape.vertices.unwrap().len(), 1);
        assert!(shape.joints.is_none());
    }

    #[tokio::test]
    async fn test_upload_success_and_rejection() {
        let router = Router::new().route(
            "/api/upload",
            post(|body: axum::body::Bytes| async move {
                if body.starts_with(b"glTF") {
                    (
                        StatusCode::OK,
                        Json(json!({ "success": true, "filePath": "/mesh/mesh.glb" })),
                    )
                } else {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "success": false, "error": "not a GLB" })),
                    )
                }
            }),
        );
        let client = client_for(&serve(router).await);

        let mut glb = b"glTF".to_vec();
        glb.extend_from_slice(&[0; 8]);
        assert_eq!(client.upload_glb(glb).await.unwrap(), "/mesh/mesh.glb");

        match client.upload_glb(b"nope".to_vec()).await {
            Err(ServiceError::Rejected(msg)) => assert_eq!(msg, "not a GLB"),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_asset() {
        let router = Router::new().route("/walk.bvh", get(|| async { "HIERARCHY" }));
        let client = client_for(&serve(router).await);
        assert_eq!(client.fetch_asset("walk.bvh").await.unwrap(), b"HIERARCHY");
        assert!(matches!(
            client.fetch_asset("missing.bvh").await,
            Err(ServiceError::Status { status: 404, .. })
        ));
    }
}
