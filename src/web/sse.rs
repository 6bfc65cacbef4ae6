//! Server-Sent Events for real-time scene updates

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::scene::SceneState;
use crate::AppState;

/// Create an SSE stream of scene changes
pub fn create_scene_stream(
    app_state: Arc<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = app_state.subscribe_scene();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(scene) => Some(Ok(scene_to_event(&scene))),
        Err(_) => None, // Skip lagged messages
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Convert scene state to an SSE event
fn scene_to_event(scene: &SceneState) -> Event {
    let data = serde_json::json!({
        "phase": scene.phase(),
        "scene": scene,
    });

    Event::default().event("scene").data(data.to_string())
}
