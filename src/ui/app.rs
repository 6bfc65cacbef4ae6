//! Main egui application: chat bar, measurement sliders and the 3D stage.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use eframe::egui;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};

use crate::body::{create_and_save_glb, MeasurementDraft, MeasurementKey, Measurements};
use crate::character::CharacterModel;
use crate::config::{Config, ViewerConfig};
use crate::motion::BvhClip;
use crate::scene::SceneState;
use crate::viewer::{HemisphereLight, OrbitCamera, Stage, StageLoad, StageSync};
use crate::AppState;

use super::renderer::StageRenderer;
use super::viewport;

/// Results of background requests, handed back to the UI thread
enum UiEvent {
    Motion(BvhClip),
    Character(CharacterModel),
}

/// Where the character comes from
enum CharacterSource {
    /// A file on disk
    File(PathBuf),
    /// A served asset such as the generated mesh
    Asset(String),
}

/// The native egui application window.
pub struct MotionStageApp {
    state: Arc<AppState>,
    runtime: Handle,
    /// Broadcast receiver for scene updates (sync-safe via try_recv)
    scene_rx: broadcast::Receiver<SceneState>,
    /// Cached latest scene (updated each frame via try_recv)
    scene: SceneState,
    viewer: ViewerConfig,
    /// Upload through the HTTP endpoint rather than writing in-process
    upload_over_http: bool,
    prompt: String,
    draft: MeasurementDraft,
    stage: Stage,
    /// GPU renderer (created from wgpu render state)
    renderer: Option<Arc<StageRenderer>>,
    render_error: Option<String>,
    camera: OrbitCamera,
    light: HemisphereLight,
    events_tx: mpsc::UnboundedSender<UiEvent>,
    events_rx: mpsc::UnboundedReceiver<UiEvent>,
    sync: StageSync,
    last_frame: Instant,
}

impl MotionStageApp {
    pub fn new(cc: &eframe::CreationContext<'_>, state: Arc<AppState>, runtime: Handle) -> Self {
        // Nothing else holds these locks during startup
        let config = state
            .config
            .try_read()
            .map(|c| c.clone())
            .unwrap_or_else(|_| Config::default());
        let scene = state
            .scene
            .try_read()
            .map(|s| s.clone())
            .unwrap_or_else(|_| SceneState::new(config.measurements.initial));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut app = Self {
            scene_rx: state.subscribe_scene(),
            draft: MeasurementDraft::new(*scene.measurements(), config.measurements.range),
            sync: StageSync::new(&scene, config.viewer.prefer_generated_mesh),
            scene,
            stage: Stage::new(&config.viewer),
            renderer: None,
            render_error: None,
            camera: OrbitCamera::from_config(&config.viewer.camera),
            light: HemisphereLight::default(),
            viewer: config.viewer,
            upload_over_http: config.http.enabled,
            prompt: String::new(),
            events_tx,
            events_rx,
            last_frame: Instant::now(),
            state,
            runtime,
        };

        let source = if app.viewer.prefer_generated_mesh && app.state.store.exists() {
            CharacterSource::File(app.state.store.path())
        } else {
            CharacterSource::File(PathBuf::from(&app.viewer.character_model))
        };
        app.request_character(source);
        app.init_renderer(cc);

        app
    }

    fn init_renderer(&mut self, cc: &eframe::CreationContext<'_>) {
        let Some(render_state) = cc.wgpu_render_state.as_ref() else {
            let message = "wgpu render state not available".to_string();
            tracing::error!("{}", message);
            self.render_error = Some(message);
            return;
        };

        self.renderer = Some(Arc::new(StageRenderer::new(
            &render_state.device,
            &render_state.queue,
            render_state.target_format,
            &self.stage.grid_lines(),
            self.viewer.background,
        )));
    }

    /// Launch the native UI window. Blocks until the window is closed.
    pub fn run(state: Arc<AppState>) -> eframe::Result {
        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("UI needs a tokio runtime: {}", e);
                return Ok(());
            }
        };

        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_title("motionstage")
                .with_inner_size([1024.0, 700.0]),
            renderer: eframe::Renderer::Wgpu,
            ..Default::default()
        };

        eframe::run_native(
            "motionstage",
            options,
            Box::new(move |cc| Ok(Box::new(Self::new(cc, state, runtime)))),
        )
    }

    /// Drain the broadcast channel and cache the latest scene.
    fn update_cached_scene(&mut self) {
        loop {
            match self.scene_rx.try_recv() {
                Ok(scene) => self.scene = scene,
                Err(broadcast::error::TryRecvError::Empty) => break,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::debug!("Scene receiver lagged by {} messages", n);
                }
                Err(broadcast::error::TryRecvError::Closed) => break,
            }
        }
    }

    /// Apply finished background loads to the stage
    fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                UiEvent::Motion(clip) => self.stage.load_motion(clip),
                UiEvent::Character(model) => self.stage.set_character(model),
            }
        }
    }

    /// Start loads for whatever the scene points at that the stage lacks
    fn sync_stage(&mut self) {
        for load in self.sync.poll(&self.scene) {
            match load {
                StageLoad::Motion(file) => self.request_motion(file),
                StageLoad::Character(url) => self.request_character(CharacterSource::Asset(url)),
            }
        }
    }

    fn request_motion(&self, file: String) {
        let state = Arc::clone(&self.state);
        let tx = self.events_tx.clone();
        self.runtime.spawn(async move {
            match fetch_motion(&state, &file).await {
                Ok(clip) => {
                    let _ = tx.send(UiEvent::Motion(clip));
                }
                Err(e) => {
                    tracing::error!("Error loading BVH {}: {}", file, e);
                    let message = e.to_string();
                    state.update_scene(|scene| scene.with_error(message)).await;
                }
            }
        });
    }

    fn request_character(&self, source: CharacterSource) {
        let state = Arc::clone(&self.state);
        let tx = self.events_tx.clone();
        self.runtime.spawn(async move {
            match fetch_character(&state, &source).await {
                Ok(model) => {
                    let _ = tx.send(UiEvent::Character(model));
                }
                Err(e) => {
                    tracing::error!("Error loading character: {}", e);
                    let message = e.to_string();
                    state.update_scene(|scene| scene.with_error(message)).await;
                }
            }
        });
    }

    fn submit_prompt(&mut self) {
        let text = self.prompt.trim().to_string();
        if text.is_empty() {
            return;
        }
        self.prompt.clear();
        // show loading right away; the broadcast catches up
        self.scene = self.scene.clone().with_prompt_sent();

        let state = Arc::clone(&self.state);
        self.runtime.spawn(send_prompt(state, text));
    }

    fn commit_measurement(&mut self, key: MeasurementKey, value: f32) {
        let measurements = self.draft.commit(key, value);
        let state = Arc::clone(&self.state);
        let over_http = self.upload_over_http;
        self.runtime
            .spawn(commit_measurements(state, measurements, over_http));
    }

    fn chat_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let input = ui.add(
                egui::TextEdit::singleline(&mut self.prompt)
                    .hint_text("Type a message...")
                    .desired_width(ui.available_width() - 60.0),
            );
            let entered = input.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if ui.button("Send").clicked() || entered {
                self.submit_prompt();
                input.request_focus();
            }
        });
    }

    fn body_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Body");
        ui.separator();

        let range = self.draft.range();
        for key in MeasurementKey::ALL {
            let mut value = self.draft.pending().get(key);
            ui.label(key.label());
            ui.horizontal(|ui| {
                let slider = ui.add(
                    egui::Slider::new(&mut value, range.min..=range.max)
                        .step_by(range.step as f64)
                        .show_value(false),
                );
                ui.label(format!("{} cm", value));

                if slider.changed() {
                    self.draft.set_pending(key, value);
                }
                // commit on release; clicks and keys change without a drag
                if slider.drag_stopped() || (slider.changed() && !slider.dragged()) {
                    self.commit_measurement(key, value);
                }
            });
        }

        if let Some(err) = self.scene.last_error() {
            ui.separator();
            ui.colored_label(egui::Color32::RED, err);
        }
    }
}

impl eframe::App for MotionStageApp {
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        self.update_cached_scene();
        self.drain_events();
        self.sync_stage();

        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.stage.update(dt);

        // Upload this frame's skinned triangles
        if let (Some(render_state), Some(renderer)) = (frame.wgpu_render_state(), &self.renderer) {
            renderer.update_triangles(
                &render_state.device,
                &render_state.queue,
                self.stage.triangles(),
            );
        }

        egui::TopBottomPanel::bottom("chat").show(ctx, |ui| {
            ui.add_space(4.0);
            self.chat_bar(ui);
            ui.add_space(4.0);
        });

        if self.scene.is_loading() {
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.centered_and_justified(|ui| {
                    ui.heading("Loading...");
                });
            });
        } else {
            egui::SidePanel::left("body")
                .resizable(false)
                .show(ctx, |ui| self.body_panel(ui));

            egui::CentralPanel::default()
                .frame(egui::Frame::none())
                .show(ctx, |ui| match &self.renderer {
                    Some(renderer) => {
                        viewport::draw_stage(ui, renderer, &mut self.camera, &self.light);
                    }
                    None => {
                        ui.heading("Stage");
                        if let Some(ref err) = self.render_error {
                            ui.colored_label(egui::Color32::RED, err);
                        }
                    }
                });
        }

        // Repaint continuously for animation
        ctx.request_repaint();
    }
}

/// Read a served file, preferring the local public directory
async fn read_asset(state: &AppState, url_path: &str) -> crate::Result<Vec<u8>> {
    let local = state.store.asset_path(url_path)?;
    if tokio::fs::try_exists(&local).await.unwrap_or(false) {
        return Ok(tokio::fs::read(&local).await?);
    }
    Ok(state.services.fetch_asset(url_path).await?)
}

async fn fetch_motion(state: &AppState, file: &str) -> crate::Result<BvhClip> {
    let bytes = read_asset(state, file).await?;
    Ok(BvhClip::parse(&String::from_utf8_lossy(&bytes))?)
}

async fn fetch_character(state: &AppState, source: &CharacterSource) -> crate::Result<CharacterModel> {
    let bytes = match source {
        CharacterSource::File(path) => tokio::fs::read(path).await?,
        CharacterSource::Asset(url) => read_asset(state, url).await?,
    };
    Ok(CharacterModel::from_slice(&bytes)?)
}

async fn send_prompt(state: Arc<AppState>, text: String) {
    state.update_scene(SceneState::with_prompt_sent).await;
    match state.services.generate_motion(&text).await {
        Ok(filename) => {
            state
                .update_scene(|scene| scene.with_motion_received(filename))
                .await;
        }
        Err(e) => {
            tracing::error!("Error: {}", e);
            let message = e.to_string();
            state.update_scene(|scene| scene.with_error(message)).await;
        }
    }
}

async fn commit_measurements(state: Arc<AppState>, measurements: Measurements, over_http: bool) {
    state
        .update_scene(|scene| scene.with_measurements(measurements))
        .await;

    match build_body_mesh(&state, &measurements, over_http).await {
        Ok(url) => {
            state.update_scene(|scene| scene.with_mesh_ready(url)).await;
        }
        Err(e) => {
            let message = e.to_string();
            state.update_scene(|scene| scene.with_error(message)).await;
        }
    }
}

async fn build_body_mesh(
    state: &AppState,
    measurements: &Measurements,
    over_http: bool,
) -> crate::Result<String> {
    let response = state
        .services
        .calculate_body_shape(measurements)
        .await
        .map_err(|e| {
            tracing::error!("Error: {}", e);
            e
        })?;

    if over_http {
        create_and_save_glb(response, &state.services).await
    } else {
        create_and_save_glb(response, &state.store).await
    }
}
