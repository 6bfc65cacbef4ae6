//! egui-wgpu `CallbackTrait` implementation for the stage viewport.
//!
//! `prepare()` renders the stage offscreen with depth testing, `paint()` blits
//! the result into the egui render pass. Drag orbits, scroll zooms.

use std::sync::Arc;

use eframe::egui::{self, Color32, Sense, Ui, Vec2};
use eframe::{egui_wgpu, wgpu};

use super::renderer::{StageRenderer, Uniforms};
use crate::viewer::{HemisphereLight, OrbitCamera};

const ORBIT_SPEED: f32 = 0.008;

/// Paint callback that blits the stage's offscreen texture into the egui render pass.
pub struct StageViewportCallback {
    pub renderer: Arc<StageRenderer>,
    pub uniforms: Uniforms,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl egui_wgpu::CallbackTrait for StageViewportCallback {
    fn prepare(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        _screen_descriptor: &egui_wgpu::ScreenDescriptor,
        _egui_encoder: &mut wgpu::CommandEncoder,
        _callback_resources: &mut egui_wgpu::CallbackResources,
    ) -> Vec<wgpu::CommandBuffer> {
        self.renderer
            .resize(device, self.viewport_width, self.viewport_height);
        vec![self
            .renderer
            .render_offscreen(device, queue, &self.uniforms)]
    }

    fn paint(
        &self,
        _info: egui::PaintCallbackInfo,
        render_pass: &mut wgpu::RenderPass<'static>,
        _callback_resources: &egui_wgpu::CallbackResources,
    ) {
        self.renderer.blit(render_pass);
    }
}

/// Draw the stage filling the available space.
pub fn draw_stage(
    ui: &mut Ui,
    renderer: &Arc<StageRenderer>,
    cam: &mut OrbitCamera,
    light: &HemisphereLight,
) -> egui::Response {
    let (rect, resp) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());

    if resp.dragged() {
        let d = resp.drag_delta();
        cam.orbit(-d.x * ORBIT_SPEED, d.y * ORBIT_SPEED);
    }
    if resp.hovered() {
        let s = ui.input(|i| i.smooth_scroll_delta.y);
        if s != 0.0 {
            cam.zoom(s);
        }
    }

    let aspect = rect.width() / rect.height().max(1.0);
    let uniforms = Uniforms::new(cam.view_proj(aspect), cam.eye(), light);

    let ppp = ui.ctx().pixels_per_point();
    ui.painter().add(egui_wgpu::Callback::new_paint_callback(
        rect,
        StageViewportCallback {
            renderer: Arc::clone(renderer),
            uniforms,
            viewport_width: ((rect.width() * ppp) as u32).max(1),
            viewport_height: ((rect.height() * ppp) as u32).max(1),
        },
    ));

    ui.painter().text(
        rect.min + Vec2::new(8.0, 6.0),
        egui::Align2::LEFT_TOP,
        "Drag: orbit   Scroll: zoom",
        egui::FontId::proportional(11.0),
        Color32::from_rgba_premultiplied(60, 60, 60, 160),
    );

    resp
}
