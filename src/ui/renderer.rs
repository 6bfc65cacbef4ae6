//! wgpu rendering pipeline for the stage.
//!
//! Draws the skinned triangles and the ground grid into an offscreen colour
//! target with a depth buffer, then blits the result into egui's render pass.
//! Geometry arrives already skinned and in world space from [`Stage`].
//!
//! [`Stage`]: crate::viewer::Stage

use std::sync::{Mutex, MutexGuard, PoisonError};

use bytemuck::{Pod, Zeroable};
use eframe::wgpu;
use glam::{Mat4, Vec3};

use crate::viewer::{rgb_to_linear, HemisphereLight, Triangle};

/// Holds sRGB-encoded values written by the shader
const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const GRID_COLOR: u32 = 0x888888;
const INITIAL_VERTICES: u64 = 4096;

/// Vertex layout matching `stage.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    /// Zero for unlit geometry
    pub normal: [f32; 3],
    /// Linear RGBA
    pub color: [f32; 4],
}

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x4];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Uniform buffer layout matching `stage.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Uniforms {
    pub view_proj: [[f32; 4]; 4],
    pub eye: [f32; 4],
    /// Linear sky colour, intensity in `w`
    pub sky: [f32; 4],
    pub ground: [f32; 4],
}

impl Uniforms {
    pub fn new(view_proj: Mat4, eye: Vec3, light: &HemisphereLight) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            eye: eye.extend(1.0).to_array(),
            sky: light.sky.extend(light.intensity).to_array(),
            ground: light.ground.extend(0.0).to_array(),
        }
    }
}

/// Three vertices per triangle, each carrying the face normal
pub fn triangle_vertices(triangles: &[Triangle]) -> Vec<Vertex> {
    triangles
        .iter()
        .flat_map(|tri| {
            let normal = tri.normal.to_array();
            tri.positions.map(|p| Vertex {
                position: p.to_array(),
                normal,
                color: tri.color,
            })
        })
        .collect()
}

/// Two unlit vertices per grid line
pub fn line_vertices(lines: &[[Vec3; 2]]) -> Vec<Vertex> {
    let color = rgb_to_linear(GRID_COLOR).extend(1.0).to_array();
    lines
        .iter()
        .flat_map(|segment| {
            segment.map(|p| Vertex {
                position: p.to_array(),
                normal: [0.0; 3],
                color,
            })
        })
        .collect()
}

/// 0xRRGGBB as a clear colour. The target stores sRGB values, so no conversion.
pub fn clear_color(rgb: u32) -> wgpu::Color {
    let channel = |shift: u32| ((rgb >> shift) & 0xff) as f64 / 255.0;
    wgpu::Color {
        r: channel(16),
        g: channel(8),
        b: channel(0),
        a: 1.0,
    }
}

/// Vertex buffer that grows to fit whatever is written to it.
struct VertexBuffer {
    label: &'static str,
    buffer: wgpu::Buffer,
    capacity: u64,
    count: u32,
}

impl VertexBuffer {
    fn new(device: &wgpu::Device, label: &'static str) -> Self {
        let capacity = INITIAL_VERTICES * std::mem::size_of::<Vertex>() as u64;
        Self {
            label,
            buffer: create_vertex_buffer(device, label, capacity),
            capacity,
            count: 0,
        }
    }

    fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, vertices: &[Vertex]) {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let needed = bytes.len() as u64;
        if needed > self.capacity {
            self.capacity = needed.next_power_of_two();
            self.buffer = create_vertex_buffer(device, self.label, self.capacity);
        }
        if !bytes.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytes);
        }
        self.count = vertices.len() as u32;
    }

    fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        if self.count == 0 {
            return;
        }
        pass.set_vertex_buffer(0, self.buffer.slice(..));
        pass.draw(0..self.count, 0..1);
    }
}

/// Current stage geometry on the GPU.
struct Geometry {
    triangles: VertexBuffer,
    lines: VertexBuffer,
}

/// Mutable offscreen state behind a Mutex for resize support.
struct OffscreenState {
    _color_texture: wgpu::Texture,
    color_view: wgpu::TextureView,
    _depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,
    blit_bind_group: wgpu::BindGroup,
    size: [u32; 2],
}

/// The stage renderer. Holds all GPU resources for offscreen rendering.
pub struct StageRenderer {
    triangle_pipeline: wgpu::RenderPipeline,
    line_pipeline: wgpu::RenderPipeline,
    blit_pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    scene_bind_group: wgpu::BindGroup,
    blit_bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    geometry: Mutex<Geometry>,
    offscreen: Mutex<OffscreenState>,
    background: wgpu::Color,
}

impl StageRenderer {
    /// Create the pipelines and upload the static grid.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target_format: wgpu::TextureFormat,
        grid: &[[Vec3; 2]],
        background: u32,
    ) -> Self {
        let scene_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("stage_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("stage.wgsl").into()),
        });
        let blit_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("stage_blit_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("blit.wgsl").into()),
        });

        let scene_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("stage_scene_bgl"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let scene_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("stage_scene_pl"),
                bind_group_layouts: &[&scene_bind_group_layout],
                push_constant_ranges: &[],
            });

        let triangle_pipeline = scene_pipeline(
            device,
            &scene_pipeline_layout,
            &scene_shader,
            wgpu::PrimitiveTopology::TriangleList,
            "stage_triangle_pipeline",
        );
        let line_pipeline = scene_pipeline(
            device,
            &scene_pipeline_layout,
            &scene_shader,
            wgpu::PrimitiveTopology::LineList,
            "stage_line_pipeline",
        );

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("stage_uniforms"),
            size: std::mem::size_of::<Uniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let scene_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("stage_scene_bg"),
            layout: &scene_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        // Blit bind group layout (texture + sampler)
        let blit_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("stage_blit_bgl"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let blit_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("stage_blit_pl"),
                bind_group_layouts: &[&blit_bind_group_layout],
                push_constant_ranges: &[],
            });

        let blit_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("stage_blit_pipeline"),
            layout: Some(&blit_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &blit_shader,
                entry_point: Some("vs_blit"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &blit_shader,
                entry_point: Some("fs_blit"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("stage_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let offscreen = create_offscreen(device, &blit_bind_group_layout, &sampler, 1, 1);

        let mut geometry = Geometry {
            triangles: VertexBuffer::new(device, "stage_triangles"),
            lines: VertexBuffer::new(device, "stage_grid"),
        };
        geometry.lines.write(device, queue, &line_vertices(grid));

        Self {
            triangle_pipeline,
            line_pipeline,
            blit_pipeline,
            uniform_buffer,
            scene_bind_group,
            blit_bind_group_layout,
            sampler,
            geometry: Mutex::new(geometry),
            offscreen: Mutex::new(offscreen),
            background: clear_color(background),
        }
    }

    /// Replace the triangles with this frame's skinned output.
    pub fn update_triangles(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        triangles: &[Triangle],
    ) {
        lock(&self.geometry)
            .triangles
            .write(device, queue, &triangle_vertices(triangles));
    }

    /// Resize the offscreen render target if the viewport size changed.
    pub fn resize(&self, device: &wgpu::Device, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        let mut state = lock(&self.offscreen);
        if state.size == [width, height] {
            return;
        }
        *state = create_offscreen(
            device,
            &self.blit_bind_group_layout,
            &self.sampler,
            width,
            height,
        );
    }

    /// Render the stage offscreen. Call this in `prepare()`.
    pub fn render_offscreen(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        uniforms: &Uniforms,
    ) -> wgpu::CommandBuffer {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));

        let state = lock(&self.offscreen);
        let geometry = lock(&self.geometry);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("stage_offscreen_encoder"),
        });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("stage_offscreen_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &state.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.background),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &state.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            pass.set_bind_group(0, &self.scene_bind_group, &[]);

            pass.set_pipeline(&self.line_pipeline);
            geometry.lines.draw(&mut pass);

            pass.set_pipeline(&self.triangle_pipeline);
            geometry.triangles.draw(&mut pass);
        }

        encoder.finish()
    }

    /// Blit the offscreen texture to the current render pass. Call this in `paint()`.
    pub fn blit(&self, render_pass: &mut wgpu::RenderPass<'static>) {
        let state = lock(&self.offscreen);
        render_pass.set_pipeline(&self.blit_pipeline);
        render_pass.set_bind_group(0, &state.blit_bind_group, &[]);
        drop(state);
        render_pass.draw(0..3, 0..1); // fullscreen triangle
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn scene_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    topology: wgpu::PrimitiveTopology,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[Vertex::layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: OFFSCREEN_FORMAT,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None, // generated meshes have no guaranteed winding
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: Default::default(),
        multiview: None,
        cache: None,
    })
}

fn create_vertex_buffer(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_offscreen(
    device: &wgpu::Device,
    blit_layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    width: u32,
    height: u32,
) -> OffscreenState {
    let (color_texture, color_view) = create_texture(
        device,
        "stage_offscreen_color",
        width,
        height,
        OFFSCREEN_FORMAT,
        wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
    );
    let (depth_texture, depth_view) = create_texture(
        device,
        "stage_offscreen_depth",
        width,
        height,
        DEPTH_FORMAT,
        wgpu::TextureUsages::RENDER_ATTACHMENT,
    );

    let blit_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("stage_blit_bg"),
        layout: blit_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&color_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });

    OffscreenState {
        _color_texture: color_texture,
        color_view,
        _depth_texture: depth_texture,
        depth_view,
        blit_bind_group,
        size: [width, height],
    }
}

fn create_texture(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&Default::default());
    (texture, view)
}
