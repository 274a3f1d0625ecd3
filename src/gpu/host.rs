//! wgpu implementation of the host renderer capabilities.
//!
//! The embedding renderer owns the device, queue and frame loop; it calls
//! [`WgpuHost::dispatch_frame`] from its GPU-submission thread once per view
//! after compositing the scene. Draw contexts record into their own command
//! encoder and submit on close, which is the enqueue onto the GPU-submission
//! context that chain execution relies on.

use crate::gpu::context::RenderContext;
use crate::gpu::effect::{EffectInstance, EffectTemplate};
use crate::gpu::target::RenderTarget;
use crate::host::{FrameCallback, RenderHost};
use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use wgpu::util::DeviceExt;

/// Vertex for fullscreen quad rendering.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

impl QuadVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Fullscreen quad vertices (two triangles covering NDC).
const QUAD_VERTICES: &[QuadVertex] = &[
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [ 1.0, -1.0], uv: [1.0, 1.0] },
    QuadVertex { position: [ 1.0,  1.0], uv: [1.0, 0.0] },
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [ 1.0,  1.0], uv: [1.0, 0.0] },
    QuadVertex { position: [-1.0,  1.0], uv: [0.0, 0.0] },
];

/// UV-rect scale for the capture blit.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct BlitUniforms {
    scale: [f32; 2],
    _pad: [f32; 2],
}

/// Token for a registered frame hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookHandle(u64);

/// Open draw target: commands are recorded here and submitted on `end_draw`.
pub struct WgpuDrawCtx {
    encoder: wgpu::CommandEncoder,
    target: Arc<RenderTarget>,
}

/// The wgpu-backed render host.
pub struct WgpuHost {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    sampler: wgpu::Sampler,
    quad_vertex_buffer: wgpu::Buffer,
    uniform_layout: wgpu::BindGroupLayout,
    blit_texture_layout: wgpu::BindGroupLayout,
    blit_pipeline: wgpu::RenderPipeline,
    blit_uniform_buffer: wgpu::Buffer,
    blit_uniform_bind_group: wgpu::BindGroup,
    viewport: Mutex<(u32, u32)>,
    hooks: Mutex<HashMap<u64, FrameCallback<WgpuHost>>>,
    next_hook_id: AtomicU64,
}

impl WgpuHost {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Fullscreen Quad Buffer"),
            contents: bytemuck::cast_slice(QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Post-Process Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let blit_texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blit Texture Layout"),
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

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Effect Uniform Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let blit_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader_blit.wgsl").into()),
        });

        let blit_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blit Pipeline Layout"),
            bind_group_layouts: &[&blit_texture_layout, &uniform_layout],
            push_constant_ranges: &[],
        });

        let blit_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Blit Pipeline"),
            layout: Some(&blit_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &blit_shader,
                entry_point: Some("vs_main"),
                buffers: &[QuadVertex::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &blit_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let blit_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Blit Uniform Buffer"),
            size: std::mem::size_of::<BlitUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let blit_uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blit Uniform Bind Group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: blit_uniform_buffer.as_entire_binding(),
            }],
        });

        Self {
            device,
            queue,
            format,
            sampler,
            quad_vertex_buffer,
            uniform_layout,
            blit_texture_layout,
            blit_pipeline,
            blit_uniform_buffer,
            blit_uniform_bind_group,
            viewport: Mutex::new((1, 1)),
            hooks: Mutex::new(HashMap::new()),
            next_hook_id: AtomicU64::new(1),
        }
    }

    pub fn from_context(context: RenderContext) -> Self {
        Self::new(context.device, context.queue, context.format)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Allocate a render target compatible with this host.
    pub fn create_target(&self, width: u32, height: u32, label: &str) -> Arc<RenderTarget> {
        Arc::new(RenderTarget::new(
            &self.device,
            self.format,
            width,
            height,
            label,
        ))
    }

    /// The embedding renderer reports the logical size of the active view
    /// here (on resize, not per frame).
    pub fn set_viewport_size(&self, width: u32, height: u32) {
        *self.viewport.lock().unwrap() = (width, height);
    }

    /// Invoke every registered frame hook with the composited scene color.
    ///
    /// Must be called from the GPU-submission thread after scene composition;
    /// the handle is only promised valid for the duration of the dispatch.
    pub fn dispatch_frame(&self, scene: Option<&Arc<RenderTarget>>) {
        let mut hooks = self.hooks.lock().unwrap();
        for callback in hooks.values_mut() {
            callback(scene);
        }
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.lock().unwrap().len()
    }
}

impl RenderHost for WgpuHost {
    type Surface = Arc<RenderTarget>;
    type SceneColor = Arc<RenderTarget>;
    type Template = Arc<EffectTemplate>;
    type Instance = EffectInstance;
    type DrawCtx = WgpuDrawCtx;
    type HookHandle = HookHandle;

    fn surface_size(&self, surface: &Self::Surface) -> (u32, u32) {
        surface.size()
    }

    fn scene_color_size(&self, scene: &Self::SceneColor) -> (u32, u32) {
        scene.size()
    }

    fn viewport_size(&self) -> (u32, u32) {
        *self.viewport.lock().unwrap()
    }

    fn create_instance(&self, template: &Self::Template) -> Self::Instance {
        log::debug!("compiling effect instance '{}'", template.label());
        EffectInstance::create(
            &self.device,
            self.format,
            &self.uniform_layout,
            QuadVertex::desc(),
            template,
        )
    }

    fn bind_surface(&self, instance: &mut Self::Instance, name: &str, surface: &Self::Surface) {
        instance.bind(name, surface.clone());
    }

    fn draw_scaled_quad(&self, scene: &Self::SceneColor, dest: &Self::Surface, scale: Vec2) {
        let uniforms = BlitUniforms {
            scale: scale.to_array(),
            _pad: [0.0; 2],
        };
        self.queue
            .write_buffer(&self.blit_uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blit Bind Group"),
            layout: &self.blit_texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(scene.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Capture Blit Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Capture Blit Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: dest.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(&self.blit_pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.set_bind_group(1, &self.blit_uniform_bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
            render_pass.draw(0..6, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
    }

    fn begin_draw(&self, dest: &Self::Surface) -> Self::DrawCtx {
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Effect Draw Encoder"),
            });
        WgpuDrawCtx {
            encoder,
            target: dest.clone(),
        }
    }

    fn draw_effect(&self, ctx: &mut Self::DrawCtx, instance: &Self::Instance) {
        let template = instance.template();

        // Every declared texture must be bound before the pass can run.
        let mut views = Vec::with_capacity(template.texture_bindings().len());
        for name in template.texture_bindings() {
            match instance.bound_surface(name) {
                Some(surface) => views.push(surface.view()),
                None => {
                    log::debug!(
                        "effect '{}' missing bound surface '{}'; skipping draw",
                        template.label(),
                        name
                    );
                    return;
                }
            }
        }

        let params = instance.packed_params();
        if !params.is_empty() {
            self.queue
                .write_buffer(instance.uniform_buffer(), 0, &params);
        }

        let mut entries: Vec<wgpu::BindGroupEntry> = views
            .iter()
            .enumerate()
            .map(|(i, view)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: views.len() as u32,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        });
        let texture_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("Effect Texture Bind Group: {}", template.label())),
            layout: instance.texture_layout(),
            entries: &entries,
        });

        let target_view = ctx.target.view();
        let mut render_pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&format!("Effect Pass: {}", template.label())),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_pipeline(instance.pipeline());
        render_pass.set_bind_group(0, &texture_bind_group, &[]);
        render_pass.set_bind_group(1, instance.uniform_bind_group(), &[]);
        render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
        render_pass.draw(0..6, 0..1);
    }

    fn end_draw(&self, ctx: Self::DrawCtx) {
        self.queue.submit(Some(ctx.encoder.finish()));
    }

    fn register_frame_hook(&self, callback: FrameCallback<Self>) -> Self::HookHandle {
        let id = self.next_hook_id.fetch_add(1, Ordering::Relaxed);
        self.hooks.lock().unwrap().insert(id, callback);
        HookHandle(id)
    }

    fn deregister_frame_hook(&self, handle: Self::HookHandle) {
        self.hooks.lock().unwrap().remove(&handle.0);
    }
}
