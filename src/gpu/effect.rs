//! Effect templates and parameterized instances.
//!
//! A template is a WGSL shader plus its declared texture bindings and
//! parameter defaults. Creating an instance compiles the render pipeline and
//! allocates the uniform buffer — the expensive step the chain's dirty
//! discipline keeps off the per-frame path. Instances then carry mutable
//! parameter values and named surface bindings.

use crate::gpu::target::RenderTarget;
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum size for an instance's packed parameter block (in bytes).
pub const MAX_PARAM_BLOCK_SIZE: u64 = 128;

/// Runtime value of an effect parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

impl ParamValue {
    /// Bytes for uniform upload.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ParamValue::Float(v) => bytemuck::cast_slice(&[*v]).to_vec(),
            ParamValue::Vec2(v) => bytemuck::cast_slice(v).to_vec(),
            ParamValue::Vec3(v) => bytemuck::cast_slice(v).to_vec(),
            ParamValue::Vec4(v) => bytemuck::cast_slice(v).to_vec(),
        }
    }
}

/// Shader definition an instance is created from.
///
/// The WGSL must define `vs_main`/`fs_main`, take its textures (in declared
/// binding order) plus a sampler at `@group(0)` and, if it has parameters, a
/// uniform block at `@group(1) @binding(0)` matching the declared parameter
/// order with 16-byte-aligned packing.
pub struct EffectTemplate {
    label: String,
    source: String,
    texture_bindings: Vec<String>,
    defaults: Vec<(String, ParamValue)>,
}

impl EffectTemplate {
    pub fn new(label: impl Into<String>, wgsl: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            source: wgsl.into(),
            texture_bindings: vec!["source".to_string()],
            defaults: Vec::new(),
        }
    }

    /// Replace the declared texture bindings (default: a single `source`).
    pub fn with_texture_bindings(mut self, names: &[&str]) -> Self {
        self.texture_bindings = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Declare a parameter and its default. Declaration order is upload
    /// order.
    pub fn with_param(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.defaults.push((name.into(), value));
        self
    }

    /// Pass the source surface through unchanged.
    pub fn copy() -> Arc<Self> {
        Arc::new(Self::new("copy", include_str!("shader_copy.wgsl")))
    }

    /// Multiply the source by a color.
    pub fn tint() -> Arc<Self> {
        Arc::new(
            Self::new("tint", include_str!("shader_tint.wgsl"))
                .with_param("tint", ParamValue::Vec4([1.0, 1.0, 1.0, 1.0])),
        )
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn texture_bindings(&self) -> &[String] {
        &self.texture_bindings
    }

    pub fn defaults(&self) -> &[(String, ParamValue)] {
        &self.defaults
    }
}

/// A parameterized instance bound to a template.
///
/// Owns the compiled pipeline and uniform resources; parameter edits and
/// surface bindings are cheap and do not require a rebuild.
pub struct EffectInstance {
    template: Arc<EffectTemplate>,
    pipeline: wgpu::RenderPipeline,
    texture_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    params: Vec<(String, ParamValue)>,
    bound: HashMap<String, Arc<RenderTarget>>,
}

impl EffectInstance {
    pub(crate) fn create(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        uniform_layout: &wgpu::BindGroupLayout,
        quad_layout: wgpu::VertexBufferLayout<'_>,
        template: &Arc<EffectTemplate>,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("Effect Shader: {}", template.label())),
            source: wgpu::ShaderSource::Wgsl(template.source().into()),
        });

        // One group holding every declared texture, sampler last.
        let texture_count = template.texture_bindings().len() as u32;
        let mut entries: Vec<wgpu::BindGroupLayoutEntry> = (0..texture_count)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            })
            .collect();
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: texture_count,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("Effect Texture Layout: {}", template.label())),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("Effect Pipeline Layout: {}", template.label())),
            bind_group_layouts: &[&texture_layout, uniform_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("Effect Pipeline: {}", template.label())),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[quad_layout],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
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

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("Effect Params: {}", template.label())),
            size: MAX_PARAM_BLOCK_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("Effect Param Bind Group: {}", template.label())),
            layout: uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        Self {
            params: template.defaults().to_vec(),
            template: template.clone(),
            pipeline,
            texture_layout,
            uniform_buffer,
            uniform_bind_group,
            bound: HashMap::new(),
        }
    }

    pub fn template(&self) -> &Arc<EffectTemplate> {
        &self.template
    }

    pub(crate) fn pipeline(&self) -> &wgpu::RenderPipeline {
        &self.pipeline
    }

    pub(crate) fn texture_layout(&self) -> &wgpu::BindGroupLayout {
        &self.texture_layout
    }

    pub(crate) fn uniform_buffer(&self) -> &wgpu::Buffer {
        &self.uniform_buffer
    }

    pub(crate) fn uniform_bind_group(&self) -> &wgpu::BindGroup {
        &self.uniform_bind_group
    }

    /// Set a declared parameter. Unknown names are ignored with a log, so a
    /// misconfigured effect cannot fault the frame.
    pub fn set_param(&mut self, name: &str, value: ParamValue) {
        match self.params.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => log::warn!(
                "effect '{}' has no parameter '{}'",
                self.template.label(),
                name
            ),
        }
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub(crate) fn bind(&mut self, name: &str, surface: Arc<RenderTarget>) {
        self.bound.insert(name.to_string(), surface);
    }

    pub(crate) fn bound_surface(&self, name: &str) -> Option<&Arc<RenderTarget>> {
        self.bound.get(name)
    }

    /// Parameter block in declaration order, padded to 16-byte alignment.
    pub(crate) fn packed_params(&self) -> Vec<u8> {
        let mut data = Vec::new();
        for (_, value) in &self.params {
            data.extend(value.to_bytes());
        }
        while data.len() % 16 != 0 {
            data.push(0);
        }
        if data.len() as u64 > MAX_PARAM_BLOCK_SIZE {
            log::warn!(
                "effect '{}' parameter block exceeds {} bytes; truncating",
                self.template.label(),
                MAX_PARAM_BLOCK_SIZE
            );
            data.truncate(MAX_PARAM_BLOCK_SIZE as usize);
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_packing_is_16_byte_aligned() {
        let template = Arc::new(
            EffectTemplate::new("fx", "")
                .with_param("strength", ParamValue::Float(0.5))
                .with_param("center", ParamValue::Vec2([0.25, 0.75])),
        );
        // Pack without an instance: same path the instance uses.
        let mut data = Vec::new();
        for (_, value) in template.defaults() {
            data.extend(value.to_bytes());
        }
        while data.len() % 16 != 0 {
            data.push(0);
        }
        assert_eq!(data.len(), 16);
        assert_eq!(&data[0..4], bytemuck::cast_slice::<f32, u8>(&[0.5f32]));
        assert_eq!(
            &data[4..12],
            bytemuck::cast_slice::<f32, u8>(&[0.25f32, 0.75f32])
        );
    }

    #[test]
    fn test_param_value_bytes() {
        assert_eq!(ParamValue::Float(1.0).to_bytes().len(), 4);
        assert_eq!(ParamValue::Vec2([0.0; 2]).to_bytes().len(), 8);
        assert_eq!(ParamValue::Vec3([0.0; 3]).to_bytes().len(), 12);
        assert_eq!(ParamValue::Vec4([0.0; 4]).to_bytes().len(), 16);
    }

    #[test]
    fn test_template_declares_defaults_in_order() {
        let template = EffectTemplate::new("fx", "wgsl here")
            .with_param("a", ParamValue::Float(1.0))
            .with_param("b", ParamValue::Float(2.0));
        let names: Vec<&str> = template.defaults().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(template.texture_bindings(), ["source"]);
    }

    #[test]
    fn test_builtin_templates() {
        let copy = EffectTemplate::copy();
        assert!(copy.defaults().is_empty());
        assert!(copy.source().contains("fs_main"));

        let tint = EffectTemplate::tint();
        assert_eq!(
            tint.defaults()[0].1,
            ParamValue::Vec4([1.0, 1.0, 1.0, 1.0])
        );
    }
}
