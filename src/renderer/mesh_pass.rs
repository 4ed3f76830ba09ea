use anyhow::{Context, Result};

use crate::mesh::MeshVertex;

use super::DEPTH_FORMAT;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub(super) struct FrameData {
    pub view_proj: [[f32; 4]; 4],
    pub shadow_view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
    pub sun_dir: [f32; 4],
    pub sun_color: [f32; 4],
    pub fill_dir: [f32; 4],
    pub fill_color: [f32; 4],
    pub ambient: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub(super) struct InstanceData {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
    pub emissive: [f32; 4],
    pub params: [f32; 4],
}

pub(super) fn instance_layout<'a>() -> wgpu::VertexBufferLayout<'a> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<InstanceData>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &[
            wgpu::VertexAttribute { shader_location: 2, format: wgpu::VertexFormat::Float32x4, offset: 0 },
            wgpu::VertexAttribute {
                shader_location: 3,
                format: wgpu::VertexFormat::Float32x4,
                offset: 16,
            },
            wgpu::VertexAttribute {
                shader_location: 4,
                format: wgpu::VertexFormat::Float32x4,
                offset: 32,
            },
            wgpu::VertexAttribute {
                shader_location: 5,
                format: wgpu::VertexFormat::Float32x4,
                offset: 48,
            },
            wgpu::VertexAttribute {
                shader_location: 6,
                format: wgpu::VertexFormat::Float32x4,
                offset: 64,
            },
            wgpu::VertexAttribute {
                shader_location: 7,
                format: wgpu::VertexFormat::Float32x4,
                offset: 80,
            },
            wgpu::VertexAttribute {
                shader_location: 8,
                format: wgpu::VertexFormat::Float32x4,
                offset: 96,
            },
        ],
    }
}

/// Forward pass over the visible entity instances, lit by the two
/// directional lights plus ambient and sampling the shadow map.
#[derive(Default)]
pub(super) struct MeshPass {
    pipeline: Option<wgpu::RenderPipeline>,
    frame_buffer: Option<wgpu::Buffer>,
    frame_bind_group: Option<wgpu::BindGroup>,
    shadow_bgl: Option<wgpu::BindGroupLayout>,
    instance_buffer: Option<wgpu::Buffer>,
    instance_capacity: usize,
}

impl MeshPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_pipeline(
        &mut self,
        device: &wgpu::Device,
        target_format: wgpu::TextureFormat,
        sample_count: u32,
    ) -> Result<()> {
        if self.pipeline.is_some() {
            return Ok(());
        }
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/scene.wgsl").into()),
        });

        let frame_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Frame BGL"),
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
        let shadow_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Shadow Sample BGL"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Depth,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });

        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Scene Frame Buffer"),
            size: std::mem::size_of::<FrameData>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Frame BG"),
            layout: &frame_bgl,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: frame_buffer.as_entire_binding() }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&frame_bgl, &shadow_bgl],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Scene Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[MeshVertex::layout(), instance_layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: sample_count,
                ..Default::default()
            },
            multiview: None,
            cache: None,
        });

        self.pipeline = Some(pipeline);
        self.frame_buffer = Some(frame_buffer);
        self.frame_bind_group = Some(frame_bind_group);
        self.shadow_bgl = Some(shadow_bgl);
        Ok(())
    }

    pub fn shadow_bind_group_layout(&self) -> Result<&wgpu::BindGroupLayout> {
        self.shadow_bgl.as_ref().context("Mesh pipeline not initialized")
    }

    pub fn write_frame(&self, queue: &wgpu::Queue, frame: &FrameData) -> Result<()> {
        let buffer = self.frame_buffer.as_ref().context("Frame buffer missing")?;
        queue.write_buffer(buffer, 0, bytemuck::bytes_of(frame));
        Ok(())
    }

    pub fn upload_instances(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        instances: &[InstanceData],
    ) -> Result<()> {
        if instances.is_empty() {
            return Ok(());
        }
        if self.instance_capacity < instances.len() {
            let mut capacity = self.instance_capacity.max(128);
            while capacity < instances.len() {
                capacity *= 2;
            }
            self.instance_buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Scene Instance Buffer"),
                size: (capacity * std::mem::size_of::<InstanceData>()) as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
            self.instance_capacity = capacity;
        }
        let buffer = self.instance_buffer.as_ref().context("Instance buffer missing")?;
        queue.write_buffer(buffer, 0, bytemuck::cast_slice(instances));
        Ok(())
    }

    pub fn pipeline(&self) -> Result<&wgpu::RenderPipeline> {
        self.pipeline.as_ref().context("Mesh pipeline not initialized")
    }

    pub fn frame_bind_group(&self) -> Result<&wgpu::BindGroup> {
        self.frame_bind_group.as_ref().context("Frame bind group missing")
    }

    pub fn instance_buffer(&self) -> Result<&wgpu::Buffer> {
        self.instance_buffer.as_ref().context("Instance buffer missing")
    }
}
