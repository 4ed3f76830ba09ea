use anyhow::{Context, Result};
use glam::{Mat4, Vec3};

use crate::mesh::MeshVertex;

use super::mesh_pass::{instance_layout, InstanceData};
use super::DEPTH_FORMAT;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ShadowFrame {
    light_view_proj: [[f32; 4]; 4],
}

/// Depth-only pass from the directional light's point of view. A single map
/// fitted to the warehouse bounds; resolution follows the quality controller.
#[derive(Default)]
pub(super) struct ShadowPass {
    pipeline: Option<wgpu::RenderPipeline>,
    frame_buffer: Option<wgpu::Buffer>,
    frame_bind_group: Option<wgpu::BindGroup>,
    map_view: Option<wgpu::TextureView>,
    sampler: Option<wgpu::Sampler>,
    sample_bind_group: Option<wgpu::BindGroup>,
    resolution: u32,
    instance_buffer: Option<wgpu::Buffer>,
    instance_capacity: usize,
}

impl ShadowPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// (Re)creates the map at `resolution` and the bind group the mesh pass
    /// samples it through. With shadows disabled a 1x1 placeholder keeps the
    /// bind group valid while the strength uniform zeroes the contribution.
    pub fn ensure_resources(
        &mut self,
        device: &wgpu::Device,
        sample_layout: &wgpu::BindGroupLayout,
        resolution: u32,
    ) -> Result<()> {
        let resolution = resolution.max(1);
        if self.resolution == resolution && self.map_view.is_some() {
            return Ok(());
        }
        self.resolution = resolution;

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Shadow Map"),
            size: wgpu::Extent3d { width: resolution, height: resolution, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let map_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        if self.sampler.is_none() {
            self.sampler = Some(device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("Shadow Sampler"),
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                compare: Some(wgpu::CompareFunction::LessEqual),
                ..Default::default()
            }));
        }
        let sampler = self.sampler.as_ref().context("Shadow sampler missing")?;
        self.sample_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shadow Sample BG"),
            layout: sample_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&map_view),
                },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(sampler) },
            ],
        }));
        self.map_view = Some(map_view);
        Ok(())
    }

    pub fn ensure_pipeline(&mut self, device: &wgpu::Device) -> Result<()> {
        if self.pipeline.is_some() {
            return Ok(());
        }
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Shadow Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/shadow.wgsl").into()),
        });
        let frame_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Shadow Frame BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Shadow Frame Buffer"),
            size: std::mem::size_of::<ShadowFrame>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shadow Frame BG"),
            layout: &frame_bgl,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: frame_buffer.as_entire_binding() }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shadow Pipeline Layout"),
            bind_group_layouts: &[&frame_bgl],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Shadow Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[MeshVertex::layout(), instance_layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: None,
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
                bias: wgpu::DepthBiasState { constant: 2, slope_scale: 2.0, clamp: 0.0 },
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        self.pipeline = Some(pipeline);
        self.frame_buffer = Some(frame_buffer);
        self.frame_bind_group = Some(frame_bind_group);
        Ok(())
    }

    pub fn write_frame(&self, queue: &wgpu::Queue, light_view_proj: Mat4) -> Result<()> {
        let buffer = self.frame_buffer.as_ref().context("Shadow frame buffer missing")?;
        let frame = ShadowFrame { light_view_proj: light_view_proj.to_cols_array_2d() };
        queue.write_buffer(buffer, 0, bytemuck::bytes_of(&frame));
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
                label: Some("Shadow Instance Buffer"),
                size: (capacity * std::mem::size_of::<InstanceData>()) as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
            self.instance_capacity = capacity;
        }
        let buffer = self.instance_buffer.as_ref().context("Shadow instance buffer missing")?;
        queue.write_buffer(buffer, 0, bytemuck::cast_slice(instances));
        Ok(())
    }

    pub fn pipeline(&self) -> Result<&wgpu::RenderPipeline> {
        self.pipeline.as_ref().context("Shadow pipeline not initialized")
    }

    pub fn frame_bind_group(&self) -> Result<&wgpu::BindGroup> {
        self.frame_bind_group.as_ref().context("Shadow frame bind group missing")
    }

    pub fn instance_buffer(&self) -> Result<&wgpu::Buffer> {
        self.instance_buffer.as_ref().context("Shadow instance buffer missing")
    }

    pub fn map_view(&self) -> Result<&wgpu::TextureView> {
        self.map_view.as_ref().context("Shadow map missing")
    }

    pub fn sample_bind_group(&self) -> Result<&wgpu::BindGroup> {
        self.sample_bind_group.as_ref().context("Shadow sample bind group missing")
    }
}

/// Orthographic light projection fitted around the scene bounds.
pub(super) fn light_view_proj(sun_direction: Vec3, center: Vec3, radius: f32) -> Mat4 {
    let radius = radius.max(1.0);
    let direction = sun_direction.normalize_or_zero();
    let direction =
        if direction.length_squared() < 1e-4 { Vec3::new(0.4, 0.8, 0.35).normalize() } else { direction };
    let eye = center + direction * radius * 2.0;
    let up = if direction.abs_diff_eq(Vec3::Y, 1e-3) { Vec3::Z } else { Vec3::Y };
    let view = Mat4::look_at_rh(eye, center, up);
    let proj = Mat4::orthographic_rh(-radius, radius, -radius, radius, 0.1, radius * 4.0);
    proj * view
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_matrix_is_finite_for_degenerate_direction() {
        let matrix = light_view_proj(Vec3::ZERO, Vec3::new(10.0, 0.0, 15.0), 25.0);
        assert!(!matrix.to_cols_array().iter().any(|v| v.is_nan() || v.is_infinite()));
    }

    #[test]
    fn scene_center_projects_inside_the_map() {
        let center = Vec3::new(10.0, 0.0, 15.0);
        let matrix = light_view_proj(Vec3::new(0.4, 0.8, 0.35), center, 20.0);
        let clip = matrix * center.extend(1.0);
        let ndc = clip / clip.w;
        assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0);
        assert!(ndc.z >= 0.0 && ndc.z <= 1.0);
    }
}
