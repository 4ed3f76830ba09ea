use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use anyhow::{Context, Result};
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;

use crate::camera3d::Camera3D;
use crate::config::WindowConfig;
use crate::material::Material;
use crate::pool::{GeometryHandle, GeometryId};

mod line_pass;
mod mesh_pass;
mod shadow_pass;
mod window_surface;

pub use line_pass::LineVertex;
pub use window_surface::{SurfaceFrame, WindowSurface};

use line_pass::LinePass;
use mesh_pass::{FrameData, InstanceData, MeshPass};
use shadow_pass::{light_view_proj, ShadowPass};

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const SCENE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const CLEAR_COLOR: wgpu::Color = wgpu::Color { r: 0.05, g: 0.06, b: 0.1, a: 1.0 };

/// One visible entity instance handed to the renderer for this frame.
pub struct MeshDraw {
    pub geometry: GeometryHandle,
    pub model: Mat4,
    pub material: Arc<Material>,
    pub casts_shadows: bool,
    pub receives_shadows: bool,
}

/// Fixed light rig: ambient, one shadow-casting sun and one fill light.
#[derive(Clone, Debug)]
pub struct SceneLighting {
    pub sun_direction: Vec3,
    pub sun_color: Vec3,
    pub fill_direction: Vec3,
    pub fill_color: Vec3,
    pub ambient: Vec3,
}

impl Default for SceneLighting {
    fn default() -> Self {
        Self {
            sun_direction: Vec3::new(0.4, 0.8, 0.35).normalize(),
            sun_color: Vec3::new(1.05, 0.98, 0.92),
            fill_direction: Vec3::new(-0.5, 0.4, -0.3).normalize(),
            fill_color: Vec3::new(0.18, 0.2, 0.24),
            ambient: Vec3::new(0.22, 0.22, 0.24),
        }
    }
}

pub struct RenderFrameParams<'a> {
    pub camera: &'a Camera3D,
    pub draws: &'a [MeshDraw],
    pub lines: &'a [LineVertex],
    pub scene_center: Vec3,
    pub scene_radius: f32,
    /// `None` disables the shadow pass entirely.
    pub shadow_resolution: Option<u32>,
    /// Offscreen target scale relative to the window (pixel-ratio cap).
    pub render_scale: f32,
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

struct SceneTarget {
    color_view: wgpu::TextureView,
    resolve_view: Option<wgpu::TextureView>,
    sample_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    size: (u32, u32),
}

#[derive(Default)]
struct BlitPass {
    pipeline: Option<wgpu::RenderPipeline>,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
    sampler: Option<wgpu::Sampler>,
    bind_group: Option<wgpu::BindGroup>,
}

/// Owns the GPU surface, the render passes and the per-geometry GPU cache.
/// Everything scene-shaped comes in through `RenderFrameParams`; the managers
/// never talk to wgpu directly.
pub struct Renderer {
    surface: WindowSurface,
    mesh_pass: MeshPass,
    shadow_pass: ShadowPass,
    line_pass: LinePass,
    blit: BlitPass,
    scene_target: Option<SceneTarget>,
    gpu_meshes: HashMap<GeometryId, GpuMesh>,
    lighting: SceneLighting,
    sample_count: u32,
}

impl Renderer {
    pub fn new(window_cfg: &WindowConfig, antialiasing: bool) -> Self {
        Self {
            surface: WindowSurface::new(window_cfg),
            mesh_pass: MeshPass::new(),
            shadow_pass: ShadowPass::new(),
            line_pass: LinePass::new(),
            blit: BlitPass::default(),
            scene_target: None,
            gpu_meshes: HashMap::new(),
            lighting: SceneLighting::default(),
            // fixed at startup: flipping MSAA means rebuilding every pipeline
            sample_count: if antialiasing { 4 } else { 1 },
        }
    }

    pub fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        self.surface.ensure_window(event_loop)
    }

    pub fn window(&self) -> Option<&winit::window::Window> {
        self.surface.window()
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.surface.size()
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.surface.aspect_ratio()
    }

    pub fn device_pixel_ratio(&self) -> f32 {
        self.surface.device_pixel_ratio()
    }

    pub fn software_adapter(&self) -> bool {
        self.surface.software_adapter()
    }

    pub fn device(&self) -> Result<&wgpu::Device> {
        self.surface.device()
    }

    pub fn queue(&self) -> Result<&wgpu::Queue> {
        self.surface.queue()
    }

    pub fn surface_format(&self) -> Result<wgpu::TextureFormat> {
        self.surface.surface_format()
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.surface.resize(new_size);
        self.scene_target = None;
        self.blit.bind_group = None;
    }

    pub fn lighting(&self) -> &SceneLighting {
        &self.lighting
    }

    /// Frees the per-geometry GPU cache; only valid alongside the pool's own
    /// `release_all` at teardown.
    pub fn release_geometry_cache(&mut self) {
        self.gpu_meshes.clear();
    }

    pub fn render_frame(&mut self, params: &RenderFrameParams<'_>) -> Result<SurfaceFrame> {
        let device = self.surface.device()?.clone();
        let queue = self.surface.queue()?.clone();
        let surface_format = self.surface.surface_format()?;

        self.mesh_pass.ensure_pipeline(&device, SCENE_FORMAT, self.sample_count)?;
        self.line_pass.ensure_pipeline(&device, SCENE_FORMAT, self.sample_count)?;
        self.shadow_pass.ensure_pipeline(&device)?;
        self.ensure_blit_pipeline(&device, surface_format)?;

        let shadow_resolution = params.shadow_resolution.unwrap_or(1);
        if self.shadow_pass.resolution() != shadow_resolution {
            let layout = self.mesh_pass.shadow_bind_group_layout()?;
            self.shadow_pass.ensure_resources(&device, layout, shadow_resolution)?;
        } else if self.shadow_pass.sample_bind_group().is_err() {
            let layout = self.mesh_pass.shadow_bind_group_layout()?;
            self.shadow_pass.ensure_resources(&device, layout, shadow_resolution)?;
        }

        self.ensure_scene_target(&device, params.render_scale)?;

        for draw in params.draws {
            self.ensure_gpu_mesh(&device, &draw.geometry);
        }

        let (instances, batches) = build_batches(params.draws.iter());
        self.mesh_pass.upload_instances(&device, &queue, &instances)?;

        let shadows_on = params.shadow_resolution.is_some();
        let (caster_instances, caster_batches) =
            build_batches(params.draws.iter().filter(|d| shadows_on && d.casts_shadows));
        self.shadow_pass.upload_instances(&device, &queue, &caster_instances)?;

        let view_proj = params.camera.view_projection(self.surface.size());
        let shadow_matrix =
            light_view_proj(self.lighting.sun_direction, params.scene_center, params.scene_radius);
        self.shadow_pass.write_frame(&queue, shadow_matrix)?;

        let shadow_strength = if shadows_on { 1.0 } else { 0.0 };
        let frame_data = FrameData {
            view_proj: view_proj.to_cols_array_2d(),
            shadow_view_proj: shadow_matrix.to_cols_array_2d(),
            camera_pos: params.camera.position.extend(1.0).to_array(),
            sun_dir: self.lighting.sun_direction.extend(shadow_strength).to_array(),
            sun_color: self.lighting.sun_color.extend(1.0).to_array(),
            fill_dir: self.lighting.fill_direction.extend(0.0).to_array(),
            fill_color: self.lighting.fill_color.extend(1.0).to_array(),
            ambient: self
                .lighting
                .ambient
                .extend(1.0 / self.shadow_pass.resolution().max(1) as f32)
                .to_array(),
        };
        self.mesh_pass.write_frame(&queue, &frame_data)?;
        self.line_pass.upload(&device, &queue, view_proj, params.lines)?;

        let frame = self.surface.acquire_surface_frame()?;
        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Encoder") });

        if shadows_on {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Shadow Pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: self.shadow_pass.map_view()?,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            if !caster_batches.is_empty() {
                pass.set_pipeline(self.shadow_pass.pipeline()?);
                pass.set_bind_group(0, self.shadow_pass.frame_bind_group()?, &[]);
                pass.set_vertex_buffer(1, self.shadow_pass.instance_buffer()?.slice(..));
                for (geometry, range) in &caster_batches {
                    let mesh = self
                        .gpu_meshes
                        .get(&geometry.id)
                        .context("caster geometry missing from GPU cache")?;
                    pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                    pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..mesh.index_count, 0, range.clone());
                }
            }
        }

        {
            let target = self.scene_target.as_ref().context("Scene target missing")?;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color_view,
                    depth_slice: None,
                    resolve_target: target.resolve_view.as_ref(),
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            if !batches.is_empty() {
                pass.set_pipeline(self.mesh_pass.pipeline()?);
                pass.set_bind_group(0, self.mesh_pass.frame_bind_group()?, &[]);
                pass.set_bind_group(1, self.shadow_pass.sample_bind_group()?, &[]);
                pass.set_vertex_buffer(1, self.mesh_pass.instance_buffer()?.slice(..));
                for (geometry, range) in &batches {
                    let mesh = self
                        .gpu_meshes
                        .get(&geometry.id)
                        .context("geometry missing from GPU cache")?;
                    pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                    pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..mesh.index_count, 0, range.clone());
                }
            }
            self.line_pass.draw(&mut pass)?;
        }

        self.ensure_blit_bind_group(&device)?;
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Blit Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: frame.view(),
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(self.blit.pipeline.as_ref().context("Blit pipeline missing")?);
            pass.set_bind_group(0, self.blit.bind_group.as_ref().context("Blit bind group missing")?, &[]);
            pass.draw(0..3, 0..1);
        }

        queue.submit(std::iter::once(encoder.finish()));
        Ok(frame)
    }

    #[cfg(feature = "panel")]
    pub fn render_egui(
        &mut self,
        painter: &mut egui_wgpu::Renderer,
        paint_jobs: &[egui::ClippedPrimitive],
        screen: &egui_wgpu::ScreenDescriptor,
        frame: SurfaceFrame,
    ) -> Result<()> {
        let device = self.surface.device()?.clone();
        let queue = self.surface.queue()?.clone();
        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Egui Encoder") });
        let mut extra_cmd = painter.update_buffers(&device, &queue, &mut encoder, paint_jobs, screen);
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Egui Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: frame.view(),
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            let pass = unsafe {
                std::mem::transmute::<&mut wgpu::RenderPass<'_>, &mut wgpu::RenderPass<'static>>(&mut pass)
            };
            painter.render(pass, paint_jobs, screen);
        }
        extra_cmd.push(encoder.finish());
        queue.submit(extra_cmd.into_iter());
        frame.present();
        Ok(())
    }

    fn ensure_gpu_mesh(&mut self, device: &wgpu::Device, geometry: &GeometryHandle) {
        self.gpu_meshes.entry(geometry.id).or_insert_with(|| {
            let mesh = &geometry.mesh;
            let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh VB"),
                contents: bytemuck::cast_slice(&mesh.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh IB"),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
            GpuMesh { vertex_buffer, index_buffer, index_count: mesh.indices.len() as u32 }
        });
    }

    fn ensure_scene_target(&mut self, device: &wgpu::Device, render_scale: f32) -> Result<()> {
        let surface_size = self.surface.size();
        let scale = render_scale.clamp(0.25, 1.0);
        let width = ((surface_size.width as f32 * scale).round() as u32).max(1);
        let height = ((surface_size.height as f32 * scale).round() as u32).max(1);
        if let Some(target) = &self.scene_target {
            if target.size == (width, height) {
                return Ok(());
            }
        }

        let extent = wgpu::Extent3d { width, height, depth_or_array_layers: 1 };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Scene Color"),
            size: extent,
            mip_level_count: 1,
            sample_count: self.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: SCENE_FORMAT,
            usage: if self.sample_count > 1 {
                wgpu::TextureUsages::RENDER_ATTACHMENT
            } else {
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING
            },
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());

        let (resolve_view, sample_view) = if self.sample_count > 1 {
            let resolve = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Scene Resolve"),
                size: extent,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: SCENE_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            });
            let view = resolve.create_view(&wgpu::TextureViewDescriptor::default());
            let sample = resolve.create_view(&wgpu::TextureViewDescriptor::default());
            (Some(view), sample)
        } else {
            (None, color.create_view(&wgpu::TextureViewDescriptor::default()))
        };

        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Scene Depth"),
            size: extent,
            mip_level_count: 1,
            sample_count: self.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

        self.scene_target =
            Some(SceneTarget { color_view, resolve_view, sample_view, depth_view, size: (width, height) });
        self.blit.bind_group = None;
        Ok(())
    }

    fn ensure_blit_pipeline(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat) -> Result<()> {
        if self.blit.pipeline.is_some() {
            return Ok(());
        }
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../assets/shaders/blit.wgsl").into()),
        });
        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blit BGL"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
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
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Blit Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blit Pipeline Layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Blit Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        self.blit.pipeline = Some(pipeline);
        self.blit.bind_group_layout = Some(bgl);
        self.blit.sampler = Some(sampler);
        Ok(())
    }

    fn ensure_blit_bind_group(&mut self, device: &wgpu::Device) -> Result<()> {
        if self.blit.bind_group.is_some() {
            return Ok(());
        }
        let target = self.scene_target.as_ref().context("Scene target missing")?;
        let bgl = self.blit.bind_group_layout.as_ref().context("Blit layout missing")?;
        let sampler = self.blit.sampler.as_ref().context("Blit sampler missing")?;
        self.blit.bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blit BG"),
            layout: bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&target.sample_view),
                },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(sampler) },
            ],
        }));
        Ok(())
    }
}

/// Groups draws by pooled geometry so each shared mesh binds once and draws
/// all of its instances in a single call.
fn build_batches<'a>(
    draws: impl Iterator<Item = &'a MeshDraw>,
) -> (Vec<InstanceData>, Vec<(GeometryHandle, Range<u32>)>) {
    let mut ordered: Vec<&MeshDraw> = draws.collect();
    ordered.sort_by_key(|draw| draw.geometry.id);

    let mut instances = Vec::with_capacity(ordered.len());
    let mut batches: Vec<(GeometryHandle, Range<u32>)> = Vec::new();
    for draw in ordered {
        let material = draw.material.as_ref();
        instances.push(InstanceData {
            model: draw.model.to_cols_array_2d(),
            color: material.base_color,
            emissive: [material.emissive[0], material.emissive[1], material.emissive[2], 0.0],
            params: [
                if material.unlit { 1.0 } else { 0.0 },
                if draw.receives_shadows { 1.0 } else { 0.0 },
                material.roughness,
                material.metallic,
            ],
        });
        let index = instances.len() as u32;
        match batches.last_mut() {
            Some((geometry, range)) if geometry.id == draw.geometry.id => range.end = index,
            _ => batches.push((draw.geometry.clone(), index - 1..index)),
        }
    }
    (instances, batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{GeometryPool, ShapeKind};

    fn draw(geometry: GeometryHandle) -> MeshDraw {
        MeshDraw {
            geometry,
            model: Mat4::IDENTITY,
            material: Arc::new(Material::lit([0.5, 0.5, 0.5, 1.0])),
            casts_shadows: false,
            receives_shadows: true,
        }
    }

    #[test]
    fn batches_group_shared_geometry() {
        let mut pool = GeometryPool::new();
        let cube = pool.get_shared(ShapeKind::Cuboid, [1.0, 1.0, 1.0]);
        let disc = pool.get_shared(ShapeKind::Disc, [0.4, 0.0, 0.0]);
        let draws =
            vec![draw(cube.clone()), draw(disc.clone()), draw(cube.clone()), draw(cube.clone())];
        let (instances, batches) = build_batches(draws.iter());
        assert_eq!(instances.len(), 4);
        assert_eq!(batches.len(), 2);
        let total: u32 = batches.iter().map(|(_, range)| range.end - range.start).sum();
        assert_eq!(total, 4);
        let cube_batch =
            batches.iter().find(|(geometry, _)| geometry.id == cube.id).expect("cube batch");
        assert_eq!(cube_batch.1.end - cube_batch.1.start, 3);
    }

    #[test]
    fn unlit_material_sets_instance_flag() {
        let mut pool = GeometryPool::new();
        let cube = pool.get_shared(ShapeKind::Cuboid, [1.0, 1.0, 1.0]);
        let mut unlit_draw = draw(cube);
        unlit_draw.material = unlit_draw.material.flat_copy();
        let (instances, _) = build_batches(std::iter::once(&unlit_draw));
        assert_eq!(instances[0].params[0], 1.0);
    }
}
