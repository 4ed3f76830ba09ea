use anyhow::{Context, Result};
use glam::{Vec2, Vec3};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};

use crate::camera3d::OrbitCamera;
use crate::channel::{ChannelEvent, ControlCommand, SyncChannel};
use crate::config::{AppConfig, AppConfigOverrides};
use crate::hud::{ConnectionState, HudModel};
use crate::input::{Input, InputAction};
use crate::pool::GeometryPool;
use crate::quality::{QualityController, QualityTier};
use crate::renderer::{LineVertex, MeshDraw, RenderFrameParams, Renderer};
use crate::scene::{RobotManager, SceneEntity, TaskMarkerManager, WarehouseManager};
use crate::snapshot::Snapshot;
use crate::time::Time;
use crate::visibility::VisibilityPass;

#[cfg(feature = "panel")]
mod panel;

#[cfg(feature = "panel")]
use egui_wgpu::{Renderer as EguiRenderer, RendererOptions, ScreenDescriptor};
#[cfg(feature = "panel")]
use egui_winit::State as EguiWinit;

const CAMERA_FOV_RADIANS: f32 = 55.0 * std::f32::consts::PI / 180.0;
const CAMERA_NEAR: f32 = 0.1;
const CAMERA_FAR: f32 = 500.0;
const GRID_COLOR: [f32; 3] = [0.32, 0.34, 0.38];
const PATH_COLOR: [f32; 3] = [0.1, 0.85, 0.3];

pub async fn run() -> Result<()> {
    run_with_overrides(AppConfigOverrides::default()).await
}

pub async fn run_with_overrides(overrides: AppConfigOverrides) -> Result<()> {
    let mut config = AppConfig::load_or_default("config/app.json");
    config.apply_overrides(&overrides);
    let event_loop = EventLoop::new().context("Failed to create winit event loop")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app).context("Event loop execution failed")?;
    Ok(())
}

/// Application root: owns every component and drives the per-frame sequence
/// (input → snapshot drain → animation hook → visibility pass → draw).
pub struct App {
    config: AppConfig,
    renderer: Renderer,
    pool: GeometryPool,
    warehouse: WarehouseManager,
    robot: RobotManager,
    tasks: TaskMarkerManager,
    quality: QualityController,
    visibility: VisibilityPass,
    orbit: OrbitCamera,
    follow_robot: bool,
    grid_visible: bool,
    grid_lines: Vec<LineVertex>,
    channel: Option<SyncChannel>,
    hud: HudModel,
    time: Time,
    input: Input,
    should_close: bool,
    last_title: String,
    fps_smoothed: f32,

    #[cfg(feature = "panel")]
    egui_ctx: egui::Context,
    #[cfg(feature = "panel")]
    egui_winit: Option<EguiWinit>,
    #[cfg(feature = "panel")]
    egui_renderer: Option<EguiRenderer>,
    #[cfg(feature = "panel")]
    egui_screen: Option<ScreenDescriptor>,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let renderer = Renderer::new(&config.window, config.quality.antialiasing);
        let quality = QualityController::new(config.quality.tier, config.quality.shadows, 1.0);
        let visibility = VisibilityPass::new(config.lod.clone());
        let warehouse = WarehouseManager::new(config.caps);
        Self {
            renderer,
            pool: GeometryPool::new(),
            warehouse,
            robot: RobotManager::new(),
            tasks: TaskMarkerManager::new(),
            quality,
            visibility,
            orbit: OrbitCamera::new(Vec3::new(10.0, 0.0, 15.0), 30.0),
            follow_robot: false,
            grid_visible: true,
            grid_lines: Vec::new(),
            channel: None,
            hud: HudModel::default(),
            time: Time::new(),
            input: Input::new(),
            should_close: false,
            last_title: String::new(),
            fps_smoothed: 0.0,
            config,

            #[cfg(feature = "panel")]
            egui_ctx: egui::Context::default(),
            #[cfg(feature = "panel")]
            egui_winit: None,
            #[cfg(feature = "panel")]
            egui_renderer: None,
            #[cfg(feature = "panel")]
            egui_screen: None,
        }
    }

    /// Applies one snapshot in arrival order: warehouse fragment first, then
    /// robot, then tasks. Public so headless scenario tests can drive the
    /// same path the channel does.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        if let Some(warehouse) = &snapshot.warehouse {
            let before = self.warehouse.dimensions();
            self.warehouse.reconcile(warehouse, &mut self.pool);
            if self.warehouse.dimensions() != before {
                if let Some((width, length)) = self.warehouse.dimensions() {
                    self.grid_lines = build_grid(width, length);
                    let center = Vec3::new(width * 0.5, 0.0, length * 0.5);
                    let radius = (width * width + length * length).sqrt() * 0.75;
                    self.orbit.set_home(center, radius);
                    if before.is_none() {
                        self.orbit.reset();
                    }
                }
            }
        }
        if let Some(robot) = &snapshot.robot {
            if !self.robot.is_initialized() {
                self.robot.init(robot.dimensions.unwrap_or_default(), &mut self.pool);
            }
            self.robot.update_transform(robot.position, robot.orientation);
            self.robot.update_status(robot.status);
            self.robot.update_path(&robot.path);
            self.hud.set_battery(robot.battery_percentage);
            self.hud.status = robot.status;
        }
        if let Some(tasks) = &snapshot.tasks {
            self.tasks.reconcile(tasks, &mut self.pool);
            self.hud.tasks_pending = tasks.iter().filter(|task| !task.completed).count();
            self.hud.tasks_completed = tasks.iter().filter(|task| task.completed).count();
        }
        // entities created by this snapshot must match the active view mode
        if self.quality.simplified_view() {
            for entity in self.all_entities_mut() {
                entity.apply_simplified();
            }
        }
    }

    pub fn hud(&self) -> &HudModel {
        &self.hud
    }

    pub fn warehouse(&self) -> &WarehouseManager {
        &self.warehouse
    }

    pub fn robot(&self) -> &RobotManager {
        &self.robot
    }

    pub fn robot_mut(&mut self) -> &mut RobotManager {
        &mut self.robot
    }

    pub fn tasks(&self) -> &TaskMarkerManager {
        &self.tasks
    }

    fn all_entities_mut(&mut self) -> impl Iterator<Item = &mut SceneEntity> {
        self.warehouse
            .entities_mut()
            .chain(self.robot.entities_mut())
            .chain(self.tasks.entities_mut())
    }

    fn set_simplified(&mut self, enabled: bool) {
        let entities = self
            .warehouse
            .entities_mut()
            .chain(self.robot.entities_mut())
            .chain(self.tasks.entities_mut());
        self.quality.set_simplified_view(enabled, entities);
    }

    fn handle_action(&mut self, action: InputAction) {
        match action {
            InputAction::ToggleGrid => self.grid_visible = !self.grid_visible,
            InputAction::TogglePaths => {
                let visible = !self.robot.paths_visible();
                self.robot.set_paths_visible(visible);
            }
            InputAction::TopView => self.orbit.top_view(),
            InputAction::ToggleFollow => self.follow_robot = !self.follow_robot,
            InputAction::ResetCamera => {
                self.follow_robot = false;
                self.orbit.reset();
            }
            InputAction::SetTierLow => self.quality.set_tier(QualityTier::Low),
            InputAction::SetTierBalanced => self.quality.set_tier(QualityTier::Balanced),
            InputAction::SetTierHigh => self.quality.set_tier(QualityTier::High),
            InputAction::ToggleSimplified => {
                let enabled = !self.quality.simplified_view();
                self.set_simplified(enabled);
            }
        }
    }

    fn drain_channel(&mut self) {
        let mut snapshots = Vec::new();
        if let Some(channel) = &self.channel {
            while let Some(event) = channel.poll() {
                match event {
                    ChannelEvent::Connected => {
                        self.hud.connection = ConnectionState::Connected;
                        self.hud.transport_note = None;
                    }
                    ChannelEvent::Disconnected { reason } => {
                        // scene stays frozen as-is; reconnect is the recovery
                        self.hud.connection = ConnectionState::Disconnected;
                        self.hud.transport_note = Some(format!("link lost: {reason}"));
                    }
                    ChannelEvent::Snapshot(snapshot) => snapshots.push(snapshot),
                }
            }
        }
        // applied strictly in arrival order, one by one, never coalesced
        for snapshot in snapshots {
            self.apply_snapshot(*snapshot);
        }
    }

    fn apply_camera_input(&mut self, dt: f32) {
        if self.input.take_double_click() {
            self.follow_robot = false;
            self.orbit.reset();
        }
        let rotate = self.input.rotate_delta();
        if rotate != (0.0, 0.0) {
            self.orbit.orbit(Vec2::new(rotate.0 * 0.008, rotate.1 * 0.008));
        }
        let pan = self.input.pan_delta();
        if pan != (0.0, 0.0) {
            self.follow_robot = false;
            self.orbit.pan(Vec2::new(pan.0, pan.1));
        }
        let zoom = self.input.zoom_factor();
        if (zoom - 1.0).abs() > f32::EPSILON {
            self.orbit.zoom(zoom);
        }
        if self.follow_robot && self.robot.is_initialized() {
            self.orbit.follow(self.robot.rendered_position(), dt);
        }
    }

    fn collect_draws(&self) -> Vec<MeshDraw> {
        let mut draws = Vec::new();
        for entity in self.warehouse.entities() {
            if entity.visible && self.warehouse.category_visible(entity.category) {
                draws.push(mesh_draw(entity));
            }
        }
        for entity in self.robot.entities() {
            if entity.visible {
                draws.push(mesh_draw(entity));
            }
        }
        if self.tasks.category_visible() {
            for entity in self.tasks.entities() {
                if entity.visible {
                    draws.push(mesh_draw(entity));
                }
            }
        }
        draws
    }

    fn collect_lines(&self) -> Vec<LineVertex> {
        let mut lines = Vec::new();
        if self.grid_visible {
            lines.extend_from_slice(&self.grid_lines);
        }
        if let Some(points) = self.robot.path_points() {
            for pair in points.windows(2) {
                lines.push(LineVertex { position: pair[0].to_array(), color: PATH_COLOR });
                lines.push(LineVertex { position: pair[1].to_array(), color: PATH_COLOR });
            }
        }
        lines
    }

    fn scene_bounds(&self) -> (Vec3, f32) {
        match self.warehouse.dimensions() {
            Some((width, length)) => (
                Vec3::new(width * 0.5, 0.0, length * 0.5),
                (width * width + length * length).sqrt() * 0.5 + 2.0,
            ),
            None => (Vec3::new(10.0, 0.0, 15.0), 20.0),
        }
    }

    fn update_title(&mut self) {
        let title = self.hud.title_line();
        if title != self.last_title {
            if let Some(window) = self.renderer.window() {
                window.set_title(&title);
            }
            self.last_title = title;
        }
    }

    fn frame(&mut self) {
        self.time.tick();
        let dt = self.time.delta_seconds();
        if dt > 0.0 {
            let fps = 1.0 / dt.max(1e-4);
            self.fps_smoothed = if self.fps_smoothed == 0.0 {
                fps
            } else {
                self.fps_smoothed * 0.95 + fps * 0.05
            };
        }

        let actions: Vec<InputAction> = self.input.actions.drain(..).collect();
        for action in actions {
            self.handle_action(action);
        }
        self.apply_camera_input(dt);
        self.drain_channel();
        self.robot.animate(dt);

        let camera = self.orbit.to_camera(CAMERA_FOV_RADIANS, CAMERA_NEAR, CAMERA_FAR);
        let view_proj = camera.view_projection(self.renderer.size());
        self.visibility.run(camera.position, &view_proj, self.warehouse.entities_mut());

        let draws = self.collect_draws();
        let lines = self.collect_lines();
        let (scene_center, scene_radius) = self.scene_bounds();

        if self.quality.take_shadow_refresh() {
            log::debug!(
                "[quality] tier={} shadows={:?} scale={:.2}",
                self.quality.tier().label(),
                self.quality.shadow_resolution(),
                self.quality.render_scale()
            );
        }

        let params = RenderFrameParams {
            camera: &camera,
            draws: &draws,
            lines: &lines,
            scene_center,
            scene_radius,
            shadow_resolution: self.quality.shadow_resolution(),
            render_scale: self.quality.render_scale(),
        };
        let frame = match self.renderer.render_frame(&params) {
            Ok(frame) => frame,
            Err(err) => {
                log::error!("[render] {err:?}");
                self.input.clear_frame();
                return;
            }
        };

        self.finish_frame(frame);
        self.update_title();
        if let Some(window) = self.renderer.window() {
            window.request_redraw();
        }
        self.input.clear_frame();
    }

    #[cfg(not(feature = "panel"))]
    fn finish_frame(&mut self, frame: crate::renderer::SurfaceFrame) {
        frame.present();
    }

    #[cfg(feature = "panel")]
    fn finish_frame(&mut self, frame: crate::renderer::SurfaceFrame) {
        if self.egui_winit.is_none() {
            frame.present();
            return;
        }
        let raw_input = {
            let Some(window) = self.renderer.window() else {
                frame.present();
                return;
            };
            self.egui_winit.as_mut().expect("egui state").take_egui_input(window)
        };

        let view = panel::PanelView {
            hud: &self.hud,
            tier: self.quality.tier(),
            shadow_mode: self.quality.shadow_mode(),
            simplified: self.quality.simplified_view(),
            antialiasing: self.config.quality.antialiasing,
            grid_visible: self.grid_visible,
            paths_visible: self.robot.paths_visible(),
            follow_robot: self.follow_robot,
            entity_count: self.warehouse.entities().count()
                + self.robot.entities().count()
                + self.tasks.marker_count(),
            fps: self.fps_smoothed,
        };
        let mut requests = panel::PanelRequests::default();
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            requests = panel::draw(ctx, &view);
        });
        self.apply_panel_requests(requests);

        let egui::FullOutput { platform_output, textures_delta, shapes, .. } = full_output;
        if let Some(window) = self.renderer.window() {
            self.egui_winit.as_mut().expect("egui state").handle_platform_output(window, platform_output);
        }
        if let (Some(painter), Some(screen)) = (self.egui_renderer.as_mut(), self.egui_screen.as_ref()) {
            if let (Ok(device), Ok(queue)) = (self.renderer.device(), self.renderer.queue()) {
                for (id, delta) in &textures_delta.set {
                    painter.update_texture(device, queue, *id, delta);
                }
            }
            let meshes = self.egui_ctx.tessellate(shapes, screen.pixels_per_point);
            if let Err(err) = self.renderer.render_egui(painter, &meshes, screen, frame) {
                log::error!("[panel] egui render error: {err:?}");
            }
            for id in &textures_delta.free {
                painter.free_texture(id);
            }
        } else {
            frame.present();
        }
    }

    #[cfg(feature = "panel")]
    fn apply_panel_requests(&mut self, requests: panel::PanelRequests) {
        if let Some(tier) = requests.tier {
            self.quality.set_tier(tier);
        }
        if let Some(mode) = requests.shadow_mode {
            self.quality.set_shadow_mode(mode);
        }
        if let Some(enabled) = requests.simplified {
            self.set_simplified(enabled);
        }
        if let Some(grid) = requests.grid {
            self.grid_visible = grid;
        }
        if let Some(paths) = requests.paths {
            self.robot.set_paths_visible(paths);
        }
        if let Some(follow) = requests.follow {
            self.follow_robot = follow;
        }
        if requests.reset_camera {
            self.follow_robot = false;
            self.orbit.reset();
        }
        if requests.top_view {
            self.orbit.top_view();
        }
        if let Some(channel) = &self.channel {
            if requests.start_simulation {
                channel.send(ControlCommand::StartSimulation);
            }
            if requests.stop_simulation {
                channel.send(ControlCommand::StopSimulation);
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.renderer.ensure_window(event_loop) {
            // the display surface failing to come up is the one fatal case
            log::error!("[app] display surface init failed: {err:?}");
            self.should_close = true;
            event_loop.exit();
            return;
        }

        // first resume only: later resumes must not clobber user-set quality
        if self.channel.is_none() {
            self.quality = QualityController::new(
                self.config.quality.tier,
                self.config.quality.shadows,
                self.renderer.device_pixel_ratio(),
            );
            if self.config.quality.simplified_view || self.renderer.software_adapter() {
                self.set_simplified(true);
            }
            let delay =
                std::time::Duration::from_secs_f32(self.config.sync.reconnect_delay_secs.max(0.1));
            self.channel = Some(SyncChannel::connect(&self.config.sync.url, delay));
            self.hud.connection = ConnectionState::Connecting;
        }

        #[cfg(feature = "panel")]
        {
            if self.egui_winit.is_none() {
                if let Some(window) = self.renderer.window() {
                    let state = EguiWinit::new(
                        self.egui_ctx.clone(),
                        egui::ViewportId::ROOT,
                        window,
                        Some(window.scale_factor() as f32),
                        window.theme(),
                        None,
                    );
                    self.egui_winit = Some(state);
                }
            }
            match (self.renderer.device(), self.renderer.surface_format()) {
                (Ok(device), Ok(format)) => {
                    self.egui_renderer =
                        Some(EguiRenderer::new(device, format, RendererOptions::default()));
                }
                (Err(err), _) | (_, Err(err)) => {
                    log::warn!("[panel] egui renderer unavailable: {err:?}");
                }
            }
            let size = self.renderer.size();
            self.egui_screen = Some(ScreenDescriptor {
                size_in_pixels: [size.width, size.height],
                pixels_per_point: self.renderer.device_pixel_ratio(),
            });
        }

        if let Some(window) = self.renderer.window() {
            window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        // the panel gets first refusal; shortcuts never fire while it has
        // keyboard focus (e.g. a focused text field)
        #[cfg(feature = "panel")]
        {
            if let (Some(window), Some(state)) = (self.renderer.window(), self.egui_winit.as_mut()) {
                if window_id == window.id() {
                    let response = state.on_window_event(window, &event);
                    if response.consumed {
                        return;
                    }
                }
            }
        }
        #[cfg(not(feature = "panel"))]
        let _ = window_id;

        self.input.handle_window_event(&event);
        match &event {
            WindowEvent::CloseRequested => {
                self.should_close = true;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                self.renderer.resize(*size);
                #[cfg(feature = "panel")]
                if let Some(screen) = &mut self.egui_screen {
                    screen.size_in_pixels = [size.width, size.height];
                }
            }
            WindowEvent::KeyboardInput { event: KeyEvent { logical_key, state, .. }, .. } => {
                if let Key::Named(NamedKey::Escape) = logical_key {
                    if *state == ElementState::Pressed {
                        self.should_close = true;
                        event_loop.exit();
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                if !self.should_close {
                    self.frame();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_close {
            event_loop.exit();
            return;
        }
        if let Some(window) = self.renderer.window() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // teardown order matters: entities drop their geometry handles
        // before the pool releases the shared meshes
        self.tasks.clear();
        self.robot.clear();
        self.warehouse.clear();
        self.pool.release_all();
        self.renderer.release_geometry_cache();
    }
}

fn mesh_draw(entity: &SceneEntity) -> MeshDraw {
    MeshDraw {
        geometry: entity.geometry.clone(),
        model: entity.transform.matrix(),
        material: entity.material.clone(),
        casts_shadows: entity.casts_shadows,
        receives_shadows: entity.receives_shadows,
    }
}

/// One-metre grid over the warehouse floor, drawn just above it.
fn build_grid(width: f32, length: f32) -> Vec<LineVertex> {
    let mut lines = Vec::new();
    let y = 0.012;
    let mut push = |from: [f32; 3], to: [f32; 3]| {
        lines.push(LineVertex { position: from, color: GRID_COLOR });
        lines.push(LineVertex { position: to, color: GRID_COLOR });
    };
    let columns = width.floor() as i32;
    for x in 0..=columns {
        push([x as f32, y, 0.0], [x as f32, y, length]);
    }
    let rows = length.floor() as i32;
    for z in 0..=rows {
        push([0.0, y, z as f32], [width, y, z as f32]);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_covers_both_axes() {
        let lines = build_grid(20.0, 30.0);
        // 21 columns + 31 rows, two vertices each
        assert_eq!(lines.len(), (21 + 31) * 2);
        assert!(lines.iter().all(|v| v.position[1] > 0.0));
    }

    #[test]
    fn scene_bounds_follow_warehouse_dimensions() {
        let mut app = App::new(AppConfig::default());
        let (_, default_radius) = app.scene_bounds();
        assert!(default_radius > 0.0);
        let snapshot = Snapshot::parse(
            r#"{"warehouse": {"width": 20.0, "length": 30.0}}"#,
        )
        .expect("parse");
        app.apply_snapshot(snapshot);
        let (center, radius) = app.scene_bounds();
        assert!((center - Vec3::new(10.0, 0.0, 15.0)).length() < 1e-4);
        assert!(radius > 18.0);
    }

    #[test]
    fn snapshot_drives_hud_and_managers() {
        let mut app = App::new(AppConfig::default());
        let snapshot = Snapshot::parse(
            r#"{
                "robot": {"position": [1.0, 1.0], "orientation": 0.0,
                           "status": "moving", "battery_percentage": 42.0},
                "tasks": [{"type": "pick", "position": [2.0, 2.0], "completed": false},
                          {"type": "place", "position": [3.0, 3.0], "completed": true}]
            }"#,
        )
        .expect("parse");
        app.apply_snapshot(snapshot);
        assert!(app.robot.is_initialized());
        assert_eq!(app.hud.battery_percentage, Some(42.0));
        assert_eq!(app.hud.tasks_pending, 1);
        assert_eq!(app.hud.tasks_completed, 1);
        assert_eq!(app.tasks.marker_count(), 1);
    }
}
