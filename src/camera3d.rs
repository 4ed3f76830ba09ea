use glam::{Mat4, Quat, Vec2, Vec3};
use winit::dpi::PhysicalSize;

const DEFAULT_UP: Vec3 = Vec3::Y;
const MIN_PITCH: f32 = -std::f32::consts::FRAC_PI_2 + 0.01;
const MAX_PITCH: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// Perspective camera derived from the orbit controller each frame.
#[derive(Debug, Clone)]
pub struct Camera3D {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera3D {
    pub fn new(position: Vec3, target: Vec3, fov_y_radians: f32, near: f32, far: f32) -> Self {
        Self { position, target, up: DEFAULT_UP, fov_y_radians, near, far }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_radians, aspect.max(0.0001), self.near, self.far)
    }

    pub fn view_projection(&self, viewport: PhysicalSize<u32>) -> Mat4 {
        let aspect =
            if viewport.height > 0 { viewport.width as f32 / viewport.height as f32 } else { 1.0 };
        self.projection_matrix(aspect) * self.view_matrix()
    }
}

/// Orbit controller: yaw/pitch/radius around a target, with panning and the
/// viewer presets (reset, top view, follow).
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub radius: f32,
    pub yaw_radians: f32,
    pub pitch_radians: f32,
    home_target: Vec3,
    home_radius: f32,
    home_yaw: f32,
    home_pitch: f32,
}

impl OrbitCamera {
    pub fn new(target: Vec3, radius: f32) -> Self {
        let mut camera = Self {
            target,
            radius: radius.max(0.5),
            yaw_radians: std::f32::consts::FRAC_PI_4,
            pitch_radians: -0.9,
            home_target: target,
            home_radius: radius.max(0.5),
            home_yaw: 0.0,
            home_pitch: 0.0,
        };
        camera.home_yaw = camera.yaw_radians;
        camera.home_pitch = camera.pitch_radians;
        camera
    }

    /// Re-anchors the home pose; used once the warehouse dimensions arrive.
    pub fn set_home(&mut self, target: Vec3, radius: f32) {
        self.home_target = target;
        self.home_radius = radius.max(0.5);
    }

    pub fn to_camera(&self, fov_y_radians: f32, near: f32, far: f32) -> Camera3D {
        let rotation = Quat::from_euler(glam::EulerRot::YXZ, self.yaw_radians, self.pitch_radians, 0.0);
        let offset = rotation * Vec3::new(0.0, 0.0, self.radius);
        Camera3D::new(self.target + offset, self.target, fov_y_radians, near, far)
    }

    pub fn orbit(&mut self, delta: Vec2) {
        self.yaw_radians += delta.x;
        self.pitch_radians = (self.pitch_radians + delta.y).clamp(MIN_PITCH, MAX_PITCH);
    }

    /// Moves the target in the camera's horizontal plane.
    pub fn pan(&mut self, delta: Vec2) {
        let rotation = Quat::from_rotation_y(self.yaw_radians);
        let right = rotation * Vec3::X;
        let forward = rotation * Vec3::new(0.0, 0.0, -1.0);
        let speed = self.radius * 0.002;
        self.target += right * (-delta.x * speed) + forward * (delta.y * speed);
    }

    pub fn zoom(&mut self, factor: f32) {
        self.radius = (self.radius * factor).clamp(1.0, 500.0);
    }

    pub fn reset(&mut self) {
        self.target = self.home_target;
        self.radius = self.home_radius;
        self.yaw_radians = self.home_yaw;
        self.pitch_radians = self.home_pitch;
    }

    /// Straight-down view over the current target.
    pub fn top_view(&mut self) {
        self.pitch_radians = MIN_PITCH;
        self.yaw_radians = 0.0;
    }

    /// Eases the orbit target toward a followed position.
    pub fn follow(&mut self, position: Vec3, dt: f32) {
        let blend = (dt * 5.0).clamp(0.0, 1.0);
        self.target = self.target.lerp(position, blend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera3d_view_projection_is_finite() {
        let camera =
            Camera3D::new(Vec3::new(0.0, 10.0, 20.0), Vec3::ZERO, 55.0_f32.to_radians(), 0.1, 500.0);
        let vp = camera.view_projection(PhysicalSize::new(1280, 720));
        assert!(!vp.to_cols_array().iter().any(|v| v.is_nan() || v.is_infinite()));
    }

    #[test]
    fn reset_returns_to_home_pose() {
        let mut orbit = OrbitCamera::new(Vec3::new(10.0, 0.0, 15.0), 30.0);
        orbit.orbit(Vec2::new(1.0, 0.3));
        orbit.pan(Vec2::new(120.0, -40.0));
        orbit.zoom(0.5);
        orbit.reset();
        assert!((orbit.target - Vec3::new(10.0, 0.0, 15.0)).length() < 1e-6);
        assert!((orbit.radius - 30.0).abs() < 1e-6);
    }

    #[test]
    fn top_view_pins_pitch() {
        let mut orbit = OrbitCamera::new(Vec3::ZERO, 20.0);
        orbit.top_view();
        let camera = orbit.to_camera(55.0_f32.to_radians(), 0.1, 500.0);
        // camera sits almost directly above the target
        let offset = camera.position - camera.target;
        assert!(offset.y > offset.x.abs().max(offset.z.abs()) * 10.0);
    }

    #[test]
    fn follow_converges_on_target() {
        let mut orbit = OrbitCamera::new(Vec3::ZERO, 20.0);
        let goal = Vec3::new(5.0, 0.0, 5.0);
        for _ in 0..200 {
            orbit.follow(goal, 0.016);
        }
        assert!((orbit.target - goal).length() < 0.05);
    }
}
