use glam::{Quat, Vec3};

use crate::material::Material;
use crate::pool::{GeometryPool, ShapeKind};
use crate::scene::entity::{Category, SceneEntity, Transform3};
use crate::snapshot::{RobotDimensions, RobotStatus};
use crate::wrap_angle;

const BODY_COLOR: [f32; 4] = [0.85, 0.55, 0.1, 1.0];
const WHEEL_COLOR: [f32; 4] = [0.15, 0.15, 0.17, 1.0];
const BEACON_COLOR: [f32; 4] = [0.25, 0.25, 0.28, 1.0];
const NOSE_COLOR: [f32; 4] = [0.9, 0.85, 0.75, 1.0];
const PATH_HEIGHT: f32 = 0.05;

/// How fast the rendered pose chases the authoritative snapshot pose.
const EASE_RATE: f32 = 10.0;

struct ChassisPart {
    offset: Vec3,
    entity: SceneEntity,
}

/// Owns the robot's visual representation: fixed chassis parts built once,
/// a pose eased toward the latest snapshot, a status beacon tint and the
/// planned-path polyline.
pub struct RobotManager {
    parts: Vec<ChassisPart>,
    dimensions: RobotDimensions,
    target_position: Vec3,
    target_yaw: f32,
    rendered_position: Vec3,
    rendered_yaw: f32,
    status: RobotStatus,
    path: Vec<Vec3>,
    paths_visible: bool,
    initialized: bool,
    has_pose: bool,
}

impl RobotManager {
    pub fn new() -> Self {
        Self {
            parts: Vec::new(),
            dimensions: RobotDimensions::default(),
            target_position: Vec3::ZERO,
            target_yaw: 0.0,
            rendered_position: Vec3::ZERO,
            rendered_yaw: 0.0,
            status: RobotStatus::Idle,
            path: Vec::new(),
            paths_visible: true,
            initialized: false,
            has_pose: false,
        }
    }

    /// Builds the chassis once: body, four caster wheels, a nose marker for
    /// heading and the status beacon on top.
    pub fn init(&mut self, dimensions: RobotDimensions, pool: &mut GeometryPool) {
        self.dimensions = dimensions;
        self.parts.clear();

        let RobotDimensions { width, length, height } = dimensions;
        let body = pool.get_shared(ShapeKind::Cuboid, [length, height, width]);
        self.push_part(Vec3::new(0.0, height * 0.5 + 0.05, 0.0), body, Material::lit(BODY_COLOR));

        let wheel = pool.get_shared(ShapeKind::Cylinder, [0.06, 0.1, 0.0]);
        let wx = length * 0.35;
        let wz = width * 0.35;
        for (x, z) in [(wx, wz), (wx, -wz), (-wx, wz), (-wx, -wz)] {
            self.push_part(
                Vec3::new(x, 0.05, z),
                wheel.clone(),
                Material::lit(WHEEL_COLOR).with_roughness(0.9),
            );
        }

        let nose = pool.get_shared(ShapeKind::Cuboid, [0.1, 0.05, width * 0.4]);
        self.push_part(
            Vec3::new(length * 0.5 + 0.05, height * 0.7, 0.0),
            nose,
            Material::lit(NOSE_COLOR),
        );

        let beacon = pool.get_shared(ShapeKind::Cylinder, [0.06, 0.12, 0.0]);
        self.push_part(
            Vec3::new(0.0, height + 0.11, 0.0),
            beacon,
            Material::lit(BEACON_COLOR),
        );

        self.initialized = true;
        self.apply_status_tint();
        self.place_parts();
    }

    fn push_part(&mut self, offset: Vec3, geometry: crate::pool::GeometryHandle, material: Material) {
        let entity = SceneEntity::new(Category::Robot, geometry, material);
        self.parts.push(ChassisPart { offset, entity });
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn dimensions(&self) -> RobotDimensions {
        self.dimensions
    }

    /// Authoritative pose from the snapshot; applied every snapshot
    /// independent of any reconcile. Simulation (x, y) maps to scene (x, z),
    /// simulation heading is counter-clockwise in the floor plane.
    pub fn update_transform(&mut self, position: [f32; 2], orientation_radians: f32) {
        self.target_position = Vec3::new(position[0], 0.0, position[1]);
        self.target_yaw = -orientation_radians;
        // first pose snaps instead of easing in from the origin
        if !self.has_pose {
            self.has_pose = true;
            self.rendered_position = self.target_position;
            self.rendered_yaw = self.target_yaw;
            if self.initialized {
                self.place_parts();
            }
        }
    }

    pub fn update_status(&mut self, status: RobotStatus) {
        if self.status != status {
            self.status = status;
            self.apply_status_tint();
        }
    }

    pub fn status(&self) -> RobotStatus {
        self.status
    }

    fn apply_status_tint(&mut self) {
        let tint = self.status.tint();
        // body and beacon carry the indicator; wheels and nose stay neutral
        if let Some(body) = self.parts.first_mut() {
            body.entity.set_emissive(tint);
        }
        if let Some(beacon) = self.parts.last_mut() {
            beacon.entity.set_emissive(tint);
        }
    }

    /// Rebuilds the planned-path polyline from the robot through the
    /// waypoints. Fewer than two points means no polyline at all.
    pub fn update_path(&mut self, waypoints: &[[f32; 2]]) {
        self.path.clear();
        if waypoints.is_empty() {
            return;
        }
        self.path.push(Vec3::new(self.target_position.x, PATH_HEIGHT, self.target_position.z));
        self.path
            .extend(waypoints.iter().map(|w| Vec3::new(w[0], PATH_HEIGHT, w[1])));
        if self.path.len() < 2 {
            self.path.clear();
        }
    }

    pub fn set_paths_visible(&mut self, visible: bool) {
        self.paths_visible = visible;
    }

    pub fn paths_visible(&self) -> bool {
        self.paths_visible
    }

    /// Polyline to draw this frame, or `None` when hidden or degenerate.
    pub fn path_points(&self) -> Option<&[Vec3]> {
        if self.paths_visible && self.path.len() >= 2 {
            Some(&self.path)
        } else {
            None
        }
    }

    /// Per-frame interpolation hook: eases the rendered pose toward the
    /// authoritative one and re-places the chassis parts.
    pub fn animate(&mut self, dt: f32) {
        if !self.initialized {
            return;
        }
        let blend = (dt * EASE_RATE).clamp(0.0, 1.0);
        self.rendered_position = self.rendered_position.lerp(self.target_position, blend);
        self.rendered_yaw += wrap_angle(self.target_yaw - self.rendered_yaw) * blend;
        self.place_parts();
    }

    fn place_parts(&mut self) {
        let rotation = Quat::from_rotation_y(self.rendered_yaw);
        for part in &mut self.parts {
            part.entity.transform = Transform3 {
                translation: self.rendered_position + rotation * part.offset,
                yaw: self.rendered_yaw,
                scale: Vec3::ONE,
            };
        }
    }

    pub fn rendered_position(&self) -> Vec3 {
        self.rendered_position
    }

    pub fn entities(&self) -> impl Iterator<Item = &SceneEntity> {
        self.parts.iter().map(|part| &part.entity)
    }

    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut SceneEntity> {
        self.parts.iter_mut().map(|part| &mut part.entity)
    }

    pub fn clear(&mut self) {
        self.parts.clear();
        self.path.clear();
        self.initialized = false;
        self.has_pose = false;
    }
}

impl Default for RobotManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initialized_manager() -> (RobotManager, GeometryPool) {
        let mut pool = GeometryPool::new();
        let mut manager = RobotManager::new();
        manager.init(RobotDimensions::default(), &mut pool);
        (manager, pool)
    }

    #[test]
    fn chassis_parts_share_wheel_geometry() {
        let (manager, pool) = initialized_manager();
        assert_eq!(manager.entities().count(), 7); // body + 4 wheels + nose + beacon
        // 4 wheels resolve to one pooled cylinder; beacon differs in size
        assert!(pool.len() < 7);
    }

    #[test]
    fn status_change_updates_emissive_tint() {
        let (mut manager, _pool) = initialized_manager();
        manager.update_status(RobotStatus::Idle);
        let body_emissive = manager.entities().next().expect("body").material.emissive;
        assert_eq!(body_emissive, [0.0, 0.0, 0.0]);
        manager.update_status(RobotStatus::Moving);
        let body_emissive = manager.entities().next().expect("body").material.emissive;
        assert_eq!(body_emissive, RobotStatus::Moving.tint());
    }

    #[test]
    fn transform_eases_toward_snapshot_pose() {
        let (mut manager, _pool) = initialized_manager();
        manager.update_transform([1.0, 1.0], 0.0);
        assert!((manager.rendered_position() - Vec3::new(1.0, 0.0, 1.0)).length() < 1e-6);
        manager.update_transform([5.0, 1.0], 0.0);
        for _ in 0..120 {
            manager.animate(0.016);
        }
        assert!((manager.rendered_position() - Vec3::new(5.0, 0.0, 1.0)).length() < 0.05);
    }

    #[test]
    fn short_or_hidden_paths_produce_no_polyline() {
        let (mut manager, _pool) = initialized_manager();
        manager.update_transform([1.0, 1.0], 0.0);
        manager.update_path(&[]);
        assert!(manager.path_points().is_none());
        manager.update_path(&[[5.0, 1.0], [5.0, 6.0]]);
        assert_eq!(manager.path_points().expect("polyline").len(), 3);
        manager.set_paths_visible(false);
        assert!(manager.path_points().is_none());
    }
}
