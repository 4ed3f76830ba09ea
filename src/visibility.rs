use glam::{Mat4, Vec3, Vec4};

use crate::config::LodConfig;
use crate::scene::{Category, SceneEntity};

/// View frustum as six inward-facing planes extracted from a view-projection
/// matrix.
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    pub fn from_matrix(view_proj: &Mat4) -> Self {
        let m = view_proj.to_cols_array_2d();
        let planes = [
            Vec4::new(m[0][3] + m[0][0], m[1][3] + m[1][0], m[2][3] + m[2][0], m[3][3] + m[3][0]),
            Vec4::new(m[0][3] - m[0][0], m[1][3] - m[1][0], m[2][3] - m[2][0], m[3][3] - m[3][0]),
            Vec4::new(m[0][3] + m[0][1], m[1][3] + m[1][1], m[2][3] + m[2][1], m[3][3] + m[3][1]),
            Vec4::new(m[0][3] - m[0][1], m[1][3] - m[1][1], m[2][3] - m[2][1], m[3][3] - m[3][1]),
            Vec4::new(m[0][3] + m[0][2], m[1][3] + m[1][2], m[2][3] + m[2][2], m[3][3] + m[3][2]),
            Vec4::new(m[0][3] - m[0][2], m[1][3] - m[1][2], m[2][3] - m[2][2], m[3][3] - m[3][2]),
        ];
        Self { planes }
    }

    pub fn contains_sphere(&self, center: Vec3, radius: f32) -> bool {
        for plane in &self.planes {
            let distance = plane.x * center.x + plane.y * center.y + plane.z * center.z + plane.w;
            if distance < -radius {
                return false;
            }
        }
        true
    }
}

/// Distance band an in-view entity falls into. Ordering matters: detail only
/// ever decreases from `Near` to `Far`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DetailTier {
    Near,
    Mid,
    Far,
}

pub fn detail_tier(distance: f32, lod: &LodConfig) -> DetailTier {
    if distance < lod.near_distance {
        DetailTier::Near
    } else if distance <= lod.far_distance {
        DetailTier::Mid
    } else {
        DetailTier::Far
    }
}

/// Per-frame culling and level-of-detail pass over the culling-eligible
/// categories (racks, obstacles, items). Runs after camera update, before
/// draw; the robot and fixed structure never go through it.
pub struct VisibilityPass {
    lod: LodConfig,
}

impl VisibilityPass {
    pub fn new(lod: LodConfig) -> Self {
        Self { lod }
    }

    pub fn lod(&self) -> &LodConfig {
        &self.lod
    }

    pub fn set_lod(&mut self, lod: LodConfig) {
        self.lod = lod;
    }

    pub fn run<'a>(
        &self,
        camera_position: Vec3,
        view_proj: &Mat4,
        entities: impl Iterator<Item = &'a mut SceneEntity>,
    ) {
        let frustum = Frustum::from_matrix(view_proj);
        for entity in entities {
            if !entity.category.culling_eligible() {
                continue;
            }
            let center = entity.world_center();
            let radius = entity.world_radius();
            if !frustum.contains_sphere(center, radius) {
                entity.visible = false;
                continue;
            }
            entity.visible = true;
            let tier = detail_tier(camera_position.distance(center), &self.lod);
            self.apply_tier(entity, tier);
        }
    }

    /// Per-category shadow table. Every rule is distance-monotonic: moving an
    /// entity farther away can only clear flags, never set them.
    fn apply_tier(&self, entity: &mut SceneEntity, tier: DetailTier) {
        match entity.category {
            Category::Item => {
                entity.casts_shadows =
                    tier == DetailTier::Near && entity.slot < self.lod.item_shadow_casters;
                entity.receives_shadows = tier <= DetailTier::Mid;
            }
            Category::Rack => {
                entity.casts_shadows = tier <= DetailTier::Mid;
                entity.receives_shadows = tier <= DetailTier::Mid;
            }
            Category::Obstacle => {
                entity.casts_shadows = tier == DetailTier::Near;
                entity.receives_shadows = tier <= DetailTier::Mid;
            }
            _ => {}
        }
    }
}
