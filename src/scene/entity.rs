use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};

use crate::material::Material;
use crate::pool::GeometryHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Floor,
    Wall,
    Obstacle,
    Rack,
    Item,
    ChargingStation,
    Robot,
    TaskMarker,
}

impl Category {
    /// Only dynamic warehouse furniture goes through culling and LOD; the
    /// robot and fixed structure are always drawn at full detail.
    pub fn culling_eligible(self) -> bool {
        matches!(self, Category::Rack | Category::Obstacle | Category::Item)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Transform3 {
    pub translation: Vec3,
    pub yaw: f32,
    pub scale: Vec3,
}

impl Default for Transform3 {
    fn default() -> Self {
        Self { translation: Vec3::ZERO, yaw: 0.0, scale: Vec3::ONE }
    }
}

impl Transform3 {
    pub fn at(translation: Vec3) -> Self {
        Self { translation, ..Self::default() }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            self.scale,
            Quat::from_rotation_y(self.yaw),
            self.translation,
        )
    }
}

/// Visual representation of one domain object. Holds a non-owning handle to
/// pooled geometry and exclusively owns its material; dropping the entity
/// releases the handle without touching the pooled mesh.
pub struct SceneEntity {
    pub category: Category,
    pub geometry: GeometryHandle,
    pub material: Arc<Material>,
    /// Back-reference kept while the simplified view has swapped the
    /// material out; restoring puts back this exact `Arc`.
    original_material: Option<Arc<Material>>,
    pub transform: Transform3,
    pub visible: bool,
    pub casts_shadows: bool,
    pub receives_shadows: bool,
    /// Index within the most recent snapshot list for this category.
    pub slot: usize,
}

impl SceneEntity {
    pub fn new(category: Category, geometry: GeometryHandle, material: Material) -> Self {
        Self {
            category,
            geometry,
            material: Arc::new(material),
            original_material: None,
            transform: Transform3::default(),
            visible: true,
            casts_shadows: false,
            receives_shadows: true,
            slot: 0,
        }
    }

    pub fn with_transform(mut self, transform: Transform3) -> Self {
        self.transform = transform;
        self
    }

    pub fn simplified_active(&self) -> bool {
        self.original_material.is_some()
    }

    /// Swap in a flat unlit material, stashing the original. Calling this
    /// twice without a restore in between is a no-op, which is what makes the
    /// simplified-view toggle idempotent.
    pub fn apply_simplified(&mut self) {
        if self.original_material.is_none() {
            let flat = self.material.flat_copy();
            self.original_material = Some(std::mem::replace(&mut self.material, flat));
        }
    }

    /// Put back the stashed material reference (identity-preserving).
    pub fn restore_original(&mut self) {
        if let Some(original) = self.original_material.take() {
            self.material = original;
        }
    }

    /// Updates the emissive tint, writing through to the stashed original
    /// while the simplified view is active so the change survives a restore.
    pub fn set_emissive(&mut self, emissive: [f32; 3]) {
        let target = self.original_material.as_mut().unwrap_or(&mut self.material);
        if target.emissive != emissive {
            let mut updated = (**target).clone();
            updated.emissive = emissive;
            *target = Arc::new(updated);
        }
    }

    pub fn world_center(&self) -> Vec3 {
        self.transform.translation + self.geometry.mesh.bounds.center * self.transform.scale
    }

    pub fn world_radius(&self) -> f32 {
        self.geometry.mesh.bounds.radius * self.transform.scale.max_element()
    }
}
