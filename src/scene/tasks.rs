use glam::Vec3;

use crate::material::Material;
use crate::pool::{GeometryPool, ShapeKind};
use crate::scene::entity::{Category, SceneEntity, Transform3};
use crate::snapshot::{TaskKind, TaskState};

const MARKER_HEIGHT: f32 = 0.02;

/// Owns the floating task markers: one per non-completed task, rebuilt
/// wholesale on every snapshot (cheap at these counts, so no diffing).
pub struct TaskMarkerManager {
    markers: Vec<SceneEntity>,
    visible: bool,
}

impl TaskMarkerManager {
    pub fn new() -> Self {
        Self { markers: Vec::new(), visible: true }
    }

    pub fn reconcile(&mut self, tasks: &[TaskState], pool: &mut GeometryPool) {
        self.markers.clear();
        for (slot, task) in tasks.iter().filter(|task| !task.completed).enumerate() {
            let (geometry, material) = match task.kind {
                TaskKind::Pick => (
                    pool.get_shared(ShapeKind::Ring, [0.25, 0.42, 0.0]),
                    marker_material([0.9, 0.55, 0.1, 1.0]),
                ),
                TaskKind::Place => (
                    pool.get_shared(ShapeKind::Plane, [0.6, 0.6, 0.0]),
                    marker_material([0.2, 0.45, 0.9, 1.0]),
                ),
                TaskKind::Charge => (
                    pool.get_shared(ShapeKind::Disc, [0.35, 0.0, 0.0]),
                    marker_material([0.15, 0.75, 0.3, 1.0]),
                ),
                TaskKind::Other => (
                    pool.get_shared(ShapeKind::Cuboid, [0.25, 0.25, 0.25]),
                    marker_material([0.6, 0.6, 0.6, 1.0]),
                ),
            };
            let mut marker = SceneEntity::new(Category::TaskMarker, geometry, material)
                .with_transform(Transform3::at(Vec3::new(
                    task.position[0],
                    MARKER_HEIGHT,
                    task.position[1],
                )));
            marker.slot = slot;
            marker.receives_shadows = false;
            self.markers.push(marker);
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn category_visible(&self) -> bool {
        self.visible
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn entities(&self) -> impl Iterator<Item = &SceneEntity> {
        self.markers.iter()
    }

    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut SceneEntity> {
        self.markers.iter_mut()
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }
}

impl Default for TaskMarkerManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Markers are unlit so they read the same under any quality tier.
fn marker_material(color: [f32; 4]) -> Material {
    Material { base_color: color, emissive: [0.0; 3], metallic: 0.0, roughness: 1.0, unlit: true }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ShapeKind;

    fn task(kind: TaskKind, completed: bool) -> TaskState {
        TaskState { kind, position: [3.0, 4.0], completed }
    }

    #[test]
    fn completed_tasks_produce_no_marker() {
        let mut pool = GeometryPool::new();
        let mut manager = TaskMarkerManager::new();
        manager.reconcile(&[task(TaskKind::Place, false), task(TaskKind::Pick, true)], &mut pool);
        assert_eq!(manager.marker_count(), 1);
        let marker = manager.entities().next().expect("marker");
        // the surviving marker is the "place" plane
        assert_eq!(marker.geometry.id, pool.get_shared(ShapeKind::Plane, [0.6, 0.6, 0.0]).id);
    }

    #[test]
    fn markers_rebuild_from_scratch_each_snapshot() {
        let mut pool = GeometryPool::new();
        let mut manager = TaskMarkerManager::new();
        manager.reconcile(&[task(TaskKind::Pick, false), task(TaskKind::Charge, false)], &mut pool);
        assert_eq!(manager.marker_count(), 2);
        manager.reconcile(&[task(TaskKind::Charge, false)], &mut pool);
        assert_eq!(manager.marker_count(), 1);
        manager.reconcile(&[], &mut pool);
        assert_eq!(manager.marker_count(), 0);
    }

    #[test]
    fn marker_shape_follows_task_type() {
        let mut pool = GeometryPool::new();
        let mut manager = TaskMarkerManager::new();
        manager.reconcile(
            &[
                task(TaskKind::Pick, false),
                task(TaskKind::Place, false),
                task(TaskKind::Charge, false),
                task(TaskKind::Other, false),
            ],
            &mut pool,
        );
        let ids: Vec<_> = manager.entities().map(|e| e.geometry.id).collect();
        assert_eq!(ids.len(), 4);
        // four distinct shapes, no accidental sharing across kinds
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 4);
    }
}
