use std::collections::HashMap;

use glam::Vec3;

use crate::config::CapsConfig;
use crate::material::Material;
use crate::pool::{GeometryPool, ShapeKind};
use crate::scene::entity::{Category, SceneEntity, Transform3};
use crate::snapshot::WarehouseState;

const WALL_HEIGHT: f32 = 1.2;
const WALL_THICKNESS: f32 = 0.15;
const OBSTACLE_FALLBACK_HEIGHT: f32 = 0.6;
const RACK_FALLBACK_HEIGHT: f32 = 1.0;
const STATION_PAD_RADIUS: f32 = 0.45;
const STATION_PAD_HEIGHT: f32 = 0.06;

const FLOOR_COLOR: [f32; 4] = [0.23, 0.25, 0.27, 1.0];
const WALL_COLOR: [f32; 4] = [0.55, 0.57, 0.6, 1.0];
const OBSTACLE_COLOR: [f32; 4] = [0.5, 0.18, 0.14, 1.0];
const RACK_COLOR: [f32; 4] = [0.3, 0.42, 0.55, 1.0];
const STATION_COLOR: [f32; 4] = [0.1, 0.45, 0.2, 1.0];

// item tint cycled by type hash so same-type crates match
const ITEM_PALETTE: [[f32; 4]; 5] = [
    [0.75, 0.55, 0.2, 1.0],
    [0.62, 0.3, 0.55, 1.0],
    [0.25, 0.55, 0.6, 1.0],
    [0.7, 0.65, 0.3, 1.0],
    [0.45, 0.5, 0.7, 1.0],
];

/// Owns the visual lifecycle of the static structure (floor, walls) and the
/// per-snapshot warehouse furniture: obstacles, racks, items and charging
/// stations. Never touches entities of another manager.
pub struct WarehouseManager {
    caps: CapsConfig,
    dimensions: Option<(f32, f32)>,
    fixtures: Vec<SceneEntity>,
    obstacles: HashMap<usize, SceneEntity>,
    racks: HashMap<usize, SceneEntity>,
    items: HashMap<i64, SceneEntity>,
    stations: HashMap<usize, SceneEntity>,
    hidden: Vec<Category>,
}

impl WarehouseManager {
    pub fn new(caps: CapsConfig) -> Self {
        Self {
            caps,
            dimensions: None,
            fixtures: Vec::new(),
            obstacles: HashMap::new(),
            racks: HashMap::new(),
            items: HashMap::new(),
            stations: HashMap::new(),
            hidden: Vec::new(),
        }
    }

    pub fn dimensions(&self) -> Option<(f32, f32)> {
        self.dimensions
    }

    /// Builds the per-session fixtures for a warehouse of `width` x `length`
    /// metres. Re-invoked only when the snapshot reports new dimensions.
    pub fn init(&mut self, width: f32, length: f32, pool: &mut GeometryPool) {
        self.dimensions = Some((width, length));
        self.fixtures.clear();

        let floor = pool.get_shared(ShapeKind::Plane, [width, length, 0.0]);
        self.fixtures.push(
            SceneEntity::new(Category::Floor, floor, Material::lit(FLOOR_COLOR).with_roughness(0.95))
                .with_transform(Transform3::at(Vec3::new(width * 0.5, 0.0, length * 0.5))),
        );

        let wall_x = pool.get_shared(ShapeKind::Cuboid, [width, WALL_HEIGHT, WALL_THICKNESS]);
        let wall_z = pool.get_shared(ShapeKind::Cuboid, [WALL_THICKNESS, WALL_HEIGHT, length]);
        let wall_y = WALL_HEIGHT * 0.5;
        let placements = [
            (wall_x.clone(), Vec3::new(width * 0.5, wall_y, 0.0)),
            (wall_x, Vec3::new(width * 0.5, wall_y, length)),
            (wall_z.clone(), Vec3::new(0.0, wall_y, length * 0.5)),
            (wall_z, Vec3::new(width, wall_y, length * 0.5)),
        ];
        for (geometry, position) in placements {
            self.fixtures.push(
                SceneEntity::new(Category::Wall, geometry, Material::lit(WALL_COLOR))
                    .with_transform(Transform3::at(position)),
            );
        }
    }

    /// Applies one warehouse fragment: rebuilds fixtures when the floor plan
    /// changed, then reconciles every bounded category against its cap.
    pub fn reconcile(&mut self, state: &WarehouseState, pool: &mut GeometryPool) {
        let dims = (state.width, state.length);
        if self.dimensions != Some(dims) && state.width > 0.0 && state.length > 0.0 {
            self.init(state.width, state.length, pool);
        }

        reconcile_indexed(
            &mut self.obstacles,
            state.obstacles.len().min(self.caps.obstacles),
            pool,
            |slot, pool| {
                let spec = &state.obstacles[slot];
                let dims = spec.dims3(OBSTACLE_FALLBACK_HEIGHT);
                let geometry = pool.get_shared(ShapeKind::Cuboid, dims);
                SceneEntity::new(Category::Obstacle, geometry, Material::lit(OBSTACLE_COLOR))
                    .with_transform(Transform3::at(box_origin(spec.position, dims)))
            },
            |slot, entity, pool| {
                let spec = &state.obstacles[slot];
                let dims = spec.dims3(OBSTACLE_FALLBACK_HEIGHT);
                entity.geometry = pool.get_shared(ShapeKind::Cuboid, dims);
                entity.transform.translation = box_origin(spec.position, dims);
            },
        );

        reconcile_indexed(
            &mut self.racks,
            state.racks.len().min(self.caps.racks),
            pool,
            |slot, pool| {
                let spec = &state.racks[slot];
                let dims = spec.dims3(RACK_FALLBACK_HEIGHT);
                let geometry = pool.get_shared(ShapeKind::Cuboid, dims);
                SceneEntity::new(Category::Rack, geometry, Material::lit(RACK_COLOR).with_roughness(0.6))
                    .with_transform(Transform3::at(box_origin(spec.position, dims)))
            },
            |slot, entity, pool| {
                let spec = &state.racks[slot];
                let dims = spec.dims3(RACK_FALLBACK_HEIGHT);
                entity.geometry = pool.get_shared(ShapeKind::Cuboid, dims);
                entity.transform.translation = box_origin(spec.position, dims);
            },
        );

        reconcile_indexed(
            &mut self.stations,
            state.charging_stations.len().min(self.caps.charging_stations),
            pool,
            |slot, pool| {
                let spec = &state.charging_stations[slot];
                let geometry =
                    pool.get_shared(ShapeKind::Cylinder, [STATION_PAD_RADIUS, STATION_PAD_HEIGHT, 0.0]);
                let material = Material::lit(STATION_COLOR).with_emissive([0.0, 0.12, 0.04]);
                SceneEntity::new(Category::ChargingStation, geometry, material).with_transform(
                    Transform3::at(Vec3::new(
                        spec.position[0],
                        STATION_PAD_HEIGHT * 0.5,
                        spec.position[1],
                    )),
                )
            },
            |slot, entity, _pool| {
                let spec = &state.charging_stations[slot];
                entity.transform.translation =
                    Vec3::new(spec.position[0], STATION_PAD_HEIGHT * 0.5, spec.position[1]);
            },
        );

        self.reconcile_items(state, pool);
    }

    /// Items carry a stable wire id, so they diff by identity rather than
    /// list position.
    fn reconcile_items(&mut self, state: &WarehouseState, pool: &mut GeometryPool) {
        let capped = &state.items[..state.items.len().min(self.caps.items)];
        for (slot, spec) in capped.iter().enumerate() {
            let dims = spec.dims3();
            let translation = box_origin(spec.position, dims);
            match self.items.get_mut(&spec.id) {
                Some(entity) => {
                    entity.geometry = pool.get_shared(ShapeKind::Cuboid, dims);
                    entity.transform.translation = translation;
                    entity.slot = slot;
                }
                None => {
                    let geometry = pool.get_shared(ShapeKind::Cuboid, dims);
                    let mut entity =
                        SceneEntity::new(Category::Item, geometry, Material::lit(item_color(&spec.kind)))
                            .with_transform(Transform3::at(translation));
                    entity.slot = slot;
                    self.items.insert(spec.id, entity);
                }
            }
        }
        let live: std::collections::HashSet<i64> = capped.iter().map(|item| item.id).collect();
        self.items.retain(|id, _| live.contains(id));
    }

    pub fn set_visible(&mut self, category: Category, visible: bool) {
        if visible {
            self.hidden.retain(|&c| c != category);
        } else if !self.hidden.contains(&category) {
            self.hidden.push(category);
        }
    }

    pub fn category_visible(&self, category: Category) -> bool {
        !self.hidden.contains(&category)
    }

    pub fn entities(&self) -> impl Iterator<Item = &SceneEntity> {
        self.fixtures
            .iter()
            .chain(self.obstacles.values())
            .chain(self.racks.values())
            .chain(self.items.values())
            .chain(self.stations.values())
    }

    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut SceneEntity> {
        self.fixtures
            .iter_mut()
            .chain(self.obstacles.values_mut())
            .chain(self.racks.values_mut())
            .chain(self.items.values_mut())
            .chain(self.stations.values_mut())
    }

    pub fn obstacle_count(&self) -> usize {
        self.obstacles.len()
    }

    pub fn rack_count(&self) -> usize {
        self.racks.len()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    /// Drops every owned entity. Pooled geometry stays with the pool.
    pub fn clear(&mut self) {
        self.fixtures.clear();
        self.obstacles.clear();
        self.racks.clear();
        self.items.clear();
        self.stations.clear();
        self.dimensions = None;
    }
}

/// Identity for id-less categories is the slot index: update in place while
/// the slot exists, dispose the tail when the list shrinks.
fn reconcile_indexed(
    map: &mut HashMap<usize, SceneEntity>,
    kept: usize,
    pool: &mut GeometryPool,
    mut create: impl FnMut(usize, &mut GeometryPool) -> SceneEntity,
    mut update: impl FnMut(usize, &mut SceneEntity, &mut GeometryPool),
) {
    for slot in 0..kept {
        match map.get_mut(&slot) {
            Some(entity) => {
                update(slot, entity, pool);
                entity.slot = slot;
            }
            None => {
                let mut entity = create(slot, pool);
                entity.slot = slot;
                map.insert(slot, entity);
            }
        }
    }
    map.retain(|&slot, _| slot < kept);
}

/// Simulation positions are footprint centres on the floor; lift by half the
/// height so cuboids sit on it.
fn box_origin(position: [f32; 2], dims: [f32; 3]) -> Vec3 {
    Vec3::new(position[0], dims[1] * 0.5, position[1])
}

fn item_color(kind: &str) -> [f32; 4] {
    let hash: usize = kind.bytes().fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    ITEM_PALETTE[hash % ITEM_PALETTE.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ItemState, PlacedBox, StationState};

    fn warehouse_with(items: usize, obstacles: usize) -> WarehouseState {
        WarehouseState {
            width: 20.0,
            length: 30.0,
            obstacles: (0..obstacles)
                .map(|i| PlacedBox { position: [i as f32, 2.0], dimensions: vec![1.0, 1.0] })
                .collect(),
            racks: vec![PlacedBox { position: [8.0, 10.0], dimensions: vec![1.0, 5.0, 1.0] }],
            items: (0..items)
                .map(|i| ItemState {
                    id: i as i64,
                    kind: "crate".to_string(),
                    position: [1.0 + i as f32 * 0.1, 2.0],
                    dimensions: None,
                })
                .collect(),
            charging_stations: vec![
                StationState { position: [0.5, 0.5] },
                StationState { position: [19.5, 0.5] },
            ],
        }
    }

    #[test]
    fn caps_bound_every_category() {
        let mut pool = GeometryPool::new();
        let mut manager = WarehouseManager::new(CapsConfig::default());
        let state = warehouse_with(60, 25);
        manager.reconcile(&state, &mut pool);
        assert_eq!(manager.item_count(), 50);
        assert_eq!(manager.obstacle_count(), 20);
        assert_eq!(manager.rack_count(), 1);
        assert_eq!(manager.station_count(), 2);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut pool = GeometryPool::new();
        let mut manager = WarehouseManager::new(CapsConfig::default());
        let state = warehouse_with(10, 3);
        manager.reconcile(&state, &mut pool);
        let count_once = manager.entities().count();
        let positions_once: Vec<Vec3> =
            manager.entities().map(|e| e.transform.translation).collect();
        manager.reconcile(&state, &mut pool);
        assert_eq!(manager.entities().count(), count_once);
        let positions_twice: Vec<Vec3> =
            manager.entities().map(|e| e.transform.translation).collect();
        assert_eq!(positions_once.len(), positions_twice.len());
    }

    #[test]
    fn missing_identities_are_disposed() {
        let mut pool = GeometryPool::new();
        let mut manager = WarehouseManager::new(CapsConfig::default());
        manager.reconcile(&warehouse_with(10, 5), &mut pool);
        assert_eq!(manager.item_count(), 10);
        let mut shrunk = warehouse_with(4, 2);
        shrunk.items.retain(|item| item.id < 4);
        manager.reconcile(&shrunk, &mut pool);
        assert_eq!(manager.item_count(), 4);
        assert_eq!(manager.obstacle_count(), 2);
    }

    #[test]
    fn identical_obstacles_share_pooled_geometry() {
        let mut pool = GeometryPool::new();
        let mut manager = WarehouseManager::new(CapsConfig::default());
        manager.reconcile(&warehouse_with(0, 5), &mut pool);
        let ids: Vec<_> = manager
            .entities()
            .filter(|e| e.category == Category::Obstacle)
            .map(|e| e.geometry.id)
            .collect();
        assert_eq!(ids.len(), 5);
        assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn fixtures_survive_furniture_reconcile() {
        let mut pool = GeometryPool::new();
        let mut manager = WarehouseManager::new(CapsConfig::default());
        manager.reconcile(&warehouse_with(5, 1), &mut pool);
        let walls = manager.entities().filter(|e| e.category == Category::Wall).count();
        assert_eq!(walls, 4);
        assert_eq!(manager.dimensions(), Some((20.0, 30.0)));
        // same dimensions: fixtures not rebuilt, furniture still reconciled
        manager.reconcile(&warehouse_with(2, 1), &mut pool);
        assert_eq!(manager.entities().filter(|e| e.category == Category::Wall).count(), 4);
        assert_eq!(manager.item_count(), 2);
    }

    #[test]
    fn category_visibility_toggle() {
        let mut manager = WarehouseManager::new(CapsConfig::default());
        assert!(manager.category_visible(Category::Item));
        manager.set_visible(Category::Item, false);
        manager.set_visible(Category::Item, false);
        assert!(!manager.category_visible(Category::Item));
        manager.set_visible(Category::Item, true);
        assert!(manager.category_visible(Category::Item));
    }
}
