use std::collections::HashMap;
use std::sync::Arc;

use crate::mesh::Mesh;

/// Shape kinds the pool knows how to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Cuboid,
    Plane,
    Cylinder,
    Ring,
    Disc,
}

/// Canonical signature of a pooled shape: kind plus dimensions quantized to
/// 3 decimal places (millimetre buckets). Quantization is the single equality
/// rule for the whole pool; callers never compare raw floats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShapeKey {
    pub kind: ShapeKind,
    dims: [i64; 3],
}

impl ShapeKey {
    pub fn new(kind: ShapeKind, dims: [f32; 3]) -> Self {
        Self { kind, dims: [quantize(dims[0]), quantize(dims[1]), quantize(dims[2])] }
    }
}

fn quantize(value: f32) -> i64 {
    (value as f64 * 1000.0).round() as i64
}

/// Monotonically increasing identifier; the renderer keys its GPU-mesh cache
/// on this so visually identical entities share one vertex/index upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub u64);

pub struct PooledGeometry {
    pub id: GeometryId,
    pub mesh: Mesh,
}

pub type GeometryHandle = Arc<PooledGeometry>;

/// Cache of shared geometries keyed by shape signature. The pool exclusively
/// owns its entries; entities hold non-owning `Arc` clones and must never
/// tear one down themselves.
#[derive(Default)]
pub struct GeometryPool {
    entries: HashMap<ShapeKey, GeometryHandle>,
    next_id: u64,
}

impl GeometryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared handle for `kind` + `dims`, allocating on first use.
    /// Identical signatures always resolve to the same handle.
    pub fn get_shared(&mut self, kind: ShapeKind, dims: [f32; 3]) -> GeometryHandle {
        let key = ShapeKey::new(kind, dims);
        if let Some(handle) = self.entries.get(&key) {
            return handle.clone();
        }
        let mesh = build_mesh(kind, dims);
        let handle = Arc::new(PooledGeometry { id: GeometryId(self.next_id), mesh });
        self.next_id += 1;
        self.entries.insert(key, handle.clone());
        handle
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every pooled geometry. Only valid at full scene teardown, once
    /// no entity holds a handle.
    pub fn release_all(&mut self) {
        self.entries.clear();
    }
}

fn build_mesh(kind: ShapeKind, dims: [f32; 3]) -> Mesh {
    match kind {
        ShapeKind::Cuboid => Mesh::cuboid(dims[0], dims[1], dims[2]),
        ShapeKind::Plane => Mesh::plane(dims[0], dims[1]),
        ShapeKind::Cylinder => Mesh::cylinder(dims[0], dims[1], 24),
        ShapeKind::Ring => Mesh::ring(dims[0], dims[1], 32),
        ShapeKind::Disc => Mesh::disc(dims[0], 24),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_signatures_share_one_handle() {
        let mut pool = GeometryPool::new();
        let a = pool.get_shared(ShapeKind::Cuboid, [1.0, 2.0, 3.0]);
        let b = pool.get_shared(ShapeKind::Cuboid, [1.0, 2.0, 3.0]);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn quantization_buckets_to_three_decimals() {
        let mut pool = GeometryPool::new();
        let a = pool.get_shared(ShapeKind::Cuboid, [1.0001, 2.0, 3.0]);
        let b = pool.get_shared(ShapeKind::Cuboid, [1.0004, 2.0, 3.0]);
        let c = pool.get_shared(ShapeKind::Cuboid, [1.001, 2.0, 3.0]);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn distinct_kinds_never_collide() {
        let mut pool = GeometryPool::new();
        let cuboid = pool.get_shared(ShapeKind::Cuboid, [1.0, 1.0, 1.0]);
        let plane = pool.get_shared(ShapeKind::Plane, [1.0, 1.0, 1.0]);
        assert!(!Arc::ptr_eq(&cuboid, &plane));
        assert_ne!(cuboid.id, plane.id);
    }

    #[test]
    fn release_all_empties_the_pool() {
        let mut pool = GeometryPool::new();
        pool.get_shared(ShapeKind::Disc, [0.4, 0.0, 0.0]);
        pool.get_shared(ShapeKind::Ring, [0.3, 0.5, 0.0]);
        assert_eq!(pool.len(), 2);
        pool.release_all();
        assert!(pool.is_empty());
    }
}
