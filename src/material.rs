use std::sync::Arc;

/// Solid-color surface description. Entities own their material exclusively
/// (behind an `Arc` so the simplified-view swap can restore the original
/// reference, not a lookalike).
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub base_color: [f32; 4],
    pub emissive: [f32; 3],
    pub metallic: f32,
    pub roughness: f32,
    /// Skips lighting entirely; used by the simplified view and by markers.
    pub unlit: bool,
}

impl Material {
    pub fn lit(base_color: [f32; 4]) -> Self {
        Self { base_color, emissive: [0.0; 3], metallic: 0.0, roughness: 0.85, unlit: false }
    }

    pub fn with_emissive(mut self, emissive: [f32; 3]) -> Self {
        self.emissive = emissive;
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness;
        self
    }

    /// Lighting-independent stand-in keeping the original base color; the
    /// simplified view swaps every entity to one of these.
    pub fn flat_copy(&self) -> Arc<Material> {
        Arc::new(Material {
            base_color: self.base_color,
            emissive: [0.0; 3],
            metallic: 0.0,
            roughness: 1.0,
            unlit: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_copy_keeps_color_and_drops_lighting() {
        let original = Material::lit([0.2, 0.4, 0.6, 1.0]).with_emissive([0.1, 0.0, 0.0]);
        let flat = original.flat_copy();
        assert_eq!(flat.base_color, original.base_color);
        assert_eq!(flat.emissive, [0.0; 3]);
        assert!(flat.unlit);
    }
}
