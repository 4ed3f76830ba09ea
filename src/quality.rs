use serde::Deserialize;

use crate::scene::SceneEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Low,
    #[default]
    Balanced,
    High,
}

impl QualityTier {
    pub fn label(self) -> &'static str {
        match self {
            QualityTier::Low => "Low",
            QualityTier::Balanced => "Balanced",
            QualityTier::High => "High",
        }
    }

    /// Shadow-map edge length for this tier.
    pub fn shadow_resolution(self) -> u32 {
        match self {
            QualityTier::Low => 512,
            QualityTier::Balanced => 1024,
            QualityTier::High => 2048,
        }
    }

    /// Upper bound on the pixel ratio the renderer may use.
    pub fn pixel_ratio_cap(self, device_ratio: f32) -> f32 {
        match self {
            QualityTier::Low => 1.0,
            QualityTier::Balanced => device_ratio.min(1.5),
            QualityTier::High => device_ratio,
        }
    }
}

/// Shadow quality selector, orthogonal to the tier: `Off` disables the
/// shadow pass entirely, `Low` pins a small map, `High` follows the tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowMode {
    Off,
    Low,
    #[default]
    High,
}

impl ShadowMode {
    pub fn label(self) -> &'static str {
        match self {
            ShadowMode::Off => "Off",
            ShadowMode::Low => "Low",
            ShadowMode::High => "High",
        }
    }
}

/// Session-lifetime render quality state. Mutated only by explicit user
/// action (panel, shortcuts) or the startup degradation path; read by the
/// managers at creation time and by the renderer every frame.
pub struct QualityController {
    tier: QualityTier,
    shadow_mode: ShadowMode,
    simplified: bool,
    device_pixel_ratio: f32,
    shadow_refresh: bool,
}

impl QualityController {
    pub fn new(tier: QualityTier, shadow_mode: ShadowMode, device_pixel_ratio: f32) -> Self {
        Self {
            tier,
            shadow_mode,
            simplified: false,
            device_pixel_ratio: device_pixel_ratio.max(0.5),
            shadow_refresh: true,
        }
    }

    pub fn tier(&self) -> QualityTier {
        self.tier
    }

    pub fn set_tier(&mut self, tier: QualityTier) {
        if self.tier != tier {
            self.tier = tier;
            self.shadow_refresh = true;
        }
    }

    pub fn shadow_mode(&self) -> ShadowMode {
        self.shadow_mode
    }

    pub fn set_shadow_mode(&mut self, mode: ShadowMode) {
        if self.shadow_mode != mode {
            self.shadow_mode = mode;
            self.shadow_refresh = true;
        }
    }

    pub fn simplified_view(&self) -> bool {
        self.simplified
    }

    /// Swaps every live entity's material for a flat unlit one (enable) or
    /// restores the stashed originals by identity (disable). Safe to call
    /// with the current state again; the per-entity stash guard makes the
    /// whole toggle idempotent.
    pub fn set_simplified_view<'a>(
        &mut self,
        enabled: bool,
        entities: impl Iterator<Item = &'a mut SceneEntity>,
    ) {
        self.simplified = enabled;
        for entity in entities {
            if enabled {
                entity.apply_simplified();
            } else {
                entity.restore_original();
            }
        }
        self.shadow_refresh = true;
    }

    /// Entities created after the toggle must match it.
    pub fn conform_new_entity(&self, entity: &mut SceneEntity) {
        if self.simplified {
            entity.apply_simplified();
        }
    }

    pub fn shadows_enabled(&self) -> bool {
        !self.simplified && self.shadow_mode != ShadowMode::Off
    }

    /// Effective shadow-map resolution, `None` when the pass is disabled.
    pub fn shadow_resolution(&self) -> Option<u32> {
        if self.simplified {
            return None;
        }
        match self.shadow_mode {
            ShadowMode::Off => None,
            ShadowMode::Low => Some(512),
            ShadowMode::High => Some(self.tier.shadow_resolution()),
        }
    }

    pub fn pixel_ratio_cap(&self) -> f32 {
        if self.simplified {
            1.0
        } else {
            self.tier.pixel_ratio_cap(self.device_pixel_ratio)
        }
    }

    /// Scale applied to the offscreen scene target relative to the window's
    /// physical size; the native equivalent of capping the pixel ratio.
    pub fn render_scale(&self) -> f32 {
        (self.pixel_ratio_cap() / self.device_pixel_ratio).clamp(0.25, 1.0)
    }

    /// True once after any change that requires shadow-map reallocation.
    pub fn take_shadow_refresh(&mut self) -> bool {
        std::mem::take(&mut self.shadow_refresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Material;
    use crate::pool::{GeometryPool, ShapeKind};
    use crate::scene::{Category, SceneEntity};
    use std::sync::Arc;

    fn entities() -> Vec<SceneEntity> {
        let mut pool = GeometryPool::new();
        (0..3)
            .map(|i| {
                let geometry = pool.get_shared(ShapeKind::Cuboid, [1.0 + i as f32, 1.0, 1.0]);
                SceneEntity::new(Category::Item, geometry, Material::lit([0.3, 0.3, 0.3, 1.0]))
            })
            .collect()
    }

    #[test]
    fn tier_tables_match_documented_values() {
        assert_eq!(QualityTier::Low.shadow_resolution(), 512);
        assert_eq!(QualityTier::Balanced.shadow_resolution(), 1024);
        assert_eq!(QualityTier::High.shadow_resolution(), 2048);
        assert_eq!(QualityTier::Low.pixel_ratio_cap(2.0), 1.0);
        assert_eq!(QualityTier::Balanced.pixel_ratio_cap(2.0), 1.5);
        assert_eq!(QualityTier::High.pixel_ratio_cap(2.0), 2.0);
    }

    #[test]
    fn simplified_round_trip_restores_material_identity() {
        let mut quality =
            QualityController::new(QualityTier::Balanced, ShadowMode::High, 1.0);
        let mut entities = entities();
        let originals: Vec<_> = entities.iter().map(|e| e.material.clone()).collect();

        quality.set_simplified_view(true, entities.iter_mut());
        assert!(!quality.shadows_enabled());
        assert_eq!(quality.pixel_ratio_cap(), 1.0);
        // double-enable must not clobber the stash
        quality.set_simplified_view(true, entities.iter_mut());
        quality.set_simplified_view(false, entities.iter_mut());

        for (entity, original) in entities.iter().zip(&originals) {
            assert!(Arc::ptr_eq(&entity.material, original));
        }
        assert!(quality.shadows_enabled());
    }

    #[test]
    fn shadow_mode_overrides_tier_resolution() {
        let mut quality = QualityController::new(QualityTier::High, ShadowMode::High, 1.0);
        assert_eq!(quality.shadow_resolution(), Some(2048));
        quality.set_shadow_mode(ShadowMode::Low);
        assert_eq!(quality.shadow_resolution(), Some(512));
        quality.set_shadow_mode(ShadowMode::Off);
        assert_eq!(quality.shadow_resolution(), None);
    }

    #[test]
    fn shadow_refresh_fires_once_per_change() {
        let mut quality = QualityController::new(QualityTier::Low, ShadowMode::High, 1.0);
        assert!(quality.take_shadow_refresh()); // initial
        assert!(!quality.take_shadow_refresh());
        quality.set_tier(QualityTier::High);
        assert!(quality.take_shadow_refresh());
        quality.set_tier(QualityTier::High); // unchanged, no refresh
        assert!(!quality.take_shadow_refresh());
    }
}
