use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::quality::{QualityTier, ShadowMode};

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Wareview".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            fullscreen: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "SyncConfig::default_url")]
    pub url: String,
    #[serde(default = "SyncConfig::default_reconnect_delay_secs")]
    pub reconnect_delay_secs: f32,
}

impl SyncConfig {
    fn default_url() -> String {
        "ws://127.0.0.1:9002".to_string()
    }

    const fn default_reconnect_delay_secs() -> f32 {
        2.0
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { url: Self::default_url(), reconnect_delay_secs: Self::default_reconnect_delay_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QualityConfig {
    #[serde(default)]
    pub tier: QualityTier,
    #[serde(default)]
    pub shadows: ShadowMode,
    #[serde(default)]
    pub simplified_view: bool,
    /// MSAA on the scene target. Fixed at startup: changing it means
    /// rebuilding the render surface, so it is not exposed as a live toggle.
    #[serde(default = "QualityConfig::default_antialiasing")]
    pub antialiasing: bool,
}

impl QualityConfig {
    const fn default_antialiasing() -> bool {
        true
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            tier: QualityTier::default(),
            shadows: ShadowMode::default(),
            simplified_view: false,
            antialiasing: Self::default_antialiasing(),
        }
    }
}

/// Distance thresholds and per-category shadow policy for the LOD pass.
#[derive(Debug, Clone, Deserialize)]
pub struct LodConfig {
    #[serde(default = "LodConfig::default_near_distance")]
    pub near_distance: f32,
    #[serde(default = "LodConfig::default_far_distance")]
    pub far_distance: f32,
    /// Only the first N items (by snapshot slot) ever cast shadows.
    #[serde(default = "LodConfig::default_item_shadow_casters")]
    pub item_shadow_casters: usize,
}

impl LodConfig {
    const fn default_near_distance() -> f32 {
        20.0
    }

    const fn default_far_distance() -> f32 {
        40.0
    }

    const fn default_item_shadow_casters() -> usize {
        20
    }
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            near_distance: Self::default_near_distance(),
            far_distance: Self::default_far_distance(),
            item_shadow_casters: Self::default_item_shadow_casters(),
        }
    }
}

/// Hard ceilings on rendered entities per category. Snapshot entries beyond a
/// cap are silently dropped, never an error.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CapsConfig {
    #[serde(default = "CapsConfig::default_items")]
    pub items: usize,
    #[serde(default = "CapsConfig::default_racks")]
    pub racks: usize,
    #[serde(default = "CapsConfig::default_obstacles")]
    pub obstacles: usize,
    #[serde(default = "CapsConfig::default_charging_stations")]
    pub charging_stations: usize,
}

impl CapsConfig {
    const fn default_items() -> usize {
        50
    }

    const fn default_racks() -> usize {
        30
    }

    const fn default_obstacles() -> usize {
        20
    }

    const fn default_charging_stations() -> usize {
        5
    }
}

impl Default for CapsConfig {
    fn default() -> Self {
        Self {
            items: Self::default_items(),
            racks: Self::default_racks(),
            obstacles: Self::default_obstacles(),
            charging_stations: Self::default_charging_stations(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub lod: LodConfig,
    #[serde(default)]
    pub caps: CapsConfig,
}

#[derive(Debug, Clone, Default)]
pub struct AppConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub vsync: Option<bool>,
    pub url: Option<String>,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(&path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("[config] {err:?}; falling back to defaults");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &AppConfigOverrides) {
        if let Some(width) = overrides.width {
            self.window.width = width;
        }
        if let Some(height) = overrides.height {
            self.window.height = height;
        }
        if let Some(vsync) = overrides.vsync {
            self.window.vsync = vsync;
        }
        if let Some(url) = &overrides.url {
            self.sync.url = url.clone();
        }
    }
}

impl AppConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none() && self.vsync.is_none() && self.url.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_tables() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.caps.items, 50);
        assert_eq!(cfg.caps.racks, 30);
        assert_eq!(cfg.caps.obstacles, 20);
        assert_eq!(cfg.caps.charging_stations, 5);
        assert_eq!(cfg.lod.near_distance, 20.0);
        assert_eq!(cfg.lod.far_distance, 40.0);
        assert_eq!(cfg.quality.tier, QualityTier::Balanced);
    }

    #[test]
    fn partial_config_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"window": {{"title": "Test", "width": 640, "height": 480, "vsync": false, "fullscreen": false}},
                "quality": {{"tier": "high"}}}}"#
        )
        .expect("write");
        let cfg = AppConfig::load(file.path()).expect("load");
        assert_eq!(cfg.window.width, 640);
        assert_eq!(cfg.quality.tier, QualityTier::High);
        assert!(cfg.quality.antialiasing);
        assert_eq!(cfg.caps.items, 50);
        assert_eq!(cfg.sync.url, "ws://127.0.0.1:9002");
    }

    #[test]
    fn overrides_apply_on_top_of_file_values() {
        let mut cfg = AppConfig::default();
        let overrides = AppConfigOverrides {
            width: Some(1920),
            vsync: Some(false),
            url: Some("ws://10.0.0.2:9002".to_string()),
            ..Default::default()
        };
        assert!(!overrides.is_empty());
        cfg.apply_overrides(&overrides);
        assert_eq!(cfg.window.width, 1920);
        assert_eq!(cfg.window.height, 720);
        assert!(!cfg.window.vsync);
        assert_eq!(cfg.sync.url, "ws://10.0.0.2:9002");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = AppConfig::load_or_default("definitely/not/here.json");
        assert_eq!(cfg.window.width, 1280);
    }
}
