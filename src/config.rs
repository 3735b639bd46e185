/* Configuration model and validation (3, 6). Config is immutable once
 * loaded; reload produces a new Config and the old one is discarded only
 * after the new Compositor starts (3). */

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::registry;
use crate::error::CoreError;
use crate::geometry::{DisplayGeometry, WidgetPlacement};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub background: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectDriverConfig {
    /* Hex strings, e.g. "1038" — parsed during backend construction, not
     * here, so a bad hex string surfaces as the Direct backend's own parse
     * error rather than a generic ConfigInvalid (8, scenario 6). */
    #[serde(default)]
    pub vid: String,
    #[serde(default)]
    pub pid: String,
    #[serde(default = "default_interface")]
    pub interface: String,
}

fn default_interface() -> String {
    crate::hid::DEFAULT_INTERFACE_TAG.to_string()
}

impl Default for DirectDriverConfig {
    fn default() -> Self {
        Self {
            vid: String::new(),
            pid: String::new(),
            interface: default_interface(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PreviewConfig {
    #[serde(default)]
    pub target_fps: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub widget_type: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub position: WidgetPositionConfig,
    /* Type-specific options, opaque to the core — handed to the external
     * widget factory unparsed. */
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WidgetPositionConfig {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
    #[serde(default)]
    pub z_order: i32,
}

impl From<WidgetPositionConfig> for WidgetPlacement {
    fn from(p: WidgetPositionConfig) -> Self {
        WidgetPlacement {
            x: p.x,
            y: p.y,
            w: p.w,
            h: p.h,
            z_order: p.z_order,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub game_name: String,
    #[serde(default)]
    pub game_display_name: String,
    pub refresh_rate_ms: u64,
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub direct_driver: DirectDriverConfig,
    pub display: DisplayConfig,
    #[serde(default)]
    pub widgets: Vec<WidgetConfig>,
    #[serde(default)]
    pub supported_resolutions: Vec<Resolution>,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub unregister_on_exit: bool,
    #[serde(default)]
    pub bundled_font_url: Option<String>,
    /* Open Question (b): kept configurable rather than hard-coded. */
    #[serde(default = "default_reload_settle_ms")]
    pub reload_settle_ms: u64,
}

fn default_reload_settle_ms() -> u64 {
    2000
}

impl Config {
    pub fn geometry(&self) -> Result<DisplayGeometry, CoreError> {
        DisplayGeometry::new(self.display.width, self.display.height)
            .map_err(CoreError::ConfigInvalid)
    }

    pub fn reload_settle_duration(&self) -> Duration {
        Duration::from_millis(self.reload_settle_ms)
    }

    /* Parse and validate a config from a JSON file. Validation uses the
     * registry's `is_registered`/`registered_names` callbacks so this
     * function never needs to know about specific backend names (4.B). */
    pub fn load(path: &Path) -> Result<Config, CoreError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::ConfigInvalid(format!("reading {}: {e}", path.display())))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Config, CoreError> {
        let cfg: Config = serde_json::from_str(text)
            .map_err(|e| CoreError::ConfigInvalid(format!("parsing JSON: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.refresh_rate_ms == 0 {
            return Err(CoreError::ConfigInvalid(
                "refresh_rate_ms must be > 0".to_string(),
            ));
        }

        let geometry = self.geometry()?;

        if !self.backend.is_empty() && !registry::is_registered(&self.backend) {
            return Err(CoreError::ConfigInvalid(format!(
                "unknown backend: {} (available: {})",
                self.backend,
                registry::registered_names().join(", ")
            )));
        }

        for widget in &self.widgets {
            let placement: WidgetPlacement = widget.position.into();
            if !placement.fits(geometry) {
                return Err(CoreError::ConfigInvalid(format!(
                    "widget {} placement {:?} does not fit display {}x{}",
                    widget.id, placement, geometry.width, geometry.height
                )));
            }
        }

        Ok(())
    }

    pub fn enabled_widgets(&self) -> impl Iterator<Item = &WidgetConfig> {
        self.widgets.iter().filter(|w| w.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{
            "refresh_rate_ms": 100,
            "display": {"width": 128, "height": 40, "background": 0},
            "widgets": [
                {"id": "clock", "type": "clock", "position": {"x": 0, "y": 0, "w": 40, "h": 10}}
            ]
        }"#
    }

    #[test]
    fn parses_minimal_config() {
        let cfg = Config::parse(minimal_json()).unwrap();
        assert_eq!(cfg.refresh_rate_ms, 100);
        assert_eq!(cfg.widgets.len(), 1);
        assert_eq!(cfg.reload_settle_ms, 2000);
    }

    #[test]
    fn rejects_zero_refresh_rate() {
        let json = minimal_json().replace("\"refresh_rate_ms\": 100", "\"refresh_rate_ms\": 0");
        assert!(matches!(Config::parse(&json), Err(CoreError::ConfigInvalid(_))));
    }

    #[test]
    fn rejects_out_of_bounds_widget_placement() {
        let json = minimal_json().replace(
            r#"{"x": 0, "y": 0, "w": 40, "h": 10}"#,
            r#"{"x": 100, "y": 0, "w": 40, "h": 10}"#,
        );
        assert!(matches!(Config::parse(&json), Err(CoreError::ConfigInvalid(_))));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            Config::parse("{ invalid json }"),
            Err(CoreError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn rejects_unknown_backend_name() {
        let json = minimal_json().replace("\"refresh_rate_ms\": 100", "\"refresh_rate_ms\": 100, \"backend\": \"zzz\"");
        assert!(matches!(Config::parse(&json), Err(CoreError::ConfigInvalid(_))));
    }
}
