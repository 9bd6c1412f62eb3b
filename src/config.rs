use serde::Deserialize;
use std::path::Path;

use crate::compositor::{GridSettings, PlacementSettings, DEFAULT_MAX_RESOLUTION};
use crate::grid::{Layout, DEFAULT_BLEND_PX};
use crate::raster::{Filter, Filters};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub grid: GridConfig,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize)]
pub struct PlacementConfig {
    #[serde(default = "default_max_resolution")]
    pub max_resolution: u32,
    #[serde(default = "default_smooth_filter")]
    pub elevation_filter: Filter,
    #[serde(default = "default_mask_filter")]
    pub mask_filter: Filter,
    #[serde(default = "default_smooth_filter")]
    pub color_filter: Filter,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            max_resolution: default_max_resolution(),
            elevation_filter: default_smooth_filter(),
            mask_filter: default_mask_filter(),
            color_filter: default_smooth_filter(),
        }
    }
}

fn default_max_resolution() -> u32 {
    DEFAULT_MAX_RESOLUTION
}

fn default_smooth_filter() -> Filter {
    Filter::Lanczos
}

fn default_mask_filter() -> Filter {
    Filter::Bilinear
}

#[derive(Debug, Deserialize)]
pub struct GridConfig {
    #[serde(default)]
    pub layout: Layout,
    #[serde(default = "default_blend_px")]
    pub blend_px: u32,
    #[serde(default = "default_mask_filter")]
    pub resample_filter: Filter,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            layout: Layout::default(),
            blend_px: default_blend_px(),
            resample_filter: default_mask_filter(),
        }
    }
}

fn default_blend_px() -> u32 {
    DEFAULT_BLEND_PX
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
        Self::parse(&content)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))
    }

    pub fn placement_settings(&self) -> PlacementSettings {
        PlacementSettings {
            max_resolution: self.placement.max_resolution,
            filters: Filters {
                elevation: self.placement.elevation_filter,
                mask: self.placement.mask_filter,
                color: self.placement.color_filter,
            },
        }
    }

    pub fn grid_settings(&self) -> GridSettings {
        GridSettings {
            layout: self.grid.layout,
            blend_px: self.grid.blend_px,
            resample_filter: self.grid.resample_filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.settings.log_level, "info");
        let placement = config.placement_settings();
        assert_eq!(placement.max_resolution, 8192);
        assert_eq!(placement.filters, Filters::default());
        let grid = config.grid_settings();
        assert_eq!(grid.layout, Layout::Auto);
        assert_eq!(grid.blend_px, 4);
        assert_eq!(grid.resample_filter, Filter::Bilinear);
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::parse(
            r#"
            [settings]
            log_level = "debug"

            [placement]
            max_resolution = 2048
            mask_filter = "nearest"

            [grid]
            layout = "grid"
            blend_px = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.settings.log_level, "debug");
        assert_eq!(config.placement.max_resolution, 2048);
        assert_eq!(config.placement.mask_filter, Filter::Nearest);
        assert_eq!(config.placement.elevation_filter, Filter::Lanczos);
        assert_eq!(config.grid.layout, Layout::Auto);
        assert_eq!(config.grid.blend_px, 8);
    }

    #[test]
    fn zero_max_resolution_is_raised_to_floor() {
        let config = Config::parse("[placement]\nmax_resolution = 0\n").unwrap();
        let placement = config.placement_settings();
        assert_eq!(placement.max_resolution, 0);
        let grid = crate::canvas::OutputGrid::govern(1000, 500, placement.max_resolution);
        assert_eq!((grid.width, grid.height), (64, 32));
    }

    #[test]
    fn unknown_filter_is_rejected() {
        assert!(Config::parse("[placement]\ncolor_filter = \"bicubic\"\n").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load_or_default(Path::new("/nonexistent/terrain-canvas.toml")).unwrap();
        assert_eq!(config.placement.max_resolution, 8192);
    }
}
